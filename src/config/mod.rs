//! Layer configuration: zoom tables, zoom behavior and tile URL templates.

use crate::core::coord::RectBounds;
use crate::core::zoom::{ZoomInfo, ZoomLevelTable};
use crate::{Result, TileFlowError};
use serde::{Deserialize, Serialize};

/// Describes a tiled layer to the source: its name, pyramid, zoom behavior
/// and how to address a tile.
pub trait LayerConfig: Send + Sync {
    fn layer_name(&self) -> String;

    /// Builds the load URL for a tile
    fn tile_url(&self, x: i32, y: i32, t: i32, zoom_identifier: i32) -> String;

    fn zoom_levels(&self) -> ZoomLevelTable;

    /// Coarser levels below the real pyramid, used by consumers that
    /// aggregate tile data above the coarsest stored level
    fn virtual_zoom_levels(&self) -> ZoomLevelTable {
        ZoomLevelTable::empty()
    }

    fn zoom_info(&self) -> ZoomInfo;

    /// Optional restriction of the layer to a sub-extent; tiles outside are
    /// never requested
    fn bounds(&self) -> Option<RectBounds> {
        None
    }
}

/// JSON-friendly descriptor for [`TemplateLayerConfig`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerDescriptor {
    pub name: String,
    pub url_template: String,
    pub min_zoom_identifier: i32,
    pub max_zoom_identifier: i32,
    #[serde(default)]
    pub dimensions: Vec<(String, String)>,
}

/// A [`LayerConfig`] driven by a URL template.
///
/// The placeholders `{x}`, `{y}`, `{z}` and `{t}` are substituted with the
/// tile address; any configured dimension name is substituted literally,
/// WMTS-style (`{Time}` -> "20240101").
#[derive(Debug, Clone)]
pub struct TemplateLayerConfig {
    layer_name: String,
    url_template: String,
    table: ZoomLevelTable,
    zoom_info: ZoomInfo,
    dimensions: Vec<(String, String)>,
    bounds: Option<RectBounds>,
}

impl TemplateLayerConfig {
    pub fn new(
        layer_name: impl Into<String>,
        url_template: impl Into<String>,
        table: ZoomLevelTable,
        zoom_info: ZoomInfo,
    ) -> Result<Self> {
        let url_template = url_template.into();
        for placeholder in ["{x}", "{y}", "{z}"] {
            if !url_template.contains(placeholder) {
                return Err(TileFlowError::Config(format!(
                    "url template '{}' is missing '{}'",
                    url_template, placeholder
                )));
            }
        }
        Ok(Self {
            layer_name: layer_name.into(),
            url_template,
            table,
            zoom_info,
            dimensions: Vec::new(),
            bounds: None,
        })
    }

    /// Builds a standard Web Mercator layer from a JSON descriptor
    pub fn from_json(json: &str) -> Result<Self> {
        let descriptor: LayerDescriptor = serde_json::from_str(json)?;
        let table =
            ZoomLevelTable::web_mercator(descriptor.min_zoom_identifier, descriptor.max_zoom_identifier);
        let config = Self::new(
            descriptor.name,
            descriptor.url_template,
            table,
            ZoomInfo::default(),
        )?;
        Ok(config.with_dimensions(descriptor.dimensions))
    }

    pub fn with_dimensions(mut self, dimensions: Vec<(String, String)>) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn with_bounds(mut self, bounds: RectBounds) -> Self {
        self.bounds = Some(bounds);
        self
    }
}

impl LayerConfig for TemplateLayerConfig {
    fn layer_name(&self) -> String {
        self.layer_name.clone()
    }

    fn tile_url(&self, x: i32, y: i32, t: i32, zoom_identifier: i32) -> String {
        let mut url = self.url_template.clone();
        url = url.replace("{z}", &zoom_identifier.to_string());
        url = url.replace("{x}", &x.to_string());
        url = url.replace("{y}", &y.to_string());
        url = url.replace("{t}", &t.to_string());
        for (name, value) in &self.dimensions {
            url = url.replace(&format!("{{{}}}", name), value);
        }
        url
    }

    fn zoom_levels(&self) -> ZoomLevelTable {
        self.table.clone()
    }

    fn virtual_zoom_levels(&self) -> ZoomLevelTable {
        let min_ident = self
            .table
            .levels()
            .iter()
            .map(|l| l.zoom_identifier)
            .min()
            .unwrap_or(0);
        ZoomLevelTable::web_mercator(0, min_ident - 1)
    }

    fn zoom_info(&self) -> ZoomInfo {
        self.zoom_info
    }

    fn bounds(&self) -> Option<RectBounds> {
        self.bounds
    }
}
