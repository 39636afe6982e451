//! Single-consumer actor mailboxes.
//!
//! Every tile source owns one mailbox; pushing a message is the only legal
//! way to mutate it. Messages are tagged with an execution environment and a
//! duplication strategy, execute strictly in enqueue order, and are silently
//! discarded once the owning actor is dropped.
//!
//! Handlers receive `&mut T` directly, so reentrant state access from inside
//! a handler is neither supported nor needed; `sync_access` exists for
//! callers outside the mailbox (e.g. a loader continuation checking whether
//! its tile is still visible).

use super::{ExecutionEnvironment, Scheduler};
use futures::channel::oneshot;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// What happens when a message with the same tag already waits in the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Duplication {
    /// Enqueue regardless
    None,
    /// Replace the queued message in place; used for camera updates so slow
    /// consumers never drown in stale ones
    ReplaceNewest,
}

type Handler<T> = Box<dyn FnOnce(&mut T) + Send>;

struct Envelope<T> {
    tag: &'static str,
    environment: ExecutionEnvironment,
    handler: Handler<T>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// FIFO of messages destined for a single actor
pub struct Mailbox<T: Send + 'static> {
    scheduler: Scheduler,
    queue: Mutex<VecDeque<Envelope<T>>>,
    draining: AtomicBool,
    target: Mutex<Weak<Mutex<T>>>,
    // drain tasks capture the mailbox through this self-reference
    self_weak: Weak<Mailbox<T>>,
}

enum Step<T> {
    Run(Envelope<T>),
    Hop(ExecutionEnvironment),
    Done,
}

impl<T: Send + 'static> Mailbox<T> {
    fn new(scheduler: Scheduler) -> Arc<Self> {
        Arc::new_cyclic(|self_weak| Self {
            scheduler,
            queue: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
            target: Mutex::new(Weak::new()),
            self_weak: self_weak.clone(),
        })
    }

    fn bind(&self, target: &Arc<Mutex<T>>) {
        *lock(&self.target) = Arc::downgrade(target);
    }

    fn push(
        &self,
        duplication: Duplication,
        environment: ExecutionEnvironment,
        tag: &'static str,
        handler: Handler<T>,
    ) {
        {
            let mut queue = lock(&self.queue);
            if duplication == Duplication::ReplaceNewest {
                if let Some(existing) = queue.iter_mut().find(|e| e.tag == tag) {
                    existing.handler = handler;
                    existing.environment = environment;
                    drop(queue);
                    self.schedule_drain();
                    return;
                }
            }
            queue.push_back(Envelope {
                tag,
                environment,
                handler,
            });
        }
        self.schedule_drain();
    }

    fn schedule_drain(&self) {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let environment = match lock(&self.queue).front() {
            Some(envelope) => envelope.environment,
            None => {
                self.draining.store(false, Ordering::Release);
                return;
            }
        };
        match self.self_weak.upgrade() {
            Some(mailbox) => self.scheduler.spawn(environment, async move {
                mailbox.drain(environment);
            }),
            None => self.draining.store(false, Ordering::Release),
        }
    }

    /// Runs queued messages on the current executor until the queue is empty
    /// or the next message belongs to a different environment, in which case
    /// draining continues there.
    fn drain(&self, environment: ExecutionEnvironment) {
        loop {
            let step = {
                let mut queue = lock(&self.queue);
                match queue.front().map(|e| e.environment) {
                    None => Step::Done,
                    Some(next) if next != environment => Step::Hop(next),
                    Some(_) => match queue.pop_front() {
                        Some(envelope) => Step::Run(envelope),
                        None => Step::Done,
                    },
                }
            };
            match step {
                Step::Done => break,
                Step::Hop(next) => {
                    if let Some(mailbox) = self.self_weak.upgrade() {
                        self.scheduler.spawn(next, async move {
                            mailbox.drain(next);
                        });
                    }
                    return;
                }
                Step::Run(envelope) => {
                    let target = lock(&self.target).clone();
                    match target.upgrade() {
                        Some(state) => {
                            let mut state = lock(&state);
                            (envelope.handler)(&mut state);
                        }
                        None => {
                            let mut queue = lock(&self.queue);
                            log::debug!(
                                "mailbox target dropped, discarding {} queued messages",
                                queue.len() + 1
                            );
                            queue.clear();
                            break;
                        }
                    }
                }
            }
        }
        self.draining.store(false, Ordering::Release);
        // a push may have raced the flag clear
        if !lock(&self.queue).is_empty() {
            self.schedule_drain();
        }
    }
}

/// Owning handle to an actor: the state plus its mailbox.
///
/// Dropping the `Actor` invalidates all [`WeakActor`] handles; messages still
/// queued are discarded.
pub struct Actor<T: Send + 'static> {
    state: Arc<Mutex<T>>,
    mailbox: Arc<Mailbox<T>>,
}

impl<T: Send + 'static> Actor<T> {
    pub fn new(scheduler: Scheduler, value: T) -> Self {
        let state = Arc::new(Mutex::new(value));
        let mailbox = Mailbox::new(scheduler);
        mailbox.bind(&state);
        Self { state, mailbox }
    }

    /// Enqueues a message with the default environment and no duplication
    /// collapsing
    pub fn message(&self, tag: &'static str, handler: impl FnOnce(&mut T) + Send + 'static) {
        self.message_with(
            Duplication::None,
            ExecutionEnvironment::Computation,
            tag,
            handler,
        );
    }

    pub fn message_with(
        &self,
        duplication: Duplication,
        environment: ExecutionEnvironment,
        tag: &'static str,
        handler: impl FnOnce(&mut T) + Send + 'static,
    ) {
        self.mailbox
            .push(duplication, environment, tag, Box::new(handler));
    }

    /// Enqueues a request and returns a future for its reply.
    ///
    /// The receiver resolves once the message has executed; it also serves
    /// as a fence, since it runs after everything enqueued before it.
    pub fn converse<R: Send + 'static>(
        &self,
        tag: &'static str,
        request: impl FnOnce(&mut T) -> R + Send + 'static,
    ) -> oneshot::Receiver<R> {
        let (reply, receiver) = oneshot::channel();
        self.message(tag, move |state| {
            let _ = reply.send(request(state));
        });
        receiver
    }

    /// Runs a closure against the state outside the mailbox, holding the
    /// state lock. Must not be called from within a handler.
    pub fn sync_access<R>(&self, access: impl FnOnce(&mut T) -> R) -> R {
        let mut state = lock(&self.state);
        access(&mut state)
    }

    pub fn downgrade(&self) -> WeakActor<T> {
        WeakActor {
            state: Arc::downgrade(&self.state),
            mailbox: Arc::downgrade(&self.mailbox),
        }
    }
}

/// Non-owning handle captured by scheduled work; sends become no-ops once
/// the actor is gone.
pub struct WeakActor<T: Send + 'static> {
    state: Weak<Mutex<T>>,
    mailbox: Weak<Mailbox<T>>,
}

impl<T: Send + 'static> Clone for WeakActor<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            mailbox: self.mailbox.clone(),
        }
    }
}

impl<T: Send + 'static> WeakActor<T> {
    /// A handle that was never attached; every send is a no-op
    pub fn empty() -> Self {
        Self {
            state: Weak::new(),
            mailbox: Weak::new(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.state.strong_count() > 0
    }

    pub fn message(&self, tag: &'static str, handler: impl FnOnce(&mut T) + Send + 'static) {
        self.message_with(
            Duplication::None,
            ExecutionEnvironment::Computation,
            tag,
            handler,
        );
    }

    pub fn message_with(
        &self,
        duplication: Duplication,
        environment: ExecutionEnvironment,
        tag: &'static str,
        handler: impl FnOnce(&mut T) + Send + 'static,
    ) {
        match self.mailbox.upgrade() {
            Some(mailbox) => mailbox.push(duplication, environment, tag, Box::new(handler)),
            None => log::debug!("message '{}' dropped, actor is gone", tag),
        }
    }

    /// Like [`Actor::converse`]; the receiver resolves to `Err(Canceled)` if
    /// the actor is gone
    pub fn converse<R: Send + 'static>(
        &self,
        tag: &'static str,
        request: impl FnOnce(&mut T) -> R + Send + 'static,
    ) -> oneshot::Receiver<R> {
        let (reply, receiver) = oneshot::channel();
        self.message(tag, move |state| {
            let _ = reply.send(request(state));
        });
        receiver
    }

    /// Runs a closure against the state if the actor is still alive
    pub fn sync_access<R>(&self, access: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.state.upgrade().map(|state| {
            let mut state = lock(&state);
            access(&mut state)
        })
    }
}
