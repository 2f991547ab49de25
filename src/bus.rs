//! Change-event fan-out with per-subscriber thread affinity.
//!
//! Subscribers register for a set of [`EventType`]s and choose where they
//! want to be called:
//! - [`ThreadAffinity::Caller`]: inline, on whichever task emitted the event.
//! - [`ThreadAffinity::Main`]: queued to the [`MainLooper`], which drains on a
//!   single designated thread.
//!
//! Events emitted one after another by the same store are delivered to each
//! subscriber in that order.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread;

use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::action::ActionId;
use crate::event::{ChangeEvent, EventType};

pub const MAIN_THREAD_NAME: &str = "fluxsync-main";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadAffinity {
    Caller,
    Main,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

pub trait Subscriber: Send + Sync {
    fn on_event(&self, event: &ChangeEvent);
}

impl<F> Subscriber for F
where
    F: Fn(&ChangeEvent) + Send + Sync,
{
    fn on_event(&self, event: &ChangeEvent) {
        self(event)
    }
}

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    subscriber: Arc<dyn Subscriber>,
    affinity: ThreadAffinity,
}

type MainJob = Box<dyn FnOnce() + Send>;
type Matcher = Box<dyn Fn(&ChangeEvent) -> bool + Send>;

struct Waiter {
    event_type: EventType,
    /// Only events emitted while handling this action resolve the waiter.
    action: Option<ActionId>,
    matches: Matcher,
    tx: oneshot::Sender<ChangeEvent>,
}

pub struct EventBus {
    routes: RwLock<HashMap<EventType, Vec<Subscription>>>,
    waiters: Mutex<Vec<Waiter>>,
    main_tx: Mutex<Sender<MainJob>>,
    main_rx: Mutex<Option<Receiver<MainJob>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("EventBus")
            .field("event_types", &routes.len())
            .finish_non_exhaustive()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            routes: RwLock::new(HashMap::new()),
            waiters: Mutex::new(Vec::new()),
            main_tx: Mutex::new(tx),
            main_rx: Mutex::new(Some(rx)),
        }
    }

    /// Hands out the looper for main-affinity delivery. Only the first call gets it;
    /// events for main-affinity subscribers queue until the looper runs.
    pub fn take_main_looper(&self) -> Option<MainLooper> {
        self.main_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(|rx| MainLooper { rx })
    }

    pub fn register<S>(
        &self,
        subscriber: S,
        affinity: ThreadAffinity,
        interests: &[EventType],
    ) -> SubscriptionId
    where
        S: Subscriber + 'static,
    {
        self.register_arc(Arc::new(subscriber), affinity, interests)
    }

    pub fn register_arc(
        &self,
        subscriber: Arc<dyn Subscriber>,
        affinity: ThreadAffinity,
        interests: &[EventType],
    ) -> SubscriptionId {
        let id = SubscriptionId(Uuid::new_v4());
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        for event_type in interests {
            let list = routes.entry(*event_type).or_default();
            if list.iter().any(|s| s.id == id) {
                continue;
            }
            list.push(Subscription {
                id,
                subscriber: Arc::clone(&subscriber),
                affinity,
            });
        }
        debug!(?id, ?affinity, interests = interests.len(), "subscriber registered");
        id
    }

    /// Returns false when the id was not registered.
    pub fn unregister(&self, id: SubscriptionId) -> bool {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = false;
        for list in routes.values_mut() {
            let before = list.len();
            list.retain(|s| s.id != id);
            removed |= list.len() != before;
        }
        routes.retain(|_, list| !list.is_empty());
        removed
    }

    pub fn subscriber_count(&self, event_type: EventType) -> usize {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event_type)
            .map_or(0, Vec::len)
    }

    /// Resolves with the next event of `event_type`.
    pub fn once(&self, event_type: EventType) -> oneshot::Receiver<ChangeEvent> {
        self.once_matching(event_type, |_| true)
    }

    /// Resolves with the next event of `event_type` accepted by `matches`.
    pub fn once_matching<F>(&self, event_type: EventType, matches: F) -> oneshot::Receiver<ChangeEvent>
    where
        F: Fn(&ChangeEvent) -> bool + Send + 'static,
    {
        self.add_waiter(event_type, None, Box::new(matches))
    }

    /// Resolves with the first `event_type` event emitted on behalf of `action`.
    pub fn once_for(&self, action: ActionId, event_type: EventType) -> oneshot::Receiver<ChangeEvent> {
        self.add_waiter(event_type, Some(action), Box::new(|_: &ChangeEvent| true))
    }

    fn add_waiter(
        &self,
        event_type: EventType,
        action: Option<ActionId>,
        matches: Matcher,
    ) -> oneshot::Receiver<ChangeEvent> {
        let (tx, rx) = oneshot::channel();
        self.waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Waiter {
                event_type,
                action,
                matches,
                tx,
            });
        rx
    }

    /// Emits an event that answers no particular action.
    pub fn emit(&self, event: ChangeEvent) {
        self.publish(None, event);
    }

    /// Emits an event produced while handling `action`.
    pub fn emit_for(&self, action: ActionId, event: ChangeEvent) {
        self.publish(Some(action), event);
    }

    fn publish(&self, action: Option<ActionId>, event: ChangeEvent) {
        let event_type = event.event_type();
        if let Some(err) = event.error() {
            warn!(?event_type, origin = ?event.origin(), kind = %err.kind, "{}", err.message);
        } else {
            debug!(?event_type, origin = ?event.origin(), "emitting change event");
        }

        // Snapshot so subscribers may (un)register from inside a callback.
        let subscriptions = self
            .routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event_type)
            .cloned()
            .unwrap_or_default();

        for sub in subscriptions {
            match sub.affinity {
                ThreadAffinity::Caller => sub.subscriber.on_event(&event),
                ThreadAffinity::Main => {
                    let event = event.clone();
                    let subscriber = Arc::clone(&sub.subscriber);
                    let job: MainJob = Box::new(move || subscriber.on_event(&event));
                    let sent = self
                        .main_tx
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .send(job);
                    if sent.is_err() {
                        warn!(?event_type, "main looper is gone, dropping event");
                    }
                }
            }
        }

        self.resolve_waiters(action, &event);
    }

    fn resolve_waiters(&self, action: Option<ActionId>, event: &ChangeEvent) {
        let mut waiters = self.waiters.lock().unwrap_or_else(PoisonError::into_inner);
        let mut pending = Vec::with_capacity(waiters.len());
        for waiter in waiters.drain(..) {
            if waiter.tx.is_closed() {
                continue;
            }
            let same_action = waiter.action.is_none() || waiter.action == action;
            if same_action && waiter.event_type == event.event_type() && (waiter.matches)(event) {
                let _ = waiter.tx.send(event.clone());
            } else {
                pending.push(waiter);
            }
        }
        *waiters = pending;
    }
}

/// FIFO queue of main-affinity deliveries, drained by the thread that owns it.
pub struct MainLooper {
    rx: Receiver<MainJob>,
}

impl MainLooper {
    /// Runs everything queued so far without blocking. Returns the number of deliveries.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Blocks the current thread, delivering events until the bus is dropped.
    pub fn run(self) {
        while let Ok(job) = self.rx.recv() {
            job();
        }
        debug!("main looper stopped");
    }

    /// Moves the looper onto a dedicated, named thread.
    pub fn spawn(self) -> std::io::Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name(MAIN_THREAD_NAME.to_string())
            .spawn(move || self.run())
    }
}
