//! Action dispatcher: a single queue feeding one handler per domain.
//!
//! `dispatch` never blocks. A worker task pulls actions off the queue and
//! spawns the owning handler for each, so a slow network call in one store
//! does not hold up the others.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::action::{Action, ActionDomain, ActionId};
use crate::bus::{EventBus, Subscriber, SubscriptionId, ThreadAffinity};
use crate::event::{ChangeEvent, EventType};

#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn domain(&self) -> ActionDomain;

    /// Consumes one action. Outcomes are reported through change-events only,
    /// emitted with [`EventBus::emit_for`] and `id`.
    async fn handle(&self, id: ActionId, action: Action);
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("a handler is already registered for {0:?} actions")]
    HandlerAlreadyRegistered(ActionDomain),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Delivered(ChangeEvent),
    /// No matching event arrived in time; the action may still complete later.
    Indeterminate,
}

type Handlers = Arc<RwLock<HashMap<ActionDomain, Arc<dyn ActionHandler>>>>;

#[derive(Clone)]
pub struct Dispatcher {
    action_tx: Arc<Mutex<Option<mpsc::UnboundedSender<(ActionId, Action)>>>>,
    handlers: Handlers,
    bus: Arc<EventBus>,
}

/// Drains the action queue. Runs until every [`Dispatcher`] clone is dropped or shut down.
pub struct DispatchWorker {
    action_rx: mpsc::UnboundedReceiver<(ActionId, Action)>,
    handlers: Handlers,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(bus: Arc<EventBus>) -> (Self, DispatchWorker) {
        let (action_tx, action_rx) = mpsc::unbounded_channel();
        let handlers: Handlers = Arc::new(RwLock::new(HashMap::new()));
        let dispatcher = Self {
            action_tx: Arc::new(Mutex::new(Some(action_tx))),
            handlers: Arc::clone(&handlers),
            bus,
        };
        (dispatcher, DispatchWorker { action_rx, handlers })
    }

    /// Creates a dispatcher with its worker already running on the current Tokio runtime.
    pub fn spawn(bus: Arc<EventBus>) -> (Self, JoinHandle<()>) {
        let (dispatcher, worker) = Self::new(bus);
        let handle = tokio::spawn(worker.run());
        (dispatcher, handle)
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn register_handler(&self, handler: Arc<dyn ActionHandler>) -> Result<(), DispatchError> {
        let domain = handler.domain();
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        if handlers.contains_key(&domain) {
            return Err(DispatchError::HandlerAlreadyRegistered(domain));
        }
        handlers.insert(domain, handler);
        debug!(?domain, "action handler registered");
        Ok(())
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
        self.bus.register(subscriber, affinity, interests)
    }

    pub fn unregister(&self, id: SubscriptionId) -> bool {
        self.bus.unregister(id)
    }

    /// Queues `action` and returns the id its events are emitted under.
    pub fn dispatch(&self, action: impl Into<Action>) -> ActionId {
        let id = ActionId::new();
        self.send(id, action.into());
        id
    }

    fn send(&self, id: ActionId, action: Action) {
        let action_type = action.action_type();
        let guard = self.action_tx.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) => {
                if tx.send((id, action)).is_err() {
                    warn!(%id, ?action_type, "dispatch worker stopped, dropping action");
                } else {
                    debug!(%id, ?action_type, "action queued");
                }
            }
            None => warn!(%id, ?action_type, "dispatcher shut down, dropping action"),
        }
    }

    /// Dispatches `action` and waits for the first `event_type` event emitted while
    /// handling this very action. Other in-flight actions of the same type never
    /// resolve it.
    pub async fn dispatch_and_wait(
        &self,
        action: impl Into<Action>,
        event_type: EventType,
        timeout: Duration,
    ) -> WaitOutcome {
        let action = action.into();
        let origin = action.action_type();
        let id = ActionId::new();
        let rx = self.bus.once_for(id, event_type);
        self.send(id, action);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(event)) => WaitOutcome::Delivered(event),
            Ok(Err(_)) | Err(_) => {
                warn!(%id, ?origin, ?event_type, ?timeout, "no change event before timeout");
                WaitOutcome::Indeterminate
            }
        }
    }

    /// Stops accepting actions. Already queued actions are still handled.
    pub fn shutdown(&self) {
        if self
            .action_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
        {
            info!("dispatcher shutting down");
        }
    }
}

impl DispatchWorker {
    pub async fn run(mut self) {
        while let Some((id, action)) = self.action_rx.recv().await {
            let domain = action.domain();
            let handler = self
                .handlers
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&domain)
                .cloned();
            match handler {
                Some(handler) => {
                    tokio::spawn(async move { handler.handle(id, action).await });
                }
                None => {
                    warn!(%id, action_type = ?action.action_type(), "no handler registered, dropping action");
                }
            }
        }
        debug!("dispatch worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionType, SiteAction};
    use crate::event::OnSitesChanged;

    struct EchoSites {
        bus: Arc<EventBus>,
    }

    #[async_trait]
    impl ActionHandler for EchoSites {
        fn domain(&self) -> ActionDomain {
            ActionDomain::Site
        }

        async fn handle(&self, id: ActionId, action: Action) {
            self.bus.emit_for(id, ChangeEvent::SiteChanged(OnSitesChanged {
                origin: action.action_type(),
                rows_affected: 0,
                error: None,
            }));
        }
    }

    #[tokio::test]
    async fn routes_to_registered_handler() {
        let bus = Arc::new(EventBus::new());
        let (dispatcher, _worker) = Dispatcher::spawn(Arc::clone(&bus));
        dispatcher
            .register_handler(Arc::new(EchoSites { bus: Arc::clone(&bus) }))
            .unwrap();

        let outcome = dispatcher
            .dispatch_and_wait(SiteAction::FetchSites, EventType::SiteChanged, Duration::from_secs(5))
            .await;
        match outcome {
            WaitOutcome::Delivered(event) => assert_eq!(event.origin(), ActionType::FetchSites),
            WaitOutcome::Indeterminate => panic!("expected an event"),
        }
    }

    #[tokio::test]
    async fn second_handler_for_domain_is_rejected() {
        let bus = Arc::new(EventBus::new());
        let (dispatcher, _worker) = Dispatcher::new(Arc::clone(&bus));
        dispatcher
            .register_handler(Arc::new(EchoSites { bus: Arc::clone(&bus) }))
            .unwrap();
        let err = dispatcher
            .register_handler(Arc::new(EchoSites { bus }))
            .unwrap_err();
        assert_eq!(err, DispatchError::HandlerAlreadyRegistered(ActionDomain::Site));
    }

    #[tokio::test]
    async fn unhandled_domain_is_dropped_without_event() {
        let bus = Arc::new(EventBus::new());
        let (dispatcher, _worker) = Dispatcher::spawn(bus);
        let outcome = dispatcher
            .dispatch_and_wait(
                crate::action::PostAction::RemoveAllPosts,
                EventType::PostChanged,
                Duration::from_millis(50),
            )
            .await;
        assert_eq!(outcome, WaitOutcome::Indeterminate);
    }

    #[tokio::test]
    async fn worker_stops_after_shutdown() {
        let bus = Arc::new(EventBus::new());
        let (dispatcher, worker) = Dispatcher::spawn(bus);
        dispatcher.shutdown();
        dispatcher.dispatch(SiteAction::FetchSites);
        tokio::time::timeout(Duration::from_secs(5), worker)
            .await
            .unwrap()
            .unwrap();
    }
}
