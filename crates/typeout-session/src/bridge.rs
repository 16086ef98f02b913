//! Engine notification channel and the bridge that feeds it into the
//! controller.
//!
//! [`EventHub`] is the in-process side of the notification channel: engine
//! events are emitted into it and delivered to whoever is listening for that
//! kind at delivery time. [`EventBridge`] holds exactly one subscription per
//! kind for the lifetime of the session screen and releases all three
//! together.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::{debug, trace};

use typeout_core::protocol::{EngineEvent, EventKind};

use crate::controller::SessionController;

type Handler = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    by_kind: HashMap<EventKind, Vec<(u64, Handler)>>,
}

/// Fan-out of engine notifications to registered listeners.
///
/// Clones share the same listener table.
#[derive(Clone, Default)]
pub struct EventHub {
    listeners: Arc<Mutex<Listeners>>,
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("EventHub");
        for kind in EventKind::ALL {
            d.field(kind.as_str(), &self.listener_count(kind));
        }
        d.finish()
    }
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `kind`.
    ///
    /// The handler stays registered until the returned [`Subscription`] is
    /// unlistened or dropped.
    pub fn listen<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners
            .by_kind
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        trace!(%kind, id, "Listener registered");

        Subscription {
            listeners: Arc::downgrade(&self.listeners),
            kind,
            id,
            active: true,
        }
    }

    /// Deliver `event` to every listener currently registered for its kind.
    ///
    /// Returns the number of handlers invoked. Events with no listener are
    /// dropped.
    pub fn emit(&self, event: &EngineEvent) -> usize {
        let kind = event.kind();
        // Handlers run without the table lock so they may listen or unlisten.
        let handlers: Vec<Handler> = {
            let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
            listeners
                .by_kind
                .get(&kind)
                .map(|hs| hs.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };

        if handlers.is_empty() {
            trace!(%kind, "No listener, event dropped");
            return 0;
        }
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.by_kind.get(&kind).map_or(0, Vec::len)
    }
}

/// A live registration on an [`EventHub`].
///
/// Dropping it unlistens.
pub struct Subscription {
    listeners: Weak<Mutex<Listeners>>,
    kind: EventKind,
    id: u64,
    active: bool,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Remove the handler from the hub. Calling this twice is a no-op.
    pub fn unlisten(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;

        if let Some(listeners) = self.listeners.upgrade() {
            let mut listeners = listeners.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(handlers) = listeners.by_kind.get_mut(&self.kind) {
                handlers.retain(|(id, _)| *id != self.id);
                if handlers.is_empty() {
                    listeners.by_kind.remove(&self.kind);
                }
            }
            trace!(kind = %self.kind, id = self.id, "Listener removed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unlisten();
    }
}

/// Routes engine notifications into the session controller.
///
/// Each handler holds a controller handle and reads the stage when the event
/// is delivered, so a late `external-cancel` after the run finished is seen
/// against `Finished` and ignored.
#[derive(Debug)]
pub struct EventBridge {
    subscriptions: [Subscription; 3],
}

impl EventBridge {
    /// Subscribe to all three engine notifications.
    pub fn attach(hub: &EventHub, controller: &SessionController) -> Self {
        let started = {
            let controller = controller.clone();
            hub.listen(EventKind::EngineStarted, move |_| {
                let outcome = controller.engine_started();
                debug!(?outcome, "engine-started handled");
            })
        };

        let progress = {
            let controller = controller.clone();
            hub.listen(EventKind::Progress, move |event| {
                if let EngineEvent::Progress {
                    progress,
                    time_left_ms,
                } = *event
                {
                    let outcome = controller.progress(progress, time_left_ms);
                    trace!(?outcome, progress, time_left_ms, "progress handled");
                }
            })
        };

        let cancelled = {
            let controller = controller.clone();
            hub.listen(EventKind::ExternalCancel, move |_| {
                let outcome = controller.external_cancel();
                debug!(?outcome, "external-cancel handled");
            })
        };

        debug!("Event bridge attached");
        Self {
            subscriptions: [started, progress, cancelled],
        }
    }

    pub fn is_attached(&self) -> bool {
        self.subscriptions.iter().all(Subscription::is_active)
    }

    /// Release all three subscriptions, whatever stage the session is in.
    pub fn detach(mut self) {
        for subscription in &mut self.subscriptions {
            subscription.unlisten();
        }
        debug!("Event bridge detached");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_emit_without_listeners_drops_event() {
        let hub = EventHub::new();
        assert_eq!(hub.emit(&EngineEvent::EngineStarted), 0);
    }

    #[test]
    fn test_listen_and_emit() {
        let hub = EventHub::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let _sub = hub.listen(EventKind::ExternalCancel, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(hub.emit(&EngineEvent::ExternalCancel), 1);
        assert_eq!(hub.emit(&EngineEvent::EngineStarted), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unlisten_stops_delivery() {
        let hub = EventHub::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let mut sub = hub.listen(EventKind::EngineStarted, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hub.listener_count(EventKind::EngineStarted), 1);

        sub.unlisten();
        sub.unlisten();
        assert!(!sub.is_active());
        assert_eq!(hub.listener_count(EventKind::EngineStarted), 0);
        assert_eq!(hub.emit(&EngineEvent::EngineStarted), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_drop_unlistens() {
        let hub = EventHub::new();
        {
            let _sub = hub.listen(EventKind::Progress, |_| {});
            assert_eq!(hub.listener_count(EventKind::Progress), 1);
        }
        assert_eq!(hub.listener_count(EventKind::Progress), 0);
    }

    #[test]
    fn test_unlisten_only_removes_own_handler() {
        let hub = EventHub::new();
        let mut first = hub.listen(EventKind::Progress, |_| {});
        let _second = hub.listen(EventKind::Progress, |_| {});
        first.unlisten();
        assert_eq!(hub.listener_count(EventKind::Progress), 1);
    }

    #[test]
    fn test_subscription_outliving_hub() {
        let hub = EventHub::new();
        let mut sub = hub.listen(EventKind::Progress, |_| {});
        drop(hub);
        sub.unlisten();
        assert!(!sub.is_active());
        assert_eq!(sub.kind(), EventKind::Progress);
    }

    #[test]
    fn test_handler_may_unlisten_during_emit() {
        let hub = EventHub::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let inner_slot = Arc::clone(&slot);
        let sub = hub.listen(EventKind::ExternalCancel, move |_| {
            if let Some(mut s) = inner_slot.lock().unwrap().take() {
                s.unlisten();
            }
        });
        *slot.lock().unwrap() = Some(sub);

        assert_eq!(hub.emit(&EngineEvent::ExternalCancel), 1);
        assert_eq!(hub.listener_count(EventKind::ExternalCancel), 0);
    }
}
