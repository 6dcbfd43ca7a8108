use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use super::{
    Disposition, EventCategory, PlatformSignal, RawEvent, SignalHub, SignalKind, Subscription,
    LEAVE_PROMPT,
};
use crate::classify::is_restricted_shortcut;

/// Receiver for normalized events. Called from inside `SignalHub::dispatch`,
/// so an implementation must tolerate being re-entered.
pub trait EventSink {
    fn deliver(&self, event: RawEvent);
}

/// Plain FIFO sink for consumers that poll.
pub type EventQueue = RefCell<VecDeque<RawEvent>>;

impl EventSink for EventQueue {
    fn deliver(&self, event: RawEvent) {
        self.borrow_mut().push_back(event);
    }
}

/// Pure translation from a platform signal to the normalized event stream.
pub fn normalize(signal: &PlatformSignal, at: DateTime<Utc>) -> RawEvent {
    let category = match signal {
        PlatformSignal::VisibilityChange { hidden } => {
            EventCategory::VisibilityChanged { hidden: *hidden }
        }
        PlatformSignal::KeyDown(combo) => EventCategory::KeyPressed(combo.clone()),
        PlatformSignal::ContextMenu => EventCategory::ContextMenuRequested,
        PlatformSignal::FullscreenChange { is_fullscreen } => EventCategory::FullscreenChanged {
            is_fullscreen: *is_fullscreen,
        },
        PlatformSignal::BeforeUnload => EventCategory::BeforeUnloadRequested,
    };
    RawEvent { category, time: at }
}

/// Default-action handling decided at the adapter, before classification.
pub fn suppression_for(category: &EventCategory) -> Disposition {
    match category {
        EventCategory::ContextMenuRequested => Disposition::PreventDefault,
        EventCategory::KeyPressed(combo) if is_restricted_shortcut(combo) => {
            Disposition::PreventDefault
        }
        EventCategory::BeforeUnloadRequested => Disposition::Confirm(LEAVE_PROMPT),
        _ => Disposition::Continue,
    }
}

/// Subscribes to all five signal categories and forwards normalized events
/// to its sink.
///
/// The adapter owns its subscriptions. `detach` releases every one of them,
/// so nothing observed afterwards can reach the sink.
pub struct EventSourceAdapter {
    subscriptions: Vec<Subscription>,
}

impl EventSourceAdapter {
    pub fn attach(hub: &SignalHub, sink: Rc<dyn EventSink>) -> Self {
        let subscriptions = SignalKind::ALL
            .iter()
            .map(|kind| {
                let sink = Rc::clone(&sink);
                hub.subscribe(*kind, move |signal, at| {
                    let event = normalize(signal, at);
                    let disposition = suppression_for(&event.category);
                    sink.deliver(event);
                    disposition
                })
            })
            .collect();
        Self { subscriptions }
    }

    pub fn is_attached(&self) -> bool {
        self.subscriptions.iter().any(Subscription::is_active)
    }

    /// Release all subscriptions. Returns false if already detached.
    pub fn detach(&mut self) -> bool {
        let was_attached = self.is_attached();
        for sub in &mut self.subscriptions {
            sub.release();
        }
        was_attached
    }
}

impl Drop for EventSourceAdapter {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyCombo;

    fn queued(hub: &SignalHub) -> (EventSourceAdapter, Rc<EventQueue>) {
        let queue = Rc::new(EventQueue::default());
        let adapter = EventSourceAdapter::attach(hub, queue.clone());
        (adapter, queue)
    }

    #[test]
    fn attach_subscribes_every_category() {
        let hub = SignalHub::new();
        let (adapter, _queue) = queued(&hub);
        assert!(adapter.is_attached());
        for kind in SignalKind::ALL {
            assert_eq!(hub.listener_count_for(kind), 1);
        }
    }

    #[test]
    fn suppresses_before_classification() {
        let hub = SignalHub::new();
        let (_adapter, queue) = queued(&hub);
        let now = Utc::now();

        let out = hub.dispatch(&PlatformSignal::ContextMenu, now);
        assert!(out.default_prevented);

        let out = hub.dispatch(&PlatformSignal::KeyDown(KeyCombo::new("c").ctrl()), now);
        assert!(out.default_prevented);

        let out = hub.dispatch(&PlatformSignal::KeyDown(KeyCombo::new("b").ctrl()), now);
        assert!(!out.default_prevented);

        let out = hub.dispatch(&PlatformSignal::BeforeUnload, now);
        assert_eq!(out.confirm_prompt, Some(LEAVE_PROMPT));

        let out = hub.dispatch(&PlatformSignal::VisibilityChange { hidden: true }, now);
        assert!(!out.default_prevented);

        assert_eq!(queue.borrow().len(), 5);
        assert_eq!(
            queue.borrow_mut().pop_front().map(|e| e.category),
            Some(EventCategory::ContextMenuRequested)
        );
    }

    #[test]
    fn sink_sees_event_before_dispatch_returns() {
        let hub = SignalHub::new();
        let (_adapter, queue) = queued(&hub);
        let at = Utc::now();

        hub.dispatch(&PlatformSignal::VisibilityChange { hidden: true }, at);
        assert_eq!(
            queue.borrow().front(),
            Some(&RawEvent {
                category: EventCategory::VisibilityChanged { hidden: true },
                time: at,
            })
        );
    }

    #[test]
    fn detach_releases_everything_and_is_idempotent() {
        let hub = SignalHub::new();
        let (mut adapter, queue) = queued(&hub);
        hub.dispatch(&PlatformSignal::ContextMenu, Utc::now());

        assert!(adapter.detach());
        assert_eq!(hub.listener_count(), 0);
        assert!(!adapter.detach());
        // already-delivered events belong to the sink
        assert_eq!(queue.borrow().len(), 1);

        let out = hub.dispatch(&PlatformSignal::ContextMenu, Utc::now());
        assert_eq!(out.delivered, 0);
        assert!(!out.default_prevented);
        assert_eq!(queue.borrow().len(), 1);
    }

    #[test]
    fn repeated_sessions_do_not_leak_listeners() {
        let hub = SignalHub::new();
        for _ in 0..10 {
            let (adapter, _queue) = queued(&hub);
            assert_eq!(hub.listener_count(), SignalKind::ALL.len());
            drop(adapter);
        }
        assert_eq!(hub.listener_count(), 0);
    }
}
