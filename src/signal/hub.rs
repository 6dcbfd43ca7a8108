use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::{Disposition, PlatformSignal, SignalKind};

type Listener = Rc<dyn Fn(&PlatformSignal, DateTime<Utc>) -> Disposition>;

struct ListenerEntry {
    id: u64,
    kind: SignalKind,
    listener: Listener,
}

#[derive(Default)]
struct HubInner {
    next_id: u64,
    listeners: Vec<ListenerEntry>,
}

/// Result of dispatching one platform signal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// number of listeners that received the signal
    pub delivered: usize,
    pub default_prevented: bool,
    pub confirm_prompt: Option<&'static str>,
}

/// Single-threaded signal bus standing in for the platform's document.
///
/// Dispatch holds no borrow of the hub while a listener runs, so listeners
/// may subscribe, release subscriptions or dispatch further signals.
/// Listeners that need state use interior mutability.
#[derive(Clone, Default)]
pub struct SignalHub {
    inner: Rc<RefCell<HubInner>>,
}

impl SignalHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: SignalKind, listener: F) -> Subscription
    where
        F: Fn(&PlatformSignal, DateTime<Utc>) -> Disposition + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.push(ListenerEntry {
            id,
            kind,
            listener: Rc::new(listener),
        });
        Subscription {
            hub: Rc::downgrade(&self.inner),
            id,
            kind,
            active: true,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }

    pub fn listener_count_for(&self, kind: SignalKind) -> usize {
        self.inner
            .borrow()
            .listeners
            .iter()
            .filter(|entry| entry.kind == kind)
            .count()
    }

    /// Deliver a signal to every matching listener in subscription order.
    ///
    /// The matching set is fixed when dispatch starts. A listener released
    /// by an earlier one in the same round is skipped.
    pub fn dispatch(&self, signal: &PlatformSignal, at: DateTime<Utc>) -> DispatchOutcome {
        let kind = signal.kind();
        let targets: Vec<(u64, Listener)> = self
            .inner
            .borrow()
            .listeners
            .iter()
            .filter(|entry| entry.kind == kind)
            .map(|entry| (entry.id, Rc::clone(&entry.listener)))
            .collect();

        let mut outcome = DispatchOutcome::default();
        for (id, listener) in targets {
            if !self.is_registered(id) {
                continue;
            }
            outcome.delivered += 1;
            match listener(signal, at) {
                Disposition::Continue => {}
                Disposition::PreventDefault => outcome.default_prevented = true,
                Disposition::Confirm(prompt) => {
                    outcome.default_prevented = true;
                    outcome.confirm_prompt = Some(prompt);
                }
            }
        }
        outcome
    }

    fn is_registered(&self, id: u64) -> bool {
        self.inner
            .borrow()
            .listeners
            .iter()
            .any(|entry| entry.id == id)
    }
}

/// Handle for one registered listener. Releasing (or dropping) it
/// unregisters the listener.
pub struct Subscription {
    hub: Weak<RefCell<HubInner>>,
    id: u64,
    kind: SignalKind,
    active: bool,
}

impl Subscription {
    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Returns false if the subscription was already released.
    pub fn release(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        if let Some(hub) = self.hub.upgrade() {
            let id = self.id;
            hub.borrow_mut().listeners.retain(|entry| entry.id != id);
        }
        true
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("active", &self.active)
            .finish()
    }
}
