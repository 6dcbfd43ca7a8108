//! Session monitor.
//!
//! `state::reduce` holds every lifecycle rule as a pure transition
//! function. `SessionMonitor` is the shell around it: it owns the signal
//! adapter, the containment surface and the collaborator, and executes the
//! effects the reducer asks for.
//!
//! Platform signals are recorded while `SignalHub::dispatch` is still on
//! the stack. The adapter's sink writes straight into the shared session
//! core. A signal raised while the core is already busy (a collaborator
//! dispatching from inside a callback) is parked and processed as soon as
//! the current step finishes.

use chrono::{DateTime, Utc};
use ed25519_dalek::SigningKey;
use std::cell::{Ref, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use crate::containment::FullscreenControl;
use crate::present::{self, AlertBanner};
use crate::report::{IntegrityReport, ReportBuilder};
use crate::signal::{
    DispatchOutcome, EventSink, EventSourceAdapter, PlatformSignal, RawEvent, SignalHub,
};
use crate::{Policy, Violation};

pub mod state;
pub mod timer;

pub use state::{reduce, Effect, MonitorEvent, Phase, SessionState};
pub use timer::{DismissTimer, PendingDismiss, TimerId};

/// External collaborator that owns answer submission.
pub trait SessionCollaborator {
    /// Called exactly once per session with the sealed report.
    fn on_test_submit(&mut self, report: IntegrityReport);

    /// Live telemetry, once per accepted violation.
    fn on_security_violation(&mut self, _violation: &Violation) {}
}

struct SessionCore {
    policy: Policy,
    state: SessionState,
    collaborator: Box<dyn SessionCollaborator>,
    signing_key: SigningKey,
    report: Option<IntegrityReport>,
}

impl SessionCore {
    /// Run one event through the reducer and execute the effects that stay
    /// inside the session. Adapter lifecycle effects are returned to the
    /// shell, which owns the adapter.
    fn step(&mut self, event: MonitorEvent) -> Vec<Effect> {
        let state = std::mem::take(&mut self.state);
        let (next, effects) = reduce(state, event, &self.policy);
        self.state = next;

        let mut lifecycle = Vec::new();
        let mut delivered = false;
        for effect in effects {
            match effect {
                Effect::AttachAdapter | Effect::DetachAdapter => lifecycle.push(effect),
                Effect::ViolationRecorded(violation) => {
                    log::warn!(
                        "violation #{}: {} ({})",
                        self.state.log().len(),
                        violation.kind(),
                        violation.detail()
                    );
                    self.collaborator.on_security_violation(&violation);
                }
                Effect::AlertShown { until } => {
                    log::debug!("alert visible until {}", until);
                }
                Effect::AlertDismissed => {
                    log::debug!("alert dismissed");
                }
                Effect::ConfirmLeave(prompt) => {
                    log::info!("navigation away requested; confirmation prompt: {}", prompt);
                }
                Effect::BuildReport { at } => {
                    let report =
                        ReportBuilder::new(&self.signing_key).build(&self.state, &self.policy, at);
                    log::info!(
                        "report sealed: violations={} score={} head={}",
                        report.violations.len(),
                        report.security_score,
                        report.chain_head
                    );
                    self.report = Some(report.clone());
                    self.collaborator.on_test_submit(report);
                    delivered = true;
                }
            }
        }

        if delivered {
            lifecycle.extend(self.step(MonitorEvent::ReportDelivered));
            log::info!("session closed");
        }
        lifecycle
    }
}

/// Adapter sink that records events into the session as they arrive.
struct SessionSink {
    core: Weak<RefCell<SessionCore>>,
    parked: RefCell<VecDeque<RawEvent>>,
}

impl SessionSink {
    /// Process parked events in arrival order. Does nothing while the core
    /// is borrowed; the borrower drains once it is done.
    fn drain(&self) -> usize {
        let Some(shared) = self.core.upgrade() else {
            return 0;
        };
        let Ok(mut core) = shared.try_borrow_mut() else {
            return 0;
        };
        let mut handled = 0;
        loop {
            let next = self.parked.borrow_mut().pop_front();
            let Some(event) = next else {
                break;
            };
            for effect in core.step(MonitorEvent::Raw(event)) {
                log::debug!("lifecycle effect {:?} ignored on the signal path", effect);
            }
            handled += 1;
        }
        handled
    }
}

impl EventSink for SessionSink {
    fn deliver(&self, event: RawEvent) {
        self.parked.borrow_mut().push_back(event);
        self.drain();
    }
}

pub struct SessionMonitor {
    core: Rc<RefCell<SessionCore>>,
    sink: Rc<SessionSink>,
    hub: SignalHub,
    adapter: Option<EventSourceAdapter>,
    display: Box<dyn FullscreenControl>,
}

impl SessionMonitor {
    pub fn new(
        policy: Policy,
        hub: SignalHub,
        display: Box<dyn FullscreenControl>,
        collaborator: Box<dyn SessionCollaborator>,
        signing_key: SigningKey,
    ) -> Self {
        let core = Rc::new(RefCell::new(SessionCore {
            policy,
            state: SessionState::new(),
            collaborator,
            signing_key,
            report: None,
        }));
        let sink = Rc::new(SessionSink {
            core: Rc::downgrade(&core),
            parked: RefCell::new(VecDeque::new()),
        });
        Self {
            core,
            sink,
            hub,
            adapter: None,
            display,
        }
    }

    pub fn policy(&self) -> Ref<'_, Policy> {
        Ref::map(self.core.borrow(), |core| &core.policy)
    }

    pub fn state(&self) -> Ref<'_, SessionState> {
        Ref::map(self.core.borrow(), |core| &core.state)
    }

    pub fn phase(&self) -> Phase {
        self.core.borrow().state.phase()
    }

    /// Snapshot of the recorded violations in order.
    pub fn violations(&self) -> Vec<Violation> {
        self.core.borrow().state.log().snapshot()
    }

    pub fn violation_count(&self) -> usize {
        self.core.borrow().state.log().len()
    }

    pub fn tab_switch_count(&self) -> u32 {
        self.core.borrow().state.tab_switch_count()
    }

    pub fn is_fullscreen(&self) -> bool {
        self.core.borrow().state.is_fullscreen()
    }

    pub fn alert_visible(&self) -> bool {
        self.core.borrow().state.alert_visible()
    }

    pub fn is_attached(&self) -> bool {
        self.adapter.as_ref().is_some_and(|a| a.is_attached())
    }

    /// The report issued at submission, if any.
    pub fn report(&self) -> Option<IntegrityReport> {
        self.core.borrow().report.clone()
    }

    /// Warning banner for the current alert, if one is showing.
    pub fn alert_banner(&self) -> Option<AlertBanner> {
        let core = self.core.borrow();
        if !core.state.alert_visible() {
            return None;
        }
        core.state.last_violation().map(present::alert_for)
    }

    pub fn countdown(&self, time_remaining_seconds: Option<u64>) -> String {
        present::format_countdown(time_remaining_seconds)
    }

    /// Mirror the collaborator's `isTestActive` flag.
    pub fn set_test_active(&mut self, active: bool) {
        if active {
            self.apply(MonitorEvent::Activate);
        } else {
            self.apply(MonitorEvent::Deactivate);
        }
    }

    /// Dispatch a platform signal on the hub. Anything it produced is
    /// recorded by the time this returns.
    pub fn dispatch(&mut self, signal: &PlatformSignal, at: DateTime<Utc>) -> DispatchOutcome {
        let outcome = self.hub.dispatch(signal, at);
        self.pump();
        outcome
    }

    /// Process events parked while the session was busy. Returns how many
    /// were handled.
    pub fn pump(&mut self) -> usize {
        self.sink.drain()
    }

    pub fn report_navigation_attempt(&mut self, target: &str, at: DateTime<Utc>) {
        self.apply(MonitorEvent::NavigationBlocked {
            target: target.to_string(),
            at,
        });
    }

    /// Advance time for the alert-dismiss timer.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        self.apply(MonitorEvent::Tick(now));
    }

    /// Submit the session. Returns true if this call issued the report.
    pub fn submit(&mut self, at: DateTime<Utc>) -> bool {
        self.pump();
        let phase = self.phase();
        if phase != Phase::Active {
            log::debug!("submit ignored in phase {}", phase.as_str());
            return false;
        }
        self.apply(MonitorEvent::Submit { at });
        self.phase() == Phase::Closed
    }

    /// Leave Active without submitting. Idempotent.
    pub fn detach(&mut self) -> bool {
        self.pump();
        if self.phase() == Phase::Active {
            self.apply(MonitorEvent::Deactivate);
            return true;
        }
        self.release_adapter()
    }

    pub fn enter_fullscreen(&mut self, at: DateTime<Utc>) -> bool {
        self.request_containment(true, at)
    }

    pub fn exit_fullscreen(&mut self, at: DateTime<Utc>) -> bool {
        self.request_containment(false, at)
    }

    fn request_containment(&mut self, on: bool, at: DateTime<Utc>) -> bool {
        let phase = self.phase();
        if phase != Phase::Active {
            log::debug!("fullscreen request ignored in phase {}", phase.as_str());
            return false;
        }
        let result = if on {
            self.display.request_fullscreen(at)
        } else {
            self.display.exit_fullscreen(at)
        };
        self.pump();
        match result {
            Ok(()) => true,
            Err(e) => {
                log::warn!("fullscreen request (on={}) failed: {}", on, e);
                false
            }
        }
    }

    fn release_adapter(&mut self) -> bool {
        match self.adapter.take() {
            Some(mut adapter) => adapter.detach(),
            None => false,
        }
    }

    fn apply(&mut self, event: MonitorEvent) {
        let lifecycle = self.core.borrow_mut().step(event);
        for effect in lifecycle {
            match effect {
                Effect::AttachAdapter => {
                    self.release_adapter();
                    let sink: Rc<dyn EventSink> = self.sink.clone();
                    self.adapter = Some(EventSourceAdapter::attach(&self.hub, sink));
                    log::info!(
                        "session active: monitoring \"{}\"",
                        self.core.borrow().policy.test_title
                    );
                }
                Effect::DetachAdapter => {
                    self.release_adapter();
                    log::info!("monitor detached (phase={})", self.phase().as_str());
                }
                _ => {}
            }
        }
        self.pump();
    }
}

impl Drop for SessionMonitor {
    fn drop(&mut self) {
        self.release_adapter();
    }
}
