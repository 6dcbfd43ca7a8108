use chrono::{DateTime, Utc};

use super::timer::DismissTimer;
use crate::chain::ViolationLog;
use crate::classify::{classify, navigation_violation};
use crate::signal::{EventCategory, RawEvent, LEAVE_PROMPT};
use crate::{Policy, Violation, ViolationKind};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Phase {
    #[default]
    Inactive,
    Active,
    Submitting,
    Closed,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Inactive => "inactive",
            Phase::Active => "active",
            Phase::Submitting => "submitting",
            Phase::Closed => "closed",
        }
    }
}

/// Inputs to the session reducer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MonitorEvent {
    /// Collaborator marked the test as in progress.
    Activate,
    /// Collaborator marked the test as no longer in progress without submitting.
    Deactivate,
    Raw(RawEvent),
    /// Host router intercepted an in-app navigation away from the session.
    NavigationBlocked { target: String, at: DateTime<Utc> },
    Tick(DateTime<Utc>),
    Submit { at: DateTime<Utc> },
    /// The report was handed to the submission collaborator.
    ReportDelivered,
}

/// Side effects requested by the reducer, executed by the monitor shell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    AttachAdapter,
    DetachAdapter,
    ViolationRecorded(Violation),
    AlertShown { until: DateTime<Utc> },
    AlertDismissed,
    ConfirmLeave(&'static str),
    BuildReport { at: DateTime<Utc> },
}

/// Mutable session state. Only `reduce` writes to it.
#[derive(Clone, Debug, Default)]
pub struct SessionState {
    phase: Phase,
    log: ViolationLog,
    tab_switch_count: u32,
    is_fullscreen: bool,
    alert_visible: bool,
    alert_timer: DismissTimer,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn log(&self) -> &ViolationLog {
        &self.log
    }

    pub fn tab_switch_count(&self) -> u32 {
        self.tab_switch_count
    }

    pub fn is_fullscreen(&self) -> bool {
        self.is_fullscreen
    }

    pub fn alert_visible(&self) -> bool {
        self.alert_visible
    }

    pub fn alert_timer(&self) -> &DismissTimer {
        &self.alert_timer
    }

    pub fn last_violation(&self) -> Option<&Violation> {
        self.log.violations().last()
    }

    fn record(&mut self, violation: Violation, policy: &Policy, effects: &mut Vec<Effect>) {
        let at = violation.timestamp();
        if violation.kind() == ViolationKind::TabSwitch {
            self.tab_switch_count += 1;
        }
        self.log.append(violation.clone());
        effects.push(Effect::ViolationRecorded(violation));

        if policy.show_warnings {
            let until = at + policy.alert_delta();
            self.alert_visible = true;
            self.alert_timer.schedule(until);
            effects.push(Effect::AlertShown { until });
        }
    }

    fn clear_alert(&mut self) {
        self.alert_timer.cancel();
        self.alert_visible = false;
    }
}

/// Session state transition function.
///
/// Events that do not apply to the current phase leave the state untouched
/// and produce no effects.
pub fn reduce(
    mut state: SessionState,
    event: MonitorEvent,
    policy: &Policy,
) -> (SessionState, Vec<Effect>) {
    let mut effects = Vec::new();

    match (state.phase, event) {
        (Phase::Closed, _) => {}

        (Phase::Inactive, MonitorEvent::Activate) => {
            state.phase = Phase::Active;
            effects.push(Effect::AttachAdapter);
        }

        (Phase::Active, MonitorEvent::Deactivate) => {
            state.phase = Phase::Inactive;
            state.clear_alert();
            effects.push(Effect::DetachAdapter);
        }

        (Phase::Active, MonitorEvent::Raw(raw)) => match &raw.category {
            EventCategory::FullscreenChanged { is_fullscreen } => {
                state.is_fullscreen = *is_fullscreen;
            }
            EventCategory::BeforeUnloadRequested => {
                effects.push(Effect::ConfirmLeave(LEAVE_PROMPT));
            }
            _ => {
                if let Some(violation) = classify(&raw, policy) {
                    state.record(violation, policy, &mut effects);
                }
            }
        },

        (Phase::Active, MonitorEvent::NavigationBlocked { target, at }) => {
            state.record(navigation_violation(&target, at), policy, &mut effects);
        }

        (Phase::Active, MonitorEvent::Submit { at }) => {
            state.phase = Phase::Submitting;
            state.clear_alert();
            effects.push(Effect::DetachAdapter);
            effects.push(Effect::BuildReport { at });
        }

        (Phase::Submitting, MonitorEvent::ReportDelivered) => {
            state.phase = Phase::Closed;
        }

        (_, MonitorEvent::Tick(now)) => {
            if state.alert_timer.fire_if_due(now).is_some() {
                state.alert_visible = false;
                effects.push(Effect::AlertDismissed);
            }
        }

        _ => {}
    }

    (state, effects)
}
