//! Presentation helpers: countdown text and alert banners.

use crate::monitor::SessionState;
use crate::{Policy, Violation, ViolationKind};

pub const ALERT_HEADLINE: &str = "Security Violation Detected";

/// `H:MM:SS` when there is at least one hour left, `M:SS` otherwise.
/// `None` and zero render as an empty string.
pub fn format_countdown(seconds: Option<u64>) -> String {
    let Some(total) = seconds.filter(|s| *s > 0) else {
        return String::new();
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlertBanner {
    pub headline: &'static str,
    pub message: String,
}

pub fn alert_for(violation: &Violation) -> AlertBanner {
    let hint = match violation.kind() {
        ViolationKind::TabSwitch => "Stay on the test page until you submit.",
        ViolationKind::DisallowedShortcut => "Keyboard shortcuts are disabled during the test.",
        ViolationKind::ContextMenu => "Right-click is disabled during the test.",
        ViolationKind::NavigationAttempt => "Leaving the test page is not allowed.",
    };
    AlertBanner {
        headline: ALERT_HEADLINE,
        message: format!("{}. {}", violation.detail(), hint),
    }
}

/// One-line session chrome: title, countdown, violation tally, containment.
pub fn status_line(policy: &Policy, state: &SessionState, time_remaining: Option<u64>) -> String {
    let mut line = policy.test_title.clone();
    let countdown = format_countdown(time_remaining);
    if !countdown.is_empty() {
        line.push_str(" | ");
        line.push_str(&countdown);
    }
    line.push_str(&format!(
        " | violations: {} | tab switches: {} | fullscreen: {}",
        state.log().len(),
        state.tab_switch_count(),
        if state.is_fullscreen() { "on" } else { "off" }
    ));
    line
}
