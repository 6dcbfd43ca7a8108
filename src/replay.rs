//! JSON-lines session scripts.
//!
//! Each non-blank line is one step with a millisecond offset from the
//! session start, e.g.
//!
//! ```text
//! {"at_ms": 0, "action": "start"}
//! {"at_ms": 1200, "action": "key", "combo": "Ctrl+C"}
//! {"at_ms": 9000, "action": "submit"}
//! ```
//!
//! Lines starting with `#` are comments. Used by `proctord` and tests to
//! drive a monitor through a `SignalHub` exactly as a host would.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::io::BufRead;

use crate::monitor::SessionMonitor;
use crate::signal::{KeyCombo, PlatformSignal};

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReplayAction {
    Start,
    Stop,
    Visibility { hidden: bool },
    Key { combo: String },
    ContextMenu,
    BeforeUnload,
    /// Platform-reported fullscreen change.
    Fullscreen { on: bool },
    RequestFullscreen,
    ExitFullscreen,
    Navigate { target: String },
    Tick,
    Submit,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ReplayStep {
    pub at_ms: u64,
    #[serde(flatten)]
    pub action: ReplayAction,
}

impl ReplayStep {
    pub fn time_from(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        let ms = i64::try_from(self.at_ms).unwrap_or(i64::MAX);
        start + Duration::milliseconds(ms)
    }
}

pub fn parse_line(line: &str) -> Result<Option<ReplayStep>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let step: ReplayStep = serde_json::from_str(trimmed)?;
    if let ReplayAction::Key { combo } = &step.action {
        KeyCombo::parse(combo)?;
    }
    Ok(Some(step))
}

pub fn parse_script(reader: impl BufRead) -> Result<Vec<ReplayStep>> {
    let mut steps = Vec::new();
    let mut last_at = 0u64;
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let Some(step) =
            parse_line(&line).map_err(|e| anyhow!("script line {}: {}", idx + 1, e))?
        else {
            continue;
        };
        if step.at_ms < last_at {
            return Err(anyhow!(
                "script line {}: at_ms {} goes backwards (previous {})",
                idx + 1,
                step.at_ms,
                last_at
            ));
        }
        last_at = step.at_ms;
        steps.push(step);
    }
    Ok(steps)
}

/// Drive one step through the monitor. Time advances to the step's
/// instant first so pending alert dismissals fire in order.
pub fn apply_step(
    monitor: &mut SessionMonitor,
    step: &ReplayStep,
    start: DateTime<Utc>,
) -> Result<()> {
    let at = step.time_from(start);
    monitor.tick(at);
    match &step.action {
        ReplayAction::Start => monitor.set_test_active(true),
        ReplayAction::Stop => monitor.set_test_active(false),
        ReplayAction::Visibility { hidden } => {
            monitor.dispatch(&PlatformSignal::VisibilityChange { hidden: *hidden }, at);
        }
        ReplayAction::Key { combo } => {
            let combo = KeyCombo::parse(combo)?;
            monitor.dispatch(&PlatformSignal::KeyDown(combo), at);
        }
        ReplayAction::ContextMenu => {
            monitor.dispatch(&PlatformSignal::ContextMenu, at);
        }
        ReplayAction::BeforeUnload => {
            let outcome = monitor.dispatch(&PlatformSignal::BeforeUnload, at);
            if let Some(prompt) = outcome.confirm_prompt {
                log::info!("platform confirmation prompt: {}", prompt);
            }
        }
        ReplayAction::Fullscreen { on } => {
            monitor.dispatch(&PlatformSignal::FullscreenChange { is_fullscreen: *on }, at);
        }
        ReplayAction::RequestFullscreen => {
            monitor.enter_fullscreen(at);
        }
        ReplayAction::ExitFullscreen => {
            monitor.exit_fullscreen(at);
        }
        ReplayAction::Navigate { target } => monitor.report_navigation_attempt(target, at),
        ReplayAction::Tick => {}
        ReplayAction::Submit => {
            monitor.submit(at);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_steps_and_skips_comments() -> Result<()> {
        let script = r#"
# warm-up
{"at_ms": 0, "action": "start"}

{"at_ms": 10, "action": "key", "combo": "Ctrl+Shift+I"}
{"at_ms": 20, "action": "visibility", "hidden": true}
{"at_ms": 30, "action": "navigate", "target": "/home"}
"#;
        let steps = parse_script(script.as_bytes())?;
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[0].action, ReplayAction::Start);
        assert_eq!(
            steps[1].action,
            ReplayAction::Key {
                combo: "Ctrl+Shift+I".to_string()
            }
        );
        assert_eq!(steps[2].action, ReplayAction::Visibility { hidden: true });
        Ok(())
    }

    #[test]
    fn rejects_bad_lines_with_line_number() {
        let err = parse_script(
            "{\"at_ms\": 0, \"action\": \"start\"}\n{\"at_ms\": 5, \"action\": \"dance\"}\n"
                .as_bytes(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("line 2"));

        assert!(parse_line(r#"{"at_ms": 1, "action": "key", "combo": "Hyper+C"}"#).is_err());
    }

    #[test]
    fn rejects_time_going_backwards() {
        let script = "{\"at_ms\": 50, \"action\": \"tick\"}\n{\"at_ms\": 10, \"action\": \"tick\"}\n";
        assert!(parse_script(script.as_bytes()).is_err());
    }
}
