//! Proctor Kernel
//!
//! This crate implements the session-integrity monitor for timed assessments
//! running inside an untrusted client surface.
//!
//! # Architecture
//!
//! The kernel keeps four guarantees by construction:
//!
//! 1. **Append-Only Evidence**: Violations are only ever appended to a hash-chained log.
//! 2. **Counter Integrity**: `tab_switch_count` always equals the number of TabSwitch entries.
//! 3. **No Use-After-Detach**: Once the adapter is detached, no platform signal reaches the state.
//! 4. **Single Report**: The submission collaborator receives exactly one sealed report.
//!
//! # Module Structure
//!
//! - `chain`: Hash-chained violation log and Ed25519 helpers
//! - `signal`: Platform signal hub, explicit subscriptions, and the event source adapter
//! - `classify`: Raw event to Violation classification under a session Policy
//! - `monitor`: Session lifecycle reducer, dismiss timer, and the effect-running shell
//! - `report`: Integrity score and sealed report construction
//! - `verify`: Offline report verification
//! - `present`: Countdown and alert text
//! - Core types: Violation, ViolationKind, Policy

use anyhow::{anyhow, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use ed25519_dalek::SigningKey;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use std::time::Duration;
use zeroize::Zeroize;

pub mod chain;
pub mod classify;
pub mod config;
pub mod containment;
pub mod monitor;
pub mod present;
pub mod replay;
pub mod report;
pub mod signal;
pub mod verify;

pub use chain::{hash_entry, sign_entry, verify_chain, verify_entry_signature, ViolationLog};
pub use classify::{classify, is_restricted_shortcut, RESTRICTED_SHORTCUTS};
pub use containment::{FullscreenControl, HeadlessDisplay, UnsupportedFullscreen};
pub use monitor::{
    reduce, Effect, MonitorEvent, Phase, SessionCollaborator, SessionMonitor, SessionState,
};
pub use present::format_countdown;
pub use report::{security_score, IntegrityReport, ReportBuilder};
pub use signal::{
    DispatchOutcome, Disposition, EventCategory, EventSink, EventSourceAdapter, KeyCombo,
    PlatformSignal, RawEvent, SignalHub, SignalKind, Subscription, LEAVE_PROMPT,
};

// -------------------- Violations --------------------

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    TabSwitch,
    DisallowedShortcut,
    ContextMenu,
    NavigationAttempt,
}

impl ViolationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ViolationKind::TabSwitch => "TabSwitch",
            ViolationKind::DisallowedShortcut => "DisallowedShortcut",
            ViolationKind::ContextMenu => "ContextMenu",
            ViolationKind::NavigationAttempt => "NavigationAttempt",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded, timestamped instance of a disallowed client action.
///
/// Inside a session, violations are only minted by the classifier. Fields
/// are private and there is no public constructor, so callers cannot build
/// or edit a record directly:
///
/// ```compile_fail
/// use proctor_kernel::{Violation, ViolationKind};
///
/// let forged = Violation {
///     kind: ViolationKind::TabSwitch,
///     timestamp: chrono::Utc::now(),
///     detail: String::new(),
/// };
/// ```
///
/// A bare record cannot be deserialized either:
///
/// ```compile_fail
/// let forged: proctor_kernel::Violation = serde_json::from_str("{}").unwrap();
/// ```
///
/// The one way in from outside is parsing an `IntegrityReport`. Those
/// records are untrusted until `verify::verify_report` has checked them
/// against the signed chain head.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Violation {
    kind: ViolationKind,
    timestamp: DateTime<Utc>,
    detail: String,
}

impl Violation {
    pub(crate) fn new(kind: ViolationKind, timestamp: DateTime<Utc>, detail: String) -> Self {
        Self {
            kind,
            timestamp,
            detail,
        }
    }

    pub fn kind(&self) -> ViolationKind {
        self.kind
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// Length-prefixed encoding used as the hash-chain payload.
    /// Infallible so that appending to the log can never fail.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let kind = self.kind.as_str().as_bytes();
        let ts = self
            .timestamp
            .to_rfc3339_opts(SecondsFormat::AutoSi, true)
            .into_bytes();
        let detail = self.detail.as_bytes();

        let mut out = Vec::with_capacity(12 + kind.len() + ts.len() + detail.len());
        for field in [kind, ts.as_slice(), detail] {
            out.extend_from_slice(&(field.len() as u32).to_be_bytes());
            out.extend_from_slice(field);
        }
        out
    }
}

// -------------------- Policy --------------------

pub const DEFAULT_ALERT_DURATION: Duration = Duration::from_secs(5);
pub const MAX_TITLE_CHARS: usize = 200;

/// A conforming test title is 1..=200 characters with no control characters.
pub fn validate_test_title(title: &str) -> Result<()> {
    static TITLE_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = TITLE_RE.get_or_init(|| regex::Regex::new(r"^[^\p{Cc}]+$").unwrap());

    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("policy: test_title must not be empty"));
    }
    if trimmed.chars().count() > MAX_TITLE_CHARS {
        return Err(anyhow!(
            "policy: test_title exceeds {} characters",
            MAX_TITLE_CHARS
        ));
    }
    if !re.is_match(trimmed) {
        return Err(anyhow!("policy: test_title contains control characters"));
    }
    Ok(())
}

/// Session policy supplied by the collaborator at session start.
/// The monitor never mutates it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Policy {
    pub test_title: String,
    /// display only; re-read by the presentation layer
    pub time_remaining_seconds: Option<u64>,
    pub allow_tab_switch: bool,
    pub show_warnings: bool,
    pub alert_duration: Duration,
}

impl Policy {
    pub fn new(test_title: &str) -> Result<Self> {
        validate_test_title(test_title)?;
        Ok(Self {
            test_title: test_title.trim().to_string(),
            time_remaining_seconds: None,
            allow_tab_switch: false,
            show_warnings: true,
            alert_duration: DEFAULT_ALERT_DURATION,
        })
    }

    pub fn with_tab_switch_allowed(mut self, allow: bool) -> Self {
        self.allow_tab_switch = allow;
        self
    }

    pub fn with_warnings(mut self, show: bool) -> Self {
        self.show_warnings = show;
        self
    }

    pub fn with_time_remaining(mut self, seconds: Option<u64>) -> Self {
        self.time_remaining_seconds = seconds;
        self
    }

    pub fn with_alert_duration(mut self, duration: Duration) -> Self {
        self.alert_duration = duration;
        self
    }

    pub(crate) fn alert_delta(&self) -> chrono::Duration {
        let ms = i64::try_from(self.alert_duration.as_millis()).unwrap_or(i64::MAX);
        chrono::Duration::milliseconds(ms)
    }
}

// -------------------- Session Keys --------------------

/// Derive the report signing key from an operator-supplied seed.
pub fn session_key_from_seed(seed: &str) -> Result<SigningKey> {
    let trimmed = seed.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("session key seed is required"));
    }
    let mut hasher = Sha256::new();
    hasher.update(b"proctor-kernel:session-key:");
    hasher.update(trimmed.as_bytes());
    let mut digest: [u8; 32] = hasher.finalize().into();
    let key = SigningKey::from_bytes(&digest);
    digest.zeroize();
    Ok(key)
}

/// Fresh random signing key for a single session.
pub fn generate_session_key() -> SigningKey {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let key = SigningKey::from_bytes(&bytes);
    bytes.zeroize();
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_defaults_are_strict() -> Result<()> {
        let policy = Policy::new("  Algebra Midterm ")?;
        assert_eq!(policy.test_title, "Algebra Midterm");
        assert!(!policy.allow_tab_switch);
        assert!(policy.show_warnings);
        assert_eq!(policy.alert_duration, Duration::from_secs(5));
        assert_eq!(policy.time_remaining_seconds, None);
        Ok(())
    }

    #[test]
    fn test_title_rejects_empty_and_control_chars() {
        assert!(validate_test_title("   ").is_err());
        assert!(validate_test_title("Final\u{0007}Exam").is_err());
        assert!(validate_test_title(&"x".repeat(MAX_TITLE_CHARS + 1)).is_err());
        assert!(validate_test_title("Chemistry – Unit 3").is_ok());
    }

    #[test]
    fn canonical_bytes_separate_fields() {
        let ts = DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let a = Violation::new(ViolationKind::ContextMenu, ts, "ab".to_string());
        let b = Violation::new(ViolationKind::ContextMenu, ts, "a".to_string());
        assert_ne!(a.canonical_bytes(), b.canonical_bytes());
        assert_eq!(a.canonical_bytes(), a.clone().canonical_bytes());
    }

    #[test]
    fn seeded_session_keys_are_stable() -> Result<()> {
        let a = session_key_from_seed("exam-room-4")?;
        let b = session_key_from_seed(" exam-room-4 ")?;
        assert_eq!(a.to_bytes(), b.to_bytes());
        assert!(session_key_from_seed("").is_err());
        assert_ne!(generate_session_key().to_bytes(), a.to_bytes());
        Ok(())
    }
}
