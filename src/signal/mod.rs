//! Platform signal plumbing.
//!
//! The host platform (browser shell, kiosk runtime, test harness) pushes
//! `PlatformSignal`s into a `SignalHub`. Listeners are registered through
//! explicit `Subscription` objects instead of process-wide handlers, so a
//! session can release every listener it owns deterministically.
//!
//! The `EventSourceAdapter` is the only listener the kernel installs. It
//! translates signals into `RawEvent`s, performs the mandated default
//! suppression and hands each event to an `EventSink` before dispatch
//! returns. It carries no policy.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub mod adapter;
pub mod hub;

pub use adapter::{EventQueue, EventSink, EventSourceAdapter};
pub use hub::{DispatchOutcome, SignalHub, Subscription};

/// Fixed native confirmation prompt for navigation-away attempts.
pub const LEAVE_PROMPT: &str = "Are you sure you want to leave? Your test progress may be lost.";

/// A key press with its modifier state.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct KeyCombo {
    pub key: String,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub shift: bool,
}

impl KeyCombo {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            ctrl: false,
            alt: false,
            shift: false,
        }
    }

    pub fn ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn alt(mut self) -> Self {
        self.alt = true;
        self
    }

    pub fn shift(mut self) -> Self {
        self.shift = true;
        self
    }

    /// Parse "Ctrl+Shift+I" style notation.
    pub fn parse(notation: &str) -> Result<Self> {
        static KEY_RE: OnceLock<regex::Regex> = OnceLock::new();
        let re = KEY_RE.get_or_init(|| {
            regex::Regex::new(r"^(?:[A-Za-z0-9]|F(?:[1-9]|1[0-9]|2[0-4])|[A-Za-z]{2,16})$").unwrap()
        });

        let parts: Vec<&str> = notation.split('+').map(str::trim).collect();
        let Some((key, modifiers)) = parts.split_last() else {
            return Err(anyhow!("key combo is empty"));
        };
        if !re.is_match(key) {
            return Err(anyhow!("invalid key in combo {:?}: {:?}", notation, key));
        }

        let mut combo = KeyCombo::new(key);
        for modifier in modifiers {
            match modifier.to_ascii_lowercase().as_str() {
                "ctrl" | "control" => combo.ctrl = true,
                "alt" => combo.alt = true,
                "shift" => combo.shift = true,
                other => return Err(anyhow!("unknown modifier {:?} in {:?}", other, notation)),
            }
        }
        Ok(combo)
    }
}

impl std::fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.ctrl {
            f.write_str("Ctrl+")?;
        }
        if self.alt {
            f.write_str("Alt+")?;
        }
        if self.shift {
            f.write_str("Shift+")?;
        }
        if self.key.chars().count() == 1 {
            write!(f, "{}", self.key.to_uppercase())
        } else {
            f.write_str(&self.key)
        }
    }
}

/// Signal categories a listener can subscribe to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Visibility,
    KeyDown,
    ContextMenu,
    FullscreenChange,
    BeforeUnload,
}

impl SignalKind {
    pub const ALL: [SignalKind; 5] = [
        SignalKind::Visibility,
        SignalKind::KeyDown,
        SignalKind::ContextMenu,
        SignalKind::FullscreenChange,
        SignalKind::BeforeUnload,
    ];
}

/// Signals as delivered by the host platform.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum PlatformSignal {
    VisibilityChange { hidden: bool },
    KeyDown(KeyCombo),
    ContextMenu,
    FullscreenChange { is_fullscreen: bool },
    BeforeUnload,
}

impl PlatformSignal {
    pub fn kind(&self) -> SignalKind {
        match self {
            PlatformSignal::VisibilityChange { .. } => SignalKind::Visibility,
            PlatformSignal::KeyDown(_) => SignalKind::KeyDown,
            PlatformSignal::ContextMenu => SignalKind::ContextMenu,
            PlatformSignal::FullscreenChange { .. } => SignalKind::FullscreenChange,
            PlatformSignal::BeforeUnload => SignalKind::BeforeUnload,
        }
    }
}

/// Normalized event category with its payload.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum EventCategory {
    VisibilityChanged { hidden: bool },
    KeyPressed(KeyCombo),
    ContextMenuRequested,
    FullscreenChanged { is_fullscreen: bool },
    BeforeUnloadRequested,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawEvent {
    pub category: EventCategory,
    pub time: DateTime<Utc>,
}

/// What a listener asks the platform to do with the signal's default action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    Continue,
    PreventDefault,
    /// Prevent the default and ask the platform for a native confirmation prompt.
    Confirm(&'static str),
}
