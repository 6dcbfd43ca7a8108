//! Fullscreen containment surface.
//!
//! Requests are best-effort. The session's fullscreen flag only changes
//! when the platform reports a `FullscreenChange` signal; a successful
//! request here does not flip it. Callers pass the instant of the request
//! so a confirming platform signal carries host time.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};

use crate::signal::{PlatformSignal, SignalHub};

/// Request/exit fullscreen on the session's root container.
pub trait FullscreenControl {
    fn request_fullscreen(&mut self, at: DateTime<Utc>) -> Result<()>;
    fn exit_fullscreen(&mut self, at: DateTime<Utc>) -> Result<()>;
}

/// Platform without a fullscreen capability.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnsupportedFullscreen;

impl FullscreenControl for UnsupportedFullscreen {
    fn request_fullscreen(&mut self, _at: DateTime<Utc>) -> Result<()> {
        Err(anyhow!("fullscreen is not supported on this platform"))
    }

    fn exit_fullscreen(&mut self, _at: DateTime<Utc>) -> Result<()> {
        Err(anyhow!("fullscreen is not supported on this platform"))
    }
}

/// Simulated display that answers requests by emitting the platform's
/// fullscreen-change signal on the hub, the way a real shell would.
pub struct HeadlessDisplay {
    hub: SignalHub,
    is_fullscreen: bool,
    permitted: bool,
}

impl HeadlessDisplay {
    pub fn new(hub: SignalHub) -> Self {
        Self {
            hub,
            is_fullscreen: false,
            permitted: true,
        }
    }

    /// Display that refuses every request (e.g. no user gesture).
    pub fn denying(hub: SignalHub) -> Self {
        Self {
            permitted: false,
            ..Self::new(hub)
        }
    }

    pub fn is_fullscreen(&self) -> bool {
        self.is_fullscreen
    }

    fn set(&mut self, on: bool, at: DateTime<Utc>) -> Result<()> {
        if !self.permitted {
            return Err(anyhow!("fullscreen request denied by display"));
        }
        if self.is_fullscreen == on {
            return Ok(());
        }
        self.is_fullscreen = on;
        self.hub
            .dispatch(&PlatformSignal::FullscreenChange { is_fullscreen: on }, at);
        Ok(())
    }
}

impl FullscreenControl for HeadlessDisplay {
    fn request_fullscreen(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.set(true, at)
    }

    fn exit_fullscreen(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.set(false, at)
    }
}
