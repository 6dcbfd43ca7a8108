use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::Policy;

const DEFAULT_TEST_TITLE: &str = "Untitled Test";
const DEFAULT_ALERT_SECS: u64 = 5;
const MAX_ALERT_SECS: u64 = 60 * 60;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ProctorConfigFile {
    test_title: Option<String>,
    time_limit_secs: Option<u64>,
    policy: Option<PolicyConfigFile>,
    alert: Option<AlertConfigFile>,
    signing: Option<SigningConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PolicyConfigFile {
    allow_tab_switch: Option<bool>,
    show_warnings: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AlertConfigFile {
    seconds: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SigningConfigFile {
    key_seed: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProctorConfig {
    pub test_title: String,
    pub time_limit_secs: Option<u64>,
    pub allow_tab_switch: bool,
    pub show_warnings: bool,
    pub alert_duration: Duration,
    /// When unset a fresh random key signs each report.
    pub key_seed: Option<String>,
}

impl ProctorConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PROCTOR_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ProctorConfigFile) -> Self {
        let policy = file.policy.unwrap_or_default();
        Self {
            test_title: file
                .test_title
                .unwrap_or_else(|| DEFAULT_TEST_TITLE.to_string()),
            time_limit_secs: file.time_limit_secs,
            allow_tab_switch: policy.allow_tab_switch.unwrap_or(false),
            show_warnings: policy.show_warnings.unwrap_or(true),
            alert_duration: Duration::from_secs(
                file.alert
                    .and_then(|alert| alert.seconds)
                    .unwrap_or(DEFAULT_ALERT_SECS),
            ),
            key_seed: file.signing.and_then(|signing| signing.key_seed),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(title) = std::env::var("PROCTOR_TEST_TITLE") {
            if !title.trim().is_empty() {
                self.test_title = title;
            }
        }
        if let Ok(value) = std::env::var("PROCTOR_ALLOW_TAB_SWITCH") {
            self.allow_tab_switch = parse_bool("PROCTOR_ALLOW_TAB_SWITCH", &value)?;
        }
        if let Ok(value) = std::env::var("PROCTOR_SHOW_WARNINGS") {
            self.show_warnings = parse_bool("PROCTOR_SHOW_WARNINGS", &value)?;
        }
        if let Ok(limit) = std::env::var("PROCTOR_TIME_LIMIT_SECS") {
            let seconds: u64 = limit.trim().parse().map_err(|_| {
                anyhow!("PROCTOR_TIME_LIMIT_SECS must be an integer number of seconds")
            })?;
            self.time_limit_secs = Some(seconds);
        }
        if let Ok(alert) = std::env::var("PROCTOR_ALERT_SECS") {
            let seconds: u64 = alert.trim().parse().map_err(|_| {
                anyhow!("PROCTOR_ALERT_SECS must be an integer number of seconds")
            })?;
            self.alert_duration = Duration::from_secs(seconds);
        }
        if let Ok(seed) = std::env::var("PROCTOR_KEY_SEED") {
            if !seed.trim().is_empty() {
                self.key_seed = Some(seed);
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        crate::validate_test_title(&self.test_title)?;
        self.test_title = self.test_title.trim().to_string();

        let alert_secs = self.alert_duration.as_secs();
        if alert_secs == 0 || alert_secs > MAX_ALERT_SECS {
            return Err(anyhow!(
                "alert duration must be between 1 and {} seconds",
                MAX_ALERT_SECS
            ));
        }
        if self.time_limit_secs == Some(0) {
            return Err(anyhow!("time limit must be greater than zero when set"));
        }
        if let Some(seed) = &self.key_seed {
            if seed.trim().is_empty() {
                return Err(anyhow!("signing key seed must not be blank"));
            }
        }
        Ok(())
    }

    pub fn to_policy(&self) -> Result<Policy> {
        Ok(Policy::new(&self.test_title)?
            .with_tab_switch_allowed(self.allow_tab_switch)
            .with_warnings(self.show_warnings)
            .with_time_remaining(self.time_limit_secs)
            .with_alert_duration(self.alert_duration))
    }
}

fn read_config_file(path: &Path) -> Result<ProctorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let cfg = if is_json {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("{} must be a boolean (true/false)", name)),
    }
}
