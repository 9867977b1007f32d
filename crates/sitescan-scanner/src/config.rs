use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sitescan_engines::Visibility;

use crate::events::Severity;

pub const DEFAULT_ROUND_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_MAX_ROUNDS: u32 = 5;
pub const DEFAULT_QUIESCENCE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 30_000;

pub const DEFAULT_ERROR_THRESHOLD: u16 = 500;
pub const DEFAULT_WARNING_THRESHOLD: u16 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    pub headless: bool,
    /// Budget shared by both sides of each settle round.
    pub timeout_ms: u64,
    pub max_rounds: u32,
    pub quiescence_timeout_ms: u64,
    pub navigation_timeout_ms: u64,
    pub status_policy: StatusPolicy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            headless: true,
            timeout_ms: DEFAULT_ROUND_TIMEOUT_MS,
            max_rounds: DEFAULT_MAX_ROUNDS,
            quiescence_timeout_ms: DEFAULT_QUIESCENCE_TIMEOUT_MS,
            navigation_timeout_ms: DEFAULT_NAVIGATION_TIMEOUT_MS,
            status_policy: StatusPolicy::default(),
        }
    }
}

impl ScanConfig {
    pub fn from_settings<I>(settings: I) -> Result<Self, SettingError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut config = Self::default();
        for raw in settings {
            config.apply(raw.as_ref().parse()?);
        }
        Ok(config)
    }

    pub fn apply(&mut self, setting: ScanSetting) {
        match setting {
            ScanSetting::Headless(headless) => self.headless = headless,
            ScanSetting::TimeoutMs(timeout_ms) => self.timeout_ms = timeout_ms,
        }
    }

    pub fn visibility(&self) -> Visibility {
        if self.headless {
            Visibility::Headless
        } else {
            Visibility::Headed
        }
    }

    pub fn round_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn quiescence_timeout(&self) -> Duration {
        Duration::from_millis(self.quiescence_timeout_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }
}

/// Status-code bands for response-derived network events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPolicy {
    pub error_threshold: u16,
    pub warning_threshold: u16,
}

impl Default for StatusPolicy {
    fn default() -> Self {
        Self {
            error_threshold: DEFAULT_ERROR_THRESHOLD,
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
        }
    }
}

impl StatusPolicy {
    /// `None` for statuses below the warning band.
    pub fn classify(&self, status: u16) -> Option<Severity> {
        if status >= self.error_threshold {
            Some(Severity::Error)
        } else if status >= self.warning_threshold {
            Some(Severity::Warning)
        } else {
            None
        }
    }
}

/// One trailing `key=value` command-line setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanSetting {
    Headless(bool),
    TimeoutMs(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingError {
    #[error("expected key=value, got `{0}`")]
    Malformed(String),

    #[error("unknown setting `{0}`")]
    Unknown(String),

    #[error("invalid value `{value}` for `{key}`")]
    InvalidValue { key: String, value: String },
}

impl FromStr for ScanSetting {
    type Err = SettingError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| SettingError::Malformed(raw.to_string()))?;
        let invalid = || SettingError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };

        match key.trim() {
            "headless" => value
                .trim()
                .parse::<bool>()
                .map(ScanSetting::Headless)
                .map_err(|_| invalid()),
            "timeout" => match value.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => Ok(ScanSetting::TimeoutMs(ms)),
                _ => Err(invalid()),
            },
            other => Err(SettingError::Unknown(other.to_string())),
        }
    }
}
