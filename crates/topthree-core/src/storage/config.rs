//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Work window and time grid for calendar scheduling
//! - Evening hours at which an unfinished top-1 raises streak risk
//! - Calendar provider endpoint and zone
//! - OAuth client settings used for token refresh
//!
//! Configuration is stored at `~/.config/topthree/config.toml`.

use std::path::{Path, PathBuf};

use chrono::{FixedOffset, NaiveTime};
use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::ConfigError;

/// Calendar slot-finding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Earliest start considered for a slot, "HH:MM".
    #[serde(default = "default_work_start")]
    pub work_start: String,
    /// A slot must end by this time, "HH:MM".
    #[serde(default = "default_work_end")]
    pub work_end: String,
    #[serde(default = "default_grid_minutes")]
    pub grid_minutes: u32,
    #[serde(default = "default_duration_minutes")]
    pub default_duration_minutes: u32,
}

/// Hours (local, 0-23) at which an incomplete top-1 escalates risk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_warning_hour")]
    pub warning_hour: u32,
    #[serde(default = "default_high_hour")]
    pub high_hour: u32,
    #[serde(default = "default_critical_hour")]
    pub critical_hour: u32,
}

/// Calendar REST endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// IANA zone name passed to the API on insert.
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
    /// Offset used to map API timestamps onto local wall time.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

/// OAuth client settings. The client secret lives in the OS keyring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/topthree/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

// Default functions
fn default_work_start() -> String {
    "08:00".into()
}
fn default_work_end() -> String {
    "22:00".into()
}
fn default_grid_minutes() -> u32 {
    15
}
fn default_duration_minutes() -> u32 {
    30
}
fn default_warning_hour() -> u32 {
    18
}
fn default_high_hour() -> u32 {
    21
}
fn default_critical_hour() -> u32 {
    23
}
fn default_calendar_id() -> String {
    "primary".into()
}
fn default_api_base_url() -> String {
    "https://www.googleapis.com/calendar/v3".into()
}
fn default_time_zone() -> String {
    "UTC".into()
}
fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".into()
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            work_start: default_work_start(),
            work_end: default_work_end(),
            grid_minutes: default_grid_minutes(),
            default_duration_minutes: default_duration_minutes(),
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            warning_hour: default_warning_hour(),
            high_hour: default_high_hour(),
            critical_hour: default_critical_hour(),
        }
    }
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            calendar_id: default_calendar_id(),
            api_base_url: default_api_base_url(),
            time_zone: default_time_zone(),
            utc_offset_minutes: 0,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            token_url: default_token_url(),
        }
    }
}

fn parse_hhmm(key: &str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value, "%H:%M").map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("expected HH:MM, got '{value}': {e}"),
    })
}

impl SchedulingConfig {
    /// Parsed `(work_start, work_end)`.
    pub fn work_window(&self) -> Result<(NaiveTime, NaiveTime), ConfigError> {
        Ok((
            parse_hhmm("scheduling.work_start", &self.work_start)?,
            parse_hhmm("scheduling.work_end", &self.work_end)?,
        ))
    }
}

impl CalendarConfig {
    pub fn offset(&self) -> Result<FixedOffset, ConfigError> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| ConfigError::InvalidValue {
            key: "calendar.utc_offset_minutes".into(),
            message: format!("{} is out of range", self.utc_offset_minutes),
        })
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<i64>() {
                            serde_json::Value::Number(n.into())
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as integer")));
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        return Err(invalid("cannot overwrite a whole section".into()));
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the data directory, writing defaults if no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed or
    /// fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        if !path.exists() {
            let cfg = Self::default();
            cfg.save_to(&path)?;
            return Ok(cfg);
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Persist to the data directory.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Reject settings the engines cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (start, end) = self.scheduling.work_window()?;
        if start >= end {
            return Err(ConfigError::InvalidValue {
                key: "scheduling.work_end".into(),
                message: format!("{} must be after work_start {}", self.scheduling.work_end, self.scheduling.work_start),
            });
        }
        let grid = self.scheduling.grid_minutes;
        if grid == 0 || 60 % grid != 0 {
            return Err(ConfigError::InvalidValue {
                key: "scheduling.grid_minutes".into(),
                message: format!("{grid} must be a positive divisor of 60"),
            });
        }
        if self.scheduling.default_duration_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "scheduling.default_duration_minutes".into(),
                message: "must be positive".into(),
            });
        }
        let risk = &self.risk;
        if !(risk.warning_hour <= risk.high_hour
            && risk.high_hour <= risk.critical_hour
            && risk.critical_hour < 24)
        {
            return Err(ConfigError::InvalidValue {
                key: "risk".into(),
                message: "hours must satisfy warning <= high <= critical < 24".into(),
            });
        }
        self.calendar.offset()?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without persisting. The updated config
    /// must still validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value is rejected.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default configuration");
            Self::default()
        })
    }
}
