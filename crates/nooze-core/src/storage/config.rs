//! TOML-based application configuration.
//!
//! Stores the tunables of the alarm lifecycle:
//! - Stable alarm id and wake-hold ceiling
//! - Escalation timings (re-assertion period, vibration phases, playback retry)
//! - Challenge shape (problem count, operand range, operators)
//!
//! Configuration is stored at `<data_dir>/config.toml`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::alarm::{AlarmId, Operator};
use crate::error::{ConfigError, Result};

/// Alarm slot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmConfig {
    /// Id reused for every re-arm when the caller does not supply one.
    #[serde(default = "default_alarm_id")]
    pub default_alarm_id: AlarmId,
    /// Upper bound on the wake hold taken while dispatching a fire.
    #[serde(default = "default_wake_hold_ceiling_secs")]
    pub wake_hold_ceiling_secs: u64,
}

/// Alert escalation timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    #[serde(default = "default_reassert_interval_secs")]
    pub reassert_interval_secs: u64,
    #[serde(default = "default_phase_two_after_secs")]
    pub phase_two_after_secs: u64,
    #[serde(default = "default_phase_three_after_secs")]
    pub phase_three_after_secs: u64,
    #[serde(default = "default_playback_retry_delay_ms")]
    pub playback_retry_delay_ms: u64,
    /// Back-to-back playback errors tolerated before audio is abandoned
    /// for the rest of the ringing period.
    #[serde(default = "default_max_consecutive_playback_failures")]
    pub max_consecutive_playback_failures: u32,
}

/// Challenge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeConfig {
    #[serde(default = "default_problem_count")]
    pub problem_count: usize,
    /// Operand bounds; generation clamps both to `±OPERAND_LIMIT`.
    #[serde(default = "default_operand_min")]
    pub operand_min: i64,
    #[serde(default = "default_operand_max")]
    pub operand_max: i64,
    #[serde(default = "default_operators")]
    pub operators: Vec<Operator>,
    /// Fixed seed for reproducible problems (None = entropy).
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data_dir>/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub alarm: AlarmConfig,
    #[serde(default)]
    pub escalation: EscalationConfig,
    #[serde(default)]
    pub challenge: ChallengeConfig,
}

fn default_alarm_id() -> AlarmId {
    1001
}
fn default_wake_hold_ceiling_secs() -> u64 {
    10
}
fn default_reassert_interval_secs() -> u64 {
    12
}
fn default_phase_two_after_secs() -> u64 {
    30
}
fn default_phase_three_after_secs() -> u64 {
    60
}
fn default_playback_retry_delay_ms() -> u64 {
    1000
}
fn default_max_consecutive_playback_failures() -> u32 {
    10
}
fn default_problem_count() -> usize {
    4
}
fn default_operand_min() -> i64 {
    1
}
fn default_operand_max() -> i64 {
    50
}
fn default_operators() -> Vec<Operator> {
    vec![Operator::Add]
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            default_alarm_id: default_alarm_id(),
            wake_hold_ceiling_secs: default_wake_hold_ceiling_secs(),
        }
    }
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            reassert_interval_secs: default_reassert_interval_secs(),
            phase_two_after_secs: default_phase_two_after_secs(),
            phase_three_after_secs: default_phase_three_after_secs(),
            playback_retry_delay_ms: default_playback_retry_delay_ms(),
            max_consecutive_playback_failures: default_max_consecutive_playback_failures(),
        }
    }
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            problem_count: default_problem_count(),
            operand_min: default_operand_min(),
            operand_max: default_operand_max(),
            operators: default_operators(),
            seed: None,
        }
    }
}

impl AlarmConfig {
    pub fn wake_hold_ceiling(&self) -> Duration {
        Duration::from_secs(self.wake_hold_ceiling_secs)
    }
}

impl EscalationConfig {
    pub fn reassert_interval(&self) -> Duration {
        Duration::from_secs(self.reassert_interval_secs.max(1))
    }

    pub fn phase_two_after(&self) -> Duration {
        Duration::from_secs(self.phase_two_after_secs)
    }

    /// Never earlier than phase two, so escalation stays monotonic.
    pub fn phase_three_after(&self) -> Duration {
        Duration::from_secs(self.phase_three_after_secs.max(self.phase_two_after_secs))
    }

    pub fn playback_retry_delay(&self) -> Duration {
        Duration::from_millis(self.playback_retry_delay_ms)
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
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

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
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    // Optional fields serialize as null; accept a number or "none".
                    serde_json::Value::Null => {
                        if value.eq_ignore_ascii_case("none") {
                            serde_json::Value::Null
                        } else {
                            serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        }

        Err(ConfigError::UnknownKey(key.to_string()))
    }

    fn path() -> Result<PathBuf> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<()> {
        let path = Self::path()?;
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
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

    /// Set a config value by key and persist. Returns error if key is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.apply(key, value)?;
        self.save()
    }

    /// Set a config value in memory only.
    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}
