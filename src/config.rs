//! Engine configuration, loaded from environment variables with defaults.

use std::time::Duration;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("could not parse '{raw}'"),
        }),
        Err(_) => Ok(default),
    }
}

/// Per-action-type daily send quotas, shared across every process writing
/// to the same store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyQuotas {
    pub connection_requests: i64,
    pub messages: i64,
    pub inmails: i64,
    pub profile_views: i64,
}

impl Default for DailyQuotas {
    fn default() -> Self {
        Self {
            connection_requests: 25,
            messages: 50,
            inmails: 15,
            profile_views: 80,
        }
    }
}

impl DailyQuotas {
    /// Quota for a logged action type. Unknown types are unmetered.
    pub fn for_action(&self, action_type: &str) -> Option<i64> {
        use crate::candidates::action_types::*;
        match action_type {
            CONNECTION_REQUEST => Some(self.connection_requests),
            MESSAGE => Some(self.messages),
            INMAIL => Some(self.inmails),
            PROFILE_VIEW => Some(self.profile_views),
            _ => None,
        }
    }
}

/// Operator-facing engine settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// First hour (inclusive, local time) the engine may act.
    pub work_start_hour: u32,
    /// Hour (exclusive, local time) after which the engine parks.
    pub work_end_hour: u32,
    /// Fixed UTC offset of the operating timezone, in minutes.
    pub utc_offset_minutes: i32,
    pub pause_on_weekends: bool,
    pub quotas: DailyQuotas,
    /// Bounds for the randomized pacing delay between consecutive sends.
    pub min_send_delay_secs: u64,
    pub max_send_delay_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            work_start_hour: 8,
            work_end_hour: 18,
            utc_offset_minutes: 0,
            pause_on_weekends: true,
            quotas: DailyQuotas::default(),
            min_send_delay_secs: 45,
            max_send_delay_secs: 180,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let settings = Self {
            work_start_hour: env_parse("OUTREACH_WORK_START_HOUR", defaults.work_start_hour)?,
            work_end_hour: env_parse("OUTREACH_WORK_END_HOUR", defaults.work_end_hour)?,
            utc_offset_minutes: env_parse(
                "OUTREACH_UTC_OFFSET_MINUTES",
                defaults.utc_offset_minutes,
            )?,
            pause_on_weekends: env_parse(
                "OUTREACH_PAUSE_ON_WEEKENDS",
                defaults.pause_on_weekends,
            )?,
            quotas: DailyQuotas {
                connection_requests: env_parse(
                    "OUTREACH_QUOTA_CONNECTIONS",
                    defaults.quotas.connection_requests,
                )?,
                messages: env_parse("OUTREACH_QUOTA_MESSAGES", defaults.quotas.messages)?,
                inmails: env_parse("OUTREACH_QUOTA_INMAILS", defaults.quotas.inmails)?,
                profile_views: env_parse(
                    "OUTREACH_QUOTA_PROFILE_VIEWS",
                    defaults.quotas.profile_views,
                )?,
            },
            min_send_delay_secs: env_parse(
                "OUTREACH_MIN_SEND_DELAY_SECS",
                defaults.min_send_delay_secs,
            )?,
            max_send_delay_secs: env_parse(
                "OUTREACH_MAX_SEND_DELAY_SECS",
                defaults.max_send_delay_secs,
            )?,
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.work_start_hour >= 24 || self.work_end_hour > 24 {
            return Err(ConfigError::InvalidValue {
                key: "OUTREACH_WORK_START_HOUR/OUTREACH_WORK_END_HOUR".into(),
                message: "hours must be within 0-24".into(),
            });
        }
        if self.work_start_hour >= self.work_end_hour {
            return Err(ConfigError::InvalidValue {
                key: "OUTREACH_WORK_START_HOUR".into(),
                message: "start hour must precede end hour".into(),
            });
        }
        if self.min_send_delay_secs > self.max_send_delay_secs {
            return Err(ConfigError::InvalidValue {
                key: "OUTREACH_MIN_SEND_DELAY_SECS".into(),
                message: "min delay exceeds max delay".into(),
            });
        }
        if FixedOffset::east_opt(self.utc_offset_minutes * 60).is_none() {
            return Err(ConfigError::InvalidValue {
                key: "OUTREACH_UTC_OFFSET_MINUTES".into(),
                message: "offset out of range".into(),
            });
        }
        Ok(())
    }

    /// The operating timezone as a chrono offset.
    pub fn timezone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"))
    }
}

/// Scheduler loop timing.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub cycle_interval: Duration,
    /// Sleep after a cycle-level error before retrying.
    pub error_backoff: Duration,
    /// Sleep while outside the working-hours window.
    pub off_hours_park: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_secs(30),
            error_backoff: Duration::from_secs(60),
            off_hours_park: Duration::from_secs(300),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            cycle_interval: Duration::from_secs(env_parse(
                "OUTREACH_CYCLE_INTERVAL_SECS",
                defaults.cycle_interval.as_secs(),
            )?),
            error_backoff: Duration::from_secs(env_parse(
                "OUTREACH_ERROR_BACKOFF_SECS",
                defaults.error_backoff.as_secs(),
            )?),
            off_hours_park: Duration::from_secs(env_parse(
                "OUTREACH_OFF_HOURS_PARK_SECS",
                defaults.off_hours_park.as_secs(),
            )?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::action_types;

    #[test]
    fn default_settings_validate() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn inverted_hours_rejected() {
        let settings = Settings {
            work_start_hour: 19,
            work_end_hour: 8,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn inverted_delay_bounds_rejected() {
        let settings = Settings {
            min_send_delay_secs: 300,
            max_send_delay_secs: 60,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn quota_lookup_by_action_type() {
        let quotas = DailyQuotas::default();
        assert_eq!(quotas.for_action(action_types::MESSAGE), Some(50));
        assert_eq!(quotas.for_action(action_types::CONNECTION_REQUEST), Some(25));
        assert_eq!(quotas.for_action(action_types::PIPELINE_TRANSITION), None);
    }

    #[test]
    fn timezone_builds_from_offset() {
        let settings = Settings {
            utc_offset_minutes: -300,
            ..Default::default()
        };
        assert_eq!(settings.timezone().local_minus_utc(), -300 * 60);
    }
}
