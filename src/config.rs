//! Deployment configuration, read from environment variables at startup.

use crate::logic::{AlwaysOpen, PenaltyPolicy, RankingKey, ScheduleGate, WeeklyWindow};
use chrono::{Duration, NaiveTime, Weekday};
use chrono_tz::Tz;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

const MINUTES_PER_WEEK: i64 = 7 * 24 * 60;

fn invalid(key: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Weekly window settings; only consulted when `enabled`.
#[derive(Clone, Debug)]
pub struct ScheduleConfig {
    pub enabled: bool,
    pub timezone: Tz,
    pub weekday: Weekday,
    pub cutoff: NaiveTime,
    pub formation_window_minutes: i64,
    pub submission_blackout_minutes: i64,
    /// Period of the scheduled formation trigger.
    pub check_interval: StdDuration,
    /// Run the no-result sweep right before each scheduled formation.
    pub sweep_no_result_on_formation: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        let window = WeeklyWindow::thursday_evening();
        Self {
            enabled: false,
            timezone: window.timezone,
            weekday: window.weekday,
            cutoff: window.cutoff,
            formation_window_minutes: window.formation_window.num_minutes(),
            submission_blackout_minutes: window.submission_blackout.num_minutes(),
            check_interval: StdDuration::from_secs(default_check_seconds()),
            sweep_no_result_on_formation: false,
        }
    }
}

impl ScheduleConfig {
    /// The single switch between "always open" and the weekly window.
    pub fn gate(&self) -> Arc<dyn ScheduleGate> {
        if self.enabled {
            Arc::new(WeeklyWindow {
                timezone: self.timezone,
                weekday: self.weekday,
                cutoff: self.cutoff,
                formation_window: Duration::minutes(self.formation_window_minutes),
                submission_blackout: Duration::minutes(self.submission_blackout_minutes),
            })
        } else {
            Arc::new(AlwaysOpen)
        }
    }
}

#[derive(Clone, Debug)]
pub struct LadderConfig {
    pub host: String,
    pub port: u16,
    /// JSONL persistence directory; in-memory when `None`.
    pub data_dir: Option<PathBuf>,
    pub group_size: usize,
    pub ranking_key: RankingKey,
    pub penalties: PenaltyPolicy,
    pub schedule: ScheduleConfig,
    /// Shared secret granting the admin role at session start.
    pub admin_key: Option<String>,
    /// Cookie signing key material (at least 64 bytes).
    pub session_key: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_group_size() -> usize {
    crate::logic::DEFAULT_GROUP_SIZE
}

fn default_check_seconds() -> u64 {
    300
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: None,
            group_size: default_group_size(),
            ranking_key: RankingKey::default(),
            penalties: PenaltyPolicy::default(),
            schedule: ScheduleConfig::default(),
            admin_key: None,
            session_key: None,
        }
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value, "expected true or false")),
    }
}

fn parse_num<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: ToString,
{
    value.trim().parse().map_err(|e: T::Err| invalid(key, value, e))
}

/// `none` disables the floor.
fn parse_floor(key: &'static str, value: &str) -> Result<Option<i32>, ConfigError> {
    if value.trim().eq_ignore_ascii_case("none") {
        Ok(None)
    } else {
        parse_num(key, value).map(Some)
    }
}

fn parse_ranking_key(value: &str) -> Result<RankingKey, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "lifetime_points" | "points" => Ok(RankingKey::LifetimePoints),
        "rating" => Ok(RankingKey::Rating),
        _ => Err(invalid("RANKING_KEY", value, "expected lifetime_points or rating")),
    }
}

impl LadderConfig {
    /// Read from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = lookup("HOST") {
            config.host = v;
        }
        if let Some(v) = lookup("PORT") {
            config.port = parse_num("PORT", &v)?;
        }
        config.data_dir = lookup("DATA_DIR")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        if let Some(v) = lookup("GROUP_SIZE") {
            config.group_size = parse_num("GROUP_SIZE", &v)?;
            if config.group_size < 2 {
                return Err(invalid("GROUP_SIZE", &v, "must be at least 2"));
            }
        }
        if let Some(v) = lookup("RANKING_KEY") {
            config.ranking_key = parse_ranking_key(&v)?;
        }

        if let Some(v) = lookup("NO_SHOW_FLOOR") {
            config.penalties.no_show_floor = parse_floor("NO_SHOW_FLOOR", &v)?;
        }
        if let Some(v) = lookup("NO_RESULT_FLOOR") {
            config.penalties.no_result_floor = parse_floor("NO_RESULT_FLOOR", &v)?;
        }
        if let Some(v) = lookup("NOT_PLAYING_FLOOR") {
            config.penalties.not_playing_floor = parse_floor("NOT_PLAYING_FLOOR", &v)?;
        }

        let schedule = &mut config.schedule;
        if let Some(v) = lookup("SCHEDULE_ENABLED") {
            schedule.enabled = parse_bool("SCHEDULE_ENABLED", &v)?;
        }
        if let Some(v) = lookup("SCHEDULE_TIMEZONE") {
            schedule.timezone = v
                .trim()
                .parse::<Tz>()
                .map_err(|e| invalid("SCHEDULE_TIMEZONE", &v, e))?;
        }
        if let Some(v) = lookup("SCHEDULE_WEEKDAY") {
            schedule.weekday = v
                .trim()
                .parse::<Weekday>()
                .map_err(|_| invalid("SCHEDULE_WEEKDAY", &v, "expected a weekday like thu"))?;
        }
        if let Some(v) = lookup("SCHEDULE_CUTOFF") {
            schedule.cutoff = NaiveTime::parse_from_str(v.trim(), "%H:%M")
                .map_err(|e| invalid("SCHEDULE_CUTOFF", &v, e))?;
        }
        if let Some(v) = lookup("FORMATION_WINDOW_MINUTES") {
            let minutes: i64 = parse_num("FORMATION_WINDOW_MINUTES", &v)?;
            if !(1..=MINUTES_PER_WEEK).contains(&minutes) {
                return Err(invalid("FORMATION_WINDOW_MINUTES", &v, "must be between 1 and 10080"));
            }
            schedule.formation_window_minutes = minutes;
        }
        if let Some(v) = lookup("SUBMISSION_BLACKOUT_MINUTES") {
            let minutes: i64 = parse_num("SUBMISSION_BLACKOUT_MINUTES", &v)?;
            if !(0..MINUTES_PER_WEEK).contains(&minutes) {
                return Err(invalid("SUBMISSION_BLACKOUT_MINUTES", &v, "must be between 0 and 10079"));
            }
            schedule.submission_blackout_minutes = minutes;
        }
        if let Some(v) = lookup("FORMATION_CHECK_SECONDS") {
            let seconds: u64 = parse_num("FORMATION_CHECK_SECONDS", &v)?;
            if seconds == 0 {
                return Err(invalid("FORMATION_CHECK_SECONDS", &v, "must be at least 1"));
            }
            schedule.check_interval = StdDuration::from_secs(seconds);
        }
        if let Some(v) = lookup("SWEEP_NO_RESULT_ON_FORMATION") {
            schedule.sweep_no_result_on_formation = parse_bool("SWEEP_NO_RESULT_ON_FORMATION", &v)?;
        }

        config.admin_key = lookup("ADMIN_KEY").filter(|v| !v.is_empty());
        config.session_key = lookup("SESSION_KEY").filter(|v| !v.is_empty());
        Ok(config)
    }
}
