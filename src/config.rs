use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{FixedOffset, Local, Offset, Weekday};
use tracing::{info, warn};

use crate::aggregate::ReportCalendar;
use crate::error::{LedgerError, Result};
use crate::sessions::SessionPolicy;

pub const DB_PATH_VAR: &str = "POS_LEDGER_DB";
pub const SESSION_POLICY_VAR: &str = "POS_LEDGER_SESSION_POLICY";
pub const UTC_OFFSET_VAR: &str = "POS_LEDGER_UTC_OFFSET_MINUTES";
pub const WEEK_START_VAR: &str = "POS_LEDGER_WEEK_START";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub session_policy: SessionPolicy,
    pub utc_offset: FixedOffset,
    pub week_start: Weekday,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: PathBuf::from("pos_ledger.db"),
            session_policy: SessionPolicy::default(),
            utc_offset: Local::now().offset().fix(),
            week_start: Weekday::Sun,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset keys fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Config::default();

        let db_path = lookup(DB_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                info!("{DB_PATH_VAR} not set, using default: {}", defaults.db_path.display());
                defaults.db_path.clone()
            });

        let session_policy = try_load(&lookup, SESSION_POLICY_VAR, defaults.session_policy)?;

        let utc_offset = match lookup(UTC_OFFSET_VAR) {
            Some(raw) => parse_offset(&raw)?,
            None => {
                info!("{UTC_OFFSET_VAR} not set, using host offset {}", defaults.utc_offset);
                defaults.utc_offset
            }
        };

        let week_start = try_load(&lookup, WEEK_START_VAR, defaults.week_start)?;

        Ok(Config {
            db_path,
            session_policy,
            utc_offset,
            week_start,
        })
    }

    pub fn calendar(&self) -> ReportCalendar {
        ReportCalendar::new(self.utc_offset, self.week_start)
    }
}

fn try_load<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e| {
            warn!("Invalid {key} value: {e}");
            LedgerError::Config(format!("invalid {key} '{raw}': {e}"))
        }),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}

fn parse_offset(raw: &str) -> Result<FixedOffset> {
    raw.trim()
        .parse::<i32>()
        .ok()
        .and_then(|minutes| minutes.checked_mul(60))
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| {
            warn!("Invalid {UTC_OFFSET_VAR} value: {raw}");
            LedgerError::Config(format!("invalid {UTC_OFFSET_VAR} '{raw}': expected minutes east of UTC"))
        })
}
