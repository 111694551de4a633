//! Work-session lifecycle.
//!
//! A session is only a time window: sales carry no session reference and are
//! attributed by `start_time <= timestamp < end_time`. Starting or closing a
//! session therefore never touches the sale log.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::clock::Timeline;
use crate::db::{decimal_at, instant_at, optional_decimal_at, parsed_at, Database};
use crate::error::{LedgerError, Result};
use crate::models::{SessionStatus, StartSession, WorkSession};

pub const DEFAULT_SESSION_NAME: &str = "Unnamed Session";

/// What `start_session` does when another session is still active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPolicy {
    /// Refuse with `SessionAlreadyActive`.
    #[default]
    Reject,
    /// Close the active session at the new session's boundary.
    AutoClose,
}

impl FromStr for SessionPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "reject" => Ok(SessionPolicy::Reject),
            "auto-close" | "autoclose" => Ok(SessionPolicy::AutoClose),
            other => Err(format!("unknown session policy '{other}'")),
        }
    }
}

impl fmt::Display for SessionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPolicy::Reject => f.write_str("reject"),
            SessionPolicy::AutoClose => f.write_str("auto-close"),
        }
    }
}

const SESSION_COLUMNS: &str = "id, name, start_us, end_us, status, starting_cash, counted_cash";

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<WorkSession> {
    let end_us: Option<i64> = row.get(3)?;
    Ok(WorkSession {
        id: row.get(0)?,
        name: row.get(1)?,
        start_time: instant_at(row, 2)?,
        end_time: end_us.map(crate::clock::from_micros),
        status: parsed_at(row, 4)?,
        starting_cash: decimal_at(row, 5)?,
        counted_cash: optional_decimal_at(row, 6)?,
    })
}

fn query_session(conn: &Connection, id: i64) -> Result<Option<WorkSession>> {
    let session = conn
        .query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM work_sessions WHERE id = ?1"),
            [id],
            session_from_row,
        )
        .optional()?;
    Ok(session)
}

fn query_active(conn: &Connection) -> Result<Option<WorkSession>> {
    let session = conn
        .query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM work_sessions WHERE status = 'ACTIVE'"),
            [],
            session_from_row,
        )
        .optional()?;
    Ok(session)
}

pub struct SessionRegistry {
    db: Arc<Database>,
    timeline: Arc<Timeline>,
    policy: SessionPolicy,
}

impl SessionRegistry {
    pub fn new(db: Arc<Database>, timeline: Arc<Timeline>, policy: SessionPolicy) -> Self {
        SessionRegistry {
            db,
            timeline,
            policy,
        }
    }

    pub fn start_session(&self, request: StartSession) -> Result<WorkSession> {
        if request.starting_cash < Decimal::ZERO {
            return Err(LedgerError::NegativeAmount("starting cash"));
        }
        let name = match request.name.trim() {
            "" => DEFAULT_SESSION_NAME.to_string(),
            trimmed => trimmed.to_string(),
        };

        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;

        if let Some(active) = query_active(&tx)? {
            match self.policy {
                SessionPolicy::Reject => {
                    warn!(active_session = active.id, "Refused to start a second active session");
                    return Err(LedgerError::SessionAlreadyActive(active.id));
                }
                SessionPolicy::AutoClose => {
                    let end = self.timeline.stamp();
                    tx.execute(
                        "UPDATE work_sessions SET status = 'CLOSED', end_us = ?1 WHERE id = ?2",
                        params![end.timestamp_micros(), active.id],
                    )?;
                    info!(session_id = active.id, name = %active.name, "Session auto-closed");
                }
            }
        }

        let start_time = self.timeline.stamp();
        tx.execute(
            "INSERT INTO work_sessions (name, start_us, status, starting_cash)
             VALUES (?1, ?2, 'ACTIVE', ?3)",
            params![
                name,
                start_time.timestamp_micros(),
                request.starting_cash.to_string()
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        info!(session_id = id, name = %name, starting_cash = %request.starting_cash, "Session started");

        Ok(WorkSession {
            id,
            name,
            start_time,
            end_time: None,
            status: SessionStatus::Active,
            starting_cash: request.starting_cash,
            counted_cash: None,
        })
    }

    /// Close an active session, optionally recording the cash counted in the
    /// drawer. Only the count is stored; totals stay derived from the ledger.
    pub fn close_session(&self, id: i64, counted_cash: Option<Decimal>) -> Result<WorkSession> {
        if counted_cash.is_some_and(|cash| cash < Decimal::ZERO) {
            return Err(LedgerError::NegativeAmount("counted cash"));
        }
        let conn = self.db.lock()?;

        let session = query_session(&conn, id)?.ok_or(LedgerError::SessionNotFound(id))?;
        if !session.is_active() {
            return Err(LedgerError::SessionAlreadyClosed(id));
        }

        let end_time = self.timeline.stamp();
        conn.execute(
            "UPDATE work_sessions SET status = 'CLOSED', end_us = ?1, counted_cash = ?2
             WHERE id = ?3 AND status = 'ACTIVE'",
            params![
                end_time.timestamp_micros(),
                counted_cash.map(|cash| cash.to_string()),
                id
            ],
        )?;

        info!(session_id = id, name = %session.name, counted_cash = ?counted_cash, "Session closed");

        Ok(WorkSession {
            end_time: Some(end_time),
            status: SessionStatus::Closed,
            counted_cash,
            ..session
        })
    }

    /// The active session, if any. Having none is a normal state.
    pub fn get_active(&self) -> Result<Option<WorkSession>> {
        let conn = self.db.lock()?;
        query_active(&conn)
    }

    pub fn get_session(&self, id: i64) -> Result<WorkSession> {
        let conn = self.db.lock()?;
        query_session(&conn, id)?.ok_or(LedgerError::SessionNotFound(id))
    }

    /// Sessions whose start lies in `[start, end)`, newest first.
    pub fn sessions_started_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<WorkSession>> {
        if start > end {
            return Err(LedgerError::InvalidRange { start, end });
        }

        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM work_sessions
             WHERE start_us >= ?1 AND start_us < ?2
             ORDER BY start_us DESC"
        ))?;
        let sessions = stmt
            .query_map(
                params![start.timestamp_micros(), end.timestamp_micros()],
                session_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;

    fn instant(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn registry(policy: SessionPolicy) -> (SessionRegistry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(instant("2024-05-10T08:00:00Z")));
        let registry = SessionRegistry::new(
            Arc::new(Database::open_in_memory().unwrap()),
            Arc::new(Timeline::new(clock.clone())),
            policy,
        );
        (registry, clock)
    }

    fn start(name: &str, cash: i64) -> StartSession {
        StartSession {
            name: name.to_string(),
            starting_cash: Decimal::from(cash),
        }
    }

    #[test]
    fn test_start_session_is_active() {
        let (registry, _) = registry(SessionPolicy::Reject);
        let session = registry.start_session(start("Morning Session", 500)).unwrap();

        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.start_time, instant("2024-05-10T08:00:00Z"));
        assert!(session.end_time.is_none());
        assert_eq!(registry.get_active().unwrap(), Some(session));
    }

    #[test]
    fn test_no_active_session_is_none() {
        let (registry, _) = registry(SessionPolicy::Reject);
        assert_eq!(registry.get_active().unwrap(), None);
    }

    #[test]
    fn test_cannot_start_new_session_while_active() {
        let (registry, _) = registry(SessionPolicy::Reject);
        let morning = registry.start_session(start("Morning Session", 0)).unwrap();

        let result = registry.start_session(start("Afternoon Session", 0));
        assert!(matches!(result, Err(LedgerError::SessionAlreadyActive(id)) if id == morning.id));
        assert_eq!(registry.get_active().unwrap().unwrap().id, morning.id);
    }

    #[test]
    fn test_can_start_session_after_previous_closed() {
        let (registry, clock) = registry(SessionPolicy::Reject);
        let morning = registry.start_session(start("Morning Session", 0)).unwrap();
        clock.advance(Duration::hours(4));
        let closed = registry.close_session(morning.id, None).unwrap();
        let afternoon = registry.start_session(start("Afternoon Session", 0)).unwrap();

        assert_eq!(closed.status, SessionStatus::Closed);
        assert_eq!(closed.end_time, Some(instant("2024-05-10T12:00:00Z")));
        assert!(afternoon.start_time > closed.end_time.unwrap());
    }

    #[test]
    fn test_auto_close_policy_closes_previous() {
        let (registry, _) = registry(SessionPolicy::AutoClose);
        let morning = registry.start_session(start("Morning Session", 0)).unwrap();
        let afternoon = registry.start_session(start("Afternoon Session", 0)).unwrap();

        let morning = registry.get_session(morning.id).unwrap();
        assert_eq!(morning.status, SessionStatus::Closed);
        assert!(morning.end_time.unwrap() < afternoon.start_time);
        assert_eq!(registry.get_active().unwrap().unwrap().id, afternoon.id);
    }

    #[test]
    fn test_close_unknown_session() {
        let (registry, _) = registry(SessionPolicy::Reject);
        assert!(matches!(
            registry.close_session(41, None),
            Err(LedgerError::SessionNotFound(41))
        ));
    }

    #[test]
    fn test_close_is_terminal() {
        let (registry, clock) = registry(SessionPolicy::Reject);
        let session = registry.start_session(start("Evening", 0)).unwrap();
        let closed = registry.close_session(session.id, None).unwrap();
        clock.advance(Duration::hours(1));

        assert!(matches!(
            registry.close_session(session.id, Some(Decimal::from(10))),
            Err(LedgerError::SessionAlreadyClosed(id)) if id == session.id
        ));
        assert_eq!(registry.get_session(session.id).unwrap(), closed);
    }

    #[test]
    fn test_close_records_counted_cash() {
        let (registry, _) = registry(SessionPolicy::Reject);
        let session = registry.start_session(start("Evening", 200)).unwrap();
        let closed = registry
            .close_session(session.id, Some(Decimal::new(48750, 2)))
            .unwrap();

        assert_eq!(closed.counted_cash, Some(Decimal::new(48750, 2)));
        assert_eq!(registry.get_session(session.id).unwrap(), closed);
    }

    #[test]
    fn test_negative_counted_cash_rejected() {
        let (registry, _) = registry(SessionPolicy::Reject);
        let session = registry.start_session(start("Evening", 0)).unwrap();

        let result = registry.close_session(session.id, Some(Decimal::from(-1)));
        assert!(matches!(result, Err(LedgerError::NegativeAmount("counted cash"))));
        assert!(registry.get_session(session.id).unwrap().is_active());
    }

    #[test]
    fn test_blank_name_gets_default() {
        let (registry, _) = registry(SessionPolicy::Reject);
        let session = registry.start_session(start("   ", 0)).unwrap();
        assert_eq!(session.name, DEFAULT_SESSION_NAME);
    }

    #[test]
    fn test_negative_starting_cash_rejected() {
        let (registry, _) = registry(SessionPolicy::Reject);
        let result = registry.start_session(start("Night", -5));
        assert!(matches!(result, Err(LedgerError::NegativeAmount(_))));
        assert_eq!(registry.get_active().unwrap(), None);
    }

    #[test]
    fn test_sessions_started_between_newest_first() {
        let (registry, clock) = registry(SessionPolicy::AutoClose);
        registry.start_session(start("Morning", 0)).unwrap();
        clock.advance(Duration::hours(5));
        registry.start_session(start("Afternoon", 0)).unwrap();
        clock.advance(Duration::days(1));
        registry.start_session(start("Tomorrow", 0)).unwrap();

        let today = registry
            .sessions_started_between(
                instant("2024-05-10T00:00:00Z"),
                instant("2024-05-11T00:00:00Z"),
            )
            .unwrap();
        let names: Vec<&str> = today.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Afternoon", "Morning"]);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("reject".parse::<SessionPolicy>().unwrap(), SessionPolicy::Reject);
        assert_eq!("AUTO_CLOSE".parse::<SessionPolicy>().unwrap(), SessionPolicy::AutoClose);
        assert!("overlap".parse::<SessionPolicy>().is_err());
    }
}
