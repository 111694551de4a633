use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::clock::from_micros;
use crate::error::{LedgerError, Result};

/// Single SQLite connection shared by the catalog, the ledger and the session
/// registry. All writers serialize on the mutex; readers hold it only while
/// materializing their rows.
pub struct Database {
    pub conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| {
                LedgerError::Config(format!(
                    "cannot create data directory {}: {e}",
                    dir.display()
                ))
            })?;
        }

        info!("Opening ledger database at {}", path.display());
        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        debug!(journal_mode = %mode, "SQLite pragmas applied");

        let db = Database {
            conn: Mutex::new(conn),
        };
        db.initialize()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Database {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        db.initialize()?;
        Ok(db)
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        Ok(self.conn.lock()?)
    }

    /// Latest instant stamped into any stored row, if there is one.
    pub fn latest_instant(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.lock()?;
        let latest: Option<i64> = conn.query_row(
            "SELECT MAX(us) FROM (
                 SELECT MAX(timestamp_us) AS us FROM sales
                 UNION ALL SELECT MAX(start_us) FROM work_sessions
                 UNION ALL SELECT MAX(end_us) FROM work_sessions
             )",
            [],
            |row| row.get(0),
        )?;
        Ok(latest.map(from_micros))
    }

    pub fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            "
            -- Menu catalog (reference data, prices are decimal text)
            CREATE TABLE IF NOT EXISTS menu_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                price TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            -- Append-only sale log
            CREATE TABLE IF NOT EXISTS sales (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp_us INTEGER NOT NULL,
                menu_item_id INTEGER NOT NULL,
                unit_price TEXT NOT NULL,
                quantity INTEGER NOT NULL CHECK (quantity > 0),
                payment_type TEXT NOT NULL CHECK (payment_type IN ('CASH', 'CARD')),
                total TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sales_timestamp ON sales (timestamp_us);

            CREATE TRIGGER IF NOT EXISTS sales_no_update BEFORE UPDATE ON sales
            BEGIN
                SELECT RAISE(ABORT, 'sales are append-only');
            END;

            CREATE TRIGGER IF NOT EXISTS sales_no_delete BEFORE DELETE ON sales
            BEGIN
                SELECT RAISE(ABORT, 'sales are append-only');
            END;

            -- Work sessions
            CREATE TABLE IF NOT EXISTS work_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                start_us INTEGER NOT NULL,
                end_us INTEGER,
                status TEXT NOT NULL DEFAULT 'ACTIVE'
            );
            ",
        )?;

        // Run migrations for existing databases (pass connection to avoid deadlock)
        Self::migrate_conn(&conn)?;

        Ok(())
    }

    fn migrate_conn(conn: &Connection) -> Result<()> {
        let columns: Vec<String> = conn
            .prepare("PRAGMA table_info(work_sessions)")?
            .query_map([], |row| row.get::<_, String>(1))?
            .filter_map(|r| r.ok())
            .collect();

        if !columns.contains(&"starting_cash".to_string()) {
            conn.execute(
                "ALTER TABLE work_sessions ADD COLUMN starting_cash TEXT NOT NULL DEFAULT '0'",
                [],
            )?;
        }

        if !columns.contains(&"counted_cash".to_string()) {
            conn.execute("ALTER TABLE work_sessions ADD COLUMN counted_cash TEXT", [])?;
        }

        // At most one ACTIVE session, whatever the caller does
        conn.execute_batch(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_single_active_session
                 ON work_sessions (status) WHERE status = 'ACTIVE';",
        )?;

        Ok(())
    }
}

pub(crate) fn decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    Decimal::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn optional_decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        Decimal::from_str(&t)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

pub(crate) fn instant_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    Ok(from_micros(row.get(idx)?))
}

pub(crate) fn parsed_at<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let text: String = row.get(idx)?;
    T::from_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
    })
}
