pub mod aggregate;
pub mod clock;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod menu;
pub mod models;
pub mod sessions;


use std::io::{self, BufRead, Write};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use aggregate::{Aggregator, ReportCalendar};
use clock::Timeline;
use config::Config;
use db::Database;
use error::Result;
use ledger::SqliteLedger;
use menu::SqliteMenuCatalog;
use sessions::{SessionPolicy, SessionRegistry};

/// Everything the gateway commands operate on. All parts share one database
/// connection and one timeline.
pub struct AppState {
    pub db: Arc<Database>,
    pub timeline: Arc<Timeline>,
    pub menu: Arc<SqliteMenuCatalog>,
    pub ledger: Arc<SqliteLedger>,
    pub sessions: SessionRegistry,
    pub reports: Aggregator<Arc<SqliteLedger>>,
}

impl AppState {
    pub fn new(
        db: Database,
        timeline: Timeline,
        policy: SessionPolicy,
        calendar: ReportCalendar,
    ) -> Self {
        let db = Arc::new(db);
        let timeline = Arc::new(timeline);
        let menu = Arc::new(SqliteMenuCatalog::new(db.clone()));
        let ledger = Arc::new(SqliteLedger::new(db.clone(), menu.clone(), timeline.clone()));

        AppState {
            sessions: SessionRegistry::new(db.clone(), timeline.clone(), policy),
            reports: Aggregator::new(ledger.clone(), timeline.clone(), calendar),
            db,
            timeline,
            menu,
            ledger,
        }
    }

    pub fn open(config: &Config) -> Result<Self> {
        Self::open_with_timeline(config, Timeline::system())
    }

    /// Open the configured store. The timeline resumes after the latest
    /// stored instant so a clock that is behind the data cannot reorder it.
    pub fn open_with_timeline(config: &Config, timeline: Timeline) -> Result<Self> {
        let db = Database::open(&config.db_path)?;
        if let Some(latest) = db.latest_instant()? {
            if latest > timeline.now() {
                warn!(%latest, now = %timeline.now(), "Clock is behind the stored ledger");
            }
            timeline.resume_after(latest);
        }
        info!(
            policy = %config.session_policy,
            utc_offset = %config.utc_offset,
            week_start = %config.week_start,
            "Ledger ready"
        );
        Ok(Self::new(
            db,
            timeline,
            config.session_policy,
            config.calendar(),
        ))
    }

    /// Fresh in-memory store on the system clock, reporting in UTC.
    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(
            Database::open_in_memory()?,
            Timeline::system(),
            SessionPolicy::default(),
            ReportCalendar::default(),
        ))
    }

    /// The current local calendar day.
    pub fn today(&self) -> NaiveDate {
        self.reports.calendar().local_date(self.timeline.now())
    }

    pub fn today_bounds(&self) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        self.reports.calendar().day_bounds(self.today())
    }
}

/// Install the stderr log subscriber, filtered by `RUST_LOG` (default `info`).
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

/// Load configuration, open the store and answer requests until `reader` ends.
pub fn run(reader: impl BufRead, writer: impl Write) -> anyhow::Result<()> {
    let config = Config::load()?;
    let state = AppState::open(&config)?;
    gateway::serve(&state, reader, writer)?;
    Ok(())
}
