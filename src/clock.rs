//! Server-side time source.
//!
//! Every timestamp the ledger assigns (sale time, session start and end, the
//! upper bound of an open session) is issued by one shared [`Timeline`], which
//! never hands out the same instant twice. A sale recorded before a session
//! starts therefore always falls strictly before that session's start, even
//! when the wall clock has not ticked in between.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, TimeZone, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        ManualClock {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.reading() = instant;
    }

    pub fn advance(&self, by: Duration) {
        *self.reading() += by;
    }

    // A panic while holding the lock cannot leave a half-written instant.
    fn reading(&self) -> MutexGuard<'_, DateTime<Utc>> {
        self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.reading()
    }
}

/// Issues strictly increasing instants at microsecond resolution.
pub struct Timeline {
    clock: Box<dyn Clock>,
    last_micros: AtomicI64,
}

impl Timeline {
    pub fn new(clock: impl Clock + 'static) -> Self {
        Timeline {
            clock: Box::new(clock),
            last_micros: AtomicI64::new(i64::MIN),
        }
    }

    pub fn system() -> Self {
        Self::new(SystemClock)
    }

    /// Make every later stamp fall strictly after `instant`, whatever the
    /// wall clock says. Used when reopening a store that already holds
    /// stamped rows.
    pub fn resume_after(&self, instant: DateTime<Utc>) {
        self.last_micros
            .fetch_max(instant.timestamp_micros(), Ordering::AcqRel);
    }

    /// Current wall-clock reading, without reserving an instant.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Reserve the next instant: the wall clock, or one microsecond past the
    /// last issued instant if the clock has not moved past it.
    pub fn stamp(&self) -> DateTime<Utc> {
        let wall = self.clock.now().timestamp_micros();
        let mut last = self.last_micros.load(Ordering::Acquire);
        loop {
            let next = if wall > last { wall } else { last + 1 };
            match self.last_micros.compare_exchange_weak(
                last,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return from_micros(next),
                Err(observed) => last = observed,
            }
        }
    }
}

pub fn from_micros(micros: i64) -> DateTime<Utc> {
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    Utc.timestamp_opt(secs, nanos)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
