//! Totals derived from the sale log.
//!
//! Every figure here is a pure function of a time range: the engine scans the
//! ledger and sums what it finds. Nothing is cached, so a session's totals are
//! always the sum of the same records the enclosing day sees, and a session
//! that has just started (no record at or after its start yet) reports zero.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{
    DateTime, Datelike, Days, FixedOffset, Months, NaiveDate, Offset, TimeZone, Utc, Weekday,
};
use rust_decimal::Decimal;

use crate::clock::Timeline;
use crate::error::{LedgerError, Result};
use crate::ledger::SaleLedger;
use crate::models::{
    ItemSales, PaymentType, Period, PeriodBounds, PeriodReport, SaleRecord, SessionSummary,
    Totals, WorkSession,
};

/// How many items a period report lists.
pub const TOP_ITEMS: usize = 10;

/// Maps instants onto local calendar days, weeks and months.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportCalendar {
    offset: FixedOffset,
    week_start: Weekday,
}

impl Default for ReportCalendar {
    fn default() -> Self {
        ReportCalendar::new(Utc.fix(), Weekday::Sun)
    }
}

impl ReportCalendar {
    pub fn new(offset: FixedOffset, week_start: Weekday) -> Self {
        ReportCalendar { offset, week_start }
    }

    pub fn week_start(&self) -> Weekday {
        self.week_start
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    pub fn start_of_day(&self, date: NaiveDate) -> Result<DateTime<Utc>> {
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or(LedgerError::DateOutOfRange(date))?;
        self.offset
            .from_local_datetime(&midnight)
            .single()
            .map(|local| local.with_timezone(&Utc))
            .ok_or(LedgerError::DateOutOfRange(date))
    }

    /// `[local midnight, next local midnight)` of `date`.
    pub fn day_bounds(&self, date: NaiveDate) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let next = date
            .checked_add_days(Days::new(1))
            .ok_or(LedgerError::DateOutOfRange(date))?;
        Ok((self.start_of_day(date)?, self.start_of_day(next)?))
    }

    pub fn period_bounds(&self, period: Period, reference: DateTime<Utc>) -> Result<PeriodBounds> {
        let date = self.local_date(reference);
        let (first, after_last) = match period {
            Period::Day => (date, date.checked_add_days(Days::new(1))),
            Period::Week => {
                let back = (7 + date.weekday().num_days_from_monday()
                    - self.week_start.num_days_from_monday())
                    % 7;
                let first = date
                    .checked_sub_days(Days::new(u64::from(back)))
                    .ok_or(LedgerError::DateOutOfRange(date))?;
                (first, first.checked_add_days(Days::new(7)))
            }
            Period::Month => {
                let first = date
                    .with_day(1)
                    .ok_or(LedgerError::DateOutOfRange(date))?;
                (first, first.checked_add_months(Months::new(1)))
            }
        };
        let after_last = after_last.ok_or(LedgerError::DateOutOfRange(date))?;

        Ok(PeriodBounds {
            period,
            start: self.start_of_day(first)?,
            end: self.start_of_day(after_last)?,
        })
    }
}

/// Sum a batch of records. Empty input yields all-zero totals.
pub fn accumulate<'a>(records: impl IntoIterator<Item = &'a SaleRecord>) -> Result<Totals> {
    let mut totals = Totals::default();
    for record in records {
        totals.overall = add(totals.overall, record.total)?;
        match record.payment_type {
            PaymentType::Cash => totals.cash = add(totals.cash, record.total)?,
            PaymentType::Card => totals.card = add(totals.card, record.total)?,
        }
        totals.item_count = totals
            .item_count
            .checked_add(record.quantity)
            .ok_or(LedgerError::AmountOverflow("item count"))?;
    }
    Ok(totals)
}

fn add(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_add(b).ok_or(LedgerError::AmountOverflow("totals"))
}

/// Per-item count and revenue, best sellers by revenue first.
pub fn item_breakdown(records: &[SaleRecord]) -> Result<Vec<ItemSales>> {
    let mut by_item: HashMap<i64, ItemSales> = HashMap::new();
    for record in records {
        let entry = by_item
            .entry(record.menu_item_id)
            .or_insert_with(|| ItemSales {
                menu_item_id: record.menu_item_id,
                name: None,
                count: 0,
                revenue: Decimal::ZERO,
            });
        entry.count = entry
            .count
            .checked_add(record.quantity)
            .ok_or(LedgerError::AmountOverflow("item count"))?;
        entry.revenue = add(entry.revenue, record.total)?;
    }

    let mut items: Vec<ItemSales> = by_item.into_values().collect();
    items.sort_by(|a, b| {
        b.revenue
            .cmp(&a.revenue)
            .then(b.count.cmp(&a.count))
            .then(a.menu_item_id.cmp(&b.menu_item_id))
    });
    Ok(items)
}

pub struct Aggregator<L> {
    ledger: L,
    timeline: Arc<Timeline>,
    calendar: ReportCalendar,
}

impl<L: SaleLedger> Aggregator<L> {
    pub fn new(ledger: L, timeline: Arc<Timeline>, calendar: ReportCalendar) -> Self {
        Aggregator {
            ledger,
            timeline,
            calendar,
        }
    }

    pub fn calendar(&self) -> &ReportCalendar {
        &self.calendar
    }

    pub fn totals(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Totals> {
        if start > end {
            return Err(LedgerError::InvalidRange { start, end });
        }
        let records = self.ledger.scan_range(start, end)?;
        accumulate(&records)
    }

    /// Totals from the session start to its end, or to a freshly issued
    /// instant while it is still open (that bound is later than every sale
    /// already committed).
    pub fn session_totals(&self, session: &WorkSession) -> Result<Totals> {
        self.totals(session.start_time, self.session_end(session))
    }

    pub fn daily_totals(&self, date: NaiveDate) -> Result<Totals> {
        let (start, end) = self.calendar.day_bounds(date)?;
        self.totals(start, end)
    }

    pub fn period_bounds(&self, period: Period, reference: DateTime<Utc>) -> Result<PeriodBounds> {
        self.calendar.period_bounds(period, reference)
    }

    pub fn period_totals(&self, period: Period, reference: DateTime<Utc>) -> Result<Totals> {
        let bounds = self.period_bounds(period, reference)?;
        self.totals(bounds.start, bounds.end)
    }

    pub fn item_sales(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<ItemSales>> {
        if start > end {
            return Err(LedgerError::InvalidRange { start, end });
        }
        item_breakdown(&self.ledger.scan_range(start, end)?)
    }

    /// Totals and best sellers of one period, both taken from a single scan.
    pub fn period_report(&self, period: Period, reference: DateTime<Utc>) -> Result<PeriodReport> {
        let bounds = self.period_bounds(period, reference)?;
        let records = self.ledger.scan_range(bounds.start, bounds.end)?;

        let mut top_items = item_breakdown(&records)?;
        top_items.truncate(TOP_ITEMS);

        Ok(PeriodReport {
            period,
            start: bounds.start,
            end: bounds.end,
            totals: accumulate(&records)?,
            top_items,
        })
    }

    /// Session totals plus the cash the drawer should hold and, once a count
    /// was recorded at close, how far the drawer is off.
    pub fn session_summary(&self, session: &WorkSession) -> Result<SessionSummary> {
        let totals = self.session_totals(session)?;
        let expected_cash = add(session.starting_cash, totals.cash)?;
        let cash_difference = session
            .counted_cash
            .map(|counted| {
                counted
                    .checked_sub(expected_cash)
                    .ok_or(LedgerError::AmountOverflow("cash difference"))
            })
            .transpose()?;

        Ok(SessionSummary {
            session: session.clone(),
            totals,
            expected_cash,
            counted_cash: session.counted_cash,
            cash_difference,
        })
    }

    fn session_end(&self, session: &WorkSession) -> DateTime<Utc> {
        session.end_time.unwrap_or_else(|| self.timeline.stamp())
    }
}
