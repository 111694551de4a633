use chrono::{DateTime, NaiveDate, Utc};

use super::CommandResult;
use crate::error::Result;
use crate::menu::MenuCatalog;
use crate::models::{ItemSales, Period, PeriodBounds, PeriodReport, SessionSummary, Totals};
use crate::AppState;

pub fn get_totals(state: &AppState, start: DateTime<Utc>, end: DateTime<Utc>) -> CommandResult<Totals> {
    Ok(state.reports.totals(start, end)?)
}

pub fn get_session_totals(state: &AppState, id: i64) -> CommandResult<Totals> {
    let session = state.sessions.get_session(id)?;
    Ok(state.reports.session_totals(&session)?)
}

pub fn get_session_summary(state: &AppState, id: i64) -> CommandResult<SessionSummary> {
    let session = state.sessions.get_session(id)?;
    Ok(state.reports.session_summary(&session)?)
}

/// Totals for `date`, or for the current local day when omitted.
pub fn get_daily_totals(state: &AppState, date: Option<NaiveDate>) -> CommandResult<Totals> {
    let date = date.unwrap_or_else(|| state.today());
    Ok(state.reports.daily_totals(date)?)
}

pub fn get_period_bounds(
    state: &AppState,
    period: Period,
    reference: Option<DateTime<Utc>>,
) -> CommandResult<PeriodBounds> {
    let reference = reference.unwrap_or_else(|| state.timeline.now());
    Ok(state.reports.period_bounds(period, reference)?)
}

pub fn get_period_totals(
    state: &AppState,
    period: Period,
    reference: Option<DateTime<Utc>>,
) -> CommandResult<Totals> {
    let reference = reference.unwrap_or_else(|| state.timeline.now());
    Ok(state.reports.period_totals(period, reference)?)
}

pub fn get_period_report(
    state: &AppState,
    period: Period,
    reference: Option<DateTime<Utc>>,
) -> CommandResult<PeriodReport> {
    let reference = reference.unwrap_or_else(|| state.timeline.now());
    let mut report = state.reports.period_report(period, reference)?;
    fill_item_names(state, &mut report.top_items)?;
    Ok(report)
}

pub fn get_item_sales(
    state: &AppState,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> CommandResult<Vec<ItemSales>> {
    let mut items = state.reports.item_sales(start, end)?;
    fill_item_names(state, &mut items)?;
    Ok(items)
}

// An id the catalog no longer resolves keeps its figures with no name.
fn fill_item_names(state: &AppState, items: &mut [ItemSales]) -> Result<()> {
    for item in items.iter_mut() {
        item.name = state.menu.get_item(item.menu_item_id)?.map(|m| m.name);
    }
    Ok(())
}
