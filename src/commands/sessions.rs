use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::CommandResult;
use crate::models::{StartSession, WorkSession};
use crate::AppState;

pub fn get_active_session(state: &AppState) -> CommandResult<Option<WorkSession>> {
    Ok(state.sessions.get_active()?)
}

pub fn start_session(state: &AppState, request: StartSession) -> CommandResult<WorkSession> {
    Ok(state.sessions.start_session(request)?)
}

pub fn close_session(
    state: &AppState,
    id: i64,
    counted_cash: Option<Decimal>,
) -> CommandResult<WorkSession> {
    Ok(state.sessions.close_session(id, counted_cash)?)
}

pub fn get_session(state: &AppState, id: i64) -> CommandResult<WorkSession> {
    Ok(state.sessions.get_session(id)?)
}

/// Sessions started during the local day `date`, newest first.
pub fn get_sessions_on_day(state: &AppState, date: NaiveDate) -> CommandResult<Vec<WorkSession>> {
    let (start, end) = state.reports.calendar().day_bounds(date)?;
    Ok(state.sessions.sessions_started_between(start, end)?)
}

pub fn get_today_sessions(state: &AppState) -> CommandResult<Vec<WorkSession>> {
    get_sessions_on_day(state, state.today())
}
