use chrono::{DateTime, Utc};

use super::CommandResult;
use crate::ledger::SaleLedger;
use crate::models::{SaleDraft, SaleRecord};
use crate::AppState;

pub fn record_sale(state: &AppState, draft: SaleDraft) -> CommandResult<SaleRecord> {
    Ok(state.ledger.append(draft)?)
}

pub fn get_sales_in_range(
    state: &AppState,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> CommandResult<Vec<SaleRecord>> {
    Ok(state.ledger.scan_range(start, end)?)
}

pub fn get_today_sales(state: &AppState) -> CommandResult<Vec<SaleRecord>> {
    let (start, end) = state.today_bounds()?;
    Ok(state.ledger.scan_range(start, end)?)
}
