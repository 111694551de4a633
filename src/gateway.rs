//! JSON-lines front end.
//!
//! One request per line, `{"command": "...", "args": {...}}`, answered by one
//! response line: `{"ok": true, "data": ...}` or
//! `{"ok": false, "error": {"code": "...", "message": "..."}}`. A bad line is
//! answered with an error and the loop keeps reading.
//!
//! Every command is a plain function in [`crate::commands`] and is registered
//! here by name, grouped the same way as [`COMMANDS`]:
//!
//! - sales: `record_sale`, `get_sales_in_range`, `get_today_sales`
//! - sessions: `get_active_session`, `start_session`, `close_session`,
//!   `get_session`, `get_today_sessions`, `get_sessions_on_day`
//! - reports: `get_totals`, `get_session_totals`, `get_session_summary`,
//!   `get_daily_totals`, `get_period_bounds`, `get_period_totals`,
//!   `get_period_report`, `get_item_sales`
//! - menu: `get_menu_items`, `create_menu_item`, `update_menu_item_price`

use std::io::{self, BufRead, Write};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::commands::{menu, reports, sales, sessions, CommandError, CommandResult};
use crate::models::Period;
use crate::AppState;

#[derive(Debug, Deserialize)]
struct Request {
    command: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize)]
struct IdArgs {
    id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloseArgs {
    id: i64,
    #[serde(default)]
    counted_cash: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct RangeArgs {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct DayArgs {
    date: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct DateArgs {
    #[serde(default)]
    date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct PeriodArgs {
    period: Period,
    #[serde(default)]
    reference: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct PriceArgs {
    id: i64,
    price: Decimal,
}

/// Every command name the gateway answers to.
pub const COMMANDS: &[&str] = &[
    // Sales
    "record_sale",
    "get_sales_in_range",
    "get_today_sales",
    // Sessions
    "get_active_session",
    "start_session",
    "close_session",
    "get_session",
    "get_today_sessions",
    "get_sessions_on_day",
    // Reports
    "get_totals",
    "get_session_totals",
    "get_session_summary",
    "get_daily_totals",
    "get_period_bounds",
    "get_period_totals",
    "get_period_report",
    "get_item_sales",
    // Menu
    "get_menu_items",
    "create_menu_item",
    "update_menu_item_price",
];

/// Answer one request line.
pub fn handle(state: &AppState, line: &str) -> String {
    let result = match serde_json::from_str::<Request>(line) {
        Ok(request) => {
            debug!(command = %request.command, "Dispatching request");
            dispatch(state, &request.command, request.args)
        }
        Err(e) => Err(CommandError::invalid_request(e)),
    };

    let body = match result {
        Ok(data) => json!({ "ok": true, "data": data }),
        Err(error) => json!({ "ok": false, "error": error }),
    };
    body.to_string()
}

pub fn dispatch(state: &AppState, command: &str, args: Value) -> CommandResult<Value> {
    match command {
        "record_sale" => respond(sales::record_sale(state, parse(args)?)),
        "get_sales_in_range" => {
            let RangeArgs { start, end } = parse(args)?;
            respond(sales::get_sales_in_range(state, start, end))
        }
        "get_today_sales" => respond(sales::get_today_sales(state)),

        "get_active_session" => respond(sessions::get_active_session(state)),
        "start_session" => respond(sessions::start_session(state, parse(args)?)),
        "close_session" => {
            let CloseArgs { id, counted_cash } = parse(args)?;
            respond(sessions::close_session(state, id, counted_cash))
        }
        "get_session" => {
            let IdArgs { id } = parse(args)?;
            respond(sessions::get_session(state, id))
        }
        "get_today_sessions" => respond(sessions::get_today_sessions(state)),
        "get_sessions_on_day" => {
            let DayArgs { date } = parse(args)?;
            respond(sessions::get_sessions_on_day(state, date))
        }

        "get_totals" => {
            let RangeArgs { start, end } = parse(args)?;
            respond(reports::get_totals(state, start, end))
        }
        "get_session_totals" => {
            let IdArgs { id } = parse(args)?;
            respond(reports::get_session_totals(state, id))
        }
        "get_session_summary" => {
            let IdArgs { id } = parse(args)?;
            respond(reports::get_session_summary(state, id))
        }
        "get_daily_totals" => {
            let DateArgs { date } = parse(args)?;
            respond(reports::get_daily_totals(state, date))
        }
        "get_period_bounds" => {
            let PeriodArgs { period, reference } = parse(args)?;
            respond(reports::get_period_bounds(state, period, reference))
        }
        "get_period_totals" => {
            let PeriodArgs { period, reference } = parse(args)?;
            respond(reports::get_period_totals(state, period, reference))
        }
        "get_period_report" => {
            let PeriodArgs { period, reference } = parse(args)?;
            respond(reports::get_period_report(state, period, reference))
        }
        "get_item_sales" => {
            let RangeArgs { start, end } = parse(args)?;
            respond(reports::get_item_sales(state, start, end))
        }

        "get_menu_items" => respond(menu::get_menu_items(state)),
        "create_menu_item" => respond(menu::create_menu_item(state, parse(args)?)),
        "update_menu_item_price" => {
            let PriceArgs { id, price } = parse(args)?;
            respond(menu::update_menu_item_price(state, id, price))
        }

        other => Err(CommandError::unknown_command(other)),
    }
}

/// Read requests until EOF, writing one response line per non-blank request.
pub fn serve(state: &AppState, reader: impl BufRead, mut writer: impl Write) -> io::Result<()> {
    info!("Gateway listening for requests");
    let mut handled = 0usize;

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        writeln!(writer, "{}", handle(state, &line))?;
        writer.flush()?;
        handled += 1;
    }

    info!(requests = handled, "Gateway input closed");
    Ok(())
}

// Commands without arguments accept a missing or null `args`.
fn parse<T: DeserializeOwned>(args: Value) -> CommandResult<T> {
    let args = match args {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(args).map_err(CommandError::invalid_request)
}

fn respond<T: Serialize>(result: CommandResult<T>) -> CommandResult<Value> {
    serde_json::to_value(result?).map_err(|e| CommandError::new("INTERNAL", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(state: &AppState, line: &str) -> Value {
        serde_json::from_str(&handle(state, line)).unwrap()
    }

    #[test]
    fn test_malformed_json_is_invalid_request() {
        let state = AppState::in_memory().unwrap();
        let response = reply(&state, "{not json");
        assert_eq!(response["ok"], false);
        assert_eq!(response["error"]["code"], "INVALID_REQUEST");
    }

    #[test]
    fn test_unknown_command() {
        let state = AppState::in_memory().unwrap();
        let response = reply(&state, r#"{"command": "refund_everything"}"#);
        assert_eq!(response["error"]["code"], "UNKNOWN_COMMAND");
    }

    #[test]
    fn test_missing_arguments_are_invalid_request() {
        let state = AppState::in_memory().unwrap();
        let response = reply(&state, r#"{"command": "close_session", "args": {}}"#);
        assert_eq!(response["error"]["code"], "INVALID_REQUEST");
    }

    #[test]
    fn test_commands_without_args_accept_missing_args() {
        let state = AppState::in_memory().unwrap();
        let response = reply(&state, r#"{"command": "get_active_session"}"#);
        assert_eq!(response["ok"], true);
        assert!(response["data"].is_null());

        let response = reply(&state, r#"{"command": "get_daily_totals", "args": null}"#);
        assert_eq!(response["ok"], true);
        assert_eq!(response["data"]["overall"], "0");
    }

    #[test]
    fn test_every_listed_command_is_dispatched() {
        let state = AppState::in_memory().unwrap();
        for command in COMMANDS {
            let result = dispatch(&state, command, Value::Null);
            if let Err(error) = result {
                assert_ne!(error.code, "UNKNOWN_COMMAND", "{command} is not routed");
            }
        }
    }

    #[test]
    fn test_serve_keeps_going_after_bad_lines() {
        let state = AppState::in_memory().unwrap();
        let input = concat!(
            "garbage\n",
            "\n",
            r#"{"command": "create_menu_item", "args": {"name": "Schnitzel", "price": "12.99"}}"#,
            "\n",
            r#"{"command": "record_sale", "args": {"menuItemId": 1, "quantity": 2}}"#,
            "\n",
        );
        let mut output = Vec::new();
        serve(&state, input.as_bytes(), &mut output).unwrap();

        let lines: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["error"]["code"], "INVALID_REQUEST");
        assert_eq!(lines[1]["data"]["name"], "Schnitzel");
        assert_eq!(lines[2]["data"]["total"], "25.98");
        assert_eq!(lines[2]["data"]["paymentType"], "CASH");
    }
}
