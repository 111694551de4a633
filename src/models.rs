use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MenuItem {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateMenuItem {
    pub name: String,
    pub price: Decimal,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentType {
    #[default]
    #[serde(alias = "cash")]
    Cash,
    #[serde(alias = "card")]
    Card,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Cash => "CASH",
            PaymentType::Card => "CARD",
        }
    }
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CASH" => Ok(PaymentType::Cash),
            "CARD" => Ok(PaymentType::Card),
            other => Err(format!("unknown payment type '{other}'")),
        }
    }
}

/// A sale as requested by a client. `payment_type` stays `None` until the
/// ledger applies the default.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SaleDraft {
    pub menu_item_id: i64,
    pub quantity: i64,
    #[serde(default)]
    pub payment_type: Option<PaymentType>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SaleRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub menu_item_id: i64,
    pub unit_price: Decimal,
    pub quantity: i64,
    pub payment_type: PaymentType,
    pub total: Decimal,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    Active,
    Closed,
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(SessionStatus::Active),
            "CLOSED" => Ok(SessionStatus::Closed),
            other => Err(format!("unknown session status '{other}'")),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkSession {
    pub id: i64,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub starting_cash: Decimal,
    /// Cash counted in the drawer when the session was closed.
    pub counted_cash: Option<Decimal>,
}

impl WorkSession {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSession {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub starting_cash: Decimal,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub overall: Decimal,
    pub cash: Decimal,
    pub card: Decimal,
    pub item_count: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Day,
    Week,
    Month,
}

/// Half-open `[start, end)` window of a calendar period.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct PeriodBounds {
    pub period: Period,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemSales {
    pub menu_item_id: i64,
    pub name: Option<String>,
    pub count: i64,
    pub revenue: Decimal,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PeriodReport {
    pub period: Period,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub totals: Totals,
    pub top_items: Vec<ItemSales>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session: WorkSession,
    pub totals: Totals,
    pub expected_cash: Decimal,
    pub counted_cash: Option<Decimal>,
    /// `counted_cash - expected_cash`; negative when the drawer is short.
    pub cash_difference: Option<Decimal>,
}
