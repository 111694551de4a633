//! Append-only sale log.
//!
//! [`SaleLedger`] is the only seam the reporting side depends on: an append
//! path and a half-open time-range scan. Totals are always recomputed from a
//! scan, never kept as running counters, so any backend that honours these two
//! calls keeps session, day and period figures consistent with each other.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use rusqlite::params;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::clock::Timeline;
use crate::db::{decimal_at, instant_at, parsed_at, Database};
use crate::error::{LedgerError, Result};
use crate::menu::MenuCatalog;
use crate::models::{PaymentType, SaleDraft, SaleRecord};

pub trait SaleLedger: Send + Sync {
    /// Validate, price and store a sale. Nothing is stored when this fails.
    fn append(&self, draft: SaleDraft) -> Result<SaleRecord>;

    /// Every record with `start <= timestamp < end`, in insertion order, as of
    /// the moment the scan starts.
    fn scan_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<SaleRecord>>;

    fn count(&self) -> Result<usize>;
}

impl<L: SaleLedger + ?Sized> SaleLedger for Arc<L> {
    fn append(&self, draft: SaleDraft) -> Result<SaleRecord> {
        (**self).append(draft)
    }

    fn scan_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<SaleRecord>> {
        (**self).scan_range(start, end)
    }

    fn count(&self) -> Result<usize> {
        (**self).count()
    }
}

/// A draft that passed validation, with its price snapshot taken.
struct PricedSale {
    menu_item_id: i64,
    unit_price: Decimal,
    quantity: i64,
    payment_type: PaymentType,
    total: Decimal,
}

impl PricedSale {
    fn into_record(self, id: i64, timestamp: DateTime<Utc>) -> SaleRecord {
        SaleRecord {
            id,
            timestamp,
            menu_item_id: self.menu_item_id,
            unit_price: self.unit_price,
            quantity: self.quantity,
            payment_type: self.payment_type,
            total: self.total,
        }
    }
}

fn price_sale(draft: &SaleDraft, catalog: &dyn MenuCatalog) -> Result<PricedSale> {
    if draft.quantity <= 0 {
        warn!(
            menu_item_id = draft.menu_item_id,
            quantity = draft.quantity,
            "Rejected sale with non-positive quantity"
        );
        return Err(LedgerError::InvalidQuantity(draft.quantity));
    }

    let item = catalog.get_item(draft.menu_item_id)?.ok_or_else(|| {
        warn!(menu_item_id = draft.menu_item_id, "Rejected sale of unknown menu item");
        LedgerError::UnknownMenuItem(draft.menu_item_id)
    })?;

    let total = item
        .price
        .checked_mul(Decimal::from(draft.quantity))
        .ok_or(LedgerError::AmountOverflow("sale total"))?;

    Ok(PricedSale {
        menu_item_id: item.id,
        unit_price: item.price,
        quantity: draft.quantity,
        payment_type: draft.payment_type.unwrap_or_default(),
        total,
    })
}

fn ensure_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
    if start > end {
        return Err(LedgerError::InvalidRange { start, end });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// SQLite backend
// ---------------------------------------------------------------------------

pub struct SqliteLedger {
    db: Arc<Database>,
    catalog: Arc<dyn MenuCatalog>,
    timeline: Arc<Timeline>,
}

impl SqliteLedger {
    pub fn new(db: Arc<Database>, catalog: Arc<dyn MenuCatalog>, timeline: Arc<Timeline>) -> Self {
        SqliteLedger {
            db,
            catalog,
            timeline,
        }
    }
}

impl SaleLedger for SqliteLedger {
    fn append(&self, draft: SaleDraft) -> Result<SaleRecord> {
        // The catalog may share this connection: price before taking the lock.
        let priced = price_sale(&draft, self.catalog.as_ref())?;

        let conn = self.db.lock()?;
        let timestamp = self.timeline.stamp();
        conn.execute(
            "INSERT INTO sales (timestamp_us, menu_item_id, unit_price, quantity, payment_type, total)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                timestamp.timestamp_micros(),
                priced.menu_item_id,
                priced.unit_price.to_string(),
                priced.quantity,
                priced.payment_type.as_str(),
                priced.total.to_string(),
            ],
        )?;
        let id = conn.last_insert_rowid();

        let record = priced.into_record(id, timestamp);
        debug!(
            sale_id = record.id,
            menu_item_id = record.menu_item_id,
            quantity = record.quantity,
            total = %record.total,
            payment = %record.payment_type,
            "Sale recorded"
        );
        Ok(record)
    }

    fn scan_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<SaleRecord>> {
        ensure_range(start, end)?;

        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, timestamp_us, menu_item_id, unit_price, quantity, payment_type, total
             FROM sales
             WHERE timestamp_us >= ?1 AND timestamp_us < ?2
             ORDER BY id",
        )?;

        let records = stmt
            .query_map(
                params![start.timestamp_micros(), end.timestamp_micros()],
                |row| {
                    Ok(SaleRecord {
                        id: row.get(0)?,
                        timestamp: instant_at(row, 1)?,
                        menu_item_id: row.get(2)?,
                        unit_price: decimal_at(row, 3)?,
                        quantity: row.get(4)?,
                        payment_type: parsed_at(row, 5)?,
                        total: decimal_at(row, 6)?,
                    })
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    fn count(&self) -> Result<usize> {
        let conn = self.db.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sales", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// Volatile ledger; readers share the lock, appends take it exclusively.
pub struct MemoryLedger {
    records: RwLock<Vec<SaleRecord>>,
    catalog: Arc<dyn MenuCatalog>,
    timeline: Arc<Timeline>,
}

impl MemoryLedger {
    pub fn new(catalog: Arc<dyn MenuCatalog>, timeline: Arc<Timeline>) -> Self {
        MemoryLedger {
            records: RwLock::new(Vec::new()),
            catalog,
            timeline,
        }
    }
}

impl SaleLedger for MemoryLedger {
    fn append(&self, draft: SaleDraft) -> Result<SaleRecord> {
        let priced = price_sale(&draft, self.catalog.as_ref())?;

        let mut records = self.records.write()?;
        let timestamp = self.timeline.stamp();
        let record = priced.into_record(records.len() as i64 + 1, timestamp);
        records.push(record.clone());

        debug!(sale_id = record.id, total = %record.total, "Sale recorded in memory");
        Ok(record)
    }

    fn scan_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<SaleRecord>> {
        ensure_range(start, end)?;

        let records = self.records.read()?;
        // Timestamps are issued under the write lock, so the log is sorted.
        let from = records.partition_point(|r| r.timestamp < start);
        let to = records.partition_point(|r| r.timestamp < end);
        Ok(records[from..to.max(from)].to_vec())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.records.read()?.len())
    }
}
