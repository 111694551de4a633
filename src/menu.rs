//! Menu catalog: the reference data a sale takes its price snapshot from.

use std::sync::Arc;

use rusqlite::{params, OptionalExtension};
use rust_decimal::Decimal;
use tracing::info;

use crate::db::{decimal_at, Database};
use crate::error::{LedgerError, Result};
use crate::models::{CreateMenuItem, MenuItem};

/// Read-only view of the menu used by the ledger. The price returned is
/// authoritative at the instant of the call and is never re-read afterwards.
pub trait MenuCatalog: Send + Sync {
    fn get_item(&self, id: i64) -> Result<Option<MenuItem>>;
}

impl<C: MenuCatalog + ?Sized> MenuCatalog for Arc<C> {
    fn get_item(&self, id: i64) -> Result<Option<MenuItem>> {
        (**self).get_item(id)
    }
}

pub struct SqliteMenuCatalog {
    db: Arc<Database>,
}

impl SqliteMenuCatalog {
    pub fn new(db: Arc<Database>) -> Self {
        SqliteMenuCatalog { db }
    }

    pub fn list_items(&self) -> Result<Vec<MenuItem>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare("SELECT id, name, price FROM menu_items ORDER BY name, id")?;
        let items = stmt
            .query_map([], |row| {
                Ok(MenuItem {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    price: decimal_at(row, 2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    pub fn create_item(&self, item: CreateMenuItem) -> Result<MenuItem> {
        ensure_price(item.price)?;
        let conn = self.db.lock()?;

        conn.execute(
            "INSERT INTO menu_items (name, price) VALUES (?1, ?2)",
            params![item.name, item.price.to_string()],
        )?;
        let id = conn.last_insert_rowid();
        info!(menu_item_id = id, name = %item.name, price = %item.price, "Menu item created");

        Ok(MenuItem {
            id,
            name: item.name,
            price: item.price,
        })
    }

    /// Change the catalog price. Sales already recorded keep their snapshot.
    pub fn update_price(&self, id: i64, price: Decimal) -> Result<MenuItem> {
        ensure_price(price)?;
        let conn = self.db.lock()?;

        conn.execute(
            "UPDATE menu_items SET price = ?1 WHERE id = ?2",
            params![price.to_string(), id],
        )?;
        if conn.changes() == 0 {
            return Err(LedgerError::UnknownMenuItem(id));
        }
        drop(conn);

        info!(menu_item_id = id, price = %price, "Menu price changed");
        self.get_item(id)?.ok_or(LedgerError::UnknownMenuItem(id))
    }
}

impl MenuCatalog for SqliteMenuCatalog {
    fn get_item(&self, id: i64) -> Result<Option<MenuItem>> {
        let conn = self.db.lock()?;
        let item = conn
            .query_row(
                "SELECT id, name, price FROM menu_items WHERE id = ?1",
                [id],
                |row| {
                    Ok(MenuItem {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        price: decimal_at(row, 2)?,
                    })
                },
            )
            .optional()?;
        Ok(item)
    }
}

fn ensure_price(price: Decimal) -> Result<()> {
    if price < Decimal::ZERO {
        return Err(LedgerError::NegativeAmount("price"));
    }
    Ok(())
}
