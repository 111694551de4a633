use rust_decimal::Decimal;

use super::CommandResult;
use crate::models::{CreateMenuItem, MenuItem};
use crate::AppState;

pub fn get_menu_items(state: &AppState) -> CommandResult<Vec<MenuItem>> {
    Ok(state.menu.list_items()?)
}

pub fn create_menu_item(state: &AppState, item: CreateMenuItem) -> CommandResult<MenuItem> {
    if item.name.trim().is_empty() {
        return Err(super::CommandError::invalid_request("Menu item name must not be empty"));
    }
    Ok(state.menu.create_item(item)?)
}

pub fn update_menu_item_price(state: &AppState, id: i64, price: Decimal) -> CommandResult<MenuItem> {
    Ok(state.menu.update_price(id, price)?)
}
