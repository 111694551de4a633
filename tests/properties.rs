use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use pos_ledger_lib::aggregate::{Aggregator, ReportCalendar};
use pos_ledger_lib::clock::{ManualClock, Timeline};
use pos_ledger_lib::error::Result;
use pos_ledger_lib::ledger::{MemoryLedger, SaleLedger};
use pos_ledger_lib::menu::MenuCatalog;
use pos_ledger_lib::models::{
    MenuItem, PaymentType, SaleDraft, SaleRecord, SessionStatus, WorkSession,
};
use proptest::prelude::*;
use rust_decimal::Decimal;

struct FixedMenu(Vec<MenuItem>);

impl MenuCatalog for FixedMenu {
    fn get_item(&self, id: i64) -> Result<Option<MenuItem>> {
        Ok(self.0.iter().find(|item| item.id == id).cloned())
    }
}

#[derive(Debug, Clone)]
struct PlannedSale {
    item: usize,
    quantity: i64,
    card: bool,
    gap_secs: i64,
}

fn sale_strategy() -> impl Strategy<Value = PlannedSale> {
    (0usize..8, 1i64..50, any::<bool>(), 1i64..400).prop_map(|(item, quantity, card, gap_secs)| {
        PlannedSale {
            item,
            quantity,
            card,
            gap_secs,
        }
    })
}

fn day_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap()
}

struct Fixture {
    clock: Arc<ManualClock>,
    ledger: Arc<MemoryLedger>,
    reports: Aggregator<Arc<MemoryLedger>>,
    menu: Vec<MenuItem>,
}

fn fixture(prices_in_cents: &[i64]) -> Fixture {
    let menu: Vec<MenuItem> = prices_in_cents
        .iter()
        .enumerate()
        .map(|(i, cents)| MenuItem {
            id: i as i64 + 1,
            name: format!("item-{i}"),
            price: Decimal::new(*cents, 2),
        })
        .collect();

    let clock = Arc::new(ManualClock::new(day_start()));
    let timeline = Arc::new(Timeline::new(clock.clone()));
    let ledger = Arc::new(MemoryLedger::new(
        Arc::new(FixedMenu(menu.clone())),
        timeline.clone(),
    ));
    let reports = Aggregator::new(ledger.clone(), timeline, ReportCalendar::default());

    Fixture {
        clock,
        ledger,
        reports,
        menu,
    }
}

fn play(fixture: &Fixture, plan: &[PlannedSale]) -> Vec<SaleRecord> {
    plan.iter()
        .map(|sale| {
            fixture.clock.advance(Duration::seconds(sale.gap_secs));
            let item = &fixture.menu[sale.item % fixture.menu.len()];
            fixture
                .ledger
                .append(SaleDraft {
                    menu_item_id: item.id,
                    quantity: sale.quantity,
                    payment_type: Some(if sale.card {
                        PaymentType::Card
                    } else {
                        PaymentType::Cash
                    }),
                })
                .unwrap()
        })
        .collect()
}

proptest! {
    #[test]
    fn daily_totals_are_exact_sums(
        prices in proptest::collection::vec(0i64..100_000, 1..6),
        plan in proptest::collection::vec(sale_strategy(), 0..200),
    ) {
        let fixture = fixture(&prices);
        let records = play(&fixture, &plan);

        let mut expected_overall = Decimal::ZERO;
        let mut expected_card = Decimal::ZERO;
        let mut expected_items = 0i64;
        for (record, sale) in records.iter().zip(&plan) {
            let item = &fixture.menu[sale.item % fixture.menu.len()];
            prop_assert_eq!(record.unit_price, item.price);
            prop_assert_eq!(record.total, item.price * Decimal::from(sale.quantity));
            expected_overall += record.total;
            if sale.card {
                expected_card += record.total;
            }
            expected_items += sale.quantity;
        }

        let day = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let totals = fixture.reports.daily_totals(day).unwrap();
        prop_assert_eq!(totals.overall, expected_overall);
        prop_assert_eq!(totals.card, expected_card);
        prop_assert_eq!(totals.cash + totals.card, totals.overall);
        prop_assert_eq!(totals.item_count, expected_items);
    }

    #[test]
    fn session_totals_never_exceed_the_day(
        prices in proptest::collection::vec(0i64..100_000, 1..6),
        plan in proptest::collection::vec(sale_strategy(), 0..200),
        offset_secs in 0i64..86_400,
        length_secs in 0i64..86_400,
    ) {
        let fixture = fixture(&prices);
        let records = play(&fixture, &plan);

        let start = day_start() + Duration::seconds(offset_secs);
        let end = (start + Duration::seconds(length_secs)).min(day_start() + Duration::days(1));
        let session = WorkSession {
            id: 1,
            name: "window".to_string(),
            start_time: start,
            end_time: Some(end),
            status: SessionStatus::Closed,
            starting_cash: Decimal::ZERO,
            counted_cash: None,
        };

        let in_session = fixture.reports.session_totals(&session).unwrap();
        let whole_day = fixture
            .reports
            .daily_totals(NaiveDate::from_ymd_opt(2024, 5, 10).unwrap())
            .unwrap();
        prop_assert!(in_session.overall <= whole_day.overall);
        prop_assert!(in_session.item_count <= whole_day.item_count);

        let expected: Decimal = records
            .iter()
            .filter(|r| r.timestamp >= start && r.timestamp < end)
            .map(|r| r.total)
            .sum();
        prop_assert_eq!(in_session.overall, expected);
    }
}
