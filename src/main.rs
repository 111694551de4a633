use std::io;

use anyhow::Context;

fn main() -> anyhow::Result<()> {
    pos_ledger_lib::init_logging();

    let stdin = io::stdin();
    let stdout = io::stdout();
    pos_ledger_lib::run(stdin.lock(), stdout.lock()).context("pos-ledger stopped")
}
