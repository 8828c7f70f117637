//! Database migration runner for Pricebook.
//!
//! Usage: cargo run --bin migrator -- up

use pricebook_db::migration::Migrator;
use sea_orm_migration::prelude::*;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    cli::run_cli(Migrator).await;
}
