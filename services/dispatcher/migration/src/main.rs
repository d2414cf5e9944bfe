use sea_orm_migration::prelude::*;

use yodel_dispatcher_migration::Migrator;

#[tokio::main]
async fn main() {
    cli::run_cli(Migrator).await;
}
