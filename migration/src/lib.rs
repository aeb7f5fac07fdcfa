pub use sea_orm_migration::prelude::*;

pub mod entities;
mod m20261001_000001_accounts_and_campaigns;
mod m20261001_000002_promotion_posts;
mod m20261002_000001_activity_rollups;
mod m20261002_000002_bot_thresholds;
mod m20261003_000001_ledger;
mod m20261003_000002_harvest_queue;
mod m20261004_000001_lease_markers;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_000001_accounts_and_campaigns::Migration),
            Box::new(m20261001_000002_promotion_posts::Migration),
            Box::new(m20261002_000001_activity_rollups::Migration),
            Box::new(m20261002_000002_bot_thresholds::Migration),
            Box::new(m20261003_000001_ledger::Migration),
            Box::new(m20261003_000002_harvest_queue::Migration),
            Box::new(m20261004_000001_lease_markers::Migration),
        ]
    }
}
