//! promoguard - metrics harvesting, bot detection and payout settlement
//!
//! Stateless workers that coordinate through the database:
//! raw events → snapshots → aggregates → classification → settlement.
//!
//! # Architecture
//! - `platforms`: TikTok / Instagram / YouTube metric adapters
//! - `harvest`: durable queue, scheduler and metric harvester
//! - `activity`: hourly/daily activity rollups and threshold calibration
//! - `fraud`: post-level rule scoring and user-level classification
//! - `settlement`: payout engine and ledger writes
//! - `storage`: SeaORM backend, status enums, retry helpers
//! - `runtime`: job schedules, daemon and one-shot commands
//! - `config` / `system`: configuration loading and logging

pub mod activity;
pub mod cli;
pub mod config;
pub mod errors;
pub mod fraud;
pub mod harvest;
pub mod platforms;
pub mod runtime;
pub mod settlement;
pub mod storage;
pub mod system;
pub mod utils;
