//! Job orchestration
//!
//! - `schedule`: UTC trigger times
//! - `startup`: builds every worker from the loaded configuration
//! - `daemon`: long-running mode, one task per job
//! - `commands`: one-shot CLI commands

pub mod commands;
pub mod daemon;
pub mod schedule;
pub mod startup;

pub use commands::{generate_config, run_command};
pub use daemon::run_daemon;
pub use schedule::Schedule;
pub use startup::{StartupContext, build_context, prepare_workers};
