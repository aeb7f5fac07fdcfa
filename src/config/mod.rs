mod structs;

use std::sync::Arc;

use crate::errors::Result;

pub use structs::*;

/// Load the process configuration
///
/// Reads `path` (default `config.toml`) plus `PG__*` environment overrides.
/// Workers receive the sections they need through their constructors, so the
/// result is handed down rather than stored globally.
pub fn init_config(path: Option<&str>) -> Result<Arc<StaticConfig>> {
    Ok(Arc::new(StaticConfig::load(path)?))
}
