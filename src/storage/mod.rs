pub mod backend;
pub mod models;

pub use backend::{PostThresholds, SeaOrmStorage};
pub use models::*;
