//! 指标抓取：调度器、队列与消费者

pub mod harvester;
pub mod queue;
pub mod scheduler;

pub use harvester::{DrainReport, HarvestOutcome, HarvestPolicy, MetricHarvester};
pub use queue::{DbHarvestQueue, Delivery, HarvestMessage, HarvestQueue, MemoryHarvestQueue};
pub use scheduler::{HarvestScheduler, ScheduleReport};
