//! Schedule store -- cron-backed triggers that tell the health check which
//! flows are expected to run and when.

pub mod cron;

pub use self::cron::{ScheduleEntry, ScheduleStore};
