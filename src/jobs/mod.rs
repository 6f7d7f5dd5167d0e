//! Background sweep scheduling.
//!
//! The daemon runs cleanup passes two ways:
//!
//! - **Periodic**: [`start_sweep_worker`] fires on a fixed interval and skips
//!   a tick if the previous pass is still running.
//! - **Manual**: [`SweepScheduler::trigger`] with [`TriggerSource::Manual`]
//!   (wired to `SIGUSR1` by the binary) waits for any pass in flight and then
//!   runs.
//!
//! # Example
//!
//! ```toml
//! [schedule]
//! enabled = true
//! interval_minutes = 60
//! run_on_start = true
//! ```

mod scheduler;

pub use scheduler::{
    SchedulerError, SchedulerStats, SweepScheduler, TriggerError, TriggerSource,
    start_sweep_worker,
};
