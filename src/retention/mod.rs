//! Message retention sweep engine.
//!
//! A cleanup pass walks each configured channel backwards in time and:
//! 1. Keeps messages younger than the policy's minimum age
//! 2. Bulk deletes messages within the platform's bulk window, in batches
//! 3. Deletes older messages one at a time
//!
//! Calls are paced with a fixed delay to stay inside the platform's rate
//! limits, and failures are contained per channel: one bad channel never
//! stops the pass.

mod accumulator;
mod classifier;
mod error;
mod orchestrator;
mod policy;
mod report;
mod sweeper;

pub use accumulator::BatchAccumulator;
pub use classifier::{Classification, classify};
pub use error::SweepError;
pub use orchestrator::{run_sweep, run_sweep_at};
pub use policy::{PolicyError, RetentionPolicy};
pub use report::{CleanupReport, SweepResult};
pub use sweeper::sweep_channel;
