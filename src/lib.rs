//! Retention sweeper: deletes chat messages older than a configured age.
//!
//! A cleanup pass visits each configured channel in order, walks its history
//! from newest to oldest and deletes everything past the retention threshold.
//! Recent-enough messages are removed with the platform's bulk delete
//! endpoint; older ones one at a time. See [`retention`] for the engine and
//! [`jobs`] for scheduling.

pub mod config;
pub mod jobs;
pub mod observability;
pub mod platform;
pub mod retention;

#[cfg(test)]
mod tests;
