//! Core engine for the admission pipeline: the application status state
//! machine, the capacity ledger for courses and schedules, and the
//! orchestrating service that keeps both in step.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
