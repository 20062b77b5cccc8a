//! Runs a submitted solution against a per-language test harness under CPU
//! and memory ceilings, and reduces what happened to a [`RunResult`].

pub mod constants;
pub mod core;
pub mod native;
pub mod reports;


pub use crate::core::domain::{RunRequest, RunResult, RunStatus, Summary, TestOutcome, Verdict};
pub use crate::core::engine::Engine;
