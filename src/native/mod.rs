/// Executor backed by plain OS processes: rlimits, process groups and procfs,
/// no container runtime.
pub mod executor;
pub mod monitor;
pub mod signal;
