//! Release workflow: per-line orchestration and the multi-line runner

pub mod orchestration;
pub mod runner;

pub use orchestration::{
    AttemptStatus, LineOutcome, Orchestrator, ReleaseAttempt, ReleaseSettings,
};
pub use runner::{LineReport, ReleaseRequest, ReleaseRunner, RunReport};
