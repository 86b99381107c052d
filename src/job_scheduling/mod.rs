//! Time-driven parts of the stream lifecycle
//!
//! - `StreamTriggerLoop`: starts due streams and keeps termination timers in step with stored end times
//! - `TerminationScheduler`: per-stream timers that stop a stream at its end time
//! - `StreamReconciler`: periodic repair of drift between stored status and running processes

pub mod reconciler;
pub mod termination_scheduler;
pub mod trigger_loop;

pub use reconciler::{HealthReport, StatusSyncReport, StreamReconciler};
pub use termination_scheduler::{
    ScheduledTermination, TerminationHandler, TerminationScheduler, TerminationSchedulerConfig,
    TerminationTimer,
};
pub use trigger_loop::{StartSweepReport, StreamTriggerLoop, TerminationSweepReport};
