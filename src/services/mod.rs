//! Service layer for stream lifecycle management
//!
//! Services here own the running state of the system: the process table,
//! retry bookkeeping and per-stream logs. They talk to persistence only
//! through the repository traits in `crate::repositories`.
//!
//! # Components
//!
//! - `StreamSupervisor`: spawns, stops and retries streaming processes
//! - `FfmpegCommandBuilder`: turns a job and its source into FFmpeg arguments
//! - `StreamLogBuffer`: bounded in-memory log per stream
//! - `RetryTracker`: exponential backoff bookkeeping for crashed streams
//! - `StreamLifecycleManager`: wires the supervisor, trigger loop and reconciler together

pub mod ffmpeg_command_builder;
pub mod retry_tracker;
pub mod stream_lifecycle;
pub mod stream_log_buffer;
pub mod stream_process;
pub mod stream_supervisor;
pub mod traits;

pub use ffmpeg_command_builder::FfmpegCommandBuilder;
pub use retry_tracker::{RetryDecision, RetryPolicy, RetryTracker};
pub use stream_lifecycle::StreamLifecycleManager;
pub use stream_log_buffer::{LogEntry, StreamLogBuffer, StreamLogBufferConfig};
pub use stream_process::{ExitKind, ExitOutcome, StreamProcess};
pub use stream_supervisor::{ActiveStreamInfo, StreamSupervisor};
pub use traits::{StreamCommand, StreamCommandBuilder};
