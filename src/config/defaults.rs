//! Default configuration values

use std::time::Duration;

// Database
pub const DEFAULT_DATABASE_URL: &str = "sqlite://./stream-conductor.db";
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

// FFmpeg
pub const DEFAULT_FFMPEG_COMMAND: &str = "ffmpeg";
pub const DEFAULT_MEDIA_ROOT: &str = "./public";
pub const DEFAULT_TEMP_PATH: &str = "./data/temp";
pub const DEFAULT_PLAYLIST_LOOP_REPETITIONS: usize = 1000;

// Trigger loop / termination scheduling
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_START_LOOKAHEAD: Duration = Duration::from_secs(60);
pub const DEFAULT_TERMINATION_TOLERANCE: Duration = Duration::from_secs(30);
pub const DEFAULT_LONG_DURATION_CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Largest delay a single timer is trusted with (2^31 - 1 milliseconds, about 24.8 days)
pub const DEFAULT_MAX_TIMER_DELAY: Duration = Duration::from_millis(2_147_483_647);

// Supervisor
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 10;
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(3);
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(60);
pub const DEFAULT_RETRY_RESET_INTERVAL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_HEARTBEAT_MARKER: &str = "frame=";
pub const DEFAULT_LOG_BUFFER_CAPACITY: usize = 100;
pub const DEFAULT_LOG_RETENTION: Duration = Duration::from_secs(60 * 60);

// Reconciler
pub const DEFAULT_STATUS_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_LOG_CLEANUP_INTERVAL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_START_GRACE_PERIOD: Duration = Duration::from_secs(30);
