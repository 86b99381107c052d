use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use defaults::*;
use duration_serde::duration;

/// Environment variable prefix; nested keys use `__`, e.g. `STREAM_CONDUCTOR_SUPERVISOR__STOP_TIMEOUT=5s`
pub const ENV_PREFIX: &str = "STREAM_CONDUCTOR_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ffmpeg: FfmpegConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FfmpegConfig {
    /// Executable used to stream; anything accepting ffmpeg-style arguments works
    #[serde(default = "default_ffmpeg_command")]
    pub command: String,
    /// Directory stored media paths are resolved against
    #[serde(default = "default_media_root")]
    pub media_root: PathBuf,
    /// Directory for generated concat manifests
    #[serde(default = "default_temp_path")]
    pub temp_path: PathBuf,
    #[serde(default = "default_playlist_loop_repetitions")]
    pub playlist_loop_repetitions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_poll_interval", with = "duration")]
    pub poll_interval: Duration,
    #[serde(default = "default_start_lookahead", with = "duration")]
    pub start_lookahead: Duration,
    /// Drift allowed between an armed timer and the stored end time before re-arming
    #[serde(default = "default_termination_tolerance", with = "duration")]
    pub termination_tolerance: Duration,
    #[serde(default = "default_long_duration_check_interval", with = "duration")]
    pub long_duration_check_interval: Duration,
    #[serde(default = "default_max_timer_delay", with = "duration")]
    pub max_timer_delay: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_retry_base_delay", with = "duration")]
    pub retry_base_delay: Duration,
    #[serde(default = "default_retry_max_delay", with = "duration")]
    pub retry_max_delay: Duration,
    /// Continuous success needed before the retry counter is forgiven
    #[serde(default = "default_retry_reset_interval", with = "duration")]
    pub retry_reset_interval: Duration,
    #[serde(default = "default_stop_timeout", with = "duration")]
    pub stop_timeout: Duration,
    #[serde(default = "default_heartbeat_marker")]
    pub heartbeat_marker: String,
    #[serde(default = "default_log_buffer_capacity")]
    pub log_buffer_capacity: usize,
    #[serde(default = "default_log_retention", with = "duration")]
    pub log_retention: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    #[serde(default = "default_status_sync_interval", with = "duration")]
    pub status_sync_interval: Duration,
    #[serde(default = "default_health_check_interval", with = "duration")]
    pub health_check_interval: Duration,
    #[serde(default = "default_log_cleanup_interval", with = "duration")]
    pub log_cleanup_interval: Duration,
    /// Jobs that went live this recently are not corrected even if no process is tracked
    #[serde(default = "default_start_grace_period", with = "duration")]
    pub start_grace_period: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            command: default_ffmpeg_command(),
            media_root: default_media_root(),
            temp_path: default_temp_path(),
            playlist_loop_repetitions: default_playlist_loop_repetitions(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            start_lookahead: default_start_lookahead(),
            termination_tolerance: default_termination_tolerance(),
            long_duration_check_interval: default_long_duration_check_interval(),
            max_timer_delay: default_max_timer_delay(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: default_max_retry_attempts(),
            retry_base_delay: default_retry_base_delay(),
            retry_max_delay: default_retry_max_delay(),
            retry_reset_interval: default_retry_reset_interval(),
            stop_timeout: default_stop_timeout(),
            heartbeat_marker: default_heartbeat_marker(),
            log_buffer_capacity: default_log_buffer_capacity(),
            log_retention: default_log_retention(),
        }
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            status_sync_interval: default_status_sync_interval(),
            health_check_interval: default_health_check_interval(),
            log_cleanup_interval: default_log_cleanup_interval(),
            start_grace_period: default_start_grace_period(),
        }
    }
}

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

fn default_max_connections() -> u32 {
    DEFAULT_DATABASE_MAX_CONNECTIONS
}

fn default_ffmpeg_command() -> String {
    DEFAULT_FFMPEG_COMMAND.to_string()
}

fn default_media_root() -> PathBuf {
    PathBuf::from(DEFAULT_MEDIA_ROOT)
}

fn default_temp_path() -> PathBuf {
    PathBuf::from(DEFAULT_TEMP_PATH)
}

fn default_playlist_loop_repetitions() -> usize {
    DEFAULT_PLAYLIST_LOOP_REPETITIONS
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

fn default_start_lookahead() -> Duration {
    DEFAULT_START_LOOKAHEAD
}

fn default_termination_tolerance() -> Duration {
    DEFAULT_TERMINATION_TOLERANCE
}

fn default_long_duration_check_interval() -> Duration {
    DEFAULT_LONG_DURATION_CHECK_INTERVAL
}

fn default_max_timer_delay() -> Duration {
    DEFAULT_MAX_TIMER_DELAY
}

fn default_max_retry_attempts() -> u32 {
    DEFAULT_MAX_RETRY_ATTEMPTS
}

fn default_retry_base_delay() -> Duration {
    DEFAULT_RETRY_BASE_DELAY
}

fn default_retry_max_delay() -> Duration {
    DEFAULT_RETRY_MAX_DELAY
}

fn default_retry_reset_interval() -> Duration {
    DEFAULT_RETRY_RESET_INTERVAL
}

fn default_stop_timeout() -> Duration {
    DEFAULT_STOP_TIMEOUT
}

fn default_heartbeat_marker() -> String {
    DEFAULT_HEARTBEAT_MARKER.to_string()
}

fn default_log_buffer_capacity() -> usize {
    DEFAULT_LOG_BUFFER_CAPACITY
}

fn default_log_retention() -> Duration {
    DEFAULT_LOG_RETENTION
}

fn default_status_sync_interval() -> Duration {
    DEFAULT_STATUS_SYNC_INTERVAL
}

fn default_health_check_interval() -> Duration {
    DEFAULT_HEALTH_CHECK_INTERVAL
}

fn default_log_cleanup_interval() -> Duration {
    DEFAULT_LOG_CLEANUP_INTERVAL
}

fn default_start_grace_period() -> Duration {
    DEFAULT_START_GRACE_PERIOD
}

impl Config {
    /// Load configuration, layering defaults, the TOML file and `STREAM_CONDUCTOR_*` env vars.
    ///
    /// A missing file is created with the default configuration so operators have
    /// something to edit.
    pub fn load_from_file(config_file: impl AsRef<Path>) -> Result<Self> {
        let config_file = config_file.as_ref();
        if !config_file.exists() {
            let contents = toml::to_string_pretty(&Self::default())
                .context("Failed to serialize default configuration")?;
            if let Some(parent) = config_file.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(config_file, contents)
                .with_context(|| format!("Failed to write {}", config_file.display()))?;
            info!("Created default config file: {}", config_file.display());
        }

        Self::figment(config_file)
            .extract()
            .with_context(|| format!("Invalid configuration in {}", config_file.display()))
    }

    fn figment(config_file: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }
}
