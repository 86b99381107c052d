use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::stream_job::StreamJob;

/// Runs shorter than this are not worth a history row
pub const MIN_RECORDED_DURATION_SECS: i64 = 1;
pub const DEFAULT_PLATFORM: &str = "Custom";

/// Summary of one completed run, written when a stream is stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamHistoryRecord {
    pub id: Uuid,
    pub stream_id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub platform: String,
    pub platform_icon: Option<String>,
    pub video_id: Option<Uuid>,
    pub video_title: Option<String>,
    pub resolution: Option<String>,
    pub bitrate: Option<u32>,
    pub fps: Option<u32>,
    pub use_advanced_settings: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: i64,
}

impl StreamHistoryRecord {
    /// Build a record for a run of `job` that ended at `end_time`.
    ///
    /// Returns `None` when the job never recorded a start or ran for less than a second.
    pub fn from_run(
        job: &StreamJob,
        video_title: Option<String>,
        end_time: DateTime<Utc>,
    ) -> Option<Self> {
        let start_time = job.start_time?;
        let duration_seconds = (end_time - start_time).num_seconds();
        if duration_seconds < MIN_RECORDED_DURATION_SECS {
            return None;
        }

        Some(Self {
            id: Uuid::new_v4(),
            stream_id: job.id,
            user_id: job.user_id,
            title: job.title.clone(),
            platform: job
                .platform
                .clone()
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_PLATFORM.to_string()),
            platform_icon: job.platform_icon.clone(),
            video_id: job.video_id,
            video_title,
            resolution: job.resolution.clone(),
            bitrate: job.bitrate,
            fps: job.fps,
            use_advanced_settings: job.use_advanced_settings,
            start_time,
            end_time,
            duration_seconds,
        })
    }
}
