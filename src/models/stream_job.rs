use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

pub const DEFAULT_RESOLUTION: &str = "1280x720";
pub const DEFAULT_BITRATE_KBPS: u32 = 2500;
pub const DEFAULT_FPS: u32 = 30;

/// Persisted lifecycle state of a stream job
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StreamStatus {
    Scheduled,
    Live,
    Offline,
}

/// A schedulable unit of work: push one source to one RTMP destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamJob {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub status: StreamStatus,
    /// Video or playlist id; resolved through `StreamJobStore::get_with_source`
    pub video_id: Option<Uuid>,
    pub rtmp_url: String,
    pub stream_key: String,
    pub platform: Option<String>,
    pub platform_icon: Option<String>,
    pub loop_video: bool,
    pub use_advanced_settings: bool,
    pub resolution: Option<String>,
    pub bitrate: Option<u32>,
    pub fps: Option<u32>,
    pub schedule_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StreamJob {
    /// A scheduled job with sensible defaults; mostly useful for seeding stores.
    pub fn new(
        user_id: Uuid,
        title: impl Into<String>,
        rtmp_url: impl Into<String>,
        stream_key: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            title: title.into(),
            status: StreamStatus::Scheduled,
            video_id: None,
            rtmp_url: rtmp_url.into(),
            stream_key: stream_key.into(),
            platform: None,
            platform_icon: None,
            loop_video: false,
            use_advanced_settings: false,
            resolution: None,
            bitrate: None,
            fps: None,
            schedule_time: None,
            end_time: None,
            start_time: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// RTMP target: the server URL without its trailing slash, then the key.
    pub fn destination(&self) -> String {
        format!("{}/{}", self.rtmp_url.trim_end_matches('/'), self.stream_key)
    }

    pub fn is_live(&self) -> bool {
        self.status == StreamStatus::Live
    }

    pub fn resolution_or_default(&self) -> &str {
        self.resolution
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_RESOLUTION)
    }

    pub fn bitrate_or_default(&self) -> u32 {
        self.bitrate.filter(|b| *b > 0).unwrap_or(DEFAULT_BITRATE_KBPS)
    }

    pub fn fps_or_default(&self) -> u32 {
        self.fps.filter(|f| *f > 0).unwrap_or(DEFAULT_FPS)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Video {
    pub id: Uuid,
    pub title: String,
    /// Path relative to the media root (a leading `/` is tolerated)
    pub filepath: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: Uuid,
    pub name: String,
    pub shuffle: bool,
    /// Videos in play order
    pub videos: Vec<Video>,
}

/// What a job streams
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamSource {
    Video(Video),
    Playlist(Playlist),
}

impl StreamSource {
    pub fn title(&self) -> &str {
        match self {
            Self::Video(video) => &video.title,
            Self::Playlist(playlist) => &playlist.name,
        }
    }
}

/// A job joined with its resolved source; `source` is `None` when the
/// referenced video or playlist no longer exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamJobWithSource {
    pub job: StreamJob,
    pub source: Option<StreamSource>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusUpdateOptions {
    /// Start timestamp to record when moving to `live` (defaults to now)
    pub start_time_override: Option<DateTime<Utc>>,
}

impl StatusUpdateOptions {
    pub fn started_at(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time_override: Some(start_time),
        }
    }
}
