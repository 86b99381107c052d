//! FFmpeg command builder
//!
//! Produces the argument list for pushing a single video or a concat playlist
//! to an RTMP endpoint, either stream-copying the video track or re-encoding
//! it with the job's advanced settings.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use super::traits::{StreamCommand, StreamCommandBuilder};
use crate::config::FfmpegConfig;
use crate::errors::CommandBuildError;
use crate::models::{Playlist, StreamJob, StreamJobWithSource, StreamSource, Video};

pub struct FfmpegCommandBuilder {
    media_root: PathBuf,
    temp_path: PathBuf,
    playlist_loop_repetitions: usize,
}

impl FfmpegCommandBuilder {
    pub fn new(config: &FfmpegConfig) -> Self {
        Self {
            media_root: config.media_root.clone(),
            temp_path: config.temp_path.clone(),
            playlist_loop_repetitions: config.playlist_loop_repetitions.max(1),
        }
    }

    pub fn manifest_path(&self, job_id: Uuid) -> PathBuf {
        self.temp_path.join(format!("playlist_{job_id}.txt"))
    }

    fn resolve_media_path(&self, video: &Video) -> PathBuf {
        self.media_root.join(video.filepath.trim_start_matches('/'))
    }

    async fn require_file(&self, job_id: Uuid, video: &Video) -> Result<PathBuf, CommandBuildError> {
        let path = self.resolve_media_path(video);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            _ => Err(CommandBuildError::SourceMissing {
                job_id,
                detail: format!("video file not found: {}", path.display()),
            }),
        }
    }

    async fn single_video_input(
        &self,
        job: &StreamJob,
        video: &Video,
    ) -> Result<Vec<String>, CommandBuildError> {
        let path = self.require_file(job.id, video).await?;
        let stream_loop = if job.loop_video { "-1" } else { "0" };

        Ok(vec![
            "-stream_loop".to_string(),
            stream_loop.to_string(),
            "-i".to_string(),
            path.to_string_lossy().into_owned(),
        ])
    }

    async fn playlist_input(
        &self,
        job: &StreamJob,
        playlist: &Playlist,
    ) -> Result<Vec<String>, CommandBuildError> {
        if playlist.videos.is_empty() {
            return Err(CommandBuildError::EmptySource {
                playlist_id: playlist.id,
            });
        }

        let mut videos = playlist.videos.clone();
        if playlist.shuffle {
            videos.shuffle(&mut rand::rng());
        }

        let mut entries = Vec::with_capacity(videos.len());
        for video in &videos {
            let path = self.require_file(job.id, video).await?;
            let path = path.to_string_lossy().into_owned();
            if path.contains('\'') || path.contains('\n') || path.contains('\r') {
                return Err(CommandBuildError::InvalidPlaylist {
                    playlist_id: playlist.id,
                    reason: format!("path cannot be written to a concat manifest: {path}"),
                });
            }
            entries.push(format!("file '{path}'"));
        }

        let repetitions = if job.loop_video {
            self.playlist_loop_repetitions
        } else {
            1
        };
        let manifest = concat_manifest(&entries, repetitions);
        let manifest_path = self.manifest_path(job.id);
        write_manifest(&manifest_path, &manifest).await?;
        debug!(
            "Wrote concat manifest for stream {} ({} entries x{})",
            job.id,
            entries.len(),
            repetitions
        );

        Ok(vec![
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            manifest_path.to_string_lossy().into_owned(),
        ])
    }
}

fn concat_manifest(entries: &[String], repetitions: usize) -> String {
    let mut manifest = String::new();
    for _ in 0..repetitions {
        for entry in entries {
            manifest.push_str(entry);
            manifest.push('\n');
        }
    }
    manifest
}

async fn write_manifest(path: &Path, contents: &str) -> Result<(), CommandBuildError> {
    let io_error = |source| CommandBuildError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
    }
    tokio::fs::write(path, contents).await.map_err(io_error)
}

/// Input-independent leading arguments
fn common_input_args() -> Vec<String> {
    ["-nostdin", "-loglevel", "warning", "-re", "-fflags", "+genpts+igndts"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Encoding arguments plus the destination
fn output_args(job: &StreamJob, destination: &str) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();

    if job.use_advanced_settings {
        let bitrate = job.bitrate_or_default();
        let fps = job.fps_or_default();
        let gop = fps * 2;
        let maxrate = (f64::from(bitrate) * 1.2).round() as u64;
        let bufsize = u64::from(bitrate) * 2;

        args.extend(
            [
                "-c:v".to_string(),
                "libx264".to_string(),
                "-preset".to_string(),
                "veryfast".to_string(),
                "-profile:v".to_string(),
                "high".to_string(),
                "-level".to_string(),
                "4.1".to_string(),
                "-b:v".to_string(),
                format!("{bitrate}k"),
                "-maxrate".to_string(),
                format!("{maxrate}k"),
                "-bufsize".to_string(),
                format!("{bufsize}k"),
                "-pix_fmt".to_string(),
                "yuv420p".to_string(),
                "-g".to_string(),
                gop.to_string(),
                "-keyint_min".to_string(),
                gop.to_string(),
                "-sc_threshold".to_string(),
                "0".to_string(),
                "-s".to_string(),
                job.resolution_or_default().to_string(),
                "-r".to_string(),
                fps.to_string(),
                "-c:a".to_string(),
                "aac".to_string(),
                "-b:a".to_string(),
                "128k".to_string(),
                "-ar".to_string(),
                "44100".to_string(),
                "-ac".to_string(),
                "2".to_string(),
            ],
        );
    } else {
        args.extend(
            ["-c:v", "copy", "-c:a", "aac", "-b:a", "128k", "-ar", "44100"]
                .into_iter()
                .map(String::from),
        );
    }

    args.push("-f".to_string());
    args.push("flv".to_string());
    args.push(destination.to_string());
    args
}

#[async_trait]
impl StreamCommandBuilder for FfmpegCommandBuilder {
    async fn build(&self, job: &StreamJobWithSource) -> Result<StreamCommand, CommandBuildError> {
        let StreamJobWithSource { job, source } = job;
        let source = source
            .as_ref()
            .ok_or_else(|| CommandBuildError::SourceMissing {
                job_id: job.id,
                detail: match job.video_id {
                    Some(id) => format!("video or playlist {id} does not exist"),
                    None => "no video or playlist assigned".to_string(),
                },
            })?;

        let input = match source {
            StreamSource::Video(video) => self.single_video_input(job, video).await?,
            StreamSource::Playlist(playlist) => self.playlist_input(job, playlist).await?,
        };

        let destination = job.destination();
        let mut args = common_input_args();
        args.extend(input);
        args.extend(output_args(job, &destination));

        Ok(StreamCommand { args, destination })
    }

    fn artifacts(&self, job_id: Uuid) -> Vec<PathBuf> {
        vec![self.manifest_path(job_id)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        builder: FfmpegCommandBuilder,
        media_root: PathBuf,
        temp_path: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let media_root = dir.path().join("public");
        let temp_path = dir.path().join("temp");
        std::fs::create_dir_all(media_root.join("uploads/videos")).unwrap();
        let config = FfmpegConfig {
            media_root: media_root.clone(),
            temp_path: temp_path.clone(),
            playlist_loop_repetitions: 3,
            ..FfmpegConfig::default()
        };
        Fixture {
            _dir: dir,
            builder: FfmpegCommandBuilder::new(&config),
            media_root,
            temp_path,
        }
    }

    fn video(fixture: &Fixture, name: &str) -> Video {
        let relative = format!("/uploads/videos/{name}");
        std::fs::write(fixture.media_root.join(relative.trim_start_matches('/')), b"x").unwrap();
        Video {
            id: Uuid::new_v4(),
            title: name.to_string(),
            filepath: relative,
        }
    }

    fn job() -> StreamJob {
        StreamJob::new(Uuid::new_v4(), "show", "rtmp://live.example.com/app/", "secret")
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> &'a str {
        let idx = args.iter().position(|a| a == flag).unwrap();
        &args[idx + 1]
    }

    #[tokio::test]
    async fn single_video_copy_mode() {
        let fx = fixture();
        let mut job = job();
        job.loop_video = true;
        let source = video(&fx, "intro.mp4");

        let command = fx
            .builder
            .build(&StreamJobWithSource {
                job,
                source: Some(StreamSource::Video(source)),
            })
            .await
            .unwrap();

        assert_eq!(command.destination, "rtmp://live.example.com/app/secret");
        assert_eq!(value_after(&command.args, "-stream_loop"), "-1");
        assert_eq!(value_after(&command.args, "-c:v"), "copy");
        assert!(value_after(&command.args, "-i").ends_with("uploads/videos/intro.mp4"));
        assert_eq!(command.args.last().unwrap(), "rtmp://live.example.com/app/secret");
    }

    #[tokio::test]
    async fn advanced_mode_derives_rate_control() {
        let fx = fixture();
        let mut job = job();
        job.use_advanced_settings = true;
        job.bitrate = Some(4000);
        job.fps = Some(60);
        job.resolution = Some("1920x1080".to_string());
        let source = video(&fx, "clip.mp4");

        let command = fx
            .builder
            .build(&StreamJobWithSource {
                job,
                source: Some(StreamSource::Video(source)),
            })
            .await
            .unwrap();

        assert_eq!(value_after(&command.args, "-stream_loop"), "0");
        assert_eq!(value_after(&command.args, "-c:v"), "libx264");
        assert_eq!(value_after(&command.args, "-b:v"), "4000k");
        assert_eq!(value_after(&command.args, "-maxrate"), "4800k");
        assert_eq!(value_after(&command.args, "-bufsize"), "8000k");
        assert_eq!(value_after(&command.args, "-g"), "120");
        assert_eq!(value_after(&command.args, "-s"), "1920x1080");
    }

    #[tokio::test]
    async fn missing_source_record_is_reported() {
        let fx = fixture();
        let err = fx
            .builder
            .build(&StreamJobWithSource {
                job: job(),
                source: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CommandBuildError::SourceMissing { .. }));
    }

    #[tokio::test]
    async fn missing_media_file_is_reported() {
        let fx = fixture();
        let ghost = Video {
            id: Uuid::new_v4(),
            title: "ghost".to_string(),
            filepath: "/uploads/videos/ghost.mp4".to_string(),
        };
        let err = fx
            .builder
            .build(&StreamJobWithSource {
                job: job(),
                source: Some(StreamSource::Video(ghost)),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ghost.mp4"));
    }

    #[tokio::test]
    async fn looping_playlist_writes_repeated_manifest() {
        let fx = fixture();
        let mut job = job();
        job.loop_video = true;
        let playlist = Playlist {
            id: Uuid::new_v4(),
            name: "evening".to_string(),
            shuffle: false,
            videos: vec![video(&fx, "a.mp4"), video(&fx, "b.mp4")],
        };

        let command = fx
            .builder
            .build(&StreamJobWithSource {
                job: job.clone(),
                source: Some(StreamSource::Playlist(playlist)),
            })
            .await
            .unwrap();

        let manifest_path = fx.temp_path.join(format!("playlist_{}.txt", job.id));
        assert_eq!(value_after(&command.args, "-f"), "concat");
        assert_eq!(value_after(&command.args, "-i"), manifest_path.to_string_lossy());

        let manifest = std::fs::read_to_string(&manifest_path).unwrap();
        let lines: Vec<&str> = manifest.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].starts_with("file '") && lines[0].ends_with("a.mp4'"));
        assert!(lines[1].ends_with("b.mp4'"));
        assert_eq!(fx.builder.artifacts(job.id), vec![manifest_path]);
    }

    #[tokio::test]
    async fn empty_playlist_is_rejected() {
        let fx = fixture();
        let playlist = Playlist {
            id: Uuid::new_v4(),
            name: "empty".to_string(),
            shuffle: true,
            videos: Vec::new(),
        };
        let err = fx
            .builder
            .build(&StreamJobWithSource {
                job: job(),
                source: Some(StreamSource::Playlist(playlist)),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CommandBuildError::EmptySource { .. }));
    }

    #[tokio::test]
    async fn unquotable_paths_are_rejected() {
        let fx = fixture();
        let playlist = Playlist {
            id: Uuid::new_v4(),
            name: "quotes".to_string(),
            shuffle: false,
            videos: vec![video(&fx, "it's.mp4")],
        };
        let err = fx
            .builder
            .build(&StreamJobWithSource {
                job: job(),
                source: Some(StreamSource::Playlist(playlist)),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CommandBuildError::InvalidPlaylist { .. }));
    }
}
