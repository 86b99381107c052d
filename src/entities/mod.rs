//! SeaORM entity definitions

pub mod prelude;

pub mod playlist_videos;
pub mod playlists;
pub mod stream_history;
pub mod stream_jobs;
pub mod videos;
