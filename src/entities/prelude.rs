pub use super::playlist_videos::Entity as PlaylistVideos;
pub use super::playlists::Entity as Playlists;
pub use super::stream_history::Entity as StreamHistory;
pub use super::stream_jobs::Entity as StreamJobs;
pub use super::videos::Entity as Videos;
