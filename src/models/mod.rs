pub mod operation;
pub mod stream_history;
pub mod stream_job;

pub use operation::OperationResult;
pub use stream_history::StreamHistoryRecord;
pub use stream_job::{
    Playlist, StatusUpdateOptions, StreamJob, StreamJobWithSource, StreamSource, StreamStatus,
    Video,
};
