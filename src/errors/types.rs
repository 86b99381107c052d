//! Error type definitions for the stream lifecycle manager
//!
//! `StreamError` is the taxonomy every lifecycle operation reports in; the
//! narrower enums describe failures of the collaborators it drives (command
//! construction and the job store).

use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by lifecycle operations (start, stop, scheduling, reconciliation)
#[derive(Error, Debug)]
pub enum StreamError {
    /// The job (or a resource it references) does not exist in the store
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// A process is already tracked for this job
    #[error("Stream {0} is already active")]
    AlreadyActive(Uuid),

    /// A stop was requested for a job with no process and no live record
    #[error("Stream {0} is not active")]
    NotActive(Uuid),

    /// The command builder could not produce a command
    #[error("Failed to build stream command: {0}")]
    Build(#[from] CommandBuildError),

    /// The operating system refused to start the process
    #[error("Failed to spawn stream process: {0}")]
    Spawn(#[source] std::io::Error),

    /// The process exited in a way that warrants a retry
    #[error("Stream process crashed (code: {code:?}, signal: {signal:?})")]
    CrashExit {
        code: Option<i32>,
        signal: Option<i32>,
    },

    /// The process exited on its own without error
    #[error("Stream process exited cleanly")]
    CleanExit,

    /// A store read or write failed
    #[error("Persistence error: {0}")]
    Persistence(#[from] RepositoryError),

    /// A tracked process whose job no longer exists
    #[error("Orphaned stream process for missing job {job_id} (pid: {pid:?})")]
    OrphanProcess { job_id: Uuid, pid: Option<u32> },

    /// Stored status disagreed with the process table
    #[error("Status drift for stream {job_id}: {detail}")]
    DriftDetected { job_id: Uuid, detail: String },

    /// Termination duration that is not a finite number of minutes
    #[error("Invalid termination duration: {0}")]
    InvalidDuration(f64),

    /// Delivering a signal to the process failed
    #[error("Failed to signal stream process {pid}: {message}")]
    Signal { pid: u32, message: String },
}

/// Failures while turning a job and its source into a command line
#[derive(Error, Debug)]
pub enum CommandBuildError {
    #[error("Source for stream {job_id} is missing: {detail}")]
    SourceMissing { job_id: Uuid, detail: String },

    #[error("Playlist {playlist_id} has no videos")]
    EmptySource { playlist_id: Uuid },

    #[error("Playlist {playlist_id} cannot be streamed: {reason}")]
    InvalidPlaylist { playlist_id: Uuid, reason: String },

    #[error("Failed to write playlist manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Repository layer specific errors
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Database errors from SeaORM
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Record not found errors
    #[error("Record not found: {table} with {field} = {value}")]
    RecordNotFound {
        table: String,
        field: String,
        value: String,
    },

    /// A stored value could not be mapped onto the domain model
    #[error("Invalid data in {table}: {message}")]
    InvalidData { table: String, message: String },

    /// The store refused the operation (used by in-process stores)
    #[error("Store unavailable: {message}")]
    Unavailable { message: String },
}

/// Result type alias for lifecycle operations
pub type StreamResult<T> = Result<T, StreamError>;

/// Result type alias for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

impl StreamError {
    pub fn job_not_found(job_id: Uuid) -> Self {
        Self::NotFound {
            resource: "stream".to_string(),
            id: job_id.to_string(),
        }
    }

    pub fn drift(job_id: Uuid, detail: impl Into<String>) -> Self {
        Self::DriftDetected {
            job_id,
            detail: detail.into(),
        }
    }
}

impl RepositoryError {
    pub fn invalid_data(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidData {
            table: table.into(),
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}
