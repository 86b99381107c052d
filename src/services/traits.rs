//! Service layer trait definitions

use async_trait::async_trait;
use std::path::PathBuf;
use uuid::Uuid;

use crate::errors::CommandBuildError;
use crate::models::StreamJobWithSource;

/// A ready-to-spawn command line for one stream run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamCommand {
    /// Arguments passed to the streaming executable (the program itself is configured separately)
    pub args: Vec<String>,
    /// RTMP destination, kept for logging
    pub destination: String,
}

/// Turns a job and its resolved source into a command
///
/// Builders may create files (concat manifests and the like); they report
/// them through [`StreamCommandBuilder::artifacts`] so the supervisor can
/// remove them when the run is stopped.
#[async_trait]
pub trait StreamCommandBuilder: Send + Sync {
    async fn build(&self, job: &StreamJobWithSource) -> Result<StreamCommand, CommandBuildError>;

    /// Files created on behalf of `job_id` that should be removed after a stop
    fn artifacts(&self, job_id: Uuid) -> Vec<PathBuf> {
        let _ = job_id;
        Vec::new()
    }
}
