//! Error handling for the stream lifecycle manager
//!
//! Operations surface failures as `StreamError`; the public facade folds them
//! into an `OperationResult` so callers never see a raw error or a panic.

pub mod types;

pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn build_errors_convert_into_stream_errors() {
        let playlist_id = Uuid::new_v4();
        let err: StreamError = CommandBuildError::EmptySource { playlist_id }.into();
        assert!(matches!(err, StreamError::Build(CommandBuildError::EmptySource { .. })));
        assert!(err.to_string().contains(&playlist_id.to_string()));
    }

    #[test]
    fn repository_errors_convert_into_persistence() {
        let err: StreamError = RepositoryError::unavailable("disk full").into();
        assert!(matches!(err, StreamError::Persistence(_)));
        assert_eq!(err.to_string(), "Persistence error: Store unavailable: disk full");
    }

    #[test]
    fn not_found_message_names_the_job() {
        let id = Uuid::new_v4();
        let err = StreamError::job_not_found(id);
        assert_eq!(err.to_string(), format!("Not found: stream with id {id}"));
    }
}
