//! SeaORM repository implementations
//!
//! These implement the storage traits from `crate::repositories::traits`
//! against the entities in `crate::entities`.

pub mod stream_history;
pub mod stream_job;

pub use stream_history::StreamHistorySeaOrmRepository;
pub use stream_job::StreamJobSeaOrmRepository;
