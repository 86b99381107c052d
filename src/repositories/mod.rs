//! Job store and history sink abstractions
//!
//! The lifecycle components only ever talk to these traits; the SeaORM
//! implementations live in `crate::database::repositories`.

pub mod memory;
pub mod traits;

pub use memory::InMemoryStreamStore;
pub use traits::{StreamHistorySink, StreamJobStore};
