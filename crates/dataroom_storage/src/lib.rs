#![forbid(unsafe_code)]

pub mod error;
pub mod memory;
pub mod repo;
pub mod sqlite;
pub mod workflow;

pub use error::{StorageError, StorageErrorKind};
pub use memory::InMemoryDataroomStore;
pub use repo::{DataroomStore, ImageRepo, RevisionRepo};
pub use sqlite::SqliteDataroomStore;
