//! Durable storage for wishub-skill: a SQLite-backed catalog/execution
//! store and a filesystem-backed artifact store.

pub mod fs;
pub mod sqlite;

pub use fs::FilesystemArtifactStore;
pub use sqlite::SqliteStore;
