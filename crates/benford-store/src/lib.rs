//! Durable implementations of the core persistence seams.
//!
//! - [`SqliteJobStore`]: users and jobs in a single SQLite file (WAL mode).
//! - [`FsObjectStore`]: documents and results artifacts as files under a root
//!   directory, one file per object key.

mod fs;
mod sqlite;

pub use fs::FsObjectStore;
pub use sqlite::SqliteJobStore;
