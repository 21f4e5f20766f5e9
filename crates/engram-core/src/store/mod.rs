//! C1: Schema & Store
//!
//! The durable record store: SQLite schema (`migrations`), the
//! reader/writer connection pair (`sqlite::Storage`), and the error type
//! the rest of the crate's error taxonomy wraps via `#[from]`.

mod migrations;
mod sqlite;

pub use sqlite::{MemoryStats, Storage, StorageError};
