pub mod actions;
pub mod app;
pub mod cli;
pub mod config;
pub mod journaling;
pub mod model;
pub mod search;
pub mod snippet;
pub mod storage;

pub use actions::{ActionError, Actions, Snapshot};
pub use app::Session;
pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use storage::{MemoryStore, NoteStore, SqliteStore, StoreError};
