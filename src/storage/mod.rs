use std::fs;

use anyhow::{Context, Result};

use crate::config::{ConfigPaths, StorageOptions};
use crate::model::{NewNote, Note, NoteId, NoteUpdate, Notebook, NotebookId, OwnerId, Tag, TagId};

pub mod memory;
mod schema;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum EntityKind {
    Note,
    Notebook,
    Tag,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: String },
    #[error("no notebook available for the new note")]
    NotebookRequired,
    #[error("{0}")]
    Invalid(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("request interrupted: {0}")]
    Interrupted(String),
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
}

impl StoreError {
    pub fn not_found(entity: EntityKind, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Owner-scoped relational store. Every call filters on `owner`; rows of
/// other owners behave as if they did not exist.
pub trait NoteStore: Send + Sync + 'static {
    /// Notes ordered by last update, newest first.
    fn list_notes(&self, owner: OwnerId) -> StoreResult<Vec<Note>>;
    fn get_note(&self, owner: OwnerId, id: NoteId) -> StoreResult<Option<Note>>;
    fn create_note(&self, owner: OwnerId, note: &NewNote) -> StoreResult<Note>;
    /// Applies the present fields, recomputing the snippet when content
    /// changes, and returns the canonical row.
    fn update_note(&self, owner: OwnerId, id: NoteId, update: &NoteUpdate) -> StoreResult<Note>;
    fn delete_note(&self, owner: OwnerId, id: NoteId) -> StoreResult<()>;

    /// Notebooks ordered by creation time, oldest first.
    fn list_notebooks(&self, owner: OwnerId) -> StoreResult<Vec<Notebook>>;
    fn create_notebook(&self, owner: OwnerId, name: &str) -> StoreResult<Notebook>;
    fn rename_notebook(&self, owner: OwnerId, id: NotebookId, name: &str)
        -> StoreResult<Notebook>;
    /// Removes only the notebook row. Its notes keep their notebook reference.
    fn delete_notebook(&self, owner: OwnerId, id: NotebookId) -> StoreResult<()>;

    /// Tags ordered by name.
    fn list_tags(&self, owner: OwnerId) -> StoreResult<Vec<Tag>>;
    fn create_tag(&self, owner: OwnerId, name: &str, color: &str) -> StoreResult<Tag>;
    fn update_tag(
        &self,
        owner: OwnerId,
        id: TagId,
        name: &str,
        color: Option<&str>,
    ) -> StoreResult<Tag>;
    /// Removes the tag together with its note associations.
    fn delete_tag(&self, owner: OwnerId, id: TagId) -> StoreResult<()>;

    fn add_tag_to_note(&self, owner: OwnerId, note: NoteId, tag: TagId) -> StoreResult<()>;
    fn remove_tag_from_note(&self, owner: OwnerId, note: NoteId, tag: TagId) -> StoreResult<()>;
}

pub(crate) fn require_name(kind: EntityKind, name: &str) -> StoreResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(StoreError::Invalid(format!("{kind} name cannot be empty")));
    }
    Ok(trimmed.to_string())
}

pub fn init(paths: &ConfigPaths, options: &StorageOptions) -> Result<SqliteStore> {
    let db_path = &paths.database_path;
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    SqliteStore::open(db_path, options)
        .with_context(|| format!("opening note store {}", db_path.display()))
}
