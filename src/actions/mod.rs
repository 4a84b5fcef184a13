//! Persistence actions bound to one owner.
//!
//! Store calls are synchronous and run on the blocking pool. Mutations fail
//! with an [`ActionError`] naming the operation; reads log the cause and
//! degrade to an empty result.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::model::{NewNote, Note, NoteId, NoteUpdate, Notebook, NotebookId, OwnerId, Tag, TagId};
use crate::storage::{NoteStore, StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Verb {
    Create,
    Update,
    Delete,
    Add,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Subject {
    #[strum(serialize = "note")]
    Note,
    #[strum(serialize = "notebook")]
    Notebook,
    #[strum(serialize = "tag")]
    Tag,
    #[strum(serialize = "tag to note")]
    TagToNote,
    #[strum(serialize = "tag from note")]
    TagFromNote,
}

#[derive(Debug, thiserror::Error)]
#[error("Failed to {verb} {subject}: {source}")]
pub struct ActionError {
    pub verb: Verb,
    pub subject: Subject,
    pub source: StoreError,
}

/// Everything a session needs to render, fetched together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub notes: Vec<Note>,
    pub notebooks: Vec<Notebook>,
    pub tags: Vec<Tag>,
}

#[derive(Default)]
struct SnapshotCache {
    epoch: AtomicU64,
    slot: Mutex<Option<Snapshot>>,
}

pub struct Actions<S> {
    store: Arc<S>,
    owner: OwnerId,
    cache: Arc<SnapshotCache>,
}

impl<S> Clone for Actions<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            owner: self.owner,
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<S: NoteStore> Actions<S> {
    pub fn new(store: Arc<S>, owner: OwnerId) -> Self {
        Self {
            store,
            owner,
            cache: Arc::default(),
        }
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Cached view of the owner's collections. A read that raced with a
    /// mutation, or that failed, is returned but not cached.
    pub async fn snapshot(&self) -> Snapshot {
        let cached = self.cache.slot.lock().clone();
        if let Some(snapshot) = cached {
            return snapshot;
        }

        let epoch = self.cache.epoch.load(Ordering::SeqCst);
        let (notes, notebooks, tags) = tokio::join!(
            self.blocking(|store, owner| store.list_notes(owner)),
            self.blocking(|store, owner| store.list_notebooks(owner)),
            self.blocking(|store, owner| store.list_tags(owner)),
        );
        let complete = notes.is_ok() && notebooks.is_ok() && tags.is_ok();
        let snapshot = Snapshot {
            notes: self.degrade("notes", notes),
            notebooks: self.degrade("notebooks", notebooks),
            tags: self.degrade("tags", tags),
        };

        if complete {
            let mut slot = self.cache.slot.lock();
            if self.cache.epoch.load(Ordering::SeqCst) == epoch {
                *slot = Some(snapshot.clone());
            }
        }
        snapshot
    }

    pub fn invalidate(&self) {
        let mut slot = self.cache.slot.lock();
        self.cache.epoch.fetch_add(1, Ordering::SeqCst);
        *slot = None;
    }

    pub async fn list_notes(&self) -> Vec<Note> {
        let result = self.blocking(|store, owner| store.list_notes(owner)).await;
        self.degrade("notes", result)
    }

    pub async fn get_note(&self, id: NoteId) -> Option<Note> {
        let result = self.blocking(move |store, owner| store.get_note(owner, id)).await;
        self.degrade("note", result)
    }

    pub async fn list_notebooks(&self) -> Vec<Notebook> {
        let result = self.blocking(|store, owner| store.list_notebooks(owner)).await;
        self.degrade("notebooks", result)
    }

    pub async fn list_tags(&self) -> Vec<Tag> {
        let result = self.blocking(|store, owner| store.list_tags(owner)).await;
        self.degrade("tags", result)
    }

    pub async fn create_note(&self, note: NewNote) -> Result<Note, ActionError> {
        self.mutate(Verb::Create, Subject::Note, move |store, owner| {
            store.create_note(owner, &note)
        })
        .await
    }

    pub async fn update_note(&self, id: NoteId, update: NoteUpdate) -> Result<Note, ActionError> {
        self.mutate(Verb::Update, Subject::Note, move |store, owner| {
            store.update_note(owner, id, &update)
        })
        .await
    }

    pub async fn delete_note(&self, id: NoteId) -> Result<(), ActionError> {
        self.mutate(Verb::Delete, Subject::Note, move |store, owner| {
            store.delete_note(owner, id)
        })
        .await
    }

    pub async fn create_notebook(&self, name: String) -> Result<Notebook, ActionError> {
        self.mutate(Verb::Create, Subject::Notebook, move |store, owner| {
            store.create_notebook(owner, &name)
        })
        .await
    }

    pub async fn rename_notebook(
        &self,
        id: NotebookId,
        name: String,
    ) -> Result<Notebook, ActionError> {
        self.mutate(Verb::Update, Subject::Notebook, move |store, owner| {
            store.rename_notebook(owner, id, &name)
        })
        .await
    }

    pub async fn delete_notebook(&self, id: NotebookId) -> Result<(), ActionError> {
        self.mutate(Verb::Delete, Subject::Notebook, move |store, owner| {
            store.delete_notebook(owner, id)
        })
        .await
    }

    pub async fn create_tag(&self, name: String, color: String) -> Result<Tag, ActionError> {
        self.mutate(Verb::Create, Subject::Tag, move |store, owner| {
            store.create_tag(owner, &name, &color)
        })
        .await
    }

    pub async fn update_tag(
        &self,
        id: TagId,
        name: String,
        color: Option<String>,
    ) -> Result<Tag, ActionError> {
        self.mutate(Verb::Update, Subject::Tag, move |store, owner| {
            store.update_tag(owner, id, &name, color.as_deref())
        })
        .await
    }

    pub async fn delete_tag(&self, id: TagId) -> Result<(), ActionError> {
        self.mutate(Verb::Delete, Subject::Tag, move |store, owner| {
            store.delete_tag(owner, id)
        })
        .await
    }

    pub async fn add_tag_to_note(&self, note: NoteId, tag: TagId) -> Result<(), ActionError> {
        self.mutate(Verb::Add, Subject::TagToNote, move |store, owner| {
            store.add_tag_to_note(owner, note, tag)
        })
        .await
    }

    pub async fn remove_tag_from_note(&self, note: NoteId, tag: TagId) -> Result<(), ActionError> {
        self.mutate(Verb::Remove, Subject::TagFromNote, move |store, owner| {
            store.remove_tag_from_note(owner, note, tag)
        })
        .await
    }

    async fn mutate<T, F>(&self, verb: Verb, subject: Subject, op: F) -> Result<T, ActionError>
    where
        F: FnOnce(&S, OwnerId) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        match self.blocking(op).await {
            Ok(value) => {
                self.invalidate();
                Ok(value)
            }
            Err(source) => {
                let err = ActionError {
                    verb,
                    subject,
                    source,
                };
                tracing::warn!(owner = %self.owner, error = %err, "store mutation failed");
                Err(err)
            }
        }
    }

    async fn blocking<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce(&S, OwnerId) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let owner = self.owner;
        tokio::task::spawn_blocking(move || op(&store, owner))
            .await
            .map_err(|err| StoreError::Interrupted(err.to_string()))?
    }

    fn degrade<T: Default>(&self, what: &str, result: StoreResult<T>) -> T {
        result.unwrap_or_else(|err| {
            tracing::error!(owner = %self.owner, error = %err, "failed to fetch {what}");
            T::default()
        })
    }
}
