use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use time::OffsetDateTime;

use super::{require_name, EntityKind, NoteStore, StoreError, StoreResult};
use crate::model::{
    NewNote, Note, NoteId, NoteTag, NoteUpdate, Notebook, NotebookId, OwnerId, Tag, TagId,
};
use crate::snippet;

/// In-process store with the same policies as [`super::SqliteStore`], plus
/// knobs to simulate a slow or failing backend.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    latency: Mutex<Duration>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    update_calls: AtomicUsize,
}

#[derive(Default)]
struct Tables {
    notes: IndexMap<NoteId, Note>,
    notebooks: IndexMap<NotebookId, Notebook>,
    tags: IndexMap<TagId, Tag>,
    note_tags: BTreeSet<NoteTag>,
}

impl Tables {
    fn assemble(&self, note: &Note) -> Note {
        let mut note = note.clone();
        note.tags = self
            .note_tags
            .iter()
            .filter(|link| link.note_id == note.id)
            .map(|link| link.tag_id)
            .collect();
        note
    }

    fn owned_note(&self, owner: OwnerId, id: NoteId) -> StoreResult<&Note> {
        self.notes
            .get(&id)
            .filter(|note| note.owner == owner)
            .ok_or_else(|| StoreError::not_found(EntityKind::Note, id))
    }

    fn ensure_notebook(&self, owner: OwnerId, id: NotebookId) -> StoreResult<()> {
        match self.notebooks.get(&id) {
            Some(notebook) if notebook.owner == owner => Ok(()),
            _ => Err(StoreError::not_found(EntityKind::Notebook, id)),
        }
    }

    fn ensure_tag(&self, owner: OwnerId, id: TagId) -> StoreResult<()> {
        match self.tags.get(&id) {
            Some(tag) if tag.owner == owner => Ok(()),
            _ => Err(StoreError::not_found(EntityKind::Tag, id)),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps this long before touching the tables.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of `update_note` calls received, failed ones included.
    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    fn read(&self) -> StoreResult<()> {
        self.delay();
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("simulated outage".into()));
        }
        Ok(())
    }

    fn write(&self) -> StoreResult<()> {
        self.delay();
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("simulated outage".into()));
        }
        Ok(())
    }

    fn delay(&self) {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            thread::sleep(latency);
        }
    }
}

impl NoteStore for MemoryStore {
    fn list_notes(&self, owner: OwnerId) -> StoreResult<Vec<Note>> {
        self.read()?;
        let tables = self.tables.lock();
        let mut rows: Vec<(usize, Note)> = tables
            .notes
            .values()
            .enumerate()
            .filter(|(_, note)| note.owner == owner)
            .map(|(idx, note)| (idx, tables.assemble(note)))
            .collect();
        rows.sort_by(|(a_idx, a), (b_idx, b)| {
            b.updated_at.cmp(&a.updated_at).then(b_idx.cmp(a_idx))
        });
        Ok(rows.into_iter().map(|(_, note)| note).collect())
    }

    fn get_note(&self, owner: OwnerId, id: NoteId) -> StoreResult<Option<Note>> {
        self.read()?;
        let tables = self.tables.lock();
        Ok(tables
            .notes
            .get(&id)
            .filter(|note| note.owner == owner)
            .map(|note| tables.assemble(note)))
    }

    fn create_note(&self, owner: OwnerId, note: &NewNote) -> StoreResult<Note> {
        self.write()?;
        let mut tables = self.tables.lock();
        let notebook_id = match note.notebook_id {
            Some(id) => {
                tables.ensure_notebook(owner, id)?;
                id
            }
            None => tables
                .notebooks
                .values()
                .filter(|notebook| notebook.owner == owner)
                .min_by_key(|notebook| notebook.created_at)
                .map(|notebook| notebook.id)
                .ok_or(StoreError::NotebookRequired)?,
        };
        for tag in &note.tags {
            tables.ensure_tag(owner, *tag)?;
        }
        let now = OffsetDateTime::now_utc();
        let created = Note {
            id: NoteId::new(),
            owner,
            notebook_id,
            title: note.title.trim().to_string(),
            content: note.content.clone(),
            snippet: snippet::snippet(&note.content),
            tags: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        };
        tables.note_tags.extend(note.tags.iter().map(|tag_id| NoteTag {
            note_id: created.id,
            tag_id: *tag_id,
        }));
        tables.notes.insert(created.id, created.clone());
        Ok(tables.assemble(&created))
    }

    fn update_note(&self, owner: OwnerId, id: NoteId, update: &NoteUpdate) -> StoreResult<Note> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.write()?;
        let mut tables = self.tables.lock();
        let mut note = tables.owned_note(owner, id)?.clone();
        if let Some(notebook_id) = update.notebook_id {
            tables.ensure_notebook(owner, notebook_id)?;
            note.notebook_id = notebook_id;
        }
        if let Some(tags) = &update.tags {
            for tag in tags {
                tables.ensure_tag(owner, *tag)?;
            }
            tables.note_tags.retain(|link| link.note_id != id);
            tables
                .note_tags
                .extend(tags.iter().map(|tag_id| NoteTag { note_id: id, tag_id: *tag_id }));
        }
        if let Some(title) = &update.title {
            note.title = title.clone();
        }
        if let Some(content) = &update.content {
            note.snippet = snippet::snippet(content);
            note.content = content.clone();
        }
        note.updated_at = OffsetDateTime::now_utc();
        tables.notes.insert(id, note.clone());
        Ok(tables.assemble(&note))
    }

    fn delete_note(&self, owner: OwnerId, id: NoteId) -> StoreResult<()> {
        self.write()?;
        let mut tables = self.tables.lock();
        tables.owned_note(owner, id)?;
        tables.notes.shift_remove(&id);
        tables.note_tags.retain(|link| link.note_id != id);
        Ok(())
    }

    fn list_notebooks(&self, owner: OwnerId) -> StoreResult<Vec<Notebook>> {
        self.read()?;
        let tables = self.tables.lock();
        let mut notebooks: Vec<Notebook> = tables
            .notebooks
            .values()
            .filter(|notebook| notebook.owner == owner)
            .cloned()
            .collect();
        notebooks.sort_by_key(|notebook| notebook.created_at);
        Ok(notebooks)
    }

    fn create_notebook(&self, owner: OwnerId, name: &str) -> StoreResult<Notebook> {
        let name = require_name(EntityKind::Notebook, name)?;
        self.write()?;
        let now = OffsetDateTime::now_utc();
        let notebook = Notebook {
            id: NotebookId::new(),
            owner,
            name,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .lock()
            .notebooks
            .insert(notebook.id, notebook.clone());
        Ok(notebook)
    }

    fn rename_notebook(
        &self,
        owner: OwnerId,
        id: NotebookId,
        name: &str,
    ) -> StoreResult<Notebook> {
        let name = require_name(EntityKind::Notebook, name)?;
        self.write()?;
        let mut tables = self.tables.lock();
        let notebook = tables
            .notebooks
            .get_mut(&id)
            .filter(|notebook| notebook.owner == owner)
            .ok_or_else(|| StoreError::not_found(EntityKind::Notebook, id))?;
        notebook.name = name;
        notebook.updated_at = OffsetDateTime::now_utc();
        Ok(notebook.clone())
    }

    fn delete_notebook(&self, owner: OwnerId, id: NotebookId) -> StoreResult<()> {
        self.write()?;
        let mut tables = self.tables.lock();
        tables.ensure_notebook(owner, id)?;
        tables.notebooks.shift_remove(&id);
        Ok(())
    }

    fn list_tags(&self, owner: OwnerId) -> StoreResult<Vec<Tag>> {
        self.read()?;
        let tables = self.tables.lock();
        let mut tags: Vec<Tag> = tables
            .tags
            .values()
            .filter(|tag| tag.owner == owner)
            .cloned()
            .collect();
        tags.sort_by_key(|tag| tag.name.to_lowercase());
        Ok(tags)
    }

    fn create_tag(&self, owner: OwnerId, name: &str, color: &str) -> StoreResult<Tag> {
        let name = require_name(EntityKind::Tag, name)?;
        self.write()?;
        let now = OffsetDateTime::now_utc();
        let tag = Tag {
            id: TagId::new(),
            owner,
            name,
            color: color.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.tables.lock().tags.insert(tag.id, tag.clone());
        Ok(tag)
    }

    fn update_tag(
        &self,
        owner: OwnerId,
        id: TagId,
        name: &str,
        color: Option<&str>,
    ) -> StoreResult<Tag> {
        let name = require_name(EntityKind::Tag, name)?;
        self.write()?;
        let mut tables = self.tables.lock();
        let tag = tables
            .tags
            .get_mut(&id)
            .filter(|tag| tag.owner == owner)
            .ok_or_else(|| StoreError::not_found(EntityKind::Tag, id))?;
        tag.name = name;
        if let Some(color) = color {
            tag.color = color.to_string();
        }
        tag.updated_at = OffsetDateTime::now_utc();
        Ok(tag.clone())
    }

    fn delete_tag(&self, owner: OwnerId, id: TagId) -> StoreResult<()> {
        self.write()?;
        let mut tables = self.tables.lock();
        tables.ensure_tag(owner, id)?;
        tables.tags.shift_remove(&id);
        tables.note_tags.retain(|link| link.tag_id != id);
        Ok(())
    }

    fn add_tag_to_note(&self, owner: OwnerId, note: NoteId, tag: TagId) -> StoreResult<()> {
        self.write()?;
        let mut tables = self.tables.lock();
        tables.owned_note(owner, note)?;
        tables.ensure_tag(owner, tag)?;
        tables.note_tags.insert(NoteTag {
            note_id: note,
            tag_id: tag,
        });
        Ok(())
    }

    fn remove_tag_from_note(&self, owner: OwnerId, note: NoteId, tag: TagId) -> StoreResult<()> {
        self.write()?;
        let mut tables = self.tables.lock();
        tables.owned_note(owner, note)?;
        tables.ensure_tag(owner, tag)?;
        tables.note_tags.remove(&NoteTag {
            note_id: note,
            tag_id: tag,
        });
        Ok(())
    }
}
