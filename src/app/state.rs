use std::collections::{HashMap, VecDeque};

use indexmap::IndexMap;
use strum::IntoEnumIterator;
use time::OffsetDateTime;

use crate::actions::Snapshot;
use crate::model::{FieldValue, Note, NoteField, NoteId, Notebook, NotebookId, Tag, TagId};
use crate::search::{self, ActiveFilter};

const MAX_NOTIFICATIONS: usize = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum View {
    #[default]
    List,
    Editor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub at: OffsetDateTime,
}

/// A field write in flight: the value sent and the local revision it was
/// taken from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteTicket {
    pub note_id: NoteId,
    pub revision: u64,
    pub value: FieldValue,
}

impl WriteTicket {
    pub fn field(&self) -> NoteField {
        self.value.field()
    }
}

/// What happened to a write response once it reached the view state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The response matched the latest local edit and was merged.
    Applied,
    /// A newer local edit exists; only the confirmed value moved.
    Superseded,
    /// Older than something already confirmed, or the note is gone.
    Ignored,
    /// The write failed and the confirmed value was restored.
    RolledBack,
}

#[derive(Debug, Clone)]
struct FieldEdit {
    revision: u64,
    confirmed_revision: u64,
    confirmed: FieldValue,
}

impl FieldEdit {
    fn is_pending(&self) -> bool {
        self.revision > self.confirmed_revision
    }
}

/// Captured before an optimistic change so a failed write can put things back.
#[derive(Debug, Clone)]
pub enum PreImage {
    Note {
        index: usize,
        note: Note,
        selected: Option<NoteId>,
        view: View,
    },
    Notebook {
        index: usize,
        notebook: Notebook,
        filter: ActiveFilter,
    },
    Tag {
        index: usize,
        tag: Tag,
        tagged: Vec<NoteId>,
        filter: ActiveFilter,
    },
}

#[derive(Debug, Default)]
pub struct ViewState {
    notes: IndexMap<NoteId, Note>,
    notebooks: IndexMap<NotebookId, Notebook>,
    tags: IndexMap<TagId, Tag>,
    filter: ActiveFilter,
    search_query: String,
    selected: Option<NoteId>,
    view: View,
    notifications: VecDeque<Notification>,
    field_edits: HashMap<(NoteId, NoteField), FieldEdit>,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the collections with a fresh snapshot. Filter and query
    /// survive; the cursor is re-checked against the new contents. Unsaved
    /// local edits are laid back over notes that still exist.
    pub fn load(&mut self, snapshot: Snapshot) {
        let drafts: Vec<(NoteId, FieldValue)> = self
            .field_edits
            .iter()
            .filter(|(_, edit)| edit.is_pending())
            .filter_map(|((note_id, field), _)| {
                let note = self.notes.get(note_id)?;
                Some((*note_id, note.field(*field)))
            })
            .collect();

        self.notes = snapshot.notes.into_iter().map(|n| (n.id, n)).collect();
        self.notebooks = snapshot
            .notebooks
            .into_iter()
            .map(|nb| (nb.id, nb))
            .collect();
        self.tags = snapshot.tags.into_iter().map(|t| (t.id, t)).collect();

        let notes = &self.notes;
        self.field_edits
            .retain(|(note_id, _), edit| edit.is_pending() && notes.contains_key(note_id));
        for (note_id, value) in drafts {
            let Some(note) = self.notes.get_mut(&note_id) else {
                continue;
            };
            if let Some(edit) = self.field_edits.get_mut(&(note_id, value.field())) {
                edit.confirmed = note.field(value.field());
            }
            note.set_field(value);
        }
        self.reconcile_selection();
    }

    pub fn notes(&self) -> impl Iterator<Item = &Note> {
        self.notes.values()
    }

    pub fn note(&self, id: NoteId) -> Option<&Note> {
        self.notes.get(&id)
    }

    pub fn notebooks(&self) -> impl Iterator<Item = &Notebook> {
        self.notebooks.values()
    }

    pub fn notebook(&self, id: NotebookId) -> Option<&Notebook> {
        self.notebooks.get(&id)
    }

    pub fn tags(&self) -> impl Iterator<Item = &Tag> {
        self.tags.values()
    }

    pub fn tag(&self, id: TagId) -> Option<&Tag> {
        self.tags.get(&id)
    }

    pub fn filter(&self) -> ActiveFilter {
        self.filter
    }

    pub fn search_query(&self) -> &str {
        &self.search_query
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn selected_note_id(&self) -> Option<NoteId> {
        self.selected
    }

    pub fn selected_note(&self) -> Option<&Note> {
        self.selected.and_then(|id| self.notes.get(&id))
    }

    pub fn visible_notes(&self) -> Vec<&Note> {
        search::filter_notes(self.notes.values(), &self.filter, &self.search_query)
    }

    pub fn list_title(&self) -> String {
        search::list_title(&self.filter, self.notebooks.values(), self.tags.values())
    }

    pub fn set_filter(&mut self, filter: ActiveFilter) {
        self.filter = filter;
        self.reconcile_selection();
    }

    pub fn set_search_query(&mut self, query: impl Into<String>) {
        self.search_query = query.into();
        self.reconcile_selection();
    }

    /// Opens the editor on `id`. Unknown notes leave the state untouched.
    pub fn select_note(&mut self, id: NoteId) -> bool {
        if !self.notes.contains_key(&id) {
            return false;
        }
        self.selected = Some(id);
        self.view = View::Editor;
        true
    }

    pub fn back_to_list(&mut self) {
        self.view = View::List;
    }

    /// Keeps the cursor inside the visible list: a selection that fell out
    /// moves to the first visible note, or clears when the list is empty.
    pub fn reconcile_selection(&mut self) {
        let Some(current) = self.selected else {
            return;
        };
        let visible = self.visible_notes();
        if visible.iter().any(|note| note.id == current) {
            return;
        }
        self.selected = visible.first().map(|note| note.id);
        if self.selected.is_none() {
            self.view = View::List;
        }
    }

    pub fn push_notification(&mut self, level: NotificationLevel, message: impl Into<String>) {
        if self.notifications.len() == MAX_NOTIFICATIONS {
            self.notifications.pop_front();
        }
        self.notifications.push_back(Notification {
            level,
            message: message.into(),
            at: OffsetDateTime::now_utc(),
        });
    }

    pub fn notifications(&self) -> impl Iterator<Item = &Notification> {
        self.notifications.iter()
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        self.notifications.drain(..).collect()
    }

    /// Merges a canonical note from the store. New notes go to the top of
    /// the list; fields with unconfirmed local edits keep their local value.
    pub fn upsert_note(&mut self, canonical: Note) {
        let id = canonical.id;
        match self.notes.get(&id) {
            Some(local) => {
                let merged = self.merge_pending(local, canonical);
                self.notes.insert(id, merged);
            }
            None => {
                self.notes.shift_insert(0, id, canonical);
            }
        }
        self.reconcile_selection();
    }

    pub fn upsert_notebook(&mut self, notebook: Notebook) {
        self.notebooks.insert(notebook.id, notebook);
    }

    pub fn upsert_tag(&mut self, tag: Tag) {
        self.tags.insert(tag.id, tag);
        self.tags
            .sort_by(|_, a, _, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    }

    /// Optimistically drops a note. A removed selection advances and the
    /// view returns to the list.
    pub fn remove_note(&mut self, id: NoteId) -> Option<PreImage> {
        let selected = self.selected;
        let view = self.view;
        let (index, _, note) = self.notes.shift_remove_full(&id)?;
        if selected == Some(id) {
            self.view = View::List;
        }
        self.reconcile_selection();
        Some(PreImage::Note {
            index,
            note,
            selected,
            view,
        })
    }

    /// Drops the edit ledger of a note whose delete was confirmed.
    pub fn forget_note(&mut self, id: NoteId) {
        self.field_edits.retain(|(note_id, _), _| *note_id != id);
    }

    /// Notes of the notebook stay; only the notebook and a filter on it go.
    pub fn remove_notebook(&mut self, id: NotebookId) -> Option<PreImage> {
        let filter = self.filter;
        let (index, _, notebook) = self.notebooks.shift_remove_full(&id)?;
        if self.filter == ActiveFilter::Notebook(id) {
            self.filter = ActiveFilter::All;
        }
        self.reconcile_selection();
        Some(PreImage::Notebook {
            index,
            notebook,
            filter,
        })
    }

    pub fn rename_notebook(&mut self, id: NotebookId, name: &str) -> Option<PreImage> {
        let index = self.notebooks.get_index_of(&id)?;
        let notebook = self.notebooks.get_mut(&id)?;
        let previous = notebook.clone();
        notebook.name = name.to_string();
        Some(PreImage::Notebook {
            index,
            notebook: previous,
            filter: self.filter,
        })
    }

    /// Drops the tag and strips it from every local note carrying it.
    pub fn remove_tag(&mut self, id: TagId) -> Option<PreImage> {
        let filter = self.filter;
        let (index, _, tag) = self.tags.shift_remove_full(&id)?;
        let mut tagged = Vec::new();
        for note in self.notes.values_mut() {
            if note.tags.remove(&id) {
                tagged.push(note.id);
            }
        }
        if self.filter == ActiveFilter::Tag(id) {
            self.filter = ActiveFilter::All;
        }
        self.reconcile_selection();
        Some(PreImage::Tag {
            index,
            tag,
            tagged,
            filter,
        })
    }

    pub fn update_tag(&mut self, id: TagId, name: &str, color: Option<&str>) -> Option<PreImage> {
        let index = self.tags.get_index_of(&id)?;
        let tag = self.tags.get_mut(&id)?;
        let previous = tag.clone();
        tag.name = name.to_string();
        if let Some(color) = color {
            tag.color = color.to_string();
        }
        Some(PreImage::Tag {
            index,
            tag: previous,
            tagged: Vec::new(),
            filter: self.filter,
        })
    }

    pub fn restore(&mut self, pre_image: PreImage) {
        match pre_image {
            PreImage::Note {
                index,
                note,
                selected,
                view,
            } => {
                let index = index.min(self.notes.len());
                self.notes.shift_insert(index, note.id, note);
                self.selected = selected;
                self.view = view;
            }
            PreImage::Notebook {
                index,
                notebook,
                filter,
            } => {
                let index = index.min(self.notebooks.len());
                self.notebooks.shift_insert(index, notebook.id, notebook);
                self.filter = filter;
            }
            PreImage::Tag {
                index,
                tag,
                tagged,
                filter,
            } => {
                for note_id in tagged {
                    if let Some(note) = self.notes.get_mut(&note_id) {
                        note.tags.insert(tag.id);
                    }
                }
                let index = index.min(self.tags.len());
                self.tags.shift_insert(index, tag.id, tag);
                self.filter = filter;
            }
        }
        self.reconcile_selection();
    }

    /// Applies a local field edit and returns its revision. The first edit
    /// of a field records the stored value as the rollback target.
    pub fn edit_field(&mut self, note_id: NoteId, value: FieldValue) -> Option<u64> {
        let note = self.notes.get_mut(&note_id)?;
        let field = value.field();
        let entry = self
            .field_edits
            .entry((note_id, field))
            .or_insert_with(|| FieldEdit {
                revision: 0,
                confirmed_revision: 0,
                confirmed: note.field(field),
            });
        entry.revision += 1;
        note.set_field(value);
        Some(entry.revision)
    }

    pub fn is_pending(&self, note_id: NoteId, field: NoteField) -> bool {
        self.field_edits
            .get(&(note_id, field))
            .is_some_and(FieldEdit::is_pending)
    }

    /// Snapshot of the current local value for sending. `None` when nothing
    /// is pending for the field.
    pub fn issue_write(&self, note_id: NoteId, field: NoteField) -> Option<WriteTicket> {
        let entry = self.field_edits.get(&(note_id, field))?;
        if !entry.is_pending() {
            return None;
        }
        let note = self.notes.get(&note_id)?;
        Some(WriteTicket {
            note_id,
            revision: entry.revision,
            value: note.field(field),
        })
    }

    pub fn apply_write_ok(&mut self, ticket: &WriteTicket, canonical: Note) -> WriteOutcome {
        let field = ticket.field();
        let Some(note) = self.notes.get_mut(&ticket.note_id) else {
            return WriteOutcome::Ignored;
        };
        let Some(entry) = self.field_edits.get_mut(&(ticket.note_id, field)) else {
            return WriteOutcome::Ignored;
        };
        if ticket.revision < entry.confirmed_revision {
            return WriteOutcome::Ignored;
        }
        entry.confirmed = canonical.field(field);
        entry.confirmed_revision = ticket.revision;
        // Other columns of the response may predate writes confirmed since.
        note.updated_at = note.updated_at.max(canonical.updated_at);
        if entry.is_pending() {
            WriteOutcome::Superseded
        } else {
            note.set_field(entry.confirmed.clone());
            WriteOutcome::Applied
        }
    }

    /// Restores the confirmed value unless a newer edit has been made since
    /// the ticket was issued.
    pub fn apply_write_err(&mut self, ticket: &WriteTicket) -> WriteOutcome {
        let field = ticket.field();
        let Some(note) = self.notes.get_mut(&ticket.note_id) else {
            return WriteOutcome::Ignored;
        };
        let Some(entry) = self.field_edits.get_mut(&(ticket.note_id, field)) else {
            return WriteOutcome::Ignored;
        };
        if ticket.revision != entry.revision {
            return WriteOutcome::Ignored;
        }
        note.set_field(entry.confirmed.clone());
        entry.confirmed_revision = entry.revision;
        WriteOutcome::RolledBack
    }

    /// Reverts a pending edit that will never be sent.
    pub fn abandon_field(&mut self, note_id: NoteId, field: NoteField) -> bool {
        let Some(entry) = self.field_edits.get_mut(&(note_id, field)) else {
            return false;
        };
        if !entry.is_pending() {
            return false;
        }
        let Some(note) = self.notes.get_mut(&note_id) else {
            return false;
        };
        note.set_field(entry.confirmed.clone());
        entry.confirmed_revision = entry.revision;
        true
    }

    fn merge_pending(&self, local: &Note, canonical: Note) -> Note {
        let mut merged = canonical;
        for field in NoteField::iter() {
            if self.is_pending(local.id, field) {
                merged.set_field(local.field(field));
            }
        }
        merged
    }
}
