//! Interactive session: the handlers behind the list, editor, sidebar and
//! tag selector, wired to the action layer and the autosave bridge.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::actions::{ActionError, Actions};
use crate::config::AppConfig;
use crate::journaling::AutosaveBridge;
use crate::model::{FieldValue, NewNote, Note, NoteId, Notebook, NotebookId, OwnerId, Tag, TagId};
use crate::search::ActiveFilter;
use crate::storage::NoteStore;

pub mod state;

pub use state::{
    Notification, NotificationLevel, PreImage, View, ViewState, WriteOutcome, WriteTicket,
};

pub const UNTITLED: &str = "Untitled";

pub struct Session<S> {
    actions: Actions<S>,
    state: Arc<Mutex<ViewState>>,
    autosave: AutosaveBridge<S>,
    default_tag_color: String,
}

impl<S: NoteStore> Session<S> {
    pub fn new(store: Arc<S>, owner: OwnerId, config: &AppConfig) -> Self {
        let actions = Actions::new(store, owner);
        let state = Arc::new(Mutex::new(ViewState::new()));
        let autosave =
            AutosaveBridge::new(actions.clone(), Arc::clone(&state), config.autosave.clone());
        Self {
            actions,
            state,
            autosave,
            default_tag_color: config.tags.default_color.clone(),
        }
    }

    /// Locks the view state. Do not hold the guard across an await.
    pub fn state(&self) -> MutexGuard<'_, ViewState> {
        self.state.lock()
    }

    pub fn actions(&self) -> &Actions<S> {
        &self.actions
    }

    pub fn autosave(&self) -> &AutosaveBridge<S> {
        &self.autosave
    }

    pub fn visible_notes(&self) -> Vec<Note> {
        self.state.lock().visible_notes().into_iter().cloned().collect()
    }

    pub async fn load(&self) {
        let snapshot = self.actions.snapshot().await;
        self.state.lock().load(snapshot);
    }

    pub async fn refresh(&self) {
        self.actions.invalidate();
        self.load().await;
    }

    /// Creates a note in the filtered notebook (or the first one), selects it
    /// and opens the editor. A blank title becomes "Untitled".
    pub async fn create_note(&self, title: Option<&str>) -> Result<Note, ActionError> {
        let title = title
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or(UNTITLED);
        let mut new_note = NewNote::titled(title);
        if let ActiveFilter::Notebook(notebook_id) = self.state.lock().filter() {
            new_note = new_note.in_notebook(notebook_id);
        }

        let note = self
            .actions
            .create_note(new_note)
            .await
            .map_err(|err| self.report(err))?;
        self.leave_selected().await;
        {
            let mut state = self.state.lock();
            state.upsert_note(note.clone());
            state.select_note(note.id);
        }
        Ok(note)
    }

    pub async fn delete_note(&self, id: NoteId) -> Result<(), ActionError> {
        let discarded = self.autosave.discard_note(id);
        if !discarded.is_empty() {
            tracing::debug!(
                note_id = %id,
                fields = ?discarded,
                "dropped unsaved edits of deleted note"
            );
        }
        let pre_image = self.state.lock().remove_note(id);
        match self.actions.delete_note(id).await {
            Ok(()) => {
                self.state.lock().forget_note(id);
                Ok(())
            }
            Err(err) => {
                if let Some(pre_image) = pre_image {
                    self.state.lock().restore(pre_image);
                    tracing::warn!(note_id = %id, "restored note after failed delete");
                }
                Err(self.report(err))
            }
        }
    }

    pub async fn select_note(&self, id: NoteId) -> bool {
        let current = self.state.lock().selected_note_id();
        if let Some(previous) = current.filter(|previous| *previous != id) {
            self.autosave.leave_note(previous).await;
        }
        self.state.lock().select_note(id)
    }

    pub async fn back_to_list(&self) {
        self.leave_selected().await;
        self.state.lock().back_to_list();
    }

    pub async fn set_filter(&self, filter: ActiveFilter) {
        let previous = self.state.lock().selected_note_id();
        self.state.lock().set_filter(filter);
        self.leave_if_moved(previous).await;
    }

    pub async fn set_search_query(&self, query: &str) {
        let previous = self.state.lock().selected_note_id();
        self.state.lock().set_search_query(query);
        self.leave_if_moved(previous).await;
    }

    pub fn edit_title(&self, id: NoteId, title: &str) -> bool {
        self.autosave.edit(id, FieldValue::Title(title.to_string()))
    }

    pub fn edit_content(&self, id: NoteId, content: &str) -> bool {
        self.autosave.edit(id, FieldValue::Content(content.to_string()))
    }

    pub fn edit_tags(&self, id: NoteId, tags: BTreeSet<TagId>) -> bool {
        self.autosave.edit(id, FieldValue::Tags(tags))
    }

    /// Writes every open autosave window now.
    pub async fn flush(&self) -> Vec<WriteOutcome> {
        self.autosave.flush_all().await
    }

    pub async fn attach_tag(&self, note: NoteId, tag: TagId) -> Result<(), ActionError> {
        self.actions
            .add_tag_to_note(note, tag)
            .await
            .map_err(|err| self.report(err))?;
        self.reload_note(note).await;
        Ok(())
    }

    pub async fn detach_tag(&self, note: NoteId, tag: TagId) -> Result<(), ActionError> {
        self.actions
            .remove_tag_from_note(note, tag)
            .await
            .map_err(|err| self.report(err))?;
        self.reload_note(note).await;
        Ok(())
    }

    /// Blank names are ignored without a remote call.
    pub async fn create_notebook(&self, name: &str) -> Result<Option<Notebook>, ActionError> {
        let Some(name) = non_blank(name) else {
            return Ok(None);
        };
        let notebook = self
            .actions
            .create_notebook(name)
            .await
            .map_err(|err| self.report(err))?;
        self.state.lock().upsert_notebook(notebook.clone());
        Ok(Some(notebook))
    }

    pub async fn rename_notebook(
        &self,
        id: NotebookId,
        name: &str,
    ) -> Result<Option<Notebook>, ActionError> {
        let Some(name) = non_blank(name) else {
            return Ok(None);
        };
        let pre_image = self.state.lock().rename_notebook(id, &name);
        match self.actions.rename_notebook(id, name).await {
            Ok(notebook) => {
                self.state.lock().upsert_notebook(notebook.clone());
                Ok(Some(notebook))
            }
            Err(err) => {
                if let Some(pre_image) = pre_image {
                    self.state.lock().restore(pre_image);
                }
                Err(self.report(err))
            }
        }
    }

    /// The notebook's notes stay in place and remain listed under `all`.
    pub async fn delete_notebook(&self, id: NotebookId) -> Result<(), ActionError> {
        let previous = self.state.lock().selected_note_id();
        let pre_image = self.state.lock().remove_notebook(id);
        self.leave_if_moved(previous).await;
        match self.actions.delete_notebook(id).await {
            Ok(()) => Ok(()),
            Err(err) => {
                if let Some(pre_image) = pre_image {
                    self.state.lock().restore(pre_image);
                }
                Err(self.report(err))
            }
        }
    }

    pub async fn create_tag(
        &self,
        name: &str,
        color: Option<&str>,
    ) -> Result<Option<Tag>, ActionError> {
        let Some(name) = non_blank(name) else {
            return Ok(None);
        };
        let color = color.unwrap_or(&self.default_tag_color).to_string();
        let tag = self
            .actions
            .create_tag(name, color)
            .await
            .map_err(|err| self.report(err))?;
        self.state.lock().upsert_tag(tag.clone());
        Ok(Some(tag))
    }

    pub async fn update_tag(
        &self,
        id: TagId,
        name: &str,
        color: Option<&str>,
    ) -> Result<Option<Tag>, ActionError> {
        let Some(name) = non_blank(name) else {
            return Ok(None);
        };
        let pre_image = self.state.lock().update_tag(id, &name, color);
        match self
            .actions
            .update_tag(id, name, color.map(str::to_string))
            .await
        {
            Ok(tag) => {
                self.state.lock().upsert_tag(tag.clone());
                Ok(Some(tag))
            }
            Err(err) => {
                if let Some(pre_image) = pre_image {
                    self.state.lock().restore(pre_image);
                }
                Err(self.report(err))
            }
        }
    }

    pub async fn delete_tag(&self, id: TagId) -> Result<(), ActionError> {
        let previous = self.state.lock().selected_note_id();
        let pre_image = self.state.lock().remove_tag(id);
        self.leave_if_moved(previous).await;
        match self.actions.delete_tag(id).await {
            Ok(()) => Ok(()),
            Err(err) => {
                if let Some(pre_image) = pre_image {
                    self.state.lock().restore(pre_image);
                }
                Err(self.report(err))
            }
        }
    }

    /// Creates a tag from the tag selector and appends it to the note's tag
    /// set through the debounced tags stream.
    pub async fn create_tag_for_note(
        &self,
        note: NoteId,
        name: &str,
    ) -> Result<Option<Tag>, ActionError> {
        let Some(tag) = self.create_tag(name, None).await? else {
            return Ok(None);
        };
        let tags = self.state.lock().note(note).map(|current| {
            let mut tags = current.tags.clone();
            tags.insert(tag.id);
            tags
        });
        if let Some(tags) = tags {
            self.edit_tags(note, tags);
        }
        Ok(Some(tag))
    }

    /// Writes pending edits before the session goes away.
    pub async fn shutdown(&self) {
        let written = self.autosave.flush_all().await;
        if !written.is_empty() {
            tracing::debug!(count = written.len(), "flushed pending edits on shutdown");
        }
    }

    async fn reload_note(&self, id: NoteId) {
        if let Some(note) = self.actions.get_note(id).await {
            self.state.lock().upsert_note(note);
        }
    }

    async fn leave_selected(&self) {
        let current = self.state.lock().selected_note_id();
        if let Some(id) = current {
            self.autosave.leave_note(id).await;
        }
    }

    async fn leave_if_moved(&self, previous: Option<NoteId>) {
        let current = self.state.lock().selected_note_id();
        if let Some(previous) = previous.filter(|previous| Some(*previous) != current) {
            self.autosave.leave_note(previous).await;
        }
    }

    fn report(&self, err: ActionError) -> ActionError {
        self.state
            .lock()
            .push_notification(NotificationLevel::Error, err.to_string());
        err
    }
}

fn non_blank(name: &str) -> Option<String> {
    let trimmed = name.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NoteField;
    use crate::snippet::EMPTY_SNIPPET;
    use crate::storage::MemoryStore;
    use std::time::Duration;

    fn session() -> (Arc<MemoryStore>, Session<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let session = Session::new(Arc::clone(&store), OwnerId::new(), &AppConfig::default());
        (store, session)
    }

    fn owner(session: &Session<MemoryStore>) -> OwnerId {
        session.actions().owner()
    }

    #[tokio::test(start_paused = true)]
    async fn draft_in_work_notebook_autosaves_content() -> anyhow::Result<()> {
        let (store, session) = session();
        let work = session.create_notebook("Work").await?.expect("notebook");
        session.set_filter(ActiveFilter::Notebook(work.id)).await;
        let note = session.create_note(Some("Draft")).await?;
        assert_eq!(note.notebook_id, work.id);
        assert_eq!(note.snippet, EMPTY_SNIPPET);
        assert!(note.tags.is_empty());
        assert_eq!(session.state().selected_note_id(), Some(note.id));
        assert_eq!(session.state().view(), View::Editor);

        let mut events = session.autosave().subscribe();
        session.edit_content(note.id, "<p>Hello <b>world</b></p>");
        tokio::time::sleep(Duration::from_millis(999)).await;
        assert_eq!(store.update_calls(), 0);
        tokio::time::sleep(Duration::from_millis(2)).await;
        events.changed().await?;

        let stored = store.get_note(owner(&session), note.id)?.expect("stored");
        assert_eq!(stored.snippet, "Hello world");
        assert_eq!(session.visible_notes()[0].snippet, "Hello world");
        Ok(())
    }

    #[tokio::test]
    async fn failed_delete_restores_note_and_notifies() -> anyhow::Result<()> {
        let (store, session) = session();
        session.create_notebook("Work").await?;
        let first = session.create_note(Some("First")).await?;
        let second = session.create_note(Some("Second")).await?;
        let order_before: Vec<_> = session.visible_notes().iter().map(|n| n.id).collect();

        store.fail_writes(true);
        let err = session.delete_note(second.id).await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to delete note: "));

        let order_after: Vec<_> = session.visible_notes().iter().map(|n| n.id).collect();
        assert_eq!(order_after, order_before);
        assert_eq!(session.state().selected_note_id(), Some(second.id));
        let notes = session.state().drain_notifications();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, NotificationLevel::Error);

        store.fail_writes(false);
        session.delete_note(second.id).await?;
        assert_eq!(session.state().selected_note_id(), Some(first.id));
        assert_eq!(session.state().view(), View::List);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_keeps_pending_title_edit() -> anyhow::Result<()> {
        let (store, session) = session();
        session.create_notebook("Work").await?;
        let note = session.create_note(Some("Draft")).await?;

        let mut events = session.autosave().subscribe();
        assert!(session.edit_title(note.id, "Edited"));
        session.refresh().await;
        assert_eq!(session.state().note(note.id).expect("note").title, "Edited");
        assert!(session.autosave().has_window(note.id, NoteField::Title));

        tokio::time::sleep(Duration::from_millis(501)).await;
        events.changed().await?;
        assert_eq!(store.update_calls(), 1);
        let stored = store.get_note(owner(&session), note.id)?.expect("stored");
        assert_eq!(stored.title, "Edited");
        assert_eq!(session.state().note(note.id).expect("note").title, "Edited");
        assert!(!session.state().is_pending(note.id, NoteField::Title));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn failed_delete_drops_unsaved_edit() -> anyhow::Result<()> {
        let (store, session) = session();
        session.create_notebook("Work").await?;
        let note = session.create_note(Some("Draft")).await?;
        assert!(session.edit_title(note.id, "Edited"));

        store.fail_writes(true);
        assert!(session.delete_note(note.id).await.is_err());
        store.fail_writes(false);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(session.flush().await.is_empty());
        assert_eq!(store.update_calls(), 0);
        let state = session.state();
        let restored = state.note(note.id).expect("restored");
        assert_eq!(restored.title, "Draft");
        assert!(!state.is_pending(note.id, NoteField::Title));
        Ok(())
    }

    #[tokio::test]
    async fn blank_names_skip_the_store() -> anyhow::Result<()> {
        let (store, session) = session();
        assert!(session.create_notebook("   ").await?.is_none());
        assert!(session.create_tag("", None).await?.is_none());
        assert!(store.list_notebooks(owner(&session))?.is_empty());
        assert!(session.state().drain_notifications().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn untitled_default_and_first_notebook_fallback() -> anyhow::Result<()> {
        let (_store, session) = session();
        let inbox = session.create_notebook("Inbox").await?.expect("notebook");
        session.create_notebook("Later").await?;
        let note = session.create_note(Some("  ")).await?;
        assert_eq!(note.title, UNTITLED);
        assert_eq!(note.notebook_id, inbox.id);
        Ok(())
    }

    #[tokio::test]
    async fn deleting_notebook_orphans_notes() -> anyhow::Result<()> {
        let (_store, session) = session();
        let work = session.create_notebook("Work").await?.expect("notebook");
        let note = session.create_note(Some("Keep")).await?;
        session.set_filter(ActiveFilter::Notebook(work.id)).await;

        session.delete_notebook(work.id).await?;
        session.refresh().await;
        assert_eq!(session.state().filter(), ActiveFilter::All);
        assert_eq!(session.state().notebooks().count(), 0);
        let visible = session.visible_notes();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, note.id);
        assert_eq!(session.state().list_title(), "All Notes");
        Ok(())
    }

    #[tokio::test]
    async fn failed_rename_restores_name() -> anyhow::Result<()> {
        let (store, session) = session();
        let work = session.create_notebook("Work").await?.expect("notebook");
        store.fail_writes(true);
        let err = session.rename_notebook(work.id, "Office").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to update notebook: store unavailable: simulated outage"
        );
        assert_eq!(session.state().notebook(work.id).expect("notebook").name, "Work");
        Ok(())
    }

    #[tokio::test]
    async fn tag_created_from_selector_is_attached() -> anyhow::Result<()> {
        let (store, session) = session();
        session.create_notebook("Work").await?;
        let note = session.create_note(Some("Tagged")).await?;

        let tag = session
            .create_tag_for_note(note.id, "urgent")
            .await?
            .expect("tag");
        assert_eq!(tag.color, crate::config::DEFAULT_TAG_COLOR);
        assert!(session.state().note(note.id).expect("note").has_tag(tag.id));

        session.flush().await;
        let stored = store.get_note(owner(&session), note.id)?.expect("stored");
        assert_eq!(stored.tags, BTreeSet::from([tag.id]));

        session.set_filter(ActiveFilter::Tag(tag.id)).await;
        assert_eq!(session.state().list_title(), "#urgent");
        assert_eq!(session.visible_notes().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn attach_and_detach_round_trip() -> anyhow::Result<()> {
        let (_store, session) = session();
        session.create_notebook("Work").await?;
        let note = session.create_note(Some("Tagged")).await?;
        let tag = session.create_tag("later", Some("#22c55e")).await?.expect("tag");

        session.attach_tag(note.id, tag.id).await?;
        assert!(session.state().note(note.id).expect("note").has_tag(tag.id));
        session.detach_tag(note.id, tag.id).await?;
        assert!(!session.state().note(note.id).expect("note").has_tag(tag.id));
        Ok(())
    }

    #[tokio::test]
    async fn filter_on_unused_tag_unselects() -> anyhow::Result<()> {
        let (_store, session) = session();
        session.create_notebook("Work").await?;
        session.create_note(Some("Only")).await?;
        let tag = session.create_tag("empty", None).await?.expect("tag");

        session.set_filter(ActiveFilter::Tag(tag.id)).await;
        assert!(session.visible_notes().is_empty());
        assert_eq!(session.state().selected_note_id(), None);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn switching_notes_abandons_pending_title() -> anyhow::Result<()> {
        let (store, session) = session();
        session.create_notebook("Work").await?;
        let first = session.create_note(Some("First")).await?;
        let second = session.create_note(Some("Second")).await?;

        session.select_note(first.id).await;
        session.edit_title(first.id, "First, edited");
        session.select_note(second.id).await;
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(store.update_calls(), 0);
        assert_eq!(session.state().note(first.id).expect("note").title, "First");
        Ok(())
    }
}
