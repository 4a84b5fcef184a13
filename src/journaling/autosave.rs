use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::actions::Actions;
use crate::app::state::{NotificationLevel, ViewState, WriteOutcome};
use crate::config::AutoSaveConfig;
use crate::model::{FieldValue, NoteField, NoteId};
use crate::storage::NoteStore;

type WindowKey = (NoteId, NoteField);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FlushKind {
    Debounced,
    Immediate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutosaveEvent {
    Saved {
        note_id: NoteId,
        field: NoteField,
        kind: FlushKind,
        outcome: WriteOutcome,
        timestamp: OffsetDateTime,
    },
    Error {
        note_id: NoteId,
        field: NoteField,
        message: String,
        rolled_back: bool,
    },
}

struct Window {
    generation: u64,
    handle: JoinHandle<()>,
}

struct Shared<S> {
    actions: Actions<S>,
    state: Arc<Mutex<ViewState>>,
    config: AutoSaveConfig,
    windows: Mutex<HashMap<WindowKey, Window>>,
    generation: AtomicU64,
    events: watch::Sender<Option<AutosaveEvent>>,
}

/// Turns keystroke-level edits into debounced writes. Each (note, field)
/// pair owns one window; an edit inside the window restarts it, and the
/// write carries whatever the field holds when the window closes.
pub struct AutosaveBridge<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for AutosaveBridge<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: NoteStore> AutosaveBridge<S> {
    pub fn new(actions: Actions<S>, state: Arc<Mutex<ViewState>>, config: AutoSaveConfig) -> Self {
        let (events, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                actions,
                state,
                config,
                windows: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
                events,
            }),
        }
    }

    pub fn config(&self) -> &AutoSaveConfig {
        &self.shared.config
    }

    /// Receives the most recent save or failure.
    pub fn subscribe(&self) -> watch::Receiver<Option<AutosaveEvent>> {
        self.shared.events.subscribe()
    }

    /// Applies the edit locally and (re)starts the field's window. Returns
    /// false when the note is not loaded.
    pub fn edit(&self, note_id: NoteId, value: FieldValue) -> bool {
        let field = value.field();
        let revision = self.shared.state.lock().edit_field(note_id, value);
        if revision.is_none() {
            return false;
        }
        self.schedule((note_id, field));
        true
    }

    pub fn pending_windows(&self) -> usize {
        self.shared.windows.lock().len()
    }

    pub fn has_window(&self, note_id: NoteId, field: NoteField) -> bool {
        self.shared.windows.lock().contains_key(&(note_id, field))
    }

    /// Drops every open window of the note without writing.
    pub fn cancel_note(&self, note_id: NoteId) -> Vec<NoteField> {
        let closed = self.take_windows(Some(note_id));
        if !closed.is_empty() {
            tracing::debug!(%note_id, count = closed.len(), "cancelled autosave windows");
        }
        closed.into_iter().map(|(_, field)| field).collect()
    }

    /// Called when the editor leaves a note. Pending edits are written at
    /// once when `save_on_switch` is set; otherwise they are discarded and
    /// the local values revert.
    pub async fn leave_note(&self, note_id: NoteId) {
        if self.shared.config.save_on_switch {
            self.flush_note(note_id).await;
            return;
        }
        let fields = self.discard_note(note_id);
        if !fields.is_empty() {
            tracing::warn!(%note_id, ?fields, "abandoned unsaved edits on navigation");
        }
    }

    /// Cancels the note's open windows and reverts their fields to the last
    /// confirmed values.
    pub fn discard_note(&self, note_id: NoteId) -> Vec<NoteField> {
        let fields = self.cancel_note(note_id);
        let mut state = self.shared.state.lock();
        for field in &fields {
            state.abandon_field(note_id, *field);
        }
        fields
    }

    /// Writes the note's open windows now instead of waiting them out.
    pub async fn flush_note(&self, note_id: NoteId) -> Vec<WriteOutcome> {
        let keys = self.take_windows(Some(note_id));
        self.commit_all(keys).await
    }

    pub async fn flush_all(&self) -> Vec<WriteOutcome> {
        let keys = self.take_windows(None);
        self.commit_all(keys).await
    }

    async fn commit_all(&self, keys: Vec<WindowKey>) -> Vec<WriteOutcome> {
        let mut outcomes = Vec::with_capacity(keys.len());
        for (note_id, field) in keys {
            if let Some(outcome) = self.shared.commit(note_id, field, FlushKind::Immediate).await {
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    fn schedule(&self, key: WindowKey) {
        let delay = self.shared.config.debounce_for(key.1);
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let shared = Arc::clone(&self.shared);

        // Holding the map while spawning keeps the timer from racing the insert.
        let mut windows = self.shared.windows.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !shared.close_window(key, generation) {
                return;
            }
            shared.commit(key.0, key.1, FlushKind::Debounced).await;
        });
        if let Some(previous) = windows.insert(key, Window { generation, handle }) {
            previous.handle.abort();
        }
        tracing::debug!(note_id = %key.0, field = %key.1, ?delay, "autosave window opened");
    }

    fn take_windows(&self, note_id: Option<NoteId>) -> Vec<WindowKey> {
        let mut windows = self.shared.windows.lock();
        let keys: Vec<WindowKey> = windows
            .keys()
            .filter(|(id, _)| note_id.map_or(true, |wanted| *id == wanted))
            .copied()
            .collect();
        for key in &keys {
            if let Some(window) = windows.remove(key) {
                window.handle.abort();
            }
        }
        keys
    }
}

impl<S: NoteStore> Shared<S> {
    /// Removes the window if it still belongs to this timer.
    fn close_window(&self, key: WindowKey, generation: u64) -> bool {
        let mut windows = self.windows.lock();
        match windows.get(&key) {
            Some(window) if window.generation == generation => {
                windows.remove(&key);
                true
            }
            _ => false,
        }
    }

    async fn commit(
        &self,
        note_id: NoteId,
        field: NoteField,
        kind: FlushKind,
    ) -> Option<WriteOutcome> {
        let ticket = self.state.lock().issue_write(note_id, field)?;
        if let FieldValue::Title(title) = &ticket.value {
            if title.trim().is_empty() {
                self.state.lock().apply_write_err(&ticket);
                tracing::debug!(%note_id, "reverted blank title");
                return None;
            }
        }

        let update = ticket.value.clone().into_update();
        match self.actions.update_note(note_id, update).await {
            Ok(canonical) => {
                let outcome = self.state.lock().apply_write_ok(&ticket, canonical);
                tracing::debug!(%note_id, %field, ?outcome, "autosaved");
                self.events.send_replace(Some(AutosaveEvent::Saved {
                    note_id,
                    field,
                    kind,
                    outcome,
                    timestamp: OffsetDateTime::now_utc(),
                }));
                Some(outcome)
            }
            Err(err) => {
                let message = err.to_string();
                let outcome = {
                    let mut state = self.state.lock();
                    state.push_notification(NotificationLevel::Error, message.clone());
                    state.apply_write_err(&ticket)
                };
                let rolled_back = outcome == WriteOutcome::RolledBack;
                tracing::warn!(%note_id, %field, rolled_back, error = %message, "autosave failed");
                self.events.send_replace(Some(AutosaveEvent::Error {
                    note_id,
                    field,
                    message,
                    rolled_back,
                }));
                Some(outcome)
            }
        }
    }
}
