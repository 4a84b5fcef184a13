use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use rusqlite::config::DbConfig;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use time::OffsetDateTime;

use super::{require_name, schema, EntityKind, NoteStore, StoreError, StoreResult};
use crate::config::StorageOptions;
use crate::model::{NewNote, Note, NoteId, NoteUpdate, Notebook, NotebookId, OwnerId, Tag, TagId};
use crate::snippet;

const TAG_DELIMITER: &str = ",";
const NOTE_SELECT: &str = "SELECT n.id,
        n.user_id,
        n.notebook_id,
        n.title,
        n.content,
        n.snippet,
        n.created_at,
        n.updated_at,
        COALESCE((
            SELECT GROUP_CONCAT(nt.tag_id, ',')
            FROM note_tags nt
            WHERE nt.note_id = n.id
        ), '')
 FROM notes n";
const NOTEBOOK_SELECT: &str = "SELECT id, user_id, name, created_at, updated_at FROM notebooks";
const TAG_SELECT: &str = "SELECT id, user_id, name, color, created_at, updated_at FROM tags";

/// SQLite-backed store. Each call opens its own connection so the handle can
/// be shared freely across blocking tasks.
#[derive(Clone)]
pub struct SqliteStore {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
}

impl SqliteStore {
    pub fn open(path: &Path, options: &StorageOptions) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        prepare_connection(&conn, options)?;
        schema::apply(&conn)?;
        Ok(Self {
            db_path: Arc::new(path.to_path_buf()),
            options: Arc::new(options.clone()),
        })
    }

    pub fn connect(&self) -> StoreResult<Connection> {
        let conn = Connection::open(&*self.db_path)?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    fn with_connection<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    /// Write transactions take the write lock up front so concurrent field
    /// commits queue on the busy timeout instead of failing on upgrade.
    fn with_transaction<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> StoreResult<T>,
    {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

impl NoteStore for SqliteStore {
    fn list_notes(&self, owner: OwnerId) -> StoreResult<Vec<Note>> {
        self.with_connection(|conn| {
            let sql = format!(
                "{NOTE_SELECT}
                 WHERE n.user_id = ?1
                 ORDER BY n.updated_at DESC, n.rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let notes = stmt
                .query_map(params![owner.to_string()], note_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(notes)
        })
    }

    fn get_note(&self, owner: OwnerId, id: NoteId) -> StoreResult<Option<Note>> {
        self.with_connection(|conn| fetch_note(conn, owner, id))
    }

    fn create_note(&self, owner: OwnerId, note: &NewNote) -> StoreResult<Note> {
        self.with_transaction(|tx| {
            let notebook_id = resolve_notebook(tx, owner, note.notebook_id)?;
            let id = NoteId::new();
            let now = now_nanos();
            tx.execute(
                "INSERT INTO notes (id, user_id, notebook_id, title, content, snippet, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    id.to_string(),
                    owner.to_string(),
                    notebook_id.to_string(),
                    note.title.trim(),
                    note.content,
                    snippet::snippet(&note.content),
                    now
                ],
            )?;
            replace_note_tags(tx, owner, id, &note.tags)?;
            fetch_note(tx, owner, id)?.ok_or_else(|| StoreError::not_found(EntityKind::Note, id))
        })
    }

    fn update_note(&self, owner: OwnerId, id: NoteId, update: &NoteUpdate) -> StoreResult<Note> {
        self.with_transaction(|tx| {
            let touched = tx.execute(
                "UPDATE notes SET updated_at = ?1 WHERE id = ?2 AND user_id = ?3",
                params![now_nanos(), id.to_string(), owner.to_string()],
            )?;
            if touched == 0 {
                return Err(StoreError::not_found(EntityKind::Note, id));
            }
            if let Some(title) = &update.title {
                tx.execute(
                    "UPDATE notes SET title = ?1 WHERE id = ?2",
                    params![title, id.to_string()],
                )?;
            }
            if let Some(content) = &update.content {
                tx.execute(
                    "UPDATE notes SET content = ?1, snippet = ?2 WHERE id = ?3",
                    params![content, snippet::snippet(content), id.to_string()],
                )?;
            }
            if let Some(notebook_id) = update.notebook_id {
                ensure_notebook(tx, owner, notebook_id)?;
                tx.execute(
                    "UPDATE notes SET notebook_id = ?1 WHERE id = ?2",
                    params![notebook_id.to_string(), id.to_string()],
                )?;
            }
            if let Some(tags) = &update.tags {
                replace_note_tags(tx, owner, id, tags)?;
            }
            fetch_note(tx, owner, id)?.ok_or_else(|| StoreError::not_found(EntityKind::Note, id))
        })
    }

    fn delete_note(&self, owner: OwnerId, id: NoteId) -> StoreResult<()> {
        self.with_connection(|conn| {
            let deleted = conn.execute(
                "DELETE FROM notes WHERE id = ?1 AND user_id = ?2",
                params![id.to_string(), owner.to_string()],
            )?;
            if deleted == 0 {
                return Err(StoreError::not_found(EntityKind::Note, id));
            }
            Ok(())
        })
    }

    fn list_notebooks(&self, owner: OwnerId) -> StoreResult<Vec<Notebook>> {
        self.with_connection(|conn| {
            let sql = format!(
                "{NOTEBOOK_SELECT} WHERE user_id = ?1 ORDER BY created_at ASC, rowid ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let notebooks = stmt
                .query_map(params![owner.to_string()], notebook_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(notebooks)
        })
    }

    fn create_notebook(&self, owner: OwnerId, name: &str) -> StoreResult<Notebook> {
        let name = require_name(EntityKind::Notebook, name)?;
        self.with_connection(|conn| {
            let now = OffsetDateTime::now_utc();
            let notebook = Notebook {
                id: NotebookId::new(),
                owner,
                name,
                created_at: now,
                updated_at: now,
            };
            conn.execute(
                "INSERT INTO notebooks (id, user_id, name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![
                    notebook.id.to_string(),
                    owner.to_string(),
                    notebook.name,
                    to_nanos(now)
                ],
            )?;
            Ok(notebook)
        })
    }

    fn rename_notebook(
        &self,
        owner: OwnerId,
        id: NotebookId,
        name: &str,
    ) -> StoreResult<Notebook> {
        let name = require_name(EntityKind::Notebook, name)?;
        self.with_connection(|conn| {
            let updated = conn.execute(
                "UPDATE notebooks SET name = ?1, updated_at = ?2 WHERE id = ?3 AND user_id = ?4",
                params![name, now_nanos(), id.to_string(), owner.to_string()],
            )?;
            if updated == 0 {
                return Err(StoreError::not_found(EntityKind::Notebook, id));
            }
            let sql = format!("{NOTEBOOK_SELECT} WHERE id = ?1 AND user_id = ?2");
            let notebook = conn.query_row(
                &sql,
                params![id.to_string(), owner.to_string()],
                notebook_from_row,
            )?;
            Ok(notebook)
        })
    }

    fn delete_notebook(&self, owner: OwnerId, id: NotebookId) -> StoreResult<()> {
        self.with_connection(|conn| {
            let deleted = conn.execute(
                "DELETE FROM notebooks WHERE id = ?1 AND user_id = ?2",
                params![id.to_string(), owner.to_string()],
            )?;
            if deleted == 0 {
                return Err(StoreError::not_found(EntityKind::Notebook, id));
            }
            Ok(())
        })
    }

    fn list_tags(&self, owner: OwnerId) -> StoreResult<Vec<Tag>> {
        self.with_connection(|conn| {
            let sql = format!(
                "{TAG_SELECT} WHERE user_id = ?1 ORDER BY name COLLATE NOCASE ASC, rowid ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let tags = stmt
                .query_map(params![owner.to_string()], tag_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(tags)
        })
    }

    fn create_tag(&self, owner: OwnerId, name: &str, color: &str) -> StoreResult<Tag> {
        let name = require_name(EntityKind::Tag, name)?;
        self.with_connection(|conn| {
            let now = OffsetDateTime::now_utc();
            let tag = Tag {
                id: TagId::new(),
                owner,
                name,
                color: color.to_string(),
                created_at: now,
                updated_at: now,
            };
            conn.execute(
                "INSERT INTO tags (id, user_id, name, color, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![
                    tag.id.to_string(),
                    owner.to_string(),
                    tag.name,
                    tag.color,
                    to_nanos(now)
                ],
            )?;
            Ok(tag)
        })
    }

    fn update_tag(
        &self,
        owner: OwnerId,
        id: TagId,
        name: &str,
        color: Option<&str>,
    ) -> StoreResult<Tag> {
        let name = require_name(EntityKind::Tag, name)?;
        self.with_connection(|conn| {
            let updated = conn.execute(
                "UPDATE tags
                 SET name = ?1, color = COALESCE(?2, color), updated_at = ?3
                 WHERE id = ?4 AND user_id = ?5",
                params![name, color, now_nanos(), id.to_string(), owner.to_string()],
            )?;
            if updated == 0 {
                return Err(StoreError::not_found(EntityKind::Tag, id));
            }
            let sql = format!("{TAG_SELECT} WHERE id = ?1 AND user_id = ?2");
            let tag = conn.query_row(
                &sql,
                params![id.to_string(), owner.to_string()],
                tag_from_row,
            )?;
            Ok(tag)
        })
    }

    fn delete_tag(&self, owner: OwnerId, id: TagId) -> StoreResult<()> {
        self.with_connection(|conn| {
            let deleted = conn.execute(
                "DELETE FROM tags WHERE id = ?1 AND user_id = ?2",
                params![id.to_string(), owner.to_string()],
            )?;
            if deleted == 0 {
                return Err(StoreError::not_found(EntityKind::Tag, id));
            }
            Ok(())
        })
    }

    fn add_tag_to_note(&self, owner: OwnerId, note: NoteId, tag: TagId) -> StoreResult<()> {
        self.with_transaction(|tx| {
            ensure_note(tx, owner, note)?;
            ensure_tag(tx, owner, tag)?;
            tx.execute(
                "INSERT OR IGNORE INTO note_tags (note_id, tag_id) VALUES (?1, ?2)",
                params![note.to_string(), tag.to_string()],
            )?;
            Ok(())
        })
    }

    fn remove_tag_from_note(&self, owner: OwnerId, note: NoteId, tag: TagId) -> StoreResult<()> {
        self.with_transaction(|tx| {
            ensure_note(tx, owner, note)?;
            ensure_tag(tx, owner, tag)?;
            tx.execute(
                "DELETE FROM note_tags WHERE note_id = ?1 AND tag_id = ?2",
                params![note.to_string(), tag.to_string()],
            )?;
            Ok(())
        })
    }
}

fn fetch_note(conn: &Connection, owner: OwnerId, id: NoteId) -> StoreResult<Option<Note>> {
    let sql = format!("{NOTE_SELECT} WHERE n.id = ?1 AND n.user_id = ?2");
    let note = conn
        .query_row(&sql, params![id.to_string(), owner.to_string()], note_from_row)
        .optional()?;
    Ok(note)
}

fn resolve_notebook(
    conn: &Connection,
    owner: OwnerId,
    requested: Option<NotebookId>,
) -> StoreResult<NotebookId> {
    if let Some(id) = requested {
        ensure_notebook(conn, owner, id)?;
        return Ok(id);
    }
    conn.query_row(
        "SELECT id FROM notebooks WHERE user_id = ?1 ORDER BY created_at ASC, rowid ASC LIMIT 1",
        params![owner.to_string()],
        |row| parse_column::<NotebookId>(row, 0),
    )
    .optional()?
    .ok_or(StoreError::NotebookRequired)
}

fn row_exists(conn: &Connection, table: &str, owner: OwnerId, id: String) -> StoreResult<bool> {
    let sql = format!("SELECT 1 FROM {table} WHERE id = ?1 AND user_id = ?2");
    let exists = conn
        .query_row(&sql, params![id, owner.to_string()], |_row| Ok(()))
        .optional()?
        .is_some();
    Ok(exists)
}

fn ensure_note(conn: &Connection, owner: OwnerId, id: NoteId) -> StoreResult<()> {
    if !row_exists(conn, "notes", owner, id.to_string())? {
        return Err(StoreError::not_found(EntityKind::Note, id));
    }
    Ok(())
}

fn ensure_notebook(conn: &Connection, owner: OwnerId, id: NotebookId) -> StoreResult<()> {
    if !row_exists(conn, "notebooks", owner, id.to_string())? {
        return Err(StoreError::not_found(EntityKind::Notebook, id));
    }
    Ok(())
}

fn ensure_tag(conn: &Connection, owner: OwnerId, id: TagId) -> StoreResult<()> {
    if !row_exists(conn, "tags", owner, id.to_string())? {
        return Err(StoreError::not_found(EntityKind::Tag, id));
    }
    Ok(())
}

fn replace_note_tags(
    conn: &Connection,
    owner: OwnerId,
    note: NoteId,
    tags: &BTreeSet<TagId>,
) -> StoreResult<()> {
    for tag in tags {
        ensure_tag(conn, owner, *tag)?;
    }
    conn.execute(
        "DELETE FROM note_tags WHERE note_id = ?1",
        params![note.to_string()],
    )?;
    let mut insert = conn.prepare("INSERT INTO note_tags (note_id, tag_id) VALUES (?1, ?2)")?;
    for tag in tags {
        insert.execute(params![note.to_string(), tag.to_string()])?;
    }
    Ok(())
}

fn note_from_row(row: &Row<'_>) -> rusqlite::Result<Note> {
    let tags: String = row.get(8)?;
    Ok(Note {
        id: parse_column(row, 0)?,
        owner: parse_column(row, 1)?,
        notebook_id: parse_column(row, 2)?,
        title: row.get(3)?,
        content: row.get(4)?,
        snippet: row.get(5)?,
        created_at: timestamp_column(row, 6)?,
        updated_at: timestamp_column(row, 7)?,
        tags: parse_tags(&tags)?,
    })
}

fn notebook_from_row(row: &Row<'_>) -> rusqlite::Result<Notebook> {
    Ok(Notebook {
        id: parse_column(row, 0)?,
        owner: parse_column(row, 1)?,
        name: row.get(2)?,
        created_at: timestamp_column(row, 3)?,
        updated_at: timestamp_column(row, 4)?,
    })
}

fn tag_from_row(row: &Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: parse_column(row, 0)?,
        owner: parse_column(row, 1)?,
        name: row.get(2)?,
        color: row.get(3)?,
        created_at: timestamp_column(row, 4)?,
        updated_at: timestamp_column(row, 5)?,
    })
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    let nanos: i64 = row.get(idx)?;
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(err)))
}

fn parse_tags(raw: &str) -> rusqlite::Result<BTreeSet<TagId>> {
    raw.split(TAG_DELIMITER)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse::<TagId>()
                .map_err(|err| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(err)))
        })
        .collect()
}

fn to_nanos(ts: OffsetDateTime) -> i64 {
    ts.unix_timestamp_nanos() as i64
}

fn now_nanos() -> i64 {
    to_nanos(OffsetDateTime::now_utc())
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> StoreResult<()> {
    conn.set_db_config(DbConfig::SQLITE_DBCONFIG_ENABLE_FKEY, true)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn init_store() -> anyhow::Result<(TempDir, SqliteStore)> {
        let temp = TempDir::new()?;
        let path = temp.path().join("notes.db");
        let store = SqliteStore::open(&path, &StorageOptions::default())?;
        Ok((temp, store))
    }

    #[test]
    fn notebooks_are_owner_scoped_and_ordered_by_creation() -> anyhow::Result<()> {
        let (_temp, store) = init_store()?;
        let owner = OwnerId::new();
        let stranger = OwnerId::new();
        let first = store.create_notebook(owner, "Work")?;
        store.create_notebook(stranger, "Elsewhere")?;
        let second = store.create_notebook(owner, "Home")?;

        let listed = store.list_notebooks(owner)?;
        let ids: Vec<_> = listed.iter().map(|nb| nb.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
        assert!(listed.iter().all(|nb| nb.owner == owner));
        Ok(())
    }

    #[test]
    fn content_update_recomputes_snippet() -> anyhow::Result<()> {
        let (_temp, store) = init_store()?;
        let owner = OwnerId::new();
        let work = store.create_notebook(owner, "Work")?;
        let draft = store.create_note(owner, &NewNote::titled("Draft").in_notebook(work.id))?;
        assert_eq!(draft.snippet, snippet::EMPTY_SNIPPET);
        assert!(draft.tags.is_empty());

        let update = NoteUpdate {
            content: Some("<p>Hello <b>world</b></p>".into()),
            ..NoteUpdate::default()
        };
        let updated = store.update_note(owner, draft.id, &update)?;
        assert_eq!(updated.snippet, "Hello world");
        assert_eq!(updated.title, "Draft");
        assert!(updated.updated_at >= draft.updated_at);
        Ok(())
    }

    #[test]
    fn note_without_notebook_lands_in_first_notebook() -> anyhow::Result<()> {
        let (_temp, store) = init_store()?;
        let owner = OwnerId::new();
        let err = store.create_note(owner, &NewNote::titled("Orphan")).unwrap_err();
        assert_matches!(err, StoreError::NotebookRequired);

        let first = store.create_notebook(owner, "Inbox")?;
        store.create_notebook(owner, "Later")?;
        let note = store.create_note(owner, &NewNote::titled("Placed"))?;
        assert_eq!(note.notebook_id, first.id);
        Ok(())
    }

    #[test]
    fn tag_set_round_trips_regardless_of_order() -> anyhow::Result<()> {
        let (_temp, store) = init_store()?;
        let owner = OwnerId::new();
        store.create_notebook(owner, "Work")?;
        let a = store.create_tag(owner, "alpha", "#3b82f6")?;
        let b = store.create_tag(owner, "beta", "#ef4444")?;
        let note = store.create_note(owner, &NewNote::titled("Tagged").with_tags([b.id, a.id]))?;
        assert_eq!(note.tags, BTreeSet::from([a.id, b.id]));

        let fetched = store.get_note(owner, note.id)?.expect("note present");
        assert_eq!(fetched.tags, BTreeSet::from([a.id, b.id]));

        store.add_tag_to_note(owner, note.id, a.id)?;
        let fetched = store.get_note(owner, note.id)?.expect("note present");
        assert_eq!(fetched.tags.len(), 2);

        store.remove_tag_from_note(owner, note.id, a.id)?;
        let fetched = store.get_note(owner, note.id)?.expect("note present");
        assert_eq!(fetched.tags, BTreeSet::from([b.id]));
        Ok(())
    }

    #[test]
    fn deleting_notebook_keeps_its_notes() -> anyhow::Result<()> {
        let (_temp, store) = init_store()?;
        let owner = OwnerId::new();
        let work = store.create_notebook(owner, "Work")?;
        let note = store.create_note(owner, &NewNote::titled("Keep me").in_notebook(work.id))?;

        store.delete_notebook(owner, work.id)?;
        assert!(store.list_notebooks(owner)?.is_empty());
        let kept = store.get_note(owner, note.id)?.expect("note survives");
        assert_eq!(kept.notebook_id, work.id);
        Ok(())
    }

    #[test]
    fn deleting_tag_cascades_associations() -> anyhow::Result<()> {
        let (_temp, store) = init_store()?;
        let owner = OwnerId::new();
        store.create_notebook(owner, "Work")?;
        let tag = store.create_tag(owner, "urgent", "#f97316")?;
        let note = store.create_note(owner, &NewNote::titled("Tagged"))?;
        store.update_note(
            owner,
            note.id,
            &NoteUpdate {
                tags: Some(BTreeSet::from([tag.id])),
                ..NoteUpdate::default()
            },
        )?;

        store.delete_tag(owner, tag.id)?;
        let fetched = store.get_note(owner, note.id)?.expect("note present");
        assert!(fetched.tags.is_empty());
        assert!(store.list_tags(owner)?.is_empty());
        Ok(())
    }

    #[test]
    fn other_owners_rows_are_invisible() -> anyhow::Result<()> {
        let (_temp, store) = init_store()?;
        let owner = OwnerId::new();
        let intruder = OwnerId::new();
        store.create_notebook(owner, "Private")?;
        let note = store.create_note(owner, &NewNote::titled("Secret"))?;

        assert!(store.list_notes(intruder)?.is_empty());
        assert!(store.get_note(intruder, note.id)?.is_none());
        let err = store
            .update_note(
                intruder,
                note.id,
                &NoteUpdate {
                    title: Some("pwned".into()),
                    ..NoteUpdate::default()
                },
            )
            .unwrap_err();
        assert_matches!(err, StoreError::NotFound { entity: EntityKind::Note, .. });
        assert_matches!(
            store.delete_note(intruder, note.id),
            Err(StoreError::NotFound { .. })
        );
        Ok(())
    }

    #[test]
    fn foreign_tags_are_rejected_on_update() -> anyhow::Result<()> {
        let (_temp, store) = init_store()?;
        let owner = OwnerId::new();
        let other = OwnerId::new();
        store.create_notebook(owner, "Work")?;
        let foreign = store.create_tag(other, "theirs", "#000000")?;
        let note = store.create_note(owner, &NewNote::titled("Mine"))?;

        let err = store
            .update_note(
                owner,
                note.id,
                &NoteUpdate {
                    tags: Some(BTreeSet::from([foreign.id])),
                    ..NoteUpdate::default()
                },
            )
            .unwrap_err();
        assert_matches!(err, StoreError::NotFound { entity: EntityKind::Tag, .. });
        assert!(store.get_note(owner, note.id)?.expect("note").tags.is_empty());
        Ok(())
    }

    #[test]
    fn update_tag_keeps_color_when_not_supplied() -> anyhow::Result<()> {
        let (_temp, store) = init_store()?;
        let owner = OwnerId::new();
        let tag = store.create_tag(owner, "alpha", "#3b82f6")?;

        let renamed = store.update_tag(owner, tag.id, "beta", None)?;
        assert_eq!(renamed.name, "beta");
        assert_eq!(renamed.color, "#3b82f6");

        let recolored = store.update_tag(owner, tag.id, "beta", Some("#22c55e"))?;
        assert_eq!(recolored.color, "#22c55e");
        Ok(())
    }

    #[test]
    fn blank_names_are_rejected() -> anyhow::Result<()> {
        let (_temp, store) = init_store()?;
        let owner = OwnerId::new();
        assert_matches!(store.create_notebook(owner, "   "), Err(StoreError::Invalid(_)));
        assert_matches!(store.create_tag(owner, "", "#fff"), Err(StoreError::Invalid(_)));
        Ok(())
    }

    #[test]
    fn notes_list_newest_update_first() -> anyhow::Result<()> {
        let (_temp, store) = init_store()?;
        let owner = OwnerId::new();
        store.create_notebook(owner, "Work")?;
        let older = store.create_note(owner, &NewNote::titled("Older"))?;
        let newer = store.create_note(owner, &NewNote::titled("Newer"))?;

        let ids: Vec<_> = store.list_notes(owner)?.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);

        store.update_note(
            owner,
            older.id,
            &NoteUpdate {
                title: Some("Older, edited".into()),
                ..NoteUpdate::default()
            },
        )?;
        let ids: Vec<_> = store.list_notes(owner)?.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![older.id, newer.id]);
        Ok(())
    }
}
