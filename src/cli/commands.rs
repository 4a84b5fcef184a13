use std::fmt::Write as _;
use std::io::{self, Read};

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::app::{NotificationLevel, Session};
use crate::model::{Note, NoteId, Notebook, NotebookId, Tag, TagId};
use crate::search::ActiveFilter;
use crate::storage::NoteStore;

#[derive(Args, Debug, Clone)]
pub struct NoteArgs {
    #[command(subcommand)]
    pub command: NoteCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum NoteCommand {
    /// List notes, optionally filtered and searched
    List(NoteListArgs),
    /// Create a note. Content is read from stdin when piped
    New(NoteNewArgs),
    /// Print one note with its content
    Show(NoteIdArgs),
    /// Change a note's title or content
    Edit(NoteEditArgs),
    /// Delete a note
    Delete(NoteIdArgs),
    /// Attach a tag to a note
    Tag(NoteTagArgs),
    /// Detach a tag from a note
    Untag(NoteTagArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct NoteListArgs {
    /// all, notebook:<id> or tag:<id>
    #[arg(long, default_value = "all")]
    pub filter: ActiveFilter,
    /// Case-insensitive text matched against title and snippet
    #[arg(long)]
    pub query: Option<String>,
    /// Print the notes as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct NoteNewArgs {
    /// Title for the note ("Untitled" if omitted)
    #[arg()]
    pub title: Option<String>,
    /// Notebook to create the note in (defaults to the first notebook)
    #[arg(long)]
    pub notebook: Option<NotebookId>,
    /// Rich-text content. If omitted, reads from stdin.
    #[arg(long)]
    pub content: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct NoteIdArgs {
    /// Note identifier
    pub id: NoteId,
}

#[derive(Args, Debug, Clone)]
pub struct NoteEditArgs {
    /// Note identifier
    pub id: NoteId,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub content: Option<String>,
    /// Read the new content from stdin
    #[arg(long, conflicts_with = "content")]
    pub stdin: bool,
}

#[derive(Args, Debug, Clone)]
pub struct NoteTagArgs {
    /// Note identifier
    pub note: NoteId,
    /// Tag identifier
    pub tag: TagId,
}

#[derive(Args, Debug, Clone)]
pub struct NotebookArgs {
    #[command(subcommand)]
    pub command: NotebookCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum NotebookCommand {
    /// List notebooks, oldest first
    List,
    /// Create a notebook
    Add { name: String },
    /// Rename a notebook
    Rename { id: NotebookId, name: String },
    /// Delete a notebook. Its notes are kept
    Delete { id: NotebookId },
}

#[derive(Args, Debug, Clone)]
pub struct TagArgs {
    #[command(subcommand)]
    pub command: TagCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum TagCommand {
    /// List tags by name
    List,
    /// Create a tag
    Add {
        name: String,
        /// Hex colour, e.g. #3b82f6 (config default if omitted)
        #[arg(long)]
        color: Option<String>,
    },
    /// Rename or recolour a tag
    Rename {
        id: TagId,
        name: String,
        #[arg(long)]
        color: Option<String>,
    },
    /// Delete a tag and detach it from every note
    Delete { id: TagId },
}

pub async fn handle_note_command<S: NoteStore>(
    session: &Session<S>,
    args: NoteArgs,
) -> Result<String> {
    match args.command {
        NoteCommand::List(args) => note_list(session, args).await,
        NoteCommand::New(mut args) => {
            if args.content.is_none() {
                args.content = read_stdin()?;
            }
            note_new(session, args).await
        }
        NoteCommand::Show(args) => note_show(session, args.id),
        NoteCommand::Edit(mut args) => {
            if args.stdin {
                args.content = read_stdin()?;
            }
            note_edit(session, args).await
        }
        NoteCommand::Delete(args) => {
            session.delete_note(args.id).await?;
            Ok(format!("Deleted note {}\n", args.id))
        }
        NoteCommand::Tag(args) => {
            session.attach_tag(args.note, args.tag).await?;
            Ok(format!("Tagged note {} with {}\n", args.note, tag_label(session, args.tag)))
        }
        NoteCommand::Untag(args) => {
            session.detach_tag(args.note, args.tag).await?;
            Ok(format!("Removed {} from note {}\n", tag_label(session, args.tag), args.note))
        }
    }
}

pub async fn handle_notebook_command<S: NoteStore>(
    session: &Session<S>,
    args: NotebookArgs,
) -> Result<String> {
    match args.command {
        NotebookCommand::List => {
            let state = session.state();
            let notebooks: Vec<Notebook> = state.notebooks().cloned().collect();
            Ok(format_notebooks(&notebooks))
        }
        NotebookCommand::Add { name } => {
            let Some(notebook) = session.create_notebook(&name).await? else {
                bail!("notebook name cannot be empty");
            };
            Ok(format!("Created notebook {} ({})\n", notebook.id, notebook.name))
        }
        NotebookCommand::Rename { id, name } => {
            let Some(notebook) = session.rename_notebook(id, &name).await? else {
                bail!("notebook name cannot be empty");
            };
            Ok(format!("Renamed notebook {} to {}\n", notebook.id, notebook.name))
        }
        NotebookCommand::Delete { id } => {
            session.delete_notebook(id).await?;
            Ok(format!("Deleted notebook {id}; its notes were kept\n"))
        }
    }
}

pub async fn handle_tag_command<S: NoteStore>(
    session: &Session<S>,
    args: TagArgs,
) -> Result<String> {
    match args.command {
        TagCommand::List => {
            let state = session.state();
            let tags: Vec<Tag> = state.tags().cloned().collect();
            Ok(format_tags(&tags))
        }
        TagCommand::Add { name, color } => {
            let Some(tag) = session.create_tag(&name, color.as_deref()).await? else {
                bail!("tag name cannot be empty");
            };
            Ok(format!("Created tag {} #{} ({})\n", tag.id, tag.name, tag.color))
        }
        TagCommand::Rename { id, name, color } => {
            let Some(tag) = session.update_tag(id, &name, color.as_deref()).await? else {
                bail!("tag name cannot be empty");
            };
            Ok(format!("Updated tag {} #{} ({})\n", tag.id, tag.name, tag.color))
        }
        TagCommand::Delete { id } => {
            session.delete_tag(id).await?;
            Ok(format!("Deleted tag {id}\n"))
        }
    }
}

async fn note_list<S: NoteStore>(session: &Session<S>, args: NoteListArgs) -> Result<String> {
    session.set_filter(args.filter).await;
    session
        .set_search_query(args.query.as_deref().unwrap_or_default())
        .await;
    let notes = session.visible_notes();
    if args.json {
        let mut json = serde_json::to_string_pretty(&notes).context("serializing notes")?;
        json.push('\n');
        return Ok(json);
    }

    let state = session.state();
    let notebooks: Vec<Notebook> = state.notebooks().cloned().collect();
    let tags: Vec<Tag> = state.tags().cloned().collect();
    Ok(format_note_list(&state.list_title(), &notes, &notebooks, &tags))
}

async fn note_new<S: NoteStore>(session: &Session<S>, args: NoteNewArgs) -> Result<String> {
    if let Some(notebook) = args.notebook {
        session.set_filter(ActiveFilter::Notebook(notebook)).await;
    }
    let created = session.create_note(args.title.as_deref()).await?;
    if let Some(content) = args.content.filter(|content| !content.trim().is_empty()) {
        session.edit_content(created.id, &content);
        flush_or_fail(session).await?;
    }
    Ok(format!("Created note {} ({})\n", created.id, created.title))
}

fn note_show<S: NoteStore>(session: &Session<S>, id: NoteId) -> Result<String> {
    let state = session.state();
    let Some(note) = state.note(id) else {
        bail!("note {id} not found");
    };
    let notebooks: Vec<Notebook> = state.notebooks().cloned().collect();
    let tags: Vec<Tag> = state.tags().cloned().collect();
    Ok(format_note_detail(note, &notebooks, &tags))
}

async fn note_edit<S: NoteStore>(session: &Session<S>, args: NoteEditArgs) -> Result<String> {
    if args.title.is_none() && args.content.is_none() {
        bail!("nothing to change; pass --title, --content or --stdin");
    }
    if session.state().note(args.id).is_none() {
        bail!("note {} not found", args.id);
    }
    session.select_note(args.id).await;
    if let Some(title) = &args.title {
        let title = title.trim();
        if title.is_empty() {
            bail!("note title cannot be empty");
        }
        session.edit_title(args.id, title);
    }
    if let Some(content) = &args.content {
        session.edit_content(args.id, content);
    }
    flush_or_fail(session).await?;
    Ok(format!("Updated note {}\n", args.id))
}

/// Writes pending edits now and turns any write failure into an error.
async fn flush_or_fail<S: NoteStore>(session: &Session<S>) -> Result<()> {
    let written = session.flush().await;
    let failures: Vec<String> = session
        .state()
        .drain_notifications()
        .into_iter()
        .filter(|notification| notification.level == NotificationLevel::Error)
        .map(|notification| notification.message)
        .collect();
    if !failures.is_empty() {
        bail!(failures.join("; "));
    }
    tracing::debug!(writes = written.len(), "flushed edits");
    Ok(())
}

fn tag_label<S: NoteStore>(session: &Session<S>, id: TagId) -> String {
    session
        .state()
        .tag(id)
        .map(|tag| format!("#{}", tag.name))
        .unwrap_or_else(|| id.to_string())
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .context("reading content from stdin")?;
    Ok(Some(buf))
}

pub fn format_note_list(title: &str, notes: &[Note], notebooks: &[Notebook], tags: &[Tag]) -> String {
    let mut out = String::new();
    let _ = writeln!(&mut out, "{title} ({})", notes.len());
    if notes.is_empty() {
        out.push_str("No notes.\n");
        return out;
    }
    for note in notes {
        let _ = writeln!(&mut out, "{}  {}", note.id, note.title);
        let _ = writeln!(
            &mut out,
            "    updated {}  in {}",
            format_timestamp(note.updated_at),
            notebook_name(note.notebook_id, notebooks)
        );
        let labels = tag_labels(note, tags);
        if !labels.is_empty() {
            let _ = writeln!(&mut out, "    tags    {labels}");
        }
        let _ = writeln!(&mut out, "    {}", note.snippet);
    }
    out
}

fn format_note_detail(note: &Note, notebooks: &[Notebook], tags: &[Tag]) -> String {
    let mut out = String::new();
    let _ = writeln!(&mut out, "{}", note.title);
    let _ = writeln!(&mut out, "id       {}", note.id);
    let _ = writeln!(
        &mut out,
        "notebook {}",
        notebook_name(note.notebook_id, notebooks)
    );
    let labels = tag_labels(note, tags);
    if !labels.is_empty() {
        let _ = writeln!(&mut out, "tags     {labels}");
    }
    let _ = writeln!(&mut out, "created  {}", format_timestamp(note.created_at));
    let _ = writeln!(&mut out, "updated  {}", format_timestamp(note.updated_at));
    out.push('\n');
    if note.content.trim().is_empty() {
        let _ = writeln!(&mut out, "{}", note.snippet);
    } else {
        let _ = writeln!(&mut out, "{}", note.content);
    }
    out
}

fn format_notebooks(notebooks: &[Notebook]) -> String {
    if notebooks.is_empty() {
        return "No notebooks.\n".to_string();
    }
    let mut out = String::new();
    for notebook in notebooks {
        let _ = writeln!(&mut out, "{}  {}", notebook.id, notebook.name);
    }
    out
}

fn format_tags(tags: &[Tag]) -> String {
    if tags.is_empty() {
        return "No tags.\n".to_string();
    }
    let mut out = String::new();
    for tag in tags {
        let _ = writeln!(&mut out, "{}  #{}  {}", tag.id, tag.name, tag.color);
    }
    out
}

fn notebook_name(id: NotebookId, notebooks: &[Notebook]) -> &str {
    notebooks
        .iter()
        .find(|notebook| notebook.id == id)
        .map(|notebook| notebook.name.as_str())
        .unwrap_or("(deleted notebook)")
}

fn tag_labels(note: &Note, tags: &[Tag]) -> String {
    tags.iter()
        .filter(|tag| note.has_tag(tag.id))
        .map(|tag| format!("#{}", tag.name))
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_timestamp(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339)
        .unwrap_or_else(|_| ts.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, StorageOptions};
    use crate::model::OwnerId;
    use crate::storage::SqliteStore;
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use tempfile::TempDir;
    use time::macros::datetime;
    use uuid::Uuid;

    type TestResult<T = ()> = Result<T>;

    fn setup_session() -> TestResult<(TempDir, Session<SqliteStore>)> {
        let temp = TempDir::new().context("creating temp dir")?;
        let store = SqliteStore::open(&temp.path().join("notes.db"), &StorageOptions::default())?;
        let session = Session::new(Arc::new(store), OwnerId::new(), &AppConfig::default());
        Ok((temp, session))
    }

    fn list_args(filter: ActiveFilter, query: Option<&str>) -> NoteListArgs {
        NoteListArgs {
            filter,
            query: query.map(str::to_string),
            json: false,
        }
    }

    #[test]
    fn note_list_rendering() {
        let owner = OwnerId::new();
        let at = datetime!(2024-03-01 09:00 UTC);
        let work = Notebook {
            id: NotebookId::from_uuid(Uuid::from_u128(10)),
            owner,
            name: "Work".into(),
            created_at: at,
            updated_at: at,
        };
        let urgent = Tag {
            id: TagId::from_uuid(Uuid::from_u128(20)),
            owner,
            name: "urgent".into(),
            color: "#f97316".into(),
            created_at: at,
            updated_at: at,
        };
        let notes = vec![
            Note {
                id: NoteId::from_uuid(Uuid::from_u128(1)),
                owner,
                notebook_id: work.id,
                title: "Draft".into(),
                content: "<p>Hello <b>world</b></p>".into(),
                snippet: "Hello world".into(),
                tags: BTreeSet::from([urgent.id]),
                created_at: at,
                updated_at: at,
            },
            Note {
                id: NoteId::from_uuid(Uuid::from_u128(2)),
                owner,
                notebook_id: NotebookId::from_uuid(Uuid::from_u128(99)),
                title: "Loose".into(),
                content: String::new(),
                snippet: "No additional text".into(),
                tags: BTreeSet::new(),
                created_at: at,
                updated_at: datetime!(2024-03-02 10:30 UTC),
            },
        ];

        let output = format_note_list("Work", &notes, &[work], &[urgent]);
        insta::assert_snapshot!(output, @r###"
        Work (2)
        00000000-0000-0000-0000-000000000001  Draft
            updated 2024-03-01T09:00:00Z  in Work
            tags    #urgent
            Hello world
        00000000-0000-0000-0000-000000000002  Loose
            updated 2024-03-02T10:30:00Z  in (deleted notebook)
            No additional text
        "###);
    }

    #[tokio::test]
    async fn cli_new_note_with_content_lists_snippet() -> TestResult {
        let (_temp, session) = setup_session()?;
        let work = session.create_notebook("Work").await?.expect("notebook");
        session.create_notebook("Home").await?;

        let message = note_new(
            &session,
            NoteNewArgs {
                title: Some("Draft".into()),
                notebook: Some(work.id),
                content: Some("<p>Hello <b>world</b></p>".into()),
            },
        )
        .await?;
        assert!(message.starts_with("Created note "));

        let output = note_list(&session, list_args(ActiveFilter::Notebook(work.id), None)).await?;
        assert!(output.starts_with("Work (1)\n"));
        assert!(output.contains("Hello world"));

        let output = note_list(&session, list_args(ActiveFilter::All, Some("WORLD"))).await?;
        assert!(output.starts_with("All Notes (1)\n"));
        let output = note_list(&session, list_args(ActiveFilter::All, Some("absent"))).await?;
        assert!(output.contains("No notes."));
        Ok(())
    }

    #[tokio::test]
    async fn cli_edit_rejects_blank_title() -> TestResult {
        let (_temp, session) = setup_session()?;
        session.create_notebook("Work").await?;
        let note = session.create_note(Some("Draft")).await?;

        let err = note_edit(
            &session,
            NoteEditArgs {
                id: note.id,
                title: Some("   ".into()),
                content: None,
                stdin: false,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "note title cannot be empty");

        note_edit(
            &session,
            NoteEditArgs {
                id: note.id,
                title: Some("Renamed".into()),
                content: None,
                stdin: false,
            },
        )
        .await?;
        session.refresh().await;
        assert_eq!(session.state().note(note.id).expect("note").title, "Renamed");
        Ok(())
    }

    #[tokio::test]
    async fn cli_notebook_delete_keeps_notes() -> TestResult {
        let (_temp, session) = setup_session()?;
        let work = session.create_notebook("Work").await?.expect("notebook");
        session.create_note(Some("Keep")).await?;

        let message = handle_notebook_command(
            &session,
            NotebookArgs {
                command: NotebookCommand::Delete { id: work.id },
            },
        )
        .await?;
        assert!(message.contains("its notes were kept"));

        let listing = handle_notebook_command(
            &session,
            NotebookArgs {
                command: NotebookCommand::List,
            },
        )
        .await?;
        assert_eq!(listing, "No notebooks.\n");

        let output = note_list(&session, list_args(ActiveFilter::All, None)).await?;
        assert!(output.contains("Keep"));
        assert!(output.contains("(deleted notebook)"));
        Ok(())
    }

    #[tokio::test]
    async fn cli_json_listing_parses() -> TestResult {
        let (_temp, session) = setup_session()?;
        session.create_notebook("Work").await?;
        session.create_note(Some("One")).await?;
        session.create_note(Some("Two")).await?;

        let output = note_list(
            &session,
            NoteListArgs {
                json: true,
                ..NoteListArgs::default()
            },
        )
        .await?;
        let parsed: Vec<Note> = serde_json::from_str(&output)?;
        let titles: Vec<_> = parsed.iter().map(|note| note.title.as_str()).collect();
        assert_eq!(titles, vec!["Two", "One"]);
        Ok(())
    }

    #[tokio::test]
    async fn cli_tag_commands_round_trip() -> TestResult {
        let (_temp, session) = setup_session()?;
        session.create_notebook("Work").await?;
        let note = session.create_note(Some("Tagged")).await?;
        handle_tag_command(
            &session,
            TagArgs {
                command: TagCommand::Add {
                    name: "urgent".into(),
                    color: None,
                },
            },
        )
        .await?;
        let tag = session.state().tags().next().cloned().expect("tag");
        assert_eq!(tag.color, "#3b82f6");

        let message = handle_note_command(
            &session,
            NoteArgs {
                command: NoteCommand::Tag(NoteTagArgs {
                    note: note.id,
                    tag: tag.id,
                }),
            },
        )
        .await?;
        assert_eq!(message, format!("Tagged note {} with #urgent\n", note.id));

        let output = note_list(&session, list_args(ActiveFilter::Tag(tag.id), None)).await?;
        assert!(output.starts_with("#urgent (1)\n"));

        handle_tag_command(
            &session,
            TagArgs {
                command: TagCommand::Delete { id: tag.id },
            },
        )
        .await?;
        let output = note_list(&session, list_args(ActiveFilter::All, None)).await?;
        assert!(!output.contains("#urgent"));
        Ok(())
    }
}
