use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::Session;
use crate::config::{ConfigLoader, ConfigPaths};
use crate::storage;

pub mod commands;

use self::commands::{NoteArgs, NoteCommand, NoteListArgs, NotebookArgs, TagArgs};

#[derive(Parser, Debug)]
#[command(
    name = "notesync",
    version,
    about = "Notebooks, tags and notes with debounced autosave"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over NOTESYNC_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over NOTESYNC_DATA)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Work with notes (default: list all notes)
    Note(NoteArgs),
    /// Manage notebooks
    Notebook(NotebookArgs),
    /// Manage tags
    Tag(TagArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;

    let paths = ConfigPaths::resolve(cli.config.clone(), cli.data_dir.clone())?;
    let loader = ConfigLoader::with_paths(paths);
    let config = loader.load_or_init()?;
    let owner = config
        .owner
        .context("config has no owner id; delete it to regenerate")?;
    let store = Arc::new(storage::init(loader.paths(), &config.storage)?);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building async runtime")?;
    let command = cli.command.unwrap_or(Commands::Note(NoteArgs {
        command: NoteCommand::List(NoteListArgs::default()),
    }));

    runtime.block_on(async move {
        let session = Session::new(store, owner, &config);
        session.load().await;
        let output = match command {
            Commands::Note(args) => commands::handle_note_command(&session, args).await,
            Commands::Notebook(args) => commands::handle_notebook_command(&session, args).await,
            Commands::Tag(args) => commands::handle_tag_command(&session, args).await,
        };
        session.shutdown().await;
        print!("{}", output?);
        Ok::<(), anyhow::Error>(())
    })
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|err| anyhow::anyhow!("{err}"))
    })
    .map(|_| ())
}
