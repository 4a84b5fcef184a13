use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

use crate::model::{NoteField, OwnerId};

const APP_DOMAIN: &str = "io";
const APP_ORG: &str = "NotesSync";
const APP_NAME: &str = "notesync";

pub const CONFIG_ENV: &str = "NOTESYNC_CONFIG";
pub const DATA_ENV: &str = "NOTESYNC_DATA";
pub const DEFAULT_TAG_COLOR: &str = "#3b82f6";

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        let paths = ConfigPaths::discover()?;
        Ok(Self { paths })
    }

    pub fn with_paths(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    /// Loads the config, writing a default one on first run. The owner id is
    /// generated once and persisted so every later run scopes to the same rows.
    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if !self.paths.config_file.exists() {
            let cfg = AppConfig {
                owner: Some(OwnerId::new()),
                ..AppConfig::default()
            };
            self.save(&cfg)?;
            tracing::info!(path = %self.paths.config_file.display(), "wrote default config");
            return Ok(cfg);
        }

        let mut cfg = self.load()?;
        if cfg.owner.is_none() {
            cfg.owner = Some(OwnerId::new());
            self.save(&cfg)?;
            tracing::info!("generated owner id for existing config");
        }
        Ok(cfg)
    }

    pub fn load(&self) -> Result<AppConfig> {
        let raw = fs::read_to_string(&self.paths.config_file)
            .with_context(|| format!("reading config {}", self.paths.config_file.display()))?;
        let cfg: AppConfig = toml::from_str(&raw).context("parsing config toml")?;
        Ok(cfg)
    }

    pub fn save(&self, cfg: &AppConfig) -> Result<()> {
        let toml = toml::to_string_pretty(cfg).context("serializing config")?;
        if let Some(parent) = self.paths.config_file.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = fs::File::create(&self.paths.config_file)
            .with_context(|| format!("creating config {}", self.paths.config_file.display()))?;
        file.write_all(toml.as_bytes()).context("writing config")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        let override_config = env::var(CONFIG_ENV).ok().map(PathBuf::from);
        let override_data = env::var(DATA_ENV).ok().map(PathBuf::from);
        Self::resolve(override_config, override_data)
    }

    /// Explicit overrides win; anything left unset comes from the environment
    /// and then from the platform project directories.
    pub fn resolve(config: Option<PathBuf>, data: Option<PathBuf>) -> Result<Self> {
        let config = config.or_else(|| env::var(CONFIG_ENV).ok().map(PathBuf::from));
        let data = data.or_else(|| env::var(DATA_ENV).ok().map(PathBuf::from));

        let (config_dir, config_file) = match config {
            Some(path) if path.extension().is_some() || path.is_file() => {
                let dir = path
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."));
                (dir, path)
            }
            Some(dir) => {
                let file = dir.join("config.toml");
                (dir, file)
            }
            None => {
                let dirs = project_dirs()?;
                let dir = dirs.config_dir().to_path_buf();
                let file = dir.join("config.toml");
                (dir, file)
            }
        };

        let data_dir = match data {
            Some(dir) => dir,
            None => project_dirs()?.data_dir().to_path_buf(),
        };
        let database_path = data_dir.join("notes.db");

        Ok(Self {
            config_dir,
            config_file,
            data_dir,
            database_path,
        })
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.config_dir, &self.data_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME).context("resolving XDG project directories")
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Identity every row is scoped to. Generated on first run.
    pub owner: Option<OwnerId>,
    pub autosave: AutoSaveConfig,
    pub storage: StorageOptions,
    pub tags: TagOptions,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSaveConfig {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "title_debounce_ms")]
    pub title_debounce: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "content_debounce_ms")]
    pub content_debounce: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "tags_debounce_ms")]
    pub tags_debounce: Duration,
    /// Flush pending windows when the selection moves instead of dropping them.
    pub save_on_switch: bool,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            title_debounce: Duration::from_millis(500),
            content_debounce: Duration::from_millis(1000),
            tags_debounce: Duration::from_millis(500),
            save_on_switch: false,
        }
    }
}

impl AutoSaveConfig {
    pub fn debounce_for(&self, field: NoteField) -> Duration {
        match field {
            NoteField::Title => self.title_debounce,
            NoteField::Content => self.content_debounce,
            NoteField::Tags => self.tags_debounce,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    pub wal_autocheckpoint: u32,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            wal_autocheckpoint: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagOptions {
    pub default_color: String,
}

impl Default for TagOptions {
    fn default() -> Self {
        Self {
            default_color: DEFAULT_TAG_COLOR.to_string(),
        }
    }
}
