//! Per-backup-root configuration.
//!
//! Lives in `<root>/.mediabackup/`:
//! - `config.json`: backup identity, endpoint and chunk size, written once
//! - `state.db`:    the SQLite catalog

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use mediabackup_catalog::{Catalog, ChunkPolicy, DEFAULT_CHUNK_SIZE};
use mediabackup_uploader::STATE_DIR_NAME;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const CONFIG_FILE: &str = "config.json";
pub const STATE_DB: &str = "state.db";
pub const DEFAULT_ENDPOINT: &str = "https://api.yourapp.com";

/// Contents of `config.json`. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupConfig {
    pub backup_id: String,
    #[serde(default)]
    pub directory_name: String,
    #[serde(default = "default_endpoint")]
    pub api_endpoint: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.into()
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

/// `bkp_` followed by 8 random hex digits.
fn generate_backup_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("bkp_{}", &hex[..8])
}

impl BackupConfig {
    pub fn chunk_policy(&self) -> ChunkPolicy {
        ChunkPolicy::new(self.chunk_size)
    }
}

/// An initialised backup root.
#[derive(Debug)]
pub struct BackupRoot {
    pub directory: PathBuf,
    pub config: BackupConfig,
    /// `true` if this call created the state directory.
    pub created: bool,
}

impl BackupRoot {
    /// Loads the configuration of `directory`, creating it on first use.
    ///
    /// `endpoint` only matters the first time; afterwards the stored value
    /// wins and a different one is ignored with a warning.
    pub fn init(directory: &Path, endpoint: Option<&str>) -> anyhow::Result<Self> {
        let directory = directory
            .canonicalize()
            .with_context(|| format!("'{}' is not a directory", directory.display()))?;
        if !directory.is_dir() {
            bail!("'{}' is not a directory", directory.display());
        }

        let state_dir = directory.join(STATE_DIR_NAME);
        let config_path = state_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: BackupConfig = serde_json::from_str(&content)
                .with_context(|| format!("failed to parse {}", config_path.display()))?;
            if let Some(requested) = endpoint
                && requested != config.api_endpoint
            {
                warn!(
                    stored = %config.api_endpoint,
                    requested,
                    "endpoint is fixed at initialisation, ignoring override"
                );
            }
            return Ok(Self {
                directory,
                config,
                created: false,
            });
        }

        std::fs::create_dir_all(&state_dir)?;
        let config = BackupConfig {
            backup_id: generate_backup_id(),
            directory_name: directory
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            api_endpoint: endpoint.unwrap_or(DEFAULT_ENDPOINT).to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        };
        let json = serde_json::to_string_pretty(&config)?;
        std::fs::write(&config_path, json)?;
        debug!(path = %config_path.display(), backup_id = %config.backup_id, "created config");

        Ok(Self {
            directory,
            config,
            created: true,
        })
    }

    pub fn state_dir(&self) -> PathBuf {
        self.directory.join(STATE_DIR_NAME)
    }

    pub fn db_path(&self) -> PathBuf {
        self.state_dir().join(STATE_DB)
    }

    /// Opens the catalog, recording the backup identity in its `meta` table
    /// on first open and checking it afterwards.
    pub fn open_catalog(&self) -> anyhow::Result<Catalog> {
        let catalog = Catalog::open(&self.db_path())
            .with_context(|| format!("failed to open {}", self.db_path().display()))?;

        match catalog.meta("backup_id")? {
            None => {
                catalog.set_meta("backup_id", &self.config.backup_id)?;
                catalog.set_meta("chunk_size", &self.config.chunk_size.to_string())?;
            }
            Some(id) if id != self.config.backup_id => {
                warn!(catalog = %id, config = %self.config.backup_id, "backup id mismatch");
            }
            Some(_) => {}
        }

        if let Some(stored) = catalog.meta("chunk_size")?
            && stored.parse::<u64>().ok() != Some(self.config.chunk_size)
        {
            warn!(
                catalog = %stored,
                config = self.config.chunk_size,
                "chunk size in config differs from the catalog, keeping the catalog's"
            );
        }

        Ok(catalog)
    }

    /// Chunk policy the catalog was populated with.
    ///
    /// `meta.chunk_size` wins over `config.json`: chunk offsets of existing
    /// records depend on it. The config value is only used for catalogs that
    /// never recorded one.
    pub fn chunk_policy(&self, catalog: &Catalog) -> anyhow::Result<ChunkPolicy> {
        match catalog.meta("chunk_size")? {
            Some(stored) => {
                let size = stored
                    .parse::<u64>()
                    .with_context(|| format!("invalid chunk_size {stored:?} in catalog"))?;
                Ok(ChunkPolicy::new(size))
            }
            None => Ok(self.config.chunk_policy()),
        }
    }
}
