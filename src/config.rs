//! Configuration management for docimport using the prefer crate.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "docimport.db";

/// Files above this size take the chunked path (10 MiB).
pub const DEFAULT_CHUNK_THRESHOLD_BYTES: u64 = 10 * 1024 * 1024;

/// Tunables for the import pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSettings {
    /// Size above which the optimized variant switches to chunked processing.
    pub chunk_threshold_bytes: u64,
    /// Rows per dispatched chunk.
    pub chunk_size: usize,
    /// Rows per batch on the optimized variant's direct path.
    pub optimized_batch_size: usize,
    /// Rows per batch on the standard variant.
    pub standard_batch_size: usize,
    pub job_timeout_secs: u64,
    pub chunk_timeout_secs: u64,
    /// Attempts per task, including the first.
    pub tries: u32,
    /// Retention of the per-user progress snapshot.
    pub progress_ttl_secs: u64,
    /// Retention of a chunked run's tally.
    pub run_tally_ttl_secs: u64,
    /// Tasks the worker pool runs at once.
    pub worker_concurrency: usize,
    /// Queue for whole-file import jobs.
    pub import_queue: String,
    /// Queue for chunk tasks.
    pub chunk_queue: String,
    pub delimiter: u8,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            chunk_threshold_bytes: DEFAULT_CHUNK_THRESHOLD_BYTES,
            chunk_size: 100,
            optimized_batch_size: 25,
            standard_batch_size: 1000,
            job_timeout_secs: 1800,
            chunk_timeout_secs: 600,
            tries: 3,
            progress_ttl_secs: 3600,
            run_tally_ttl_secs: 86400,
            worker_concurrency: 4,
            import_queue: "default".to_string(),
            chunk_queue: "documents".to_string(),
            delimiter: b',',
        }
    }
}

impl ImportSettings {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.chunk_timeout_secs)
    }
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename.
    pub database_filename: String,
    /// Database URL (overrides data_dir/database_filename if set).
    pub database_url: Option<String>,
    /// Transient store URL (None = in-memory, "redis://..." = Redis).
    pub cache_url: Option<String>,
    pub import: ImportSettings,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("docimport");

        Self {
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            database_url: None,
            cache_url: None,
            import: ImportSettings::default(),
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Get the database URL, constructing from path if not explicitly set.
    pub fn database_url(&self) -> String {
        match self.database_url {
            Some(ref url) => url.clone(),
            None => format!("sqlite:{}", self.database_path().display()),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create data directory '{}': {}",
                    self.data_dir.display(),
                    e
                ),
            )
        })
    }
}

/// Import section of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_threshold_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimized_batch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_batch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_ttl_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_tally_ttl_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_queue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_queue: Option<String>,
    /// Single-character field delimiter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
}

impl ImportConfig {
    fn apply(&self, settings: &mut ImportSettings) {
        if let Some(v) = self.chunk_threshold_bytes {
            settings.chunk_threshold_bytes = v;
        }
        if let Some(v) = self.chunk_size {
            settings.chunk_size = v.max(1);
        }
        if let Some(v) = self.optimized_batch_size {
            settings.optimized_batch_size = v.max(1);
        }
        if let Some(v) = self.standard_batch_size {
            settings.standard_batch_size = v.max(1);
        }
        if let Some(v) = self.job_timeout_secs {
            settings.job_timeout_secs = v;
        }
        if let Some(v) = self.chunk_timeout_secs {
            settings.chunk_timeout_secs = v;
        }
        if let Some(v) = self.tries {
            settings.tries = v.max(1);
        }
        if let Some(v) = self.progress_ttl_secs {
            settings.progress_ttl_secs = v;
        }
        if let Some(v) = self.run_tally_ttl_secs {
            settings.run_tally_ttl_secs = v;
        }
        if let Some(v) = self.worker_concurrency {
            settings.worker_concurrency = v.max(1);
        }
        if let Some(ref v) = self.import_queue {
            settings.import_queue = v.clone();
        }
        if let Some(ref v) = self.chunk_queue {
            settings.chunk_queue = v.clone();
        }
        if let Some(ref v) = self.delimiter {
            match v.as_bytes() {
                [b] => settings.delimiter = *b,
                _ => tracing::warn!("Ignoring delimiter '{}': must be a single byte", v),
            }
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Transient store URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_url: Option<String>,
    #[serde(default)]
    pub import: ImportConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer for discovery.
    pub async fn load() -> Self {
        match prefer::load("docimport").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => Self::load_from_path(path).await.unwrap_or_else(|e| {
                    tracing::warn!("{}", e);
                    Self::default()
                }),
                None => Self::default(),
            },
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path, parsed by extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let mut config = Self::parse(&contents, path)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, String> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        match ext {
            "toml" => toml::from_str(contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e)),
            "yaml" | "yml" => serde_yaml::from_str(contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e)),
            _ => serde_json::from_str(contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e)),
        }
    }

    /// Directory of the config file, if one was loaded.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Expand `~` and resolve relative paths against `base_dir`.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref cache_url) = self.cache_url {
            settings.cache_url = Some(cache_url.clone());
        }
        self.import.apply(&mut settings.import);
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Data directory override (--data flag).
    pub data_dir: Option<PathBuf>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

/// Load settings: defaults, then config file, then environment, then flags.
pub async fn load_settings_with_options(options: LoadOptions) -> (Settings, Config) {
    let config = match options.config_path {
        Some(ref path) => Config::load_from_path(path).await.unwrap_or_else(|e| {
            tracing::warn!("{}", e);
            Config::default()
        }),
        None => Config::load().await,
    };

    let mut settings = Settings::default();
    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    config.apply_to_settings(&mut settings, &base_dir);

    if let Some(database_url) = env_var("DATABASE_URL") {
        tracing::debug!("Using DATABASE_URL from environment: {}", database_url);
        settings.database_url = Some(database_url);
    }
    if let Some(cache_url) = env_var("DOCIMPORT_CACHE_URL") {
        tracing::debug!("Using DOCIMPORT_CACHE_URL from environment: {}", cache_url);
        settings.cache_url = Some(cache_url);
    }

    if let Some(data_dir) = options.data_dir {
        settings.data_dir = config.resolve_path(&data_dir.to_string_lossy(), &base_dir);
    }

    (settings, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_import_defaults() {
        let s = ImportSettings::default();
        assert_eq!(s.chunk_threshold_bytes, 10 * 1024 * 1024);
        assert_eq!(s.chunk_size, 100);
        assert_eq!(s.optimized_batch_size, 25);
        assert_eq!(s.job_timeout(), Duration::from_secs(1800));
        assert_eq!(s.chunk_timeout(), Duration::from_secs(600));
        assert_eq!(s.tries, 3);
        assert_eq!(s.chunk_queue, "documents");
    }

    #[tokio::test]
    async fn test_load_toml_and_apply() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("docimport.toml");
        std::fs::write(
            &path,
            "data_dir = \"data\"\n\
             [import]\n\
             chunk_size = 50\n\
             delimiter = \";\"\n",
        )
        .unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, &config.base_dir().unwrap());

        assert_eq!(settings.data_dir, dir.path().join("data"));
        assert_eq!(settings.import.chunk_size, 50);
        assert_eq!(settings.import.delimiter, b';');
        assert_eq!(settings.import.tries, 3);
    }

    #[tokio::test]
    async fn test_load_yaml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("docimport.yaml");
        std::fs::write(&path, "cache_url: redis://localhost\nimport:\n  tries: 5\n").unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        assert_eq!(config.cache_url.as_deref(), Some("redis://localhost"));
        assert_eq!(config.import.tries, Some(5));
    }

    #[test]
    fn test_database_url_from_path() {
        let settings = Settings::with_data_dir(PathBuf::from("/tmp/di"));
        assert_eq!(settings.database_url(), "sqlite:/tmp/di/docimport.db");
    }
}
