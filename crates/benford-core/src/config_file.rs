use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Config;

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub storage: Option<StorageConfig>,
    pub server: Option<ServerConfig>,
    pub nlp: Option<NlpConfig>,
    pub client: Option<ClientConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory of the object store.
    pub data_dir: Option<String>,
    /// SQLite database holding users and jobs.
    pub db_path: Option<String>,
    pub key_prefix: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: Option<String>,
    /// Upper bound on documents analyzed at once.
    pub max_concurrent_jobs: Option<usize>,
    /// Usernames registered at startup if missing.
    pub seed_users: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NlpConfig {
    pub endpoint: Option<String>,
    pub language_code: Option<String>,
    pub max_text_bytes: Option<usize>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    pub webservice: Option<String>,
    pub poll_interval_ms: Option<u64>,
}

pub const ENV_DATA_DIR: &str = "BENFORD_DATA_DIR";
pub const ENV_DB_PATH: &str = "BENFORD_DB_PATH";
pub const ENV_BIND: &str = "BENFORD_BIND";
pub const ENV_NLP_ENDPOINT: &str = "BENFORD_NLP_ENDPOINT";
pub const ENV_WEBSERVICE: &str = "BENFORD_WEBSERVICE";

/// Platform config directory path: `<config_dir>/benford/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("benford").join("config.toml"))
}

/// Default directory for the job database and stored objects:
/// `<data_dir>/benford`, or `./benford-data` when the platform has none.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("benford"))
        .unwrap_or_else(|| PathBuf::from("benford-data"))
}

/// Load config by cascading CWD `.benford.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".benford.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
            None
        }
    }
}

fn pick<S, T>(
    overlay: &Option<S>,
    base: &Option<S>,
    field: impl Fn(&S) -> Option<T>,
) -> Option<T> {
    overlay
        .as_ref()
        .and_then(&field)
        .or_else(|| base.as_ref().and_then(&field))
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        storage: Some(StorageConfig {
            data_dir: pick(&overlay.storage, &base.storage, |s| s.data_dir.clone()),
            db_path: pick(&overlay.storage, &base.storage, |s| s.db_path.clone()),
            key_prefix: pick(&overlay.storage, &base.storage, |s| s.key_prefix.clone()),
        }),
        server: Some(ServerConfig {
            bind: pick(&overlay.server, &base.server, |s| s.bind.clone()),
            max_concurrent_jobs: pick(&overlay.server, &base.server, |s| s.max_concurrent_jobs),
            seed_users: pick(&overlay.server, &base.server, |s| s.seed_users.clone()),
        }),
        nlp: Some(NlpConfig {
            endpoint: pick(&overlay.nlp, &base.nlp, |n| n.endpoint.clone()),
            language_code: pick(&overlay.nlp, &base.nlp, |n| n.language_code.clone()),
            max_text_bytes: pick(&overlay.nlp, &base.nlp, |n| n.max_text_bytes),
            timeout_secs: pick(&overlay.nlp, &base.nlp, |n| n.timeout_secs),
        }),
        client: Some(ClientConfig {
            webservice: pick(&overlay.client, &base.client, |c| c.webservice.clone()),
            poll_interval_ms: pick(&overlay.client, &base.client, |c| c.poll_interval_ms),
        }),
    }
}

impl ConfigFile {
    /// Apply `BENFORD_*` environment overrides on top of file values.
    pub fn apply_env(mut self) -> Self {
        self.apply_overrides(|name| std::env::var(name).ok().filter(|v| !v.is_empty()));
        self
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var(ENV_DATA_DIR) {
            self.storage.get_or_insert_with(Default::default).data_dir = Some(v);
        }
        if let Some(v) = var(ENV_DB_PATH) {
            self.storage.get_or_insert_with(Default::default).db_path = Some(v);
        }
        if let Some(v) = var(ENV_BIND) {
            self.server.get_or_insert_with(Default::default).bind = Some(v);
        }
        if let Some(v) = var(ENV_NLP_ENDPOINT) {
            self.nlp.get_or_insert_with(Default::default).endpoint = Some(v);
        }
        if let Some(v) = var(ENV_WEBSERVICE) {
            self.client.get_or_insert_with(Default::default).webservice = Some(v);
        }
    }

    /// Root directory of the object store.
    pub fn object_dir(&self) -> PathBuf {
        self.storage
            .as_ref()
            .and_then(|s| s.data_dir.as_deref())
            .map(PathBuf::from)
            .unwrap_or_else(|| default_data_dir().join("objects"))
    }

    /// Path of the SQLite job database.
    pub fn db_path(&self) -> PathBuf {
        self.storage
            .as_ref()
            .and_then(|s| s.db_path.as_deref())
            .map(PathBuf::from)
            .unwrap_or_else(|| default_data_dir().join("jobs.sqlite"))
    }

    /// Resolve the core settings, falling back to [`Config::default`].
    pub fn core_config(&self) -> Config {
        let defaults = Config::default();
        let storage = self.storage.as_ref();
        let nlp = self.nlp.as_ref();
        Config {
            key_prefix: storage
                .and_then(|s| s.key_prefix.clone())
                .unwrap_or(defaults.key_prefix),
            nlp_endpoint: nlp.and_then(|n| n.endpoint.clone()).or(defaults.nlp_endpoint),
            nlp_language_code: nlp
                .and_then(|n| n.language_code.clone())
                .unwrap_or(defaults.nlp_language_code),
            nlp_max_text_bytes: nlp
                .and_then(|n| n.max_text_bytes)
                .unwrap_or(defaults.nlp_max_text_bytes),
            nlp_timeout_secs: nlp
                .and_then(|n| n.timeout_secs)
                .unwrap_or(defaults.nlp_timeout_secs),
        }
    }
}
