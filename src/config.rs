//! Settings for codex-mem
//!
//! Resolution order: built-in defaults, then `<data_dir>/settings.json`,
//! then `CODEX_MEM_*` environment variables. The settings file is written
//! with the effective values on first run.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::{MemError, Result};

pub const ENV_DATA_DIR: &str = "CODEX_MEM_DATA_DIR";
pub const ENV_DATABASE_URL: &str = "CODEX_MEM_DATABASE_URL";
pub const ENV_VECTOR_ENABLED: &str = "CODEX_MEM_VECTOR_ENABLED";
pub const ENV_VECTOR_PROVIDER: &str = "CODEX_MEM_VECTOR_PROVIDER";
pub const ENV_VECTOR_COLLECTION: &str = "CODEX_MEM_VECTOR_COLLECTION";
pub const ENV_VECTOR_COLLECTION_TURNS: &str = "CODEX_MEM_VECTOR_COLLECTION_TURNS";
pub const ENV_LOG_LEVEL: &str = "CODEX_MEM_LOG_LEVEL";

const SETTINGS_FILE: &str = "settings.json";
const DATABASE_FILE: &str = "codex-mem.db";
const VECTOR_DIR: &str = "vector-db";

/// Effective configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Root for the database, settings file and vector index
    pub data_dir: PathBuf,
    /// `sqlite://<path>` or a PostgreSQL URL; defaults to a SQLite file in `data_dir`
    #[serde(default)]
    pub database_url: Option<String>,
    /// Enables the semantic index
    pub vector_enabled: bool,
    /// Semantic index provider (`local` or `none`)
    pub vector_provider: String,
    /// Collection holding memories
    pub vector_collection: String,
    /// Collection holding conversation turns
    pub vector_collection_turns: String,
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self::with_data_dir(default_data_dir())
    }
}

impl Settings {
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            database_url: None,
            vector_enabled: true,
            vector_provider: "local".to_string(),
            vector_collection: "codex-mem".to_string(),
            vector_collection_turns: "codex-mem-turns".to_string(),
            log_level: "info".to_string(),
        }
    }

    /// Load settings using the process environment
    pub fn load() -> Result<Self> {
        let env = |key: &str| std::env::var(key).ok();
        let data_dir = env(ENV_DATA_DIR)
            .map(|dir| expand_path(&dir))
            .unwrap_or_else(default_data_dir);
        Self::load_from(&data_dir, env)
    }

    /// Load settings rooted at `data_dir`, reading overrides through `env`
    pub fn load_from<F>(data_dir: &Path, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(SETTINGS_FILE);

        let mut settings = Settings::with_data_dir(data_dir);

        if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(map)) => settings.merge_file(&map),
                Ok(_) | Err(_) => {
                    tracing::warn!("Ignoring malformed settings file {}", path.display());
                }
            }
            settings.apply_env(&env);
        } else {
            settings.apply_env(&env);
            let mut body = serde_json::to_string_pretty(&settings)?;
            body.push('\n');
            std::fs::write(&path, body)?;
        }

        // The data directory is where this file was found, regardless of its contents.
        settings.data_dir = data_dir.to_path_buf();
        Ok(settings)
    }

    fn merge_file(&mut self, map: &serde_json::Map<String, Value>) {
        if let Some(url) = map.get("database_url").and_then(value_as_string) {
            if !url.is_empty() {
                self.database_url = Some(url);
            }
        }
        if let Some(enabled) = map.get("vector_enabled").and_then(value_as_bool) {
            self.vector_enabled = enabled;
        }
        if let Some(v) = map.get("vector_provider").and_then(value_as_string) {
            self.vector_provider = v;
        }
        if let Some(v) = map.get("vector_collection").and_then(value_as_string) {
            self.vector_collection = v;
        }
        if let Some(v) = map.get("vector_collection_turns").and_then(value_as_string) {
            self.vector_collection_turns = v;
        }
        if let Some(v) = map.get("log_level").and_then(value_as_string) {
            self.log_level = v;
        }
    }

    fn apply_env<F>(&mut self, env: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = env(ENV_DATABASE_URL).filter(|u| !u.is_empty()) {
            self.database_url = Some(url);
        }
        if let Some(enabled) = env(ENV_VECTOR_ENABLED) {
            self.vector_enabled = parse_bool(&enabled);
        }
        if let Some(v) = env(ENV_VECTOR_PROVIDER) {
            self.vector_provider = v;
        }
        if let Some(v) = env(ENV_VECTOR_COLLECTION) {
            self.vector_collection = v;
        }
        if let Some(v) = env(ENV_VECTOR_COLLECTION_TURNS) {
            self.vector_collection_turns = v;
        }
        if let Some(v) = env(ENV_LOG_LEVEL) {
            self.log_level = v;
        }
    }

    /// Effective database URL
    pub fn database_url(&self) -> String {
        self.database_url.clone().unwrap_or_else(|| {
            format!("sqlite://{}", self.data_dir.join(DATABASE_FILE).display())
        })
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILE)
    }

    /// Directory holding the local vector index
    pub fn vector_dir(&self) -> PathBuf {
        self.data_dir.join(VECTOR_DIR)
    }

    /// Whether the semantic index should be consulted at all
    pub fn semantic_enabled(&self) -> bool {
        self.vector_enabled && !self.vector_provider.eq_ignore_ascii_case("none")
    }

    pub fn validate(&self) -> Result<()> {
        if self.vector_collection.trim().is_empty() || self.vector_collection_turns.trim().is_empty()
        {
            return Err(MemError::Config(
                "vector collection names cannot be empty".to_string(),
            ));
        }
        if self.vector_collection == self.vector_collection_turns {
            return Err(MemError::Config(format!(
                "memories and turns must use different collections (both are '{}')",
                self.vector_collection
            )));
        }
        Ok(())
    }
}

/// `1`, `true`, `yes`, `on` (any case) are true; everything else is false
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn value_as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => Some(parse_bool(s)),
        Value::Number(n) => Some(n.as_i64() == Some(1)),
        _ => None,
    }
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".codex-mem"))
        .unwrap_or_else(|| PathBuf::from(".codex-mem"))
}
