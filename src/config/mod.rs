//! Configuration management for `td`.
//!
//! Configuration sources and precedence (highest wins):
//! 1. CLI overrides
//! 2. Environment variables (`TD_*`)
//! 3. Project config (.todos/config.yaml)
//! 4. User config (~/.config/td/config.yaml)
//! 5. Defaults

use crate::error::{Result, TdError};
use crate::query::DEFAULT_MAX_RESULTS;
use crate::storage::SqliteStorage;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the per-project workspace directory.
pub const TODOS_DIR_NAME: &str = ".todos";
/// Default database filename inside the workspace.
pub const DEFAULT_DB_FILENAME: &str = "issues.db";
pub const CONFIG_FILENAME: &str = "config.yaml";
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 30_000;

/// Discover the active `.todos` directory.
///
/// Honors `TD_DIR` when set, otherwise walks up from `start` (or CWD).
///
/// # Errors
///
/// Returns `NotInitialized` if no workspace is found.
pub fn discover_todos_dir(start: Option<&Path>) -> Result<PathBuf> {
    let env_dir = env::var("TD_DIR").ok().filter(|v| !v.trim().is_empty());
    discover_todos_dir_with_env(start, env_dir.as_deref().map(Path::new))
}

fn discover_todos_dir_with_env(start: Option<&Path>, env_override: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = env_override {
        if path.is_dir() {
            return Ok(path.to_path_buf());
        }
    }

    let mut current = match start {
        Some(path) => path.to_path_buf(),
        None => env::current_dir()?,
    };

    loop {
        let candidate = current.join(TODOS_DIR_NAME);
        if candidate.is_dir() {
            return Ok(candidate);
        }

        if !current.pop() {
            break;
        }
    }

    Err(TdError::NotInitialized)
}

/// A flat configuration layer keyed by dotted names (`webhook.url`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigLayer {
    pub values: HashMap<String, String>,
}

impl ConfigLayer {
    /// Merge another layer on top of this one (higher precedence wins).
    pub fn merge_from(&mut self, other: &Self) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Merge multiple layers in precedence order (lowest to highest).
    #[must_use]
    pub fn merge_layers(layers: &[Self]) -> Self {
        let mut merged = Self::default();
        for layer in layers {
            merged.merge_from(layer);
        }
        merged
    }

    /// Build a layer from a YAML file path. Missing files return empty config.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn from_yaml(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let value: serde_yaml::Value = serde_yaml::from_str(&contents)?;
        let mut flat = HashMap::new();
        flatten_yaml(&value, "", &mut flat);

        let mut layer = Self::default();
        for (key, value) in flat {
            layer.insert(&key, value);
        }
        Ok(layer)
    }

    /// Build a layer from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_vars(env::vars())
    }

    /// Build a layer from `TD_*` pairs. `TD_WEBHOOK_URL` maps to `webhook.url`.
    #[must_use]
    pub fn from_env_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut layer = Self::default();
        for (key, value) in vars {
            let Some(stripped) = key.strip_prefix("TD_") else {
                continue;
            };
            let lower = stripped.to_lowercase();
            // Only the first underscore separates a section.
            let dotted = lower.replacen('_', ".", 1);
            layer.insert(&lower, value.clone());
            if dotted != lower {
                layer.insert(&dotted, value);
            }
        }
        layer
    }

    fn insert(&mut self, key: &str, value: String) {
        self.values.insert(normalize_key(key), value);
    }

    /// Look up the first of `keys` that is set.
    #[must_use]
    pub fn get(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .find_map(|key| self.values.get(&normalize_key(key)))
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

/// CLI overrides for config loading.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub db: Option<PathBuf>,
    pub actor: Option<String>,
    pub lock_timeout: Option<u64>,
}

impl CliOverrides {
    #[must_use]
    pub fn as_layer(&self) -> ConfigLayer {
        let mut layer = ConfigLayer::default();

        if let Some(path) = &self.db {
            layer.insert("db", path.to_string_lossy().to_string());
        }
        if let Some(actor) = &self.actor {
            layer.insert("actor", actor.clone());
        }
        if let Some(lock_timeout) = self.lock_timeout {
            layer.insert("lock-timeout", lock_timeout.to_string());
        }

        layer
    }
}

/// Load project config (.todos/config.yaml).
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(todos_dir: &Path) -> Result<ConfigLayer> {
    ConfigLayer::from_yaml(&todos_dir.join(CONFIG_FILENAME))
}

/// Load user config (~/.config/td/config.yaml).
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<ConfigLayer> {
    let Ok(home) = env::var("HOME") else {
        return Ok(ConfigLayer::default());
    };
    let path = Path::new(&home)
        .join(".config")
        .join("td")
        .join(CONFIG_FILENAME);
    ConfigLayer::from_yaml(&path)
}

/// Merge every layer for `todos_dir`.
///
/// # Errors
///
/// Returns an error if any config file cannot be read or parsed.
pub fn load_config(todos_dir: &Path, cli: &CliOverrides) -> Result<ConfigLayer> {
    Ok(ConfigLayer::merge_layers(&[
        load_user_config()?,
        load_project_config(todos_dir)?,
        ConfigLayer::from_env(),
        cli.as_layer(),
    ]))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    pub url: String,
    pub secret: String,
}

/// Settings resolved for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub todos_dir: PathBuf,
    pub db_path: PathBuf,
    pub lock_timeout: u64,
    pub actor: Option<String>,
    pub max_results: usize,
    pub webhook: Option<WebhookConfig>,
    pub branch: Option<String>,
}

impl Config {
    /// Interpret a merged layer.
    ///
    /// # Errors
    ///
    /// Returns a config error for non-numeric limits.
    pub fn from_layer(todos_dir: &Path, layer: &ConfigLayer) -> Result<Self> {
        let db_path = layer.get(&["db", "database"]).map_or_else(
            || todos_dir.join(DEFAULT_DB_FILENAME),
            |value| {
                let candidate = PathBuf::from(value);
                if candidate.is_absolute() {
                    candidate
                } else {
                    todos_dir.join(candidate)
                }
            },
        );

        let lock_timeout =
            parse_number(layer, &["lock-timeout"])?.unwrap_or(DEFAULT_LOCK_TIMEOUT_MS);
        let max_results = parse_number(layer, &["query.max-results", "max-results"])?
            .map_or(DEFAULT_MAX_RESULTS, |n: u64| {
                usize::try_from(n).unwrap_or(usize::MAX)
            });

        let webhook = layer.get(&["webhook.url"]).map(|url| WebhookConfig {
            url: url.to_string(),
            secret: layer.get(&["webhook.secret"]).unwrap_or_default().to_string(),
        });

        Ok(Self {
            todos_dir: todos_dir.to_path_buf(),
            db_path,
            lock_timeout,
            actor: layer.get(&["actor"]).map(str::to_string),
            max_results,
            webhook,
            branch: layer.get(&["branch"]).map(str::to_string),
        })
    }

    /// Discover the workspace and load every layer.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` outside a workspace, or a config error.
    pub fn load(cli: &CliOverrides) -> Result<Self> {
        let todos_dir = discover_todos_dir(None)?;
        let layer = load_config(&todos_dir, cli)?;
        Self::from_layer(&todos_dir, &layer)
    }

    /// Directory the workspace belongs to.
    #[must_use]
    pub fn project_dir(&self) -> &Path {
        self.todos_dir.parent().unwrap_or(&self.todos_dir)
    }

    /// Branch override or the checked-out git branch.
    #[must_use]
    pub fn resolve_branch(&self) -> String {
        self.branch
            .clone()
            .unwrap_or_else(|| crate::util::current_branch(self.project_dir()))
    }
}

/// Open the configured database.
///
/// # Errors
///
/// Returns an error if the database cannot be opened.
pub fn open_storage(config: &Config) -> Result<SqliteStorage> {
    SqliteStorage::open_with_timeout(&config.db_path, Some(config.lock_timeout))
}

fn parse_number(layer: &ConfigLayer, keys: &[&str]) -> Result<Option<u64>> {
    layer
        .get(keys)
        .map(|value| {
            value
                .parse::<u64>()
                .map_err(|_| TdError::Config(format!("{} must be a number, got '{value}'", keys[0])))
        })
        .transpose()
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace('_', "-")
}

fn flatten_yaml(value: &serde_yaml::Value, prefix: &str, out: &mut HashMap<String, String>) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (key, value) in map {
                let Some(key_str) = key.as_str() else {
                    continue;
                };
                let next_prefix = if prefix.is_empty() {
                    key_str.to_string()
                } else {
                    format!("{prefix}.{key_str}")
                };
                flatten_yaml(value, &next_prefix, out);
            }
        }
        _ => {
            if let Some(value) = yaml_scalar_to_string(value) {
                out.insert(prefix.to_string(), value);
            }
        }
    }
}

fn yaml_scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::Bool(v) => Some(v.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Null
        | serde_yaml::Value::Sequence(_)
        | serde_yaml::Value::Mapping(_) => None,
        serde_yaml::Value::Tagged(tagged) => yaml_scalar_to_string(&tagged.value),
    }
}
