//! Configuration for the hub: load `.env` and XDG `config.toml` into the
//! process environment (priority: **existing env > .env > XDG**), then
//! snapshot every recognized `HIVEMIND_*` variable into a typed
//! [`HubConfig`].

mod dotenv;
mod xdg_toml;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Application name used for the XDG path `~/.config/<app>/config.toml`.
pub const APP_NAME: &str = "hivemind";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("read xdg config: {0}")]
    XdgRead(std::io::Error),
    #[error("parse xdg toml: {0}")]
    XdgParse(#[from] toml::de::Error),
    #[error("read .env: {0}")]
    DotenvRead(std::io::Error),
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

/// Loads `.env` and the XDG config, setting only keys the process
/// environment does not already define.
///
/// * `override_dir`: look for `.env` here instead of the current directory.
pub fn load_and_apply(override_dir: Option<&Path>) -> Result<(), LoadError> {
    let xdg_map = xdg_toml::load(APP_NAME)?;
    let dotenv_map = dotenv::load(override_dir).map_err(LoadError::DotenvRead)?;

    let mut keys: std::collections::HashSet<String> = xdg_map.keys().cloned().collect();
    keys.extend(dotenv_map.keys().cloned());

    for key in keys {
        if std::env::var(&key).is_ok() {
            continue;
        }
        if let Some(value) = dotenv_map.get(&key).or_else(|| xdg_map.get(&key)) {
            std::env::set_var(&key, value);
        }
    }
    Ok(())
}

fn get(env: &HashMap<String, String>, key: &str) -> Option<String> {
    env.get(key).cloned().filter(|v| !v.is_empty())
}

fn get_parsed<T: std::str::FromStr>(
    env: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, LoadError> {
    match get(env, key) {
        Some(raw) => raw.parse().map_err(|_| LoadError::Invalid {
            key: key.to_string(),
            value: raw,
            reason: format!("expected {}", std::any::type_name::<T>()),
        }),
        None => Ok(default),
    }
}

fn get_bool(
    env: &HashMap<String, String>,
    key: &str,
    default: bool,
) -> Result<bool, LoadError> {
    match get(env, key).as_deref() {
        None => Ok(default),
        Some("true") | Some("1") | Some("yes") => Ok(true),
        Some("false") | Some("0") | Some("no") => Ok(false),
        Some(other) => Err(LoadError::Invalid {
            key: key.to_string(),
            value: other.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

/// Bolt endpoint settings.
#[derive(Clone, Debug)]
pub struct GraphSettings {
    pub uri: String,
    pub user: String,
    /// Required to connect; `None` only in standalone (in-memory) mode.
    pub password: Option<String>,
    pub database: String,
    pub pool_size: usize,
    pub retry_ms: u64,
    pub acquire_timeout_ms: u64,
}

/// Model runtime settings and per-class default names.
#[derive(Clone, Debug)]
pub struct ModelSettings {
    pub host: String,
    pub port: u16,
    pub timeout_ms: u64,
    pub retries: u32,
    pub inventory_ttl_secs: u64,
    pub reasoning: Option<String>,
    pub coding: Option<String>,
    pub vision: Option<String>,
    pub chat: Option<String>,
    pub embedding: Option<String>,
    pub general: Option<String>,
    pub fallback: Option<String>,
}

/// Governance policy settings.
#[derive(Clone, Debug)]
pub struct GovernanceSettings {
    pub enforce: bool,
    pub block_on_failure: bool,
}

/// Notebook vault settings.
#[derive(Clone, Debug)]
pub struct VaultSettings {
    pub root: PathBuf,
    pub logs_folder: String,
}

/// Transport settings.
#[derive(Clone, Debug)]
pub struct ServeSettings {
    pub addr: String,
    pub bearer_token: Option<String>,
    pub drain_timeout_secs: u64,
    pub probe_timeout_ms: u64,
}

/// Typed snapshot of every recognized environment variable.
#[derive(Clone, Debug)]
pub struct HubConfig {
    pub graph: GraphSettings,
    pub model: ModelSettings,
    pub governance: GovernanceSettings,
    pub vault: VaultSettings,
    pub serve: ServeSettings,
    pub log_level: String,
}

impl HubConfig {
    /// Reads from the process environment.
    pub fn from_env() -> Result<Self, LoadError> {
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::from_map(&env)
    }

    /// Reads from an explicit map (tests).
    pub fn from_map(env: &HashMap<String, String>) -> Result<Self, LoadError> {
        Ok(Self {
            graph: GraphSettings {
                uri: get(env, "HIVEMIND_GRAPH_URI")
                    .unwrap_or_else(|| "bolt://localhost:7687".to_string()),
                user: get(env, "HIVEMIND_GRAPH_USER").unwrap_or_else(|| "neo4j".to_string()),
                password: get(env, "HIVEMIND_GRAPH_PASSWORD"),
                database: get(env, "HIVEMIND_GRAPH_DATABASE")
                    .unwrap_or_else(|| "neo4j".to_string()),
                pool_size: get_parsed(env, "HIVEMIND_GRAPH_POOL_SIZE", 50)?,
                retry_ms: get_parsed(env, "HIVEMIND_GRAPH_RETRY_MS", 30_000)?,
                acquire_timeout_ms: get_parsed(
                    env,
                    "HIVEMIND_GRAPH_ACQUIRE_TIMEOUT_MS",
                    60_000,
                )?,
            },
            model: ModelSettings {
                host: get(env, "HIVEMIND_MODEL_HOST").unwrap_or_else(|| "localhost".to_string()),
                port: get_parsed(env, "HIVEMIND_MODEL_PORT", 11_434)?,
                timeout_ms: get_parsed(env, "HIVEMIND_MODEL_TIMEOUT_MS", 120_000)?,
                retries: get_parsed(env, "HIVEMIND_MODEL_RETRIES", 3)?,
                inventory_ttl_secs: get_parsed(env, "HIVEMIND_INVENTORY_TTL_SECS", 300)?,
                reasoning: get(env, "HIVEMIND_MODEL_REASONING"),
                coding: get(env, "HIVEMIND_MODEL_CODING"),
                vision: get(env, "HIVEMIND_MODEL_VISION"),
                chat: get(env, "HIVEMIND_MODEL_CHAT"),
                embedding: get(env, "HIVEMIND_MODEL_EMBEDDING"),
                general: get(env, "HIVEMIND_MODEL_GENERAL"),
                fallback: get(env, "HIVEMIND_MODEL_FALLBACK"),
            },
            governance: GovernanceSettings {
                enforce: get_bool(env, "HIVEMIND_GOVERNANCE_ENFORCE", true)?,
                block_on_failure: get_bool(env, "HIVEMIND_GOVERNANCE_BLOCK", true)?,
            },
            vault: VaultSettings {
                root: get(env, "HIVEMIND_VAULT_ROOT")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("vault")),
                logs_folder: get(env, "HIVEMIND_LOGS_FOLDER")
                    .unwrap_or_else(|| "logs".to_string()),
            },
            serve: ServeSettings {
                addr: get(env, "HIVEMIND_ADDR").unwrap_or_else(|| "127.0.0.1:8484".to_string()),
                bearer_token: get(env, "HIVEMIND_BEARER_TOKEN"),
                drain_timeout_secs: get_parsed(env, "HIVEMIND_DRAIN_TIMEOUT_SECS", 30)?,
                probe_timeout_ms: get_parsed(env, "HIVEMIND_PROBE_TIMEOUT_MS", 30_000)?,
            },
            log_level: get(env, "HIVEMIND_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: an empty environment yields the documented defaults.
    #[test]
    fn defaults() {
        let config = HubConfig::from_map(&HashMap::new()).unwrap();
        assert_eq!(config.graph.uri, "bolt://localhost:7687");
        assert_eq!(config.graph.user, "neo4j");
        assert!(config.graph.password.is_none());
        assert_eq!(config.graph.pool_size, 50);
        assert_eq!(config.graph.acquire_timeout_ms, 60_000);
        assert_eq!(config.model.port, 11_434);
        assert_eq!(config.model.timeout_ms, 120_000);
        assert_eq!(config.model.retries, 3);
        assert_eq!(config.model.inventory_ttl_secs, 300);
        assert!(config.governance.enforce);
        assert!(config.governance.block_on_failure);
        assert_eq!(config.serve.drain_timeout_secs, 30);
        assert_eq!(config.log_level, "info");
    }

    /// **Scenario**: explicit values override defaults; booleans accept the
    /// usual spellings.
    #[test]
    fn overrides() {
        let mut env = HashMap::new();
        env.insert("HIVEMIND_GRAPH_POOL_SIZE".to_string(), "8".to_string());
        env.insert("HIVEMIND_GOVERNANCE_ENFORCE".to_string(), "no".to_string());
        env.insert(
            "HIVEMIND_MODEL_REASONING".to_string(),
            "qwq:32b".to_string(),
        );
        let config = HubConfig::from_map(&env).unwrap();
        assert_eq!(config.graph.pool_size, 8);
        assert!(!config.governance.enforce);
        assert_eq!(config.model.reasoning.as_deref(), Some("qwq:32b"));
    }

    /// **Scenario**: malformed numbers and booleans fail with the key name.
    #[test]
    fn invalid_values() {
        let mut env = HashMap::new();
        env.insert("HIVEMIND_MODEL_PORT".to_string(), "lots".to_string());
        let err = HubConfig::from_map(&env).unwrap_err();
        assert!(err.to_string().contains("HIVEMIND_MODEL_PORT"));

        let mut env = HashMap::new();
        env.insert(
            "HIVEMIND_GOVERNANCE_BLOCK".to_string(),
            "maybe".to_string(),
        );
        let err = HubConfig::from_map(&env).unwrap_err();
        assert!(err.to_string().contains("HIVEMIND_GOVERNANCE_BLOCK"));
    }

    /// **Scenario**: existing process env wins over `.env` values.
    #[test]
    fn env_wins_over_dotenv() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".env"),
            "CONFIG_PRIORITY_PROBE=from_dotenv\n",
        )
        .unwrap();
        std::env::set_var("CONFIG_PRIORITY_PROBE", "from_env");
        load_and_apply(Some(dir.path())).unwrap();
        assert_eq!(
            std::env::var("CONFIG_PRIORITY_PROBE").as_deref(),
            Ok("from_env")
        );
        std::env::remove_var("CONFIG_PRIORITY_PROBE");
    }

    /// **Scenario**: `.env` fills keys the environment lacks.
    #[test]
    fn dotenv_fills_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".env"),
            "CONFIG_FILL_PROBE=from_dotenv\n",
        )
        .unwrap();
        std::env::remove_var("CONFIG_FILL_PROBE");
        load_and_apply(Some(dir.path())).unwrap();
        assert_eq!(
            std::env::var("CONFIG_FILL_PROBE").as_deref(),
            Ok("from_dotenv")
        );
        std::env::remove_var("CONFIG_FILL_PROBE");
    }
}
