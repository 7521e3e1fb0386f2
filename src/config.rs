//! Runtime configuration loading.
//!
//! Configuration discovery follows this hierarchy:
//! 1. An explicit path (`--config` or `WORLD_CLI_CONFIG`)
//! 2. `world.toml` in the current directory or the nearest ancestor
//! 3. Built-in defaults
//!
//! Every scalar value found in any table of the file is flattened into a
//! single environment map. Known keys set in the process environment take
//! precedence over the file.

use crate::env;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tracing::{debug, info, warn};

static NAMESPACE_FALLBACK_WARNING: Once = Once::new();

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// An explicitly requested configuration file does not exist
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),
}

/// Read-only configuration for one orchestration command.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Project root, used as the build context source
    pub root_dir: PathBuf,
    /// Flattened environment passed to services
    pub env: HashMap<String, String>,
    /// Build local images before starting
    pub build: bool,
    /// Use debug build targets and attach debugger capabilities
    pub debug: bool,
    /// Return after starting instead of following logs
    pub detach: bool,
    /// Seconds used for graceful stops and readiness waits
    pub timeout_seconds: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            env: HashMap::new(),
            build: false,
            debug: false,
            detach: false,
            timeout_seconds: env::DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

impl RuntimeConfig {
    /// Create a configuration from an environment map with default flags.
    pub fn with_env<I, K, V>(env: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            env: env.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            ..Default::default()
        }
    }

    /// The environment namespace.
    ///
    /// Falls back to [`env::DEFAULT_NAMESPACE`] and warns once per process
    /// when `CARDINAL_NAMESPACE` is unset or empty.
    pub fn namespace(&self) -> String {
        match self.env.get(env::keys::CARDINAL_NAMESPACE) {
            Some(ns) if !ns.trim().is_empty() => ns.trim().to_string(),
            _ => {
                NAMESPACE_FALLBACK_WARNING.call_once(|| {
                    warn!(
                        "{} is not set, using default namespace '{}'",
                        env::keys::CARDINAL_NAMESPACE,
                        env::DEFAULT_NAMESPACE
                    );
                });
                env::DEFAULT_NAMESPACE.to_string()
            }
        }
    }

    /// Look up a key, falling back to `default` when unset or empty.
    pub fn env_or(&self, key: &str, default: &str) -> String {
        self.env
            .get(key)
            .filter(|v| !v.is_empty())
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str, root_dir: &Path) -> Result<Self, toml::de::Error> {
        let table: toml::Table = toml::from_str(content)?;
        let mut env = HashMap::new();
        flatten_into(&table, &mut env);

        Ok(Self {
            root_dir: root_dir.to_path_buf(),
            env,
            ..Default::default()
        })
    }

    /// Load configuration from a TOML file; its directory becomes the project root.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let root_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Self::from_toml_str(&content, &root_dir).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay known keys from the process environment.
    pub fn apply_process_env(&mut self) {
        for key in env::keys::ALL {
            if let Ok(value) = std::env::var(key) {
                debug!("Overriding {} from process environment", key);
                self.env.insert((*key).to_string(), value);
            }
        }
    }
}

/// Copy every scalar value of `table` (and nested tables) into `env`.
fn flatten_into(table: &toml::Table, env: &mut HashMap<String, String>) {
    for (key, value) in table {
        match value {
            toml::Value::Table(nested) => flatten_into(nested, env),
            toml::Value::String(s) => {
                env.insert(key.clone(), s.clone());
            }
            toml::Value::Integer(i) => {
                env.insert(key.clone(), i.to_string());
            }
            toml::Value::Float(f) => {
                env.insert(key.clone(), f.to_string());
            }
            toml::Value::Boolean(b) => {
                env.insert(key.clone(), b.to_string());
            }
            toml::Value::Datetime(d) => {
                env.insert(key.clone(), d.to_string());
            }
            toml::Value::Array(_) => debug!("Ignoring array value for key {}", key),
        }
    }
}

/// Configuration file discovery.
pub struct ConfigDiscovery;

impl ConfigDiscovery {
    /// Find `world.toml` in `start` or its nearest ancestor.
    pub fn find_config_file(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(env::CONFIG_FILE_NAME))
            .find(|candidate| candidate.is_file())
    }

    /// Discover and load configuration.
    ///
    /// An explicit path (argument, then `WORLD_CLI_CONFIG`) must exist. Without
    /// one, the nearest `world.toml` is used, or defaults rooted at the current
    /// directory when none is found.
    ///
    /// # Errors
    ///
    /// Returns error if an explicit file is missing, or a file fails to load.
    pub fn discover(explicit: Option<&Path>) -> Result<RuntimeConfig, ConfigError> {
        let explicit = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(env::CONFIG_PATH_ENV).map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => {
                if !path.is_file() {
                    return Err(ConfigError::NotFound(path));
                }
                info!("Loading configuration from: {:?}", path);
                RuntimeConfig::from_toml_file(&path)?
            }
            None => {
                let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
                match Self::find_config_file(&cwd) {
                    Some(path) => {
                        info!("Loading configuration from: {:?}", path);
                        RuntimeConfig::from_toml_file(&path)?
                    }
                    None => {
                        debug!("No {} found, using defaults", env::CONFIG_FILE_NAME);
                        RuntimeConfig {
                            root_dir: cwd,
                            ..Default::default()
                        }
                    }
                }
            }
        };

        config.apply_process_env();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flattens_all_tables() {
        let content = r#"
            [cardinal]
            CARDINAL_NAMESPACE = "mygame"
            REDIS_PORT = 6380

            [evm]
            FAUCET_ENABLED = true
            FAUCET_ADDRESS = "aa9288F88233Eb887d194fF2215Cf1776a6FEE41"
        "#;

        let config = RuntimeConfig::from_toml_str(content, Path::new("/project")).unwrap();
        assert_eq!(config.namespace(), "mygame");
        assert_eq!(config.env["REDIS_PORT"], "6380");
        assert_eq!(config.env["FAUCET_ENABLED"], "true");
        assert_eq!(config.root_dir, PathBuf::from("/project"));
    }

    #[test]
    fn test_namespace_falls_back_to_default() {
        let config = RuntimeConfig::default();
        assert_eq!(config.namespace(), env::DEFAULT_NAMESPACE);

        let blank = RuntimeConfig::with_env([(env::keys::CARDINAL_NAMESPACE, "  ")]);
        assert_eq!(blank.namespace(), env::DEFAULT_NAMESPACE);
    }

    #[test]
    fn test_env_or_ignores_empty_values() {
        let config = RuntimeConfig::with_env([("REDIS_PASSWORD", "")]);
        assert_eq!(config.env_or("REDIS_PASSWORD", "fallback"), "fallback");
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        assert!(RuntimeConfig::from_toml_str("[cardinal", Path::new(".")).is_err());
    }

    #[test]
    fn test_discovery_walks_ancestors() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("cardinal").join("system");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join(env::CONFIG_FILE_NAME), "[cardinal]\n").unwrap();

        let found = ConfigDiscovery::find_config_file(&nested).unwrap();
        assert_eq!(found, dir.path().join(env::CONFIG_FILE_NAME));
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let result = ConfigDiscovery::discover(Some(Path::new("/definitely/not/here.toml")));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }
}
