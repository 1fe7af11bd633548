//! Configuration handling for SchemaMover

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::dialect::DialectKind;
use crate::error::{Error, Result};
use crate::utils::naming::IgnoreRules;

/// Default configuration file looked up by the CLI
pub const DEFAULT_CONFIG_FILE: &str = "schema_mover.toml";

/// Load configuration from a TOML, JSON or YAML file, chosen by extension
pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let config_str = fs::read_to_string(path).map_err(|e| {
        Error::ConfigError(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("toml")
        .to_lowercase();

    let mut config: Config = match extension.as_str() {
        "json" => serde_json::from_str(&config_str)?,
        "yaml" | "yml" => serde_yaml::from_str(&config_str)?,
        _ => toml::from_str(&config_str)?,
    };

    config.base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    Ok(config)
}

/// Represents the complete SchemaMover configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    pub logging: Option<LoggingConfig>,
    /// Targets in declaration order, keyed by the name given on the command line
    #[serde(default)]
    pub targets: IndexMap<String, TargetConfig>,
    /// Directory schema paths are resolved against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Config {
    /// Look up a target by name
    pub fn target(&self, name: &str) -> Result<&TargetConfig> {
        self.targets
            .get(name)
            .ok_or_else(|| Error::ConfigError(format!("Unknown target `{}`", name)))
    }

    /// Check every target before any connection is attempted
    pub fn validate(&self) -> Result<()> {
        for (name, target) in &self.targets {
            target
                .validate()
                .map_err(|e| Error::ValidationError(format!("target `{}`: {}", name, e)))?;
        }
        Ok(())
    }
}

/// One database to reconcile
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TargetConfig {
    pub dsn: String,
    /// `mysql` or `postgres`; inferred from the DSN scheme when absent
    pub dialect: Option<String>,
    /// Schema files or glob patterns, in concatenation order
    #[serde(default)]
    pub schemas: Vec<String>,
    /// Regexes of live object names to leave untouched
    #[serde(default)]
    pub ignore: Vec<String>,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub timeout_seconds: Option<u64>,
}

impl TargetConfig {
    pub fn new(dsn: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            dialect: None,
            schemas: Vec::new(),
            ignore: Vec::new(),
            user: None,
            pass: None,
            timeout_seconds: None,
        }
    }

    /// Dialect named in the configuration, or the one implied by the DSN
    pub fn dialect_kind(&self) -> Result<DialectKind> {
        match &self.dialect {
            Some(name) => name.parse(),
            None => DialectKind::from_dsn(&self.dsn),
        }
    }

    pub fn ignore_rules(&self) -> Result<IgnoreRules> {
        IgnoreRules::new(&self.ignore)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dsn.trim().is_empty() {
            return Err(Error::ConfigError("dsn must not be empty".to_string()));
        }
        self.dialect_kind()?;
        self.ignore_rules()?;
        Ok(())
    }

    /// Expand the configured schema entries into concrete file paths.
    ///
    /// Relative entries are resolved against `base_dir`. Glob patterns expand to their
    /// matches in sorted order and must match at least one file; plain paths are kept as-is
    /// and fail later when read.
    pub fn resolve_schema_paths(&self, base_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in &self.schemas {
            let candidate = if Path::new(entry).is_absolute() {
                PathBuf::from(entry)
            } else {
                base_dir.join(entry)
            };

            if !entry.contains(['*', '?', '[']) {
                paths.push(candidate);
                continue;
            }

            let pattern = candidate.to_string_lossy().to_string();
            let mut matches = glob::glob(&pattern)
                .map_err(|e| {
                    Error::ConfigError(format!("Invalid schema pattern `{}`: {}", entry, e))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| Error::ConfigError(format!("Cannot read `{}`: {}", entry, e)))?;
            if matches.is_empty() {
                return Err(Error::ConfigError(format!(
                    "Schema pattern `{}` matched no files",
                    entry
                )));
            }
            matches.sort();
            paths.extend(matches);
        }
        Ok(paths)
    }
}

/// Logging configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    /// `text` or `json`
    pub format: String,
    /// Log to the console (stderr) when no file is configured
    pub stdout: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            format: "text".to_string(),
            stdout: true,
        }
    }
}
