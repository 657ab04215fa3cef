//! TOML-based configuration for trellis.
//!
//! Supports a config file (trellis.toml) with environment variable
//! expansion. Every section is optional; omitted values take the shipped
//! defaults.
//!
//! Example configuration:
//! ```toml
//! [store]
//! path = "${TRELLIS_HOME}/graph.db"
//!
//! [ingest]
//! batch_size = 1000
//! supporting_queries_cap = 8
//!
//! [extract]
//! direct_copy = 1.0
//! aggregation = 0.9
//! predicate = 0.6
//!
//! [traverse]
//! max_depth = 3
//! confidence_floor = 0.5
//!
//! [retention]
//! edge_days = 90
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::extract::ExtractorConfig;
use crate::graph::model::DEFAULT_SUPPORTING_QUERIES_CAP;
use crate::graph::retention::RetentionPolicy;
use crate::graph::traverse::{DEFAULT_CONFIDENCE_FLOOR, DEFAULT_MAX_DEPTH};
use crate::ingest::DEFAULT_BATCH_SIZE;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub ingest: IngestSettings,
    /// Confidence constants for extraction rules.
    pub extract: ExtractorConfig,
    pub traverse: TraverseSettings,
    pub retention: RetentionSettings,
}

/// Store location.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Database file path (supports ${ENV_VAR} expansion). When unset the
    /// store opens at its default location under the home directory.
    pub path: Option<String>,
}

impl StoreSettings {
    /// The configured path with environment variables expanded, or None for
    /// the default location.
    pub fn resolved_path(&self) -> Result<Option<PathBuf>, SettingsError> {
        match &self.path {
            Some(path) => Ok(Some(PathBuf::from(expand_env_vars(path)?))),
            None => Ok(None),
        }
    }
}

/// Ingestion pipeline knobs.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Rows fetched per batch.
    pub batch_size: usize,

    /// Query ids retained per edge as evidence.
    pub supporting_queries_cap: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            supporting_queries_cap: DEFAULT_SUPPORTING_QUERIES_CAP,
        }
    }
}

/// Traversal defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TraverseSettings {
    /// Hop bound when the caller does not pass one.
    pub max_depth: usize,

    /// Edges below this confidence are left out of walks by default.
    pub confidence_floor: f64,
}

impl Default for TraverseSettings {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            confidence_floor: DEFAULT_CONFIDENCE_FLOOR,
        }
    }
}

/// Retention sweep policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetentionSettings {
    /// Edges unobserved for this many days are swept.
    pub edge_days: i64,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            edge_days: RetentionPolicy::default().edge_days,
        }
    }
}

impl RetentionSettings {
    pub fn policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            edge_days: self.edge_days,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `TRELLIS_CONFIG`
    /// 2. `./trellis.toml`
    /// 3. `~/.config/trellis/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("TRELLIS_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("trellis.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("trellis").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Reject values outside their meaningful ranges.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.ingest.batch_size == 0 {
            return Err(SettingsError::InvalidConfig(
                "ingest.batch_size must be at least 1".to_string(),
            ));
        }
        if self.ingest.supporting_queries_cap == 0 {
            return Err(SettingsError::InvalidConfig(
                "ingest.supporting_queries_cap must be at least 1".to_string(),
            ));
        }
        if self.retention.edge_days <= 0 {
            return Err(SettingsError::InvalidConfig(
                "retention.edge_days must be positive".to_string(),
            ));
        }

        let confidences = [
            ("extract.direct_copy", self.extract.direct_copy),
            ("extract.calculation", self.extract.calculation),
            ("extract.aggregation", self.extract.aggregation),
            ("extract.predicate", self.extract.predicate),
            ("extract.wildcard_copy", self.extract.wildcard_copy),
            ("extract.wildcard_unknown", self.extract.wildcard_unknown),
            ("extract.chain_floor", self.extract.chain_floor),
            ("traverse.confidence_floor", self.traverse.confidence_floor),
        ];
        for (name, value) in confidences {
            if !(0.0..=1.0).contains(&value) {
                return Err(SettingsError::InvalidConfig(format!(
                    "{} must be within 0.0..=1.0, got {}",
                    name, value
                )));
            }
        }

        Ok(())
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax. A `$` followed by neither `{` nor an
/// identifier character is kept literally.
pub fn expand_env_vars(input: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let braced = chars.peek() == Some(&'{');
        if braced {
            chars.next();
        }

        let mut name = String::new();
        while let Some(&next) = chars.peek() {
            let part_of_name = if braced {
                next != '}'
            } else {
                next.is_alphanumeric() || next == '_'
            };
            if !part_of_name {
                break;
            }
            name.push(next);
            chars.next();
        }

        if braced {
            if chars.next() != Some('}') {
                return Err(SettingsError::InvalidConfig(format!(
                    "unterminated ${{...}} in \"{}\"",
                    input
                )));
            }
            if name.is_empty() {
                return Err(SettingsError::InvalidConfig(format!(
                    "empty ${{}} in \"{}\"",
                    input
                )));
            }
        } else if name.is_empty() {
            result.push('$');
            continue;
        }

        let value = env::var(&name).map_err(|_| SettingsError::MissingEnvVar(name))?;
        result.push_str(&value);
    }

    Ok(result)
}
