//! # weave-config
//!
//! Loadable configuration for callers embedding the parser (SPEC_FULL
//! §10.3), following `markdown-neuraxis-config::Config::load_from_path`
//! almost verbatim: read a TOML file, parse it, wrap both failure modes in
//! a `thiserror` enum.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {config_path}: {source}")]
    Read {
        config_path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file at {config_path}: {source}")]
    Parse {
        config_path: PathBuf,
        source: toml::de::Error,
    },
}

/// Parser-wide options, serializable via `serde` and loadable from TOML.
///
/// `recovery_enabled` defaults to `false` per spec.md §9's "Open question"
/// about the `recoveryEnabled` flag being off: the parser itself only
/// implements the `false` behavior (§7 policy, "recovery is disabled") —
/// this flag exists so a caller could flip it without touching the
/// parser's source, but flipping it currently has no observable effect.
/// See DESIGN.md.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    pub recovery_enabled: bool,
    pub default_scope: Vec<String>,
    pub doc_id_prefix: String,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            recovery_enabled: false,
            default_scope: vec!["session".to_string()],
            doc_id_prefix: "doc".to_string(),
        }
    }
}

impl ParserOptions {
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Option<Self>, ConfigError> {
        let config_path = config_path.as_ref();
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
            config_path: config_path.to_path_buf(),
            source,
        })?;

        let options: ParserOptions =
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                config_path: config_path.to_path_buf(),
                source,
            })?;

        Ok(Some(options))
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, config_path: P) -> anyhow::Result<()> {
        let config_path = config_path.as_ref();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }
}
