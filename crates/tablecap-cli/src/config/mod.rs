//! Target file loading and setting resolution.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use tablecap::{
    CapturePlan, CaptureProfile, ColumnSpec, LoaderMode, LocatorExtractor, RowScope, Schema,
    SettlePolicy,
};

/// Environment variable naming the target file.
pub const TARGET_ENV: &str = "TABLECAP_TARGET";
/// Environment variable overriding the profile's cycle bound.
pub const MAX_CYCLES_ENV: &str = "TABLECAP_MAX_CYCLES";

const DEFAULT_INITIAL_WAIT_MS: u64 = 5_000;
const DEFAULT_READY_TIMEOUT_MS: u64 = 10_000;

/// Errors raised while loading a target file.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read target file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot parse target file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid target: {0}")]
    Invalid(String),
}

/// One output column in a target file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(flatten)]
    pub extractor: LocatorExtractor,
    /// Skip rows where this column is unavailable (header rows, filler rows).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
}

/// A capture target: where the table is and how to read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub url: String,
    pub scope: RowScope,
    pub columns: Vec<ColumnConfig>,
    #[serde(default)]
    pub loader: LoaderMode,
    #[serde(default)]
    pub settle: SettlePolicy,
    /// Pause after navigation before looking for the table.
    #[serde(default = "default_initial_wait_ms")]
    pub initial_wait_ms: u64,
    /// How long to wait for the row container to appear.
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,
}

fn default_initial_wait_ms() -> u64 {
    DEFAULT_INITIAL_WAIT_MS
}

fn default_ready_timeout_ms() -> u64 {
    DEFAULT_READY_TIMEOUT_MS
}

impl TargetConfig {
    /// Parse and validate a target from JSON text.
    pub fn from_json(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let target: TargetConfig =
            serde_json::from_str(text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        target.validate()?;
        Ok(target)
    }

    /// Load and validate a target file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text, path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Invalid("url is empty".into()));
        }
        if self.scope.container.trim().is_empty() || self.scope.rows.trim().is_empty() {
            return Err(ConfigError::Invalid("scope selectors must not be empty".into()));
        }
        Schema::new(self.column_names()).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }

    /// Display name: `name` if set, otherwise the URL.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Build the capture plan for this target.
    pub fn plan(&self, max_cycles: u32) -> CapturePlan {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let spec = ColumnSpec::new(c.name.clone(), Arc::new(c.extractor.clone()));
                if c.required {
                    spec.required()
                } else {
                    spec
                }
            })
            .collect();
        CapturePlan::new(self.scope.clone(), columns, self.loader.clone(), max_cycles)
            .with_settle(self.settle.clone())
    }
}

/// Resolve the target file path.
///
/// Order: explicit flag, `TABLECAP_TARGET`, `./tablecap.json`,
/// `~/.tablecap/target.json`.
pub fn resolve_target_path(explicit: Option<&str>) -> PathBuf {
    let cwd_target = PathBuf::from("tablecap.json");
    let cwd_target = cwd_target.exists().then_some(cwd_target);
    resolve_target_path_from(
        explicit,
        std::env::var(TARGET_ENV).ok(),
        cwd_target,
        dirs::home_dir(),
    )
}

fn resolve_target_path_from(
    explicit: Option<&str>,
    env: Option<String>,
    cwd_target: Option<PathBuf>,
    home: Option<PathBuf>,
) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }
    if let Some(path) = env.filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    if let Some(path) = cwd_target {
        return path;
    }
    home.unwrap_or_else(|| PathBuf::from("."))
        .join(".tablecap")
        .join("target.json")
}

/// Resolve the cycle bound: flag, then `TABLECAP_MAX_CYCLES`, then the profile.
pub fn resolve_max_cycles(flag: Option<u32>, profile: CaptureProfile) -> u32 {
    resolve_max_cycles_from(flag, std::env::var(MAX_CYCLES_ENV).ok(), profile)
}

fn resolve_max_cycles_from(flag: Option<u32>, env: Option<String>, profile: CaptureProfile) -> u32 {
    if let Some(n) = flag {
        return n;
    }
    if let Some(raw) = env {
        match raw.trim().parse::<u32>() {
            Ok(n) if n > 0 => return n,
            _ => tracing::warn!("Ignoring invalid {MAX_CYCLES_ENV}={raw:?}"),
        }
    }
    profile.max_cycles()
}
