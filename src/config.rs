//! Index configuration: checksum policy, suggestion limits and the event hook.

use crate::error::IndexError;
use crate::telemetry::{noop_event_listener, IndexEventListener};

use config::{Config, File, FileFormat};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

/// Hard upper bound for tag value suggestions, whatever the caller asks for.
pub const DEFAULT_MAX_SUGGESTIONS: usize = 10_000;

/// Default bound on the tag value ids one series may carry under a single tag key.
pub const DEFAULT_MAX_TAG_VALUES_PER_SERIES: u32 = 1024;

/// Configuration shared by tag index flushers, readers and mergers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Recompute and compare the footer CRC32 before trusting a block.
    pub verify_checksums: bool,
    /// Cap applied to `limit` in tag value suggestions.
    pub max_suggestions: usize,
    /// Upper bound on the tag value ids of one series in a forward index block.
    /// Flushers reject larger lists, readers treat them as corruption.
    pub max_tag_values_per_series: u32,
    /// Structured event hook for observability (no-op by default).
    #[serde(skip, default = "noop_event_listener")]
    pub event_listener: Arc<dyn IndexEventListener>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            verify_checksums: true,
            max_suggestions: DEFAULT_MAX_SUGGESTIONS,
            max_tag_values_per_series: DEFAULT_MAX_TAG_VALUES_PER_SERIES,
            event_listener: noop_event_listener(),
        }
    }
}

impl IndexConfig {
    /// Parses a TOML document; missing fields fall back to defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, IndexError> {
        let cfg = Config::builder()
            .add_source(File::from_str(s, FileFormat::Toml))
            .build()?;
        let parsed: IndexConfig = cfg.try_deserialize()?;
        parsed.validate()
    }

    /// Loads a TOML config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, IndexError> {
        let cfg = Config::builder()
            .add_source(File::from(path.as_ref()).format(FileFormat::Toml))
            .build()?;
        let parsed: IndexConfig = cfg.try_deserialize()?;
        parsed.validate()
    }

    pub fn with_event_listener(mut self, listener: Arc<dyn IndexEventListener>) -> Self {
        self.event_listener = listener;
        self
    }

    fn validate(self) -> Result<Self, IndexError> {
        if self.max_suggestions == 0 {
            return Err(IndexError::Config(
                "max_suggestions must be greater than zero".to_string(),
            ));
        }
        if self.max_tag_values_per_series == 0 {
            return Err(IndexError::Config(
                "max_tag_values_per_series must be greater than zero".to_string(),
            ));
        }
        Ok(self)
    }
}
