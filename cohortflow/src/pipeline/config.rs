//! Pipeline configuration.

use crate::core::WorkUnit;
use crate::errors::ConfigError;
use crate::stages::StageOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

fn default_run_name() -> String {
    "cohortflow".to_string()
}

/// Configuration for one pipeline.
///
/// Passed explicitly to the pipeline builder; nothing is read from global
/// state. Every field has a default, so `{}` is a valid (empty) document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Name reported to the stats sink and carried on every event.
    #[serde(default = "default_run_name")]
    pub run_name: String,
    /// Source references, in the order outputs are reported.
    #[serde(default)]
    pub sources: Vec<WorkUnit>,
    /// Transform identifiers applied to every fetched artifact, in order.
    #[serde(default)]
    pub transforms: Vec<String>,
    /// Per-stage cap on concurrently running tasks.
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    /// Per-stage join deadline in milliseconds.
    #[serde(default)]
    pub stage_timeout_ms: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            run_name: default_run_name(),
            sources: Vec::new(),
            transforms: Vec::new(),
            max_concurrency: None,
            stage_timeout_ms: None,
        }
    }
}

impl PipelineConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Sets the run name.
    #[must_use]
    pub fn with_run_name(mut self, name: impl Into<String>) -> Self {
        self.run_name = name.into();
        self
    }

    /// Appends a source reference.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<WorkUnit>) -> Self {
        self.sources.push(source.into());
        self
    }

    /// Appends several source references.
    #[must_use]
    pub fn with_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<WorkUnit>,
    {
        self.sources.extend(sources.into_iter().map(Into::into));
        self
    }

    /// Appends a transform identifier.
    #[must_use]
    pub fn with_transform(mut self, id: impl Into<String>) -> Self {
        self.transforms.push(id.into());
        self
    }

    /// Appends several transform identifiers.
    #[must_use]
    pub fn with_transforms<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.transforms.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Caps concurrently running tasks per stage.
    #[must_use]
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    /// Sets a per-stage deadline.
    #[must_use]
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Returns the per-stage deadline.
    #[must_use]
    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_ms.map(Duration::from_millis)
    }

    /// Returns the scope options every stage runs with.
    #[must_use]
    pub fn stage_options(&self) -> StageOptions {
        StageOptions {
            max_concurrency: self.max_concurrency,
            timeout: self.stage_timeout(),
        }
    }

    /// Checks the configuration for values that could never run.
    ///
    /// Sources and transform identifiers must be unique: every
    /// (source, transform) pair names exactly one stored output.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run_name.trim().is_empty() {
            return Err(ConfigError::EmptyRunName);
        }
        if self.max_concurrency == Some(0) {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.stage_timeout_ms == Some(0) {
            return Err(ConfigError::ZeroTimeout);
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.sources.iter().find(|unit| !seen.insert(unit.reference())) {
            return Err(ConfigError::DuplicateSource(dup.reference().to_string()));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.transforms.iter().find(|id| !seen.insert(id.as_str())) {
            return Err(ConfigError::DuplicateTransform(dup.clone()));
        }
        Ok(())
    }
}
