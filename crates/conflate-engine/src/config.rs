use std::fs;
use std::path::{Path, PathBuf};

use conflate_tokenize::TokenTable;
use conflate_types::Context;
use serde::{Deserialize, Serialize};

use crate::error::{ConflateError, ConflateResult};
use crate::mapping;

/// Candidates at or beyond this great-circle distance never match.
pub const MATCH_RADIUS_KM: f64 = 0.5;

/// Upper bound on the default worker count.
pub const MAX_DEFAULT_WORKERS: usize = 16;

/// Tunables shared by the coordinator, workers and grouping pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Input lines read per batch before the batch is drained.
    pub batch_size: usize,
    /// Concurrent store operations per worker within a batch.
    pub max_in_flight: usize,
    /// Groups fetched per staging-store page in the grouping pass.
    pub page_size: usize,
    /// Coarse planar bound for the candidate prefilter, in degrees.
    pub prefilter_degrees: f64,
    /// Connections per store allocation.
    pub max_connections: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_in_flight: 10,
            page_size: 1000,
            prefilter_degrees: 0.02,
            max_connections: 10,
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> ConflateResult<()> {
        if self.batch_size == 0 {
            return Err(ConflateError::Config("batch_size must be at least 1".into()));
        }
        if self.max_in_flight == 0 {
            return Err(ConflateError::Config("max_in_flight must be at least 1".into()));
        }
        if self.page_size == 0 {
            return Err(ConflateError::Config("page_size must be at least 1".into()));
        }
        if self.max_connections == 0 {
            return Err(ConflateError::Config("max_connections must be at least 1".into()));
        }
        if !self.prefilter_degrees.is_finite() || self.prefilter_degrees <= 0.0 {
            return Err(ConflateError::Config(format!(
                "prefilter_degrees must be positive, got {}",
                self.prefilter_degrees
            )));
        }
        Ok(())
    }
}

/// On-disk configuration file (`conflate.toml`).
///
/// ```toml
/// [engine]
/// batch_size = 100
/// max_in_flight = 10
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub engine: EngineSettings,
}

impl ConfigFile {
    pub fn load(path: &Path) -> ConflateResult<Self> {
        let data = fs::read_to_string(path)
            .map_err(|e| ConflateError::Config(format!("{}: {e}", path.display())))?;
        toml::from_str(&data).map_err(|e| ConflateError::Config(format!("{}: {e}", path.display())))
    }
}

/// Default worker count: available parallelism, capped at
/// [`MAX_DEFAULT_WORKERS`].
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_DEFAULT_WORKERS)
}

/// One conflation run.
#[derive(Clone, Debug)]
pub struct Job {
    /// Line-delimited input features.
    pub input: PathBuf,
    pub workers: usize,
    pub context: Context,
    pub tokens: Option<TokenTable>,
    /// Name of a registered mapping function.
    pub mapping: Option<String>,
    pub settings: EngineSettings,
}

impl Job {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            workers: default_workers(),
            context: Context::default(),
            tokens: None,
            mapping: None,
            settings: EngineSettings::default(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn with_tokens(mut self, tokens: TokenTable) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn with_mapping(mut self, mapping: impl Into<String>) -> Self {
        self.mapping = Some(mapping.into());
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Reject configurations that cannot run. Called before spawning.
    pub fn validate(&self) -> ConflateResult<()> {
        if self.workers == 0 {
            return Err(ConflateError::Config("worker count must be at least 1".into()));
        }
        if !self.input.is_file() {
            return Err(ConflateError::Config(format!(
                "input file not found: {}",
                self.input.display()
            )));
        }
        if let Some(name) = &self.mapping {
            if mapping::lookup(name).is_none() {
                return Err(ConflateError::Config(format!(
                    "unknown mapping function: {name} (available: {})",
                    mapping::BUILTIN_MAPPERS.join(", ")
                )));
            }
        }
        self.settings.validate()
    }
}
