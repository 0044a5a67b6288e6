//! Run configuration, loadable from TOML
//!
//! ```toml
//! max_iterations = 10
//! max_depth = 3
//! termination = "binding"
//!
//! [provider]
//! kind = "openrouter"
//! model = "openai/gpt-4o-mini"
//!
//! [retry]
//! max_attempts = 3
//! delay_ms = 1000
//! ```

use std::fs;
use std::path::Path;

use rlm_runtime::{
    EnvironmentConfig, Error, KernelConfig, ProviderConfig, Result, RetryPolicy, SnapshotConfig,
};
use serde::{Deserialize, Serialize};

/// How the loop decides that an answer exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminationMode {
    /// Read the `FINAL` binding after every iteration
    #[default]
    Binding,
    /// Scan the reply for a line-anchored `FINAL(...)` / `FINAL_VAR(name)`
    Pattern,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RlmConfig {
    /// Iteration ceiling for one `run()`
    pub max_iterations: usize,
    /// Deepest nesting `sub_rlm` may reach below the root
    pub max_depth: usize,
    pub termination: TerminationMode,
    pub snapshot: SnapshotConfig,
    pub kernel: KernelConfig,
    pub provider: ProviderConfig,
    pub retry: RetryPolicy,
}

impl Default for RlmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_depth: 3,
            termination: TerminationMode::default(),
            snapshot: SnapshotConfig::default(),
            kernel: KernelConfig::default(),
            provider: ProviderConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl RlmConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| -> Result<()> {
            Err(Error::config_invalid(message).with_operation("config::validate"))
        };

        if self.max_iterations == 0 {
            return invalid("max_iterations must be > 0");
        }
        if self.snapshot.field_width == 0 || self.snapshot.prompt_head_width == 0 {
            return invalid("snapshot widths must be > 0");
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be > 0");
        }
        if self.kernel.python.trim().is_empty() {
            return invalid("kernel.python must name an interpreter");
        }
        Ok(())
    }

    pub fn environment(&self) -> EnvironmentConfig {
        EnvironmentConfig {
            snapshot: self.snapshot.clone(),
            kernel: self.kernel.clone(),
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RlmConfig::default()`.
pub fn load_config(path: &Path) -> Result<RlmConfig> {
    if !path.exists() {
        let config = RlmConfig::default();
        config.validate()?;
        return Ok(config);
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        Error::from(e)
            .with_operation("config::load")
            .with_context("path", path.display().to_string())
    })?;
    let config: RlmConfig = toml::from_str(&contents).map_err(|e| {
        Error::config_invalid(format!("parse {}: {}", path.display(), e))
            .with_operation("config::load")
            .set_source(e)
    })?;
    config.validate()?;
    Ok(config)
}
