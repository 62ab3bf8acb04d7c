//! Assembler configuration
//!
//! Defaults suit a standard mempool; a JSON file can override any subset of
//! fields, and command-line flags override the file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::Validator;
use crate::mining::{BlockBudget, MAX_BLOCK_WEIGHT};
use crate::script::ScriptFlags;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings for one assembly run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblerConfig {
    /// Directory holding one JSON record per candidate
    pub mempool_dir: PathBuf,
    /// Where the template file is written
    pub output: PathBuf,
    pub max_block_weight: usize,
    pub max_transactions: Option<usize>,
    /// Script execution budget per transaction, in milliseconds
    pub script_deadline_ms: Option<u64>,
    /// Reject later candidates spending an outpoint an earlier one spends
    pub reject_batch_conflicts: bool,
    pub enable_p2sh: bool,
    pub enable_witness: bool,
    pub require_low_s: bool,
    /// Validation worker threads; rayon's default when unset
    pub threads: Option<usize>,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            mempool_dir: PathBuf::from("mempool"),
            output: PathBuf::from("output.json"),
            max_block_weight: MAX_BLOCK_WEIGHT,
            max_transactions: None,
            script_deadline_ms: None,
            reject_batch_conflicts: true,
            enable_p2sh: true,
            enable_witness: true,
            require_low_s: true,
            threads: None,
        }
    }
}

impl AssemblerConfig {
    /// Load a configuration file; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.check()?;
        Ok(config)
    }

    /// Reject settings no run could satisfy
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.max_block_weight == 0 {
            return Err(ConfigError::Invalid(
                "max_block_weight must be positive".to_string(),
            ));
        }
        if self.threads == Some(0) {
            return Err(ConfigError::Invalid("threads must be positive".to_string()));
        }
        Ok(())
    }

    /// Script rules selected by the flags
    pub fn script_flags(&self) -> ScriptFlags {
        let mut flags = ScriptFlags::empty();
        flags.set(ScriptFlags::P2SH, self.enable_p2sh);
        flags.set(ScriptFlags::WITNESS, self.enable_witness);
        flags.set(ScriptFlags::LOW_S, self.require_low_s);
        flags
    }

    pub fn script_deadline(&self) -> Option<Duration> {
        self.script_deadline_ms.map(Duration::from_millis)
    }

    pub fn budget(&self) -> BlockBudget {
        BlockBudget {
            max_weight: self.max_block_weight,
            max_transactions: self.max_transactions,
        }
    }

    /// Validator for these settings
    pub fn validator(&self) -> Validator {
        Validator::new(self.script_flags()).with_script_deadline(self.script_deadline())
    }
}
