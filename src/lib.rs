//! Mempool Assembler: transaction validation and block template assembly
//!
//! This crate takes a batch of candidate transactions and produces a block
//! template from the valid ones:
//! - Bitcoin script execution (P2PK, P2PKH, P2SH, P2WPKH, bare multisig)
//! - ECDSA signature checks (secp256k1) over legacy and BIP143 digests
//! - Parallel batch validation with per-transaction verdicts
//! - Fee and priority ranking under a block weight budget
//! - JSON record loading and atomic template output
//!
//! # Example
//!
//! ```rust,no_run
//! use mempool_assembler::config::AssemblerConfig;
//! use mempool_assembler::mining::build_block_template;
//! use mempool_assembler::storage::load_mempool;
//!
//! let config = AssemblerConfig::default();
//! let mempool = load_mempool(&config.mempool_dir)?;
//! let assembly = build_block_template(mempool, &config)?;
//! println!(
//!     "{} of {} transactions selected, fee {}",
//!     assembly.template.transaction_count,
//!     assembly.report.considered,
//!     assembly.template.total_fee
//! );
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod crypto;
pub mod mining;
pub mod script;
pub mod storage;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::AssemblerConfig;
pub use core::{RejectReason, Transaction, Validator, Verdict};
pub use crypto::KeyPair;
pub use mining::{build_block_template, BlockAssembler, BlockTemplate, FeePriorityRanker, Mempool};
pub use script::{ScriptEngine, ScriptFlags};
pub use storage::{load_mempool, save_template, TemplateFile};
