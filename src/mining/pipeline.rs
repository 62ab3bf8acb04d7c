//! Validation to template pipeline
//!
//! validate (parallel) -> reserve outpoints -> merge -> rank -> assemble

use log::info;
use rayon::ThreadPoolBuilder;
use thiserror::Error;

use super::assembler::{BlockAssembler, BlockTemplate};
use super::mempool::{BatchReport, Mempool};
use super::ranker::FeePriorityRanker;
use crate::config::AssemblerConfig;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to start validation workers: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Result of one assembly run
#[derive(Debug, Clone)]
pub struct Assembly {
    pub template: BlockTemplate,
    pub report: BatchReport,
}

/// Validate a batch and assemble a block template from its valid subset
pub fn build_block_template(
    mut mempool: Mempool,
    config: &AssemblerConfig,
) -> Result<Assembly, PipelineError> {
    let validator = config.validator();

    match config.threads {
        Some(threads) => {
            let pool = ThreadPoolBuilder::new().num_threads(threads).build()?;
            pool.install(|| mempool.validate_all(&validator));
        }
        None => {
            mempool.validate_all(&validator);
        }
    }

    if config.reject_batch_conflicts {
        mempool.reserve_outpoints();
    }

    // Barrier: ranking needs the complete valid set
    let (valid, report) = mempool.into_batch();
    info!(
        "{} of {} candidates valid",
        report.valid, report.considered
    );

    let ranked = FeePriorityRanker::new().rank(valid);
    let template = BlockAssembler::new(config.budget()).assemble(&ranked);

    Ok(Assembly { template, report })
}
