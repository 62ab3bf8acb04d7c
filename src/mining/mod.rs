//! Block building from a batch of candidate transactions

pub mod assembler;
pub mod mempool;
pub mod pipeline;
pub mod ranker;

pub use assembler::{BlockAssembler, BlockBudget, BlockTemplate, TemplateEntry, MAX_BLOCK_WEIGHT};
pub use mempool::{BatchReport, Mempool, MempoolEntry, Rejection};
pub use pipeline::{build_block_template, Assembly, PipelineError};
pub use ranker::FeePriorityRanker;
