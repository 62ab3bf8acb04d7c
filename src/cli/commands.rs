//! CLI commands for the assembler
//!
//! Implements the command handlers for the CLI interface.

use std::path::Path;

use crate::config::AssemblerConfig;
use crate::core::{Transaction, Verdict};
use crate::mining::{build_block_template, Assembly};
use crate::storage::{load_mempool, load_record, save_template, TemplateFile};

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Validate a mempool directory and write a block template
pub fn cmd_assemble(config: &AssemblerConfig) -> CliResult<Assembly> {
    println!("📂 Loading mempool from {:?}...", config.mempool_dir);
    let mempool = load_mempool(&config.mempool_dir)?;

    println!("🔍 Validating {} candidate(s)...", mempool.len());
    let assembly = build_block_template(mempool, config)?;
    let report = &assembly.report;
    let template = &assembly.template;

    println!("\n📊 Batch summary");
    println!("   ├─ Considered: {}", report.considered);
    println!("   ├─ Valid: {}", report.valid);
    println!("   └─ Rejected: {}", report.rejected.len());

    if !report.rejected.is_empty() {
        let mut by_tag: Vec<_> = report.rejections_by_tag().into_iter().collect();
        by_tag.sort();
        println!("\n❌ Rejections");
        for (tag, count) in by_tag {
            println!("   └─ {}: {}", tag, count);
        }
    }

    println!("\n🧱 Block template");
    println!("   ├─ Transactions: {}", template.transaction_count);
    println!("   ├─ Total fee: {} sats", template.total_fee);
    println!(
        "   └─ Weight: {} / {}",
        template.total_weight, config.max_block_weight
    );

    let file = TemplateFile::new(report.clone(), template.clone());
    save_template(&config.output, &file)?;
    println!("\n✅ Template written to {:?}", config.output);

    Ok(assembly)
}

/// Validate a single transaction record
pub fn cmd_validate(path: &Path, config: &AssemblerConfig) -> CliResult<Verdict> {
    println!("🔍 Validating {:?}...", path);

    let mut tx: Transaction = match load_record(path)? {
        Ok(tx) => tx,
        Err(reason) => {
            println!("❌ Record could not be decoded: {}", reason);
            return Ok(Verdict::Rejected(reason));
        }
    };

    let verdict = config.validator().validate(&mut tx);
    println!("   ├─ Txid: {}", tx.txid_hex());
    println!("   ├─ Inputs: {}, outputs: {}", tx.inputs.len(), tx.outputs.len());
    println!("   ├─ Weight: {} (vsize {})", tx.weight(), tx.vsize());

    match &verdict {
        Verdict::Valid { fee, priority } => {
            println!("   ├─ Fee: {} sats", fee);
            println!("   └─ Priority: {}", priority);
            println!("✅ Transaction is valid!");
        }
        Verdict::Rejected(reason) => {
            println!("   └─ Reason: {}", reason);
            println!("❌ Transaction rejected ({})", reason.tag());
        }
    }

    Ok(verdict)
}
