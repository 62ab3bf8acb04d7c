//! Mempool loading and template persistence
//!
//! Reads candidate records from a mempool directory and writes the assembled
//! template. I/O failures are fatal to the run; a record that cannot be
//! decoded only rejects that record.

use std::fs;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{RejectReason, Transaction, TransactionRecord};
use crate::mining::{BatchReport, BlockTemplate, Mempool};

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Record file extension
pub const RECORD_EXTENSION: &str = "json";

/// The persisted result of one assembly run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateFile {
    pub generated_at: DateTime<Utc>,
    pub report: BatchReport,
    pub template: BlockTemplate,
}

impl TemplateFile {
    /// Stamp a run's output with the current time
    pub fn new(report: BatchReport, template: BlockTemplate) -> Self {
        Self {
            generated_at: Utc::now(),
            report,
            template,
        }
    }
}

/// Decode one JSON record into a transaction
pub fn decode_record(bytes: &[u8]) -> Result<Transaction, RejectReason> {
    TransactionRecord::from_json(bytes)?.to_transaction()
}

/// Record files in a mempool directory, sorted by file name
pub fn record_paths(dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
    if !dir.is_dir() {
        return Err(StorageError::InvalidData(format!(
            "Mempool directory not found: {}",
            dir.display()
        )));
    }

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == RECORD_EXTENSION) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Load every record in `dir` into a mempool, in file name order
pub fn load_mempool(dir: &Path) -> Result<Mempool, StorageError> {
    let mut mempool = Mempool::new();
    let paths = record_paths(dir)?;

    for path in &paths {
        let source = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let data = fs::read(path)?;

        match decode_record(&data) {
            Ok(tx) => mempool.add(source, tx),
            Err(reason) => mempool.add_undecodable(&source, reason),
        }
    }

    info!(
        "Loaded {} records from {} ({} decoded)",
        paths.len(),
        dir.display(),
        mempool.len()
    );
    Ok(mempool)
}

/// Load a single record file
pub fn load_record(path: &Path) -> Result<Result<Transaction, RejectReason>, StorageError> {
    let data = fs::read(path)?;
    Ok(decode_record(&data))
}

/// Write a template file atomically
pub fn save_template(path: &Path, template_file: &TemplateFile) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    // Write to temporary file first
    let temp_path = path.with_extension("tmp");
    let file = fs::File::create(&temp_path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, template_file)?;
    writer.flush()?;
    drop(writer);

    // Atomic rename
    fs::rename(&temp_path, path)?;

    info!("Template written to {}", path.display());
    Ok(())
}

/// Read a template file back
pub fn load_template(path: &Path) -> Result<TemplateFile, StorageError> {
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}
