//! Candidate transaction batch (mempool)
//!
//! Holds one run's worth of candidates in their original order and takes them
//! through validation. Production-grade features:
//! - Parallel validation across worker threads (rayon)
//! - Sequential merge of per-transaction verdicts
//! - Outpoint reservation against conflicting spends within the batch

use std::collections::{HashMap, HashSet};

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::{OutPoint, RejectReason, Transaction, ValidationStatus, Validator, Verdict};

// =============================================================================
// Entries and Rejections
// =============================================================================

/// A candidate transaction with the name of the record it came from
#[derive(Debug, Clone)]
pub struct MempoolEntry {
    /// Record name (file name for loaded batches)
    pub source: String,
    pub tx: Transaction,
}

/// A candidate excluded from the valid set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub source: String,
    /// Absent when the record never became a transaction
    pub txid: Option<String>,
    /// Failure class, e.g. `DuplicateInput`
    pub tag: String,
    pub reason: String,
}

impl Rejection {
    pub fn new(source: &str, txid: Option<String>, reason: &RejectReason) -> Self {
        Self {
            source: source.to_string(),
            txid,
            tag: reason.tag().to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Summary of one validation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Records considered, including those that failed to decode
    pub considered: usize,
    pub valid: usize,
    pub rejected: Vec<Rejection>,
}

impl BatchReport {
    /// Rejection count per failure class
    pub fn rejections_by_tag(&self) -> HashMap<&str, usize> {
        let mut counts = HashMap::new();
        for rejection in &self.rejected {
            *counts.entry(rejection.tag.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

// =============================================================================
// Mempool
// =============================================================================

/// Candidate transactions for one assembly run
#[derive(Debug, Default)]
pub struct Mempool {
    /// Decoded candidates in original order
    entries: Vec<MempoolEntry>,
    /// Records rejected before they became transactions
    undecodable: Vec<Rejection>,
}

impl Mempool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pool from transactions, named by position
    pub fn from_transactions(transactions: Vec<Transaction>) -> Self {
        let mut pool = Self::new();
        for (index, tx) in transactions.into_iter().enumerate() {
            pool.add(format!("#{}", index), tx);
        }
        pool
    }

    /// Append a decoded candidate
    pub fn add(&mut self, source: impl Into<String>, tx: Transaction) {
        self.entries.push(MempoolEntry {
            source: source.into(),
            tx,
        });
    }

    /// Record a candidate that could not be decoded
    pub fn add_undecodable(&mut self, source: &str, reason: RejectReason) {
        warn!("Skipping record {}: {}", source, reason);
        self.undecodable.push(Rejection::new(source, None, &reason));
    }

    pub fn entries(&self) -> &[MempoolEntry] {
        &self.entries
    }

    /// Number of decoded candidates
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Validate every candidate in parallel
    ///
    /// Each worker touches only its own transaction; the verdicts come back in
    /// original order.
    pub fn validate_all(&mut self, validator: &Validator) -> Vec<Verdict> {
        let verdicts: Vec<Verdict> = self
            .entries
            .par_iter_mut()
            .map(|entry| validator.validate(&mut entry.tx))
            .collect();

        let valid = verdicts.iter().filter(|verdict| verdict.is_valid()).count();
        info!(
            "Validated {} transactions: {} valid, {} rejected",
            verdicts.len(),
            valid,
            verdicts.len() - valid
        );
        verdicts
    }

    /// Reject valid candidates spending an outpoint an earlier valid candidate
    /// already spends
    ///
    /// Returns the number of candidates rejected.
    pub fn reserve_outpoints(&mut self) -> usize {
        let mut reserved: HashSet<OutPoint> = HashSet::new();
        let mut conflicts = 0;

        for entry in &mut self.entries {
            if !entry.tx.is_valid() {
                continue;
            }

            let conflict = entry
                .tx
                .outpoints()
                .enumerate()
                .find(|(_, outpoint)| reserved.contains(*outpoint))
                .map(|(index, outpoint)| RejectReason::ConflictsWithBatch {
                    index,
                    outpoint: *outpoint,
                });

            match conflict {
                Some(reason) => {
                    debug!("Rejecting {} ({}): {}", entry.source, entry.tx.txid_hex(), reason);
                    entry.tx.set_status(ValidationStatus::Rejected(reason));
                    conflicts += 1;
                }
                None => {
                    reserved.extend(entry.tx.outpoints().copied());
                }
            }
        }

        if conflicts > 0 {
            info!("Rejected {} transactions conflicting within the batch", conflicts);
        }
        conflicts
    }

    /// Split the pool into its valid transactions and a report
    ///
    /// Valid transactions keep their original order.
    pub fn into_batch(self) -> (Vec<Transaction>, BatchReport) {
        let mut report = BatchReport {
            considered: self.entries.len() + self.undecodable.len(),
            valid: 0,
            rejected: self.undecodable,
        };

        let mut valid = Vec::with_capacity(self.entries.len());
        for entry in self.entries {
            if entry.tx.is_valid() {
                valid.push(entry.tx);
            } else if let Some(reason) = entry.tx.rejection() {
                debug!("Rejected {} ({}): {}", entry.source, entry.tx.txid_hex(), reason);
                report
                    .rejected
                    .push(Rejection::new(&entry.source, Some(entry.tx.txid_hex()), reason));
            }
        }

        report.valid = valid.len();
        (valid, report)
    }
}
