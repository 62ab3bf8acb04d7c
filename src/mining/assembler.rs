//! Block template assembly
//!
//! Takes the ranked transactions and selects the prefix that fits the block
//! budget.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::core::Transaction;
use crate::crypto::reversed_hex;

/// Consensus limit on block weight (BIP141)
pub const MAX_BLOCK_WEIGHT: usize = 4_000_000;

/// Limits on what a template may contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockBudget {
    /// Cumulative weight of the selected transactions
    pub max_weight: usize,
    /// Cap on the number of transactions, if any
    pub max_transactions: Option<usize>,
}

impl Default for BlockBudget {
    fn default() -> Self {
        Self {
            max_weight: MAX_BLOCK_WEIGHT,
            max_transactions: None,
        }
    }
}

/// One selected transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateEntry {
    pub txid: String,
    pub wtxid: String,
    pub fee: i64,
    pub priority: i64,
    pub weight: usize,
}

/// An ordered candidate block body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTemplate {
    pub transaction_count: usize,
    /// Transaction identifiers in block order
    pub txids: Vec<String>,
    pub total_fee: i64,
    pub total_weight: usize,
    pub entries: Vec<TemplateEntry>,
}

impl BlockTemplate {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builds block templates from ranked transactions
#[derive(Debug, Clone, Default)]
pub struct BlockAssembler {
    budget: BlockBudget,
}

impl BlockAssembler {
    pub fn new(budget: BlockBudget) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> &BlockBudget {
        &self.budget
    }

    /// Select the longest prefix of `ranked` that fits the budget
    ///
    /// Selection stops at the first transaction that would exceed a limit, so
    /// the template is always a prefix of the ranked order. Transactions
    /// without a fee (not validated) are never selected.
    pub fn assemble(&self, ranked: &[Transaction]) -> BlockTemplate {
        let mut template = BlockTemplate::default();

        for tx in ranked {
            let (Some(fee), Some(priority)) = (tx.fee(), tx.priority()) else {
                debug!("Stopping at unvalidated transaction {}", tx.txid_hex());
                break;
            };

            if self
                .budget
                .max_transactions
                .is_some_and(|max| template.entries.len() >= max)
            {
                debug!("Transaction limit reached");
                break;
            }

            let weight = tx.weight();
            if template.total_weight + weight > self.budget.max_weight {
                debug!(
                    "Block weight limit reached at {} ({} + {} > {})",
                    tx.txid_hex(),
                    template.total_weight,
                    weight,
                    self.budget.max_weight
                );
                break;
            }

            let txid = tx.txid_hex();
            template.txids.push(txid.clone());
            template.entries.push(TemplateEntry {
                txid,
                wtxid: reversed_hex(&tx.wtxid()),
                fee,
                priority,
                weight,
            });
            template.total_fee = template.total_fee.saturating_add(fee);
            template.total_weight += weight;
        }

        template.transaction_count = template.entries.len();
        info!(
            "Assembled template: {} transactions, fee {}, weight {}",
            template.transaction_count, template.total_fee, template.total_weight
        );
        template
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ValidationStatus;
    use crate::testing::{key, outpoint, TxBuilder};

    fn valid_tx(seed: u8, fee: i64) -> Transaction {
        let mut tx = TxBuilder::new()
            .spend_p2pkh(&key(seed), outpoint(seed, 0), 100_000)
            .pay(1_000)
            .build();
        tx.set_status(ValidationStatus::Valid { fee, priority: fee });
        tx
    }

    #[test]
    fn test_unbounded_takes_everything() {
        let ranked = vec![valid_tx(70, 30), valid_tx(71, 20), valid_tx(72, 10)];
        let template = BlockAssembler::default().assemble(&ranked);

        assert_eq!(template.transaction_count, 3);
        assert_eq!(template.total_fee, 60);
        assert_eq!(template.txids[0], ranked[0].txid_hex());
        assert_eq!(
            template.total_weight,
            ranked.iter().map(Transaction::weight).sum::<usize>()
        );
    }

    #[test]
    fn test_weight_budget_selects_prefix() {
        let ranked = vec![valid_tx(73, 30), valid_tx(74, 20), valid_tx(75, 10)];
        let budget = BlockBudget {
            max_weight: ranked[0].weight() + ranked[1].weight() + 1,
            max_transactions: None,
        };
        let template = BlockAssembler::new(budget).assemble(&ranked);

        assert_eq!(template.transaction_count, 2);
        assert_eq!(template.txids, vec![ranked[0].txid_hex(), ranked[1].txid_hex()]);
    }

    #[test]
    fn test_transaction_cap() {
        let ranked = vec![valid_tx(76, 3), valid_tx(77, 2), valid_tx(78, 1)];
        let budget = BlockBudget {
            max_transactions: Some(1),
            ..BlockBudget::default()
        };
        let template = BlockAssembler::new(budget).assemble(&ranked);
        assert_eq!(template.transaction_count, 1);
        assert_eq!(template.total_fee, 3);
    }

    #[test]
    fn test_assembly_is_deterministic() {
        let ranked = vec![valid_tx(79, 5), valid_tx(80, 4)];
        let assembler = BlockAssembler::default();
        assert_eq!(assembler.assemble(&ranked), assembler.assemble(&ranked));
    }

    #[test]
    fn test_empty_input() {
        let template = BlockAssembler::default().assemble(&[]);
        assert!(template.is_empty());
        assert_eq!(template.total_fee, 0);
    }
}
