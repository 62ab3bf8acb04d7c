//! Fee and priority ordering of valid transactions

use std::cmp::Reverse;

use crate::core::Transaction;

/// Orders transactions by fee, then priority, both descending
///
/// The sort is stable: transactions equal on both keys keep their input
/// order, so the same batch always yields the same sequence.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeePriorityRanker;

impl FeePriorityRanker {
    pub fn new() -> Self {
        Self
    }

    /// Rank transactions into block order
    ///
    /// Unvalidated or rejected transactions carry no fee and sort last.
    pub fn rank(&self, mut transactions: Vec<Transaction>) -> Vec<Transaction> {
        transactions.sort_by_key(|tx| Reverse((tx.fee(), tx.priority())));
        transactions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ValidationStatus;
    use crate::testing::{key, outpoint, TxBuilder};

    fn with_status(seed: u8, fee: i64, priority: i64) -> Transaction {
        let mut tx = TxBuilder::new()
            .spend_p2pkh(&key(seed), outpoint(seed, 0), 100_000)
            .pay(1_000)
            .build();
        tx.set_status(ValidationStatus::Valid { fee, priority });
        tx
    }

    #[test]
    fn test_fee_then_priority_order() {
        let txs = vec![with_status(50, 10, 1), with_status(51, 30, 2), with_status(52, 30, 1)];
        let expected = [*txs[1].txid(), *txs[2].txid(), *txs[0].txid()];

        let ranked = FeePriorityRanker::new().rank(txs);
        let order: Vec<_> = ranked.iter().map(|tx| *tx.txid()).collect();
        assert_eq!(order, expected);
    }

    #[test]
    fn test_full_ties_keep_input_order() {
        let txs = vec![with_status(53, 5, 5), with_status(54, 5, 5), with_status(55, 5, 5)];
        let expected: Vec<_> = txs.iter().map(|tx| *tx.txid()).collect();

        let ranked = FeePriorityRanker::new().rank(txs);
        let order: Vec<_> = ranked.iter().map(|tx| *tx.txid()).collect();
        assert_eq!(order, expected);
    }

    #[test]
    fn test_ranking_is_repeatable() {
        let txs = vec![
            with_status(56, 1, 1),
            with_status(57, 9, 3),
            with_status(58, 9, 3),
            with_status(59, 4, 4),
        ];
        let first = FeePriorityRanker::new().rank(txs.clone());
        let second = FeePriorityRanker::new().rank(txs);
        assert_eq!(first, second);
    }

    #[test]
    fn test_unvalidated_sort_last() {
        let pending = TxBuilder::new()
            .spend_p2pkh(&key(60), outpoint(60, 0), 1_000)
            .pay(1)
            .build();
        let ranked = FeePriorityRanker::new().rank(vec![pending.clone(), with_status(61, 0, 0)]);
        assert_eq!(ranked[1].txid(), pending.txid());
    }
}
