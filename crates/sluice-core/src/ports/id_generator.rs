//! OrderingKeyGenerator port - ordering key の生成
//!
//! ordering key は `(timestamp_ms, tiebreak)` の組です。
//! timestamp は呼び出し側が決め（now + delay）、tiebreak はこの generator が
//! プロセス内で一意になるように割り当てます。
//!
//! # 実装
//! - **ClockSeqGenerator**: node id + シーケンス番号（本番用）

use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::OrderingKey;

/// Low bits of the tie-breaker reserved for the per-process sequence.
const SEQ_BITS: u32 = 24;
const SEQ_MASK: u64 = (1 << SEQ_BITS) - 1;
const NODE_MASK: u64 = (1 << (64 - SEQ_BITS)) - 1;

/// OrderingKeyGenerator は同一ミリ秒内でも衝突しない key を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数タスクから同時に呼ばれる）
pub trait OrderingKeyGenerator: Send + Sync {
    fn next_key(&self, timestamp_ms: i64) -> OrderingKey;
}

/// ClockSeqGenerator は `node << 24 | seq` を tiebreak にする
///
/// node はプロセス起動時にランダムに決め、seq はアトミックに増やします。
/// 同一ミリ秒に 2^24 件を超えて送らない限り衝突しません。
#[derive(Debug)]
pub struct ClockSeqGenerator {
    node: u64,
    seq: AtomicU64,
}

impl ClockSeqGenerator {
    pub fn new() -> Self {
        Self::with_node(rand::random::<u64>())
    }

    /// Fixed node id (tests, or nodes that persist their id).
    pub fn with_node(node: u64) -> Self {
        Self {
            node: node & NODE_MASK,
            seq: AtomicU64::new(0),
        }
    }

    pub fn node(&self) -> u64 {
        self.node
    }
}

impl Default for ClockSeqGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderingKeyGenerator for ClockSeqGenerator {
    fn next_key(&self, timestamp_ms: i64) -> OrderingKey {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) & SEQ_MASK;
        OrderingKey::new(timestamp_ms, (self.node << SEQ_BITS) | seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn same_millisecond_keys_are_distinct_and_increasing() {
        let keys = ClockSeqGenerator::with_node(7);
        let a = keys.next_key(1000);
        let b = keys.next_key(1000);

        assert_ne!(a, b);
        assert!(a < b);
        assert_eq!(a.timestamp_ms, 1000);
        assert_eq!(a.tiebreak >> SEQ_BITS, 7);
    }

    #[test]
    fn concurrent_generation_never_collides() {
        let keys = Arc::new(ClockSeqGenerator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let keys = Arc::clone(&keys);
                std::thread::spawn(move || (0..1000).map(|_| keys.next_key(5)).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for key in handle.join().unwrap() {
                assert!(seen.insert(key), "duplicate key {key}");
            }
        }
        assert_eq!(seen.len(), 8000);
    }
}
