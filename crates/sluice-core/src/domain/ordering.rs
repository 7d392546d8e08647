//! Ordering keys, physical row keys and receipt handles.
//!
//! A message lives in exactly one physical row and is addressed inside that
//! row by its [`OrderingKey`]. The pair is rendered as the opaque string
//! `<rowKey>:<orderHigh>:<orderLow>`, which serves both as the message id
//! and as the receipt handle.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::SluiceError;

/// Composite intra-row sort key: coarse timestamp first, tie-breaker second.
///
/// The derived `Ord` compares `timestamp_ms` before `tiebreak`, which is the
/// order the column store keeps cells in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderingKey {
    pub timestamp_ms: i64,
    pub tiebreak: u64,
}

impl OrderingKey {
    pub const fn new(timestamp_ms: i64, tiebreak: u64) -> Self {
        Self {
            timestamp_ms,
            tiebreak,
        }
    }

    /// Smallest key carrying `timestamp_ms`.
    pub const fn earliest_at(timestamp_ms: i64) -> Self {
        Self::new(timestamp_ms, 0)
    }

    /// Largest key carrying `timestamp_ms`.
    pub const fn latest_at(timestamp_ms: i64) -> Self {
        Self::new(timestamp_ms, u64::MAX)
    }
}

impl fmt::Display for OrderingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.timestamp_ms, self.tiebreak)
    }
}

/// Address of one physical row: `<queueHash>_<shard>_<partition>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey {
    queue_hash: String,
    shard: u32,
    partition: u32,
}

impl RowKey {
    pub fn new(queue_hash: impl Into<String>, shard: u32, partition: u32) -> Self {
        Self {
            queue_hash: queue_hash.into(),
            shard,
            partition,
        }
    }

    pub fn queue_hash(&self) -> &str {
        &self.queue_hash
    }

    pub fn shard(&self) -> u32 {
        self.shard
    }

    pub fn partition(&self) -> u32 {
        self.partition
    }

    /// Same queue and shard, different partition.
    pub fn with_partition(&self, partition: u32) -> Self {
        Self::new(self.queue_hash.clone(), self.shard, partition)
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.queue_hash, self.shard, self.partition)
    }
}

impl FromStr for RowKey {
    type Err = SluiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('_').collect();
        let [hash, shard, partition] = parts.as_slice() else {
            return Err(SluiceError::corrupt(format!("invalid row key {s}")));
        };
        if hash.is_empty() || hash.contains(':') {
            return Err(SluiceError::corrupt(format!("invalid row key {s}")));
        }
        let shard = shard
            .parse::<u32>()
            .map_err(|_| SluiceError::corrupt(format!("invalid shard number in row key {s}")))?;
        let partition = partition
            .parse::<u32>()
            .map_err(|_| SluiceError::corrupt(format!("invalid partition number in row key {s}")))?;
        Ok(Self::new(*hash, shard, partition))
    }
}

/// Locates exactly one stored message occurrence.
///
/// Callers must treat the rendered string as opaque; only this crate builds
/// or parses it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReceiptHandle {
    row: RowKey,
    key: OrderingKey,
}

/// Message ids share the receipt handle format.
pub type MessageId = ReceiptHandle;

impl ReceiptHandle {
    pub fn new(row: RowKey, key: OrderingKey) -> Self {
        Self { row, key }
    }

    pub fn row(&self) -> &RowKey {
        &self.row
    }

    pub fn key(&self) -> OrderingKey {
        self.key
    }
}

impl fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.row, self.key)
    }
}

impl FromStr for ReceiptHandle {
    type Err = SluiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let [row, high, low] = parts.as_slice() else {
            return Err(SluiceError::corrupt(format!("corrupt receipt handle {s}")));
        };
        let row = row.parse::<RowKey>()?;
        let timestamp_ms = high
            .parse::<i64>()
            .map_err(|_| SluiceError::corrupt(format!("corrupt receipt handle {s}")))?;
        let tiebreak = low
            .parse::<u64>()
            .map_err(|_| SluiceError::corrupt(format!("corrupt receipt handle {s}")))?;
        Ok(Self::new(row, OrderingKey::new(timestamp_ms, tiebreak)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn handle_renders_as_three_segments() {
        let handle = ReceiptHandle::new(
            RowKey::new("ab12cd", 0, 3),
            OrderingKey::new(1_700_000_000_000, 42),
        );
        assert_eq!(handle.to_string(), "ab12cd_0_3:1700000000000:42");

        let parsed: ReceiptHandle = handle.to_string().parse().unwrap();
        assert_eq!(parsed, handle);
        assert_eq!(parsed.row().partition(), 3);
    }

    #[rstest]
    #[case("x:y")]
    #[case("")]
    #[case("ab_0_1:12")]
    #[case("ab_0_1:12:34:56")]
    #[case("ab_0:12:34")]
    #[case("ab_0_z:12:34")]
    #[case("ab_0_1:twelve:34")]
    #[case("ab_0_1:12:-3")]
    fn malformed_handles_are_corrupt(#[case] raw: &str) {
        let err = raw.parse::<ReceiptHandle>().unwrap_err();
        assert!(matches!(err, SluiceError::CorruptRecord(_)), "{raw}: {err}");
    }

    #[test]
    fn ordering_keys_sort_by_time_then_tiebreak() {
        let a = OrderingKey::new(10, 5);
        let b = OrderingKey::new(10, 6);
        let c = OrderingKey::new(11, 0);
        assert!(a < b && b < c);
        assert!(OrderingKey::earliest_at(10) < a);
        assert!(OrderingKey::latest_at(10) > b);
        assert!(OrderingKey::latest_at(10) < c);
    }
}
