//! Partition key scheme.
//!
//! Maps `(queue, shard, partition)` to a physical [`RowKey`]. The queue part is
//! a SHA-1 of the queue's relative URL so that keys stay short and do not
//! depend on the host the queue was addressed through.

use std::fmt::Write as _;

use rand::Rng;
use rand::seq::SliceRandom;
use sha1::{Digest, Sha1};

use crate::domain::{RowKey, relative_url};

/// Hex SHA-1 of the queue's relative URL.
pub fn hash_queue_url(queue_url: &str) -> String {
    let digest = Sha1::digest(relative_url(queue_url).as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest.iter() {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

pub fn row_key(queue_url: &str, shard: u32, partition: u32) -> RowKey {
    RowKey::new(hash_queue_url(queue_url), shard, partition)
}

/// Uniform choice in `[0, n)`. `n` of zero is treated as one.
pub fn random_partition(n: u32) -> u32 {
    rand::thread_rng().gen_range(0..n.max(1))
}

/// `[0, n)` in random order.
pub fn shuffled(n: u32) -> Vec<u32> {
    let mut all: Vec<u32> = (0..n).collect();
    all.shuffle(&mut rand::thread_rng());
    all
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn hash_is_host_independent() {
        assert_eq!(
            hash_queue_url("http://a:6059/123/orders"),
            hash_queue_url("https://b/123/orders/")
        );
        assert_ne!(hash_queue_url("123/orders"), hash_queue_url("123/payments"));
        assert_eq!(hash_queue_url("123/orders").len(), 40);
    }

    #[test]
    fn row_key_embeds_shard_and_partition() {
        let key = row_key("123/orders", 2, 5);
        assert_eq!(key.shard(), 2);
        assert_eq!(key.partition(), 5);
        assert!(key.to_string().ends_with("_2_5"));
    }

    #[test]
    fn random_partition_stays_in_range() {
        for _ in 0..200 {
            assert!(random_partition(3) < 3);
        }
        assert_eq!(random_partition(0), 0);
    }

    #[test]
    fn shuffled_is_a_permutation() {
        let order = shuffled(16);
        let unique: HashSet<u32> = order.iter().copied().collect();
        assert_eq!(order.len(), 16);
        assert_eq!(unique, (0..16).collect());
    }
}
