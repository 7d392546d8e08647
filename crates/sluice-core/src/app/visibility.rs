//! VisibilityTracker - 受信済み（in-flight）メッセージの表
//!
//! # 設計原則
//! - receipt handle → 再表示時刻（ミリ秒）の並行マップ
//! - 再表示時刻を過ぎるまで、他の receive はそのメッセージを取れない
//! - delete / 期限切れでエントリを外す
//! - プロセス内の状態のみ（再起動で失われる = at-least-once）

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::domain::ReceiptHandle;

/// Receives between two purges of expired entries.
const PURGE_EVERY: u64 = 256;

#[derive(Debug, Clone, Copy)]
struct InFlight {
    visible_at_ms: i64,
    receive_count: u32,
    first_receive_ms: i64,
    /// The stored message is gone by then; the entry can be dropped.
    retain_until_ms: i64,
}

/// Receive metadata handed back on a successful claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim {
    pub receive_count: u32,
    pub first_receive_ms: i64,
}

#[derive(Debug, Default)]
pub struct VisibilityTracker {
    entries: DashMap<ReceiptHandle, InFlight>,
    receives: AtomicU64,
}

impl VisibilityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hide `handle` for `timeout` unless another receive already holds it.
    pub fn try_claim(
        &self,
        handle: &ReceiptHandle,
        now_ms: i64,
        timeout: Duration,
        retain_until_ms: i64,
    ) -> Option<Claim> {
        let visible_at_ms = now_ms.saturating_add(millis(timeout));
        match self.entries.entry(handle.clone()) {
            Entry::Occupied(mut held) => {
                let in_flight = held.get_mut();
                if in_flight.visible_at_ms > now_ms {
                    return None;
                }
                in_flight.visible_at_ms = visible_at_ms;
                in_flight.receive_count += 1;
                Some(Claim {
                    receive_count: in_flight.receive_count,
                    first_receive_ms: in_flight.first_receive_ms,
                })
            }
            Entry::Vacant(free) => {
                free.insert(InFlight {
                    visible_at_ms,
                    receive_count: 1,
                    first_receive_ms: now_ms,
                    retain_until_ms,
                });
                Some(Claim {
                    receive_count: 1,
                    first_receive_ms: now_ms,
                })
            }
        }
    }

    /// Restart the visibility window of an in-flight message.
    ///
    /// Returns `false` if the message is not currently hidden.
    pub fn change_visibility(&self, handle: &ReceiptHandle, now_ms: i64, timeout: Duration) -> bool {
        match self.entries.get_mut(handle) {
            Some(mut in_flight) if in_flight.visible_at_ms > now_ms => {
                in_flight.visible_at_ms = now_ms.saturating_add(millis(timeout));
                true
            }
            _ => false,
        }
    }

    pub fn forget(&self, handle: &ReceiptHandle) -> bool {
        self.entries.remove(handle).is_some()
    }

    pub fn is_hidden(&self, handle: &ReceiptHandle, now_ms: i64) -> bool {
        self.entries
            .get(handle)
            .is_some_and(|in_flight| in_flight.visible_at_ms > now_ms)
    }

    /// Hidden messages whose row belongs to `queue_hash`.
    pub fn in_flight_count(&self, queue_hash: &str, now_ms: i64) -> usize {
        self.entries
            .iter()
            .filter(|entry| {
                entry.key().row().queue_hash() == queue_hash && entry.value().visible_at_ms > now_ms
            })
            .count()
    }

    /// Drop every entry of one queue, e.g. after the queue was cleared.
    pub fn forget_queue(&self, queue_hash: &str) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|handle, _| handle.row().queue_hash() != queue_hash);
        before - self.entries.len()
    }

    /// Drop entries whose message has expired from the store.
    pub fn purge(&self, now_ms: i64) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, in_flight| in_flight.retain_until_ms > now_ms);
        before - self.entries.len()
    }

    /// Count one receive; purges every `PURGE_EVERY` calls.
    pub(crate) fn record_receive(&self, now_ms: i64) {
        let n = self.receives.fetch_add(1, Ordering::Relaxed) + 1;
        if n % PURGE_EVERY == 0 {
            let purged = self.purge(now_ms);
            if purged > 0 {
                tracing::debug!(event = "visibility_purge", purged);
            }
        }
    }
}

fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}
