//! LongPollCoordinator - queue ごとの待機リスト
//!
//! # 設計原則
//! - queue id → FIFO の待機リスト（`DashMap`、シャード単位のロック）
//! - send はメッセージを waiter に直接渡さない。起こすだけで、起きた側が再度
//!   store を読む
//! - waiter は終端状態に入る前（または同時）に必ずリストから外れる
//! - リストからの削除は冪等
//!
//! coordinator は `Clone` で、受信経路と送信通知経路の両方に同じものを渡す。

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::waiter::{Waiter, WaiterState};

#[derive(Default)]
struct Inner {
    lists: DashMap<String, VecDeque<Arc<Waiter>>>,
}

#[derive(Clone, Default)]
pub struct LongPollCoordinator {
    inner: Arc<Inner>,
}

/// Result of waiting on a parked receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A send signalled the queue; re-read the store.
    Woken,
    TimedOut,
}

impl LongPollCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a waiter for `queue_id` that expires at `deadline`.
    pub fn park(&self, queue_id: &str, deadline: Instant) -> ParkedReceive {
        let (waiter, wake) = Waiter::new(queue_id, deadline);
        self.inner
            .lists
            .entry(queue_id.to_string())
            .or_default()
            .push_back(Arc::clone(&waiter));
        tracing::trace!(event = "waiter_parked", queue_id, waiter = %waiter.id());
        ParkedReceive {
            waiter,
            wake,
            coordinator: self.clone(),
            settled: false,
        }
    }

    /// Wake up to `max_wakes` parked waiters of `queue_id`, oldest first.
    ///
    /// Returns the number actually woken.
    pub fn notify(&self, queue_id: &str, max_wakes: usize) -> usize {
        let mut woken = 0;
        while woken < max_wakes {
            let next = match self.inner.lists.get_mut(queue_id) {
                Some(mut list) => list.pop_front(),
                None => None,
            };
            let Some(waiter) = next else {
                break;
            };
            if waiter.resolve(WaiterState::Fulfilled) {
                woken += 1;
            }
        }
        self.prune(queue_id);
        if woken > 0 {
            tracing::debug!(event = "waiters_notified", queue_id, woken);
        }
        woken
    }

    /// Take `waiter` off its list. Safe to call any number of times.
    pub fn remove(&self, waiter: &Waiter) -> bool {
        let removed = match self.inner.lists.get_mut(waiter.queue_id()) {
            Some(mut list) => {
                let before = list.len();
                list.retain(|w| w.id() != waiter.id());
                list.len() != before
            }
            None => false,
        };
        self.prune(waiter.queue_id());
        removed
    }

    /// Parked waiters of one queue.
    pub fn waiting_count(&self, queue_id: &str) -> usize {
        self.inner
            .lists
            .get(queue_id)
            .map(|list| list.iter().filter(|w| !w.state().is_terminal()).count())
            .unwrap_or(0)
    }

    pub fn total_waiting(&self) -> usize {
        self.inner
            .lists
            .iter()
            .map(|entry| entry.value().iter().filter(|w| !w.state().is_terminal()).count())
            .sum()
    }

    /// Queues that currently hold a waiter list.
    pub fn queue_count(&self) -> usize {
        self.inner.lists.len()
    }

    // must not be called while a guard on `lists` is held
    fn prune(&self, queue_id: &str) {
        self.inner.lists.remove_if(queue_id, |_, list| list.is_empty());
    }
}

/// A receive parked on the coordinator.
///
/// Dropping it without waiting (client disconnect, task abort) removes the
/// waiter and marks it `Cancelled`. A wake that reached the waiter but was
/// never consumed by [`ParkedReceive::wait`] is handed on to the next parked
/// waiter of the queue, so a withdrawn receive never swallows a send signal.
pub struct ParkedReceive {
    waiter: Arc<Waiter>,
    wake: oneshot::Receiver<WaiterState>,
    coordinator: LongPollCoordinator,
    settled: bool,
}

impl ParkedReceive {
    pub fn waiter(&self) -> &Waiter {
        &self.waiter
    }

    /// Suspend until a send wakes this waiter or its deadline passes.
    pub async fn wait(mut self) -> WaitOutcome {
        let deadline = self.waiter.deadline();
        let outcome = tokio::select! {
            woke = &mut self.wake => match woke {
                Ok(WaiterState::Fulfilled) => WaitOutcome::Woken,
                _ => WaitOutcome::TimedOut,
            },
            _ = tokio::time::sleep_until(deadline) => {
                self.coordinator.remove(&self.waiter);
                if self.waiter.resolve(WaiterState::TimedOut) {
                    WaitOutcome::TimedOut
                } else {
                    // a notify won the race at the deadline
                    WaitOutcome::Woken
                }
            }
        };
        self.settled = true;
        outcome
    }

    /// Withdraw without a result (the caller stopped waiting).
    ///
    /// Returns `false` when a notify had already fulfilled the waiter; that
    /// wake is passed on to the next parked waiter.
    pub fn cancel(mut self) -> bool {
        self.withdraw(WaiterState::Cancelled)
    }

    /// Withdraw because the receive failed downstream.
    pub fn fail(mut self, reason: &str) -> bool {
        tracing::warn!(
            event = "waiter_errored",
            queue_id = self.waiter.queue_id(),
            waiter = %self.waiter.id(),
            reason,
        );
        self.withdraw(WaiterState::Errored)
    }

    fn withdraw(&mut self, to: WaiterState) -> bool {
        self.coordinator.remove(&self.waiter);
        if self.waiter.resolve(to) {
            self.settled = true;
            return true;
        }
        if !self.settled && self.waiter.state() == WaiterState::Fulfilled {
            let handed_on = self.coordinator.notify(self.waiter.queue_id(), 1);
            tracing::debug!(
                event = "wake_handed_on",
                queue_id = self.waiter.queue_id(),
                waiter = %self.waiter.id(),
                handed_on,
            );
        }
        self.settled = true;
        false
    }
}

impl Drop for ParkedReceive {
    fn drop(&mut self) {
        self.withdraw(WaiterState::Cancelled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const QUEUE: &str = "arn:sluice:123:orders";

    fn in_secs(secs: u64) -> Instant {
        Instant::now() + Duration::from_secs(secs)
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out_at_the_deadline() {
        let coordinator = LongPollCoordinator::new();
        let started = Instant::now();
        let parked = coordinator.park(QUEUE, in_secs(5));
        assert_eq!(coordinator.waiting_count(QUEUE), 1);

        assert_eq!(parked.wait().await, WaitOutcome::TimedOut);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(5), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(5_100), "{elapsed:?}");
        assert_eq!(coordinator.waiting_count(QUEUE), 0);
        assert_eq!(coordinator.queue_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn notify_wakes_before_the_deadline() {
        let coordinator = LongPollCoordinator::new();
        let parked = coordinator.park(QUEUE, in_secs(20));
        let waiter = tokio::spawn(parked.wait());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(coordinator.notify(QUEUE, 1), 1);
        assert_eq!(waiter.await.unwrap(), WaitOutcome::Woken);
        assert_eq!(coordinator.total_waiting(), 0);
    }

    #[test]
    fn notify_is_fifo_and_bounded() {
        let coordinator = LongPollCoordinator::new();
        let first = coordinator.park(QUEUE, in_secs(20));
        let second = coordinator.park(QUEUE, in_secs(20));
        let third = coordinator.park(QUEUE, in_secs(20));

        assert_eq!(coordinator.notify(QUEUE, 2), 2);
        assert_eq!(first.waiter().state(), WaiterState::Fulfilled);
        assert_eq!(second.waiter().state(), WaiterState::Fulfilled);
        assert_eq!(third.waiter().state(), WaiterState::Parked);
        assert_eq!(coordinator.waiting_count(QUEUE), 1);
    }

    #[test]
    fn notify_without_waiters_is_a_no_op() {
        let coordinator = LongPollCoordinator::new();
        assert_eq!(coordinator.notify(QUEUE, 10), 0);
        assert_eq!(coordinator.queue_count(), 0);
    }

    #[test]
    fn drop_removes_and_cancels() {
        let coordinator = LongPollCoordinator::new();
        let parked = coordinator.park(QUEUE, in_secs(20));
        let waiter = Arc::clone(&parked.waiter);

        drop(parked);
        assert_eq!(waiter.state(), WaiterState::Cancelled);
        assert_eq!(coordinator.waiting_count(QUEUE), 0);
        assert_eq!(coordinator.queue_count(), 0);
        assert!(!coordinator.remove(&waiter));
    }

    #[test]
    fn fail_marks_errored_once() {
        let coordinator = LongPollCoordinator::new();
        let parked = coordinator.park(QUEUE, in_secs(20));
        let waiter = Arc::clone(&parked.waiter);

        assert!(parked.fail("connection reset"));
        assert_eq!(waiter.state(), WaiterState::Errored);
        assert_eq!(coordinator.notify(QUEUE, 1), 0);
    }

    #[test]
    fn cancel_after_notify_hands_the_wake_on() {
        let coordinator = LongPollCoordinator::new();
        let rechecking = coordinator.park(QUEUE, in_secs(20));
        let sleeping = coordinator.park(QUEUE, in_secs(20));

        // the wake lands on the first waiter while it is still re-reading
        assert_eq!(coordinator.notify(QUEUE, 1), 1);
        assert_eq!(sleeping.waiter().state(), WaiterState::Parked);

        assert!(!rechecking.cancel());
        assert_eq!(sleeping.waiter().state(), WaiterState::Fulfilled);
        assert_eq!(coordinator.total_waiting(), 0);
    }

    #[test]
    fn fail_and_drop_after_notify_hand_the_wake_on() {
        let coordinator = LongPollCoordinator::new();
        let failing = coordinator.park(QUEUE, in_secs(20));
        let dropped = coordinator.park(QUEUE, in_secs(20));
        let last = coordinator.park(QUEUE, in_secs(20));

        assert_eq!(coordinator.notify(QUEUE, 1), 1);
        assert!(!failing.fail("store read failed"));
        assert_eq!(dropped.waiter().state(), WaiterState::Fulfilled);

        drop(dropped);
        assert_eq!(last.waiter().state(), WaiterState::Fulfilled);
    }

    #[tokio::test(start_paused = true)]
    async fn consumed_wake_is_not_handed_on() {
        let coordinator = LongPollCoordinator::new();
        let woken = coordinator.park(QUEUE, in_secs(20));
        let other = coordinator.park(QUEUE, in_secs(20));

        coordinator.notify(QUEUE, 1);
        assert_eq!(woken.wait().await, WaitOutcome::Woken);
        assert_eq!(other.waiter().state(), WaiterState::Parked);
        assert_eq!(coordinator.waiting_count(QUEUE), 1);
    }

    #[test]
    fn queues_do_not_share_waiters() {
        let coordinator = LongPollCoordinator::new();
        let _orders = coordinator.park(QUEUE, in_secs(20));
        let payments = coordinator.park("arn:sluice:123:payments", in_secs(20));

        assert_eq!(coordinator.notify(QUEUE, 5), 1);
        assert_eq!(payments.waiter().state(), WaiterState::Parked);
        assert_eq!(coordinator.total_waiting(), 1);
    }
}
