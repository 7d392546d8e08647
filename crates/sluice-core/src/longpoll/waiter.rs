//! Waiter - 待機中の receive 1 件
//!
//! # 状態遷移
//! ```text
//! Parked ─┬─> Fulfilled  (send 通知で起床)
//!         ├─> TimedOut   (deadline 到達)
//!         ├─> Errored    (下流エラー)
//!         └─> Cancelled  (クライアント切断 / drop)
//! ```
//!
//! 終端状態への遷移は一度だけ。最初に `resolve` した側が勝ちます。

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::domain::WaiterId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaiterState {
    Parked,
    Fulfilled,
    TimedOut,
    Errored,
    Cancelled,
}

impl WaiterState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, WaiterState::Parked)
    }
}

#[derive(Debug)]
struct Slot {
    state: WaiterState,
    wake: Option<oneshot::Sender<WaiterState>>,
}

#[derive(Debug)]
pub struct Waiter {
    id: WaiterId,
    queue_id: String,
    deadline: Instant,
    slot: Mutex<Slot>,
}

impl Waiter {
    pub(crate) fn new(
        queue_id: impl Into<String>,
        deadline: Instant,
    ) -> (Arc<Self>, oneshot::Receiver<WaiterState>) {
        let (tx, rx) = oneshot::channel();
        let waiter = Arc::new(Self {
            id: WaiterId::generate(),
            queue_id: queue_id.into(),
            deadline,
            slot: Mutex::new(Slot {
                state: WaiterState::Parked,
                wake: Some(tx),
            }),
        });
        (waiter, rx)
    }

    pub fn id(&self) -> WaiterId {
        self.id
    }

    pub fn queue_id(&self) -> &str {
        &self.queue_id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn state(&self) -> WaiterState {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).state
    }

    /// Move a parked waiter to the terminal state `to`.
    ///
    /// Returns `false` when the waiter had already left `Parked`.
    pub(crate) fn resolve(&self, to: WaiterState) -> bool {
        debug_assert!(to.is_terminal());
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.state.is_terminal() {
            return false;
        }
        slot.state = to;
        if let Some(wake) = slot.wake.take() {
            // receiver gone means the receive was dropped; nothing to wake
            let _ = wake.send(to);
        }
        true
    }
}
