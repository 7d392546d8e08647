//! Long polling: parked receives and the coordinator that wakes them.

pub mod coordinator;
pub mod waiter;

pub use self::coordinator::{LongPollCoordinator, ParkedReceive, WaitOutcome};
pub use self::waiter::{Waiter, WaiterState};
