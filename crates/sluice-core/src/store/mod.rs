//! Store - partitioned message storage on top of the `ColumnStore` port.
//!
//! - `keys`: queue → row key mapping, partition choice
//! - `codec`: message ↔ cell value
//! - `message_store`: send / batch / delete / get / clear
//! - `peek`: cursor paging and random sampling

pub mod codec;
pub mod keys;
pub mod message_store;
pub mod peek;

pub use self::message_store::{MAX_BATCH_ENTRIES, MessageStore, StoreSettings};
pub use self::peek::PeekCursor;
