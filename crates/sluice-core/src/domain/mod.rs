//! Domain model (queue config, messages, attributes, keys, errors, ids).

pub mod attributes;
pub mod errors;
pub mod ids;
pub mod message;
pub mod ordering;
pub mod queue;

pub use self::attributes::{AttributeName, MessageAttributes};
pub use self::errors::{DirectoryError, ErrorKind, SluiceError, StoreError};
pub use self::ids::{ReceiveId, WaiterId};
pub use self::message::{BatchEntry, Message, NewMessage};
pub use self::ordering::{MessageId, OrderingKey, ReceiptHandle, RowKey};
pub use self::queue::{QueueConfig, queue_id, relative_url};
