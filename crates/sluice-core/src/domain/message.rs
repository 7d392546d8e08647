//! Messages as submitted by producers and as returned by reads.

use super::attributes::MessageAttributes;
use super::ordering::{MessageId, ReceiptHandle};

/// A message handed to `send` / `send_batch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub body: Vec<u8>,
    pub attributes: MessageAttributes,
}

impl NewMessage {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            attributes: MessageAttributes::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name, value);
        self
    }

    pub fn with_delay_seconds(mut self, secs: u32) -> Self {
        self.attributes.set_delay_seconds(secs);
        self
    }
}

/// One entry of a batch send; `client_token` keys the returned id map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub client_token: String,
    pub message: NewMessage,
}

impl BatchEntry {
    pub fn new(client_token: impl Into<String>, message: NewMessage) -> Self {
        Self {
            client_token: client_token.into(),
            message,
        }
    }
}

/// A stored message occurrence.
///
/// `receipt_handle` is only set on messages returned by a receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub message_id: MessageId,
    pub body: Vec<u8>,
    pub attributes: MessageAttributes,
    pub receipt_handle: Option<ReceiptHandle>,
}

impl Message {
    /// Body as UTF-8, if it is valid UTF-8.
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}
