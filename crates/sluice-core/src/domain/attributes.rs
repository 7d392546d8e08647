//! Message attributes.
//!
//! At the boundary attributes are a plain string map (wire compatibility).
//! Internally the well-known names are a closed enum with typed accessors;
//! anything else passes through untouched.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::SluiceError;

/// Attribute names this crate interprets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeName {
    DelaySeconds,
    SentTimestamp,
    SenderId,
    ApproximateReceiveCount,
    ApproximateFirstReceiveTimestamp,
}

impl AttributeName {
    pub const ALL: [AttributeName; 5] = [
        AttributeName::DelaySeconds,
        AttributeName::SentTimestamp,
        AttributeName::SenderId,
        AttributeName::ApproximateReceiveCount,
        AttributeName::ApproximateFirstReceiveTimestamp,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AttributeName::DelaySeconds => "DelaySeconds",
            AttributeName::SentTimestamp => "SentTimestamp",
            AttributeName::SenderId => "SenderId",
            AttributeName::ApproximateReceiveCount => "ApproximateReceiveCount",
            AttributeName::ApproximateFirstReceiveTimestamp => "ApproximateFirstReceiveTimestamp",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|n| n.as_str() == name)
    }
}

impl fmt::Display for AttributeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageAttributes(BTreeMap<String, String>);

impl MessageAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }

    fn typed(&self, name: AttributeName) -> Option<&str> {
        self.get(name.as_str())
    }

    fn set_typed(&mut self, name: AttributeName, value: impl ToString) {
        self.0.insert(name.as_str().to_string(), value.to_string());
    }

    /// Requested send delay; absent means zero.
    pub fn delay_seconds(&self) -> Result<u32, SluiceError> {
        match self.typed(AttributeName::DelaySeconds) {
            None => Ok(0),
            Some(raw) => raw.trim().parse::<u32>().map_err(|_| {
                SluiceError::InvalidMessageContents(format!(
                    "{} must be a non-negative integer, got {raw:?}",
                    AttributeName::DelaySeconds
                ))
            }),
        }
    }

    pub fn set_delay_seconds(&mut self, secs: u32) {
        self.set_typed(AttributeName::DelaySeconds, secs);
    }

    pub fn sent_timestamp(&self) -> Option<i64> {
        self.typed(AttributeName::SentTimestamp)?.parse().ok()
    }

    pub fn set_sent_timestamp(&mut self, millis: i64) {
        self.set_typed(AttributeName::SentTimestamp, millis);
    }

    pub fn sender_id(&self) -> Option<&str> {
        self.typed(AttributeName::SenderId)
    }

    pub fn set_sender_id(&mut self, sender: &str) {
        self.set_typed(AttributeName::SenderId, sender);
    }

    pub fn receive_count(&self) -> u32 {
        self.typed(AttributeName::ApproximateReceiveCount)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0)
    }

    pub fn set_receive_count(&mut self, count: u32) {
        self.set_typed(AttributeName::ApproximateReceiveCount, count);
    }

    pub fn first_receive_timestamp(&self) -> Option<i64> {
        self.typed(AttributeName::ApproximateFirstReceiveTimestamp)?
            .parse()
            .ok()
    }

    pub fn set_first_receive_timestamp(&mut self, millis: i64) {
        self.set_typed(AttributeName::ApproximateFirstReceiveTimestamp, millis);
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MessageAttributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<BTreeMap<String, String>> for MessageAttributes {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}
