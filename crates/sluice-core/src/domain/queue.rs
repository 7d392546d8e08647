//! Queue configuration as resolved from the queue directory.

use serde::{Deserialize, Serialize};

use super::errors::SluiceError;

/// Four days, the usual default retention.
pub const DEFAULT_RETENTION_SECS: u32 = 345_600;
/// Fourteen days.
pub const MAX_RETENTION_SECS: u32 = 1_209_600;

/// Immutable queue layout and storage options.
///
/// A queue with S shards and P partitions occupies S×P physical rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub url: String,
    pub shards: u32,
    pub partitions: u32,
    pub retention_secs: u32,
    pub compressed: bool,
}

impl QueueConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            shards: 1,
            partitions: 1,
            retention_secs: DEFAULT_RETENTION_SECS,
            compressed: false,
        }
    }

    pub fn with_shards(mut self, shards: u32) -> Self {
        self.shards = shards;
        self
    }

    pub fn with_partitions(mut self, partitions: u32) -> Self {
        self.partitions = partitions;
        self
    }

    pub fn with_retention_secs(mut self, secs: u32) -> Self {
        self.retention_secs = secs;
        self
    }

    pub fn compressed(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }

    pub fn relative_url(&self) -> &str {
        relative_url(&self.url)
    }

    /// Stable identifier used to key long-poll waiters.
    pub fn queue_id(&self) -> String {
        queue_id(&self.url)
    }

    pub fn validate(&self) -> Result<(), SluiceError> {
        if relative_url(&self.url).is_empty() {
            return Err(SluiceError::InvalidParameterValue(
                "queue url must not be empty".into(),
            ));
        }
        if self.shards == 0 {
            return Err(SluiceError::InvalidParameterValue(
                "queue must have at least one shard".into(),
            ));
        }
        if self.partitions == 0 {
            return Err(SluiceError::InvalidParameterValue(
                "queue must have at least one partition".into(),
            ));
        }
        if self.retention_secs == 0 || self.retention_secs > MAX_RETENTION_SECS {
            return Err(SluiceError::InvalidParameterValue(format!(
                "retention must be between 1 and {MAX_RETENTION_SECS} seconds, got {}",
                self.retention_secs
            )));
        }
        Ok(())
    }
}

/// Canonical relative form of a queue url: scheme and authority are dropped,
/// as are leading and trailing slashes.
///
/// `http://host:6059/123456789012/orders` and `123456789012/orders` map to
/// the same value.
pub fn relative_url(url: &str) -> &str {
    let path = match url.find("://") {
        Some(idx) => {
            let rest = &url[idx + 3..];
            rest.find('/').map_or("", |slash| &rest[slash..])
        }
        None => url,
    };
    path.trim_matches('/')
}

/// ARN-style identifier derived from the relative url.
pub fn queue_id(url: &str) -> String {
    format!("arn:sluice:{}", relative_url(url).replace('/', ":"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_url_strips_scheme_and_host() {
        assert_eq!(
            relative_url("http://localhost:6059/123456789012/orders"),
            "123456789012/orders"
        );
        assert_eq!(relative_url("/123456789012/orders/"), "123456789012/orders");
        assert_eq!(relative_url("123456789012/orders"), "123456789012/orders");
        assert_eq!(relative_url("http://localhost:6059"), "");
    }

    #[test]
    fn queue_id_ignores_host() {
        assert_eq!(
            queue_id("http://a:1/123/q"),
            queue_id("https://b:2/123/q")
        );
        assert_eq!(queue_id("123/q"), "arn:sluice:123:q");
    }

    #[test]
    fn validate_rejects_empty_layout() {
        assert!(QueueConfig::new("123/q").validate().is_ok());
        assert!(QueueConfig::new("123/q").with_partitions(0).validate().is_err());
        assert!(QueueConfig::new("123/q").with_shards(0).validate().is_err());
        assert!(QueueConfig::new("http://host/").validate().is_err());
        assert!(
            QueueConfig::new("123/q")
                .with_retention_secs(MAX_RETENTION_SECS + 1)
                .validate()
                .is_err()
        );
    }
}
