//! InMemoryQueueDirectory - 開発・テスト用の queue directory
//!
//! relative URL をキーにして QueueConfig を保持します。
//! `set_available(false)` で directory 障害を再現できます。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{DirectoryError, QueueConfig, SluiceError, relative_url};
use crate::ports::QueueDirectory;

#[derive(Default)]
pub struct InMemoryQueueDirectory {
    queues: RwLock<HashMap<String, QueueConfig>>,
    unavailable: AtomicBool,
}

impl InMemoryQueueDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a queue.
    pub async fn register(&self, queue: QueueConfig) -> Result<(), SluiceError> {
        queue.validate()?;
        let key = queue.relative_url().to_string();
        self.queues.write().await.insert(key, queue);
        Ok(())
    }

    pub async fn remove(&self, queue_url: &str) -> Option<QueueConfig> {
        self.queues.write().await.remove(relative_url(queue_url))
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }
}

#[async_trait]
impl QueueDirectory for InMemoryQueueDirectory {
    async fn resolve(&self, queue_url: &str) -> Result<Option<QueueConfig>, DirectoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unavailable("in-memory directory switched off".into()));
        }
        Ok(self.queues.read().await.get(relative_url(queue_url)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_by_relative_url() {
        let directory = InMemoryQueueDirectory::new();
        directory
            .register(QueueConfig::new("http://localhost:6059/123/orders").with_partitions(4))
            .await
            .unwrap();

        let found = directory.resolve("123/orders").await.unwrap().unwrap();
        assert_eq!(found.partitions, 4);
        assert!(directory.resolve("123/other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_invalid_layout() {
        let directory = InMemoryQueueDirectory::new();
        let err = directory
            .register(QueueConfig::new("123/orders").with_partitions(0))
            .await
            .unwrap_err();
        assert!(matches!(err, SluiceError::InvalidParameterValue(_)));
    }

    #[tokio::test]
    async fn outage_is_reported() {
        let directory = InMemoryQueueDirectory::new();
        directory.set_available(false);
        assert!(directory.resolve("123/orders").await.is_err());
    }
}
