//! ServiceBuilder - QueueService の構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 省略可能な部品には既定の実装を使う（SystemClock, ClockSeqGenerator）

use std::sync::Arc;

use crate::longpoll::LongPollCoordinator;
use crate::ports::{ClockSeqGenerator, Clock, ColumnStore, OrderingKeyGenerator, QueueDirectory, SystemClock};
use crate::store::MessageStore;

use super::config::{ConfigError, ServiceConfig};
use super::service::QueueService;

/// ServiceBuilder は QueueService を構築
///
/// # 使用例
/// ```ignore
/// let service = ServiceBuilder::new()
///     .column_store(store)
///     .directory(directory)
///     .config(config)
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - column store と directory は必須
/// - build() 時に ServiceConfig を検証
/// - 不足や不正があれば BuildError を返す
#[derive(Default)]
pub struct ServiceBuilder {
    column_store: Option<Arc<dyn ColumnStore>>,
    directory: Option<Arc<dyn QueueDirectory>>,
    clock: Option<Arc<dyn Clock>>,
    keys: Option<Arc<dyn OrderingKeyGenerator>>,
    coordinator: Option<LongPollCoordinator>,
    config: ServiceConfig,
}

/// BuildError はサービス構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no column store configured")]
    MissingColumnStore,
    #[error("no queue directory configured")]
    MissingDirectory,
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}

impl ServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column_store(mut self, store: Arc<dyn ColumnStore>) -> Self {
        self.column_store = Some(store);
        self
    }

    pub fn directory(mut self, directory: Arc<dyn QueueDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// 既定: SystemClock
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// 既定: ランダムな node id の ClockSeqGenerator
    pub fn ordering_keys(mut self, keys: Arc<dyn OrderingKeyGenerator>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// 複数のサービスで待機リストを共有する場合に指定
    pub fn coordinator(mut self, coordinator: LongPollCoordinator) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    pub fn config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// ServiceBuilder を構築して QueueService を生成
    ///
    /// # 検証
    /// - column store / directory が設定されているか
    /// - ServiceConfig::validate()
    pub fn build(self) -> Result<QueueService, BuildError> {
        let column_store = self.column_store.ok_or(BuildError::MissingColumnStore)?;
        let directory = self.directory.ok_or(BuildError::MissingDirectory)?;
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let keys = self
            .keys
            .unwrap_or_else(|| Arc::new(ClockSeqGenerator::new()));
        let store = MessageStore::new(
            column_store,
            Arc::clone(&directory),
            keys,
            Arc::clone(&clock),
            self.config.store_settings(),
        );
        tracing::info!(
            event = "service_built",
            consistency = ?self.config.consistency,
            long_poll = self.config.long_poll_enabled,
        );
        Ok(QueueService::new(
            store,
            directory,
            self.coordinator.unwrap_or_default(),
            clock,
            self.config,
        ))
    }
}
