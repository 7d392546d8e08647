//! QueueDirectory port - queue 設定の解決
//!
//! queue の識別子（URL）から shard 数・partition 数・保持期間・圧縮フラグを引きます。
//! 実体は外部のキャッシュで、このクレートは読み取るだけです。

use async_trait::async_trait;

use crate::domain::{DirectoryError, QueueConfig};

/// QueueDirectory は read-through キャッシュ
///
/// - `Ok(None)`: queue が存在しない
/// - `Err(_)`: directory 自体が応答しない（呼び出し側で既定値にフォールバック）
#[async_trait]
pub trait QueueDirectory: Send + Sync {
    async fn resolve(&self, queue_url: &str) -> Result<Option<QueueConfig>, DirectoryError>;
}
