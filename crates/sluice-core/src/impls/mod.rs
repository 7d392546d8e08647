//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryColumnStore**: TTL 付きの wide-column store
//! - **InMemoryQueueDirectory**: queue 設定のキャッシュ
//!
//! # 本番用実装
//! 本番用の実装（Cassandra 互換ストアなど）は別クレートに配置します。

pub mod inmem_column_store;
pub mod inmem_directory;

pub use self::inmem_column_store::InMemoryColumnStore;
pub use self::inmem_directory::InMemoryQueueDirectory;
