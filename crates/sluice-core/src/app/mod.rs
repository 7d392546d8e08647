//! App - アプリケーション層
//!
//! このモジュールは、store と long-poll coordinator を組み合わせて
//! キューの API 表面を実装します。
//!
//! # 主要コンポーネント
//! - **ServiceBuilder**: サービスの構築とワイヤリング
//! - **QueueService**: send / receive / delete / peek
//! - **VisibilityTracker**: 受信済みメッセージの可視性タイムアウト
//! - **ServiceConfig**: YAML から読み込む設定
//! - **observability**: tracing の初期化とキュー統計

pub mod builder;
pub mod config;
pub mod observability;
pub mod service;
pub mod visibility;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, ServiceBuilder};
pub use self::config::{ConfigError, ServiceConfig};
pub use self::observability::{QueueStats, init_tracing};
pub use self::service::{QueueService, ReceiveRequest};
pub use self::visibility::VisibilityTracker;
