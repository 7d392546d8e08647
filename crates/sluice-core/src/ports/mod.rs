//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（wide-column store, queue directory）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - wide-column store がメッセージの正本（source of truth）
//! - queue directory は読み取り専用のキャッシュ
//! - 時刻と ordering key の生成はテストで差し替え可能にする

pub mod clock;
pub mod column_store;
pub mod id_generator;
pub mod queue_directory;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::column_store::{Cell, CellValue, ColumnRange, ColumnStore, Consistency, Direction};
pub use self::id_generator::{ClockSeqGenerator, OrderingKeyGenerator};
pub use self::queue_directory::QueueDirectory;
