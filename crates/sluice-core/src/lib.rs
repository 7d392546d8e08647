//! sluice-core
//!
//! Partitioned message storage over a wide-column store, plus the long-poll
//! receive coordinator.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（queue, message, attributes, ordering key, receipt handle, errors）
//! - **ports**: 抽象化レイヤー（ColumnStore, QueueDirectory, Clock, OrderingKeyGenerator）
//! - **store**: partition key scheme, message codec, MessageStore（send / get / peek / clear）
//! - **longpoll**: Waiter と LongPollCoordinator
//! - **app**: QueueService, ServiceBuilder, 設定, observability
//! - **impls**: 実装（InMemoryColumnStore など開発用）

pub mod app;
pub mod domain;
pub mod impls;
pub mod longpoll;
pub mod ports;
pub mod store;

pub use crate::app::{QueueService, ReceiveRequest, ServiceBuilder, ServiceConfig};
pub use crate::domain::{BatchEntry, Message, MessageId, NewMessage, QueueConfig, SluiceError};
