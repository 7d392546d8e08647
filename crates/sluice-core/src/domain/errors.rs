//! Errors - エラー型と分類
//!
//! 呼び出し側に見えるエラーは [`SluiceError`] に集約します。
//! バックエンド（wide-column store, queue directory）のエラーは
//! それぞれ [`StoreError`] / [`DirectoryError`] として定義し、
//! `SluiceError::InternalError` に変換されます。

use thiserror::Error;

/// ErrorKind はエラーの運用分類
///
/// - Client: 呼び出し側の入力が不正（リトライ無意味）
/// - Data: 保存済みデータや handle が壊れている
/// - Infrastructure: store / directory の障害（リトライ推奨）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Client,
    Data,
    Infrastructure,
}

/// Failure reported by the wide-column store port.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Failure reported by the queue directory port.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("queue directory unavailable: {0}")]
    Unavailable(String),
}

/// SluiceError はキュー操作のドメインエラー
#[derive(Debug, Error)]
pub enum SluiceError {
    #[error("the queue does not exist: {0}")]
    NonExistentQueue(String),

    #[error("invalid message contents: {0}")]
    InvalidMessageContents(String),

    #[error("invalid query parameter: {0}")]
    InvalidQueryParameter(String),

    #[error("invalid parameter value: {0}")]
    InvalidParameterValue(String),

    #[error("corrupt record: {0}")]
    CorruptRecord(String),

    #[error("internal error: {0}")]
    InternalError(#[from] StoreError),
}

impl SluiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SluiceError::NonExistentQueue(_)
            | SluiceError::InvalidMessageContents(_)
            | SluiceError::InvalidQueryParameter(_)
            | SluiceError::InvalidParameterValue(_) => ErrorKind::Client,
            SluiceError::CorruptRecord(_) => ErrorKind::Data,
            SluiceError::InternalError(_) => ErrorKind::Infrastructure,
        }
    }

    /// Wire-level error code.
    pub fn code(&self) -> &'static str {
        match self {
            SluiceError::NonExistentQueue(_) => "NonExistentQueue",
            SluiceError::InvalidMessageContents(_) => "InvalidMessageContents",
            SluiceError::InvalidQueryParameter(_) => "InvalidQueryParameter",
            SluiceError::InvalidParameterValue(_) => "InvalidParameterValue",
            SluiceError::CorruptRecord(_) => "CorruptRecord",
            SluiceError::InternalError(_) => "InternalError",
        }
    }

    pub(crate) fn corrupt(message: impl Into<String>) -> Self {
        SluiceError::CorruptRecord(message.into())
    }
}
