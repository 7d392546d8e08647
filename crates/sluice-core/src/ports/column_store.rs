//! ColumnStore port - wide-column store の境界
//!
//! 行（row）ごとに ordering key でソートされた cell を持つストアです。
//! レプリケーションや整合性の実装はストア側の責務で、このクレートは
//! 操作ごとに整合性レベルを指定するだけです。
//!
//! # 設計原則
//! - 行単位の書き込みはアトミック（行をまたぐトランザクションはない）
//! - cell ごとに TTL を持ち、期限切れの cell は読み取りから消える
//! - 範囲読み取りは `[start, end]` と件数上限、方向を指定する

use std::collections::BTreeMap;
use std::ops::Bound;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{OrderingKey, RowKey, StoreError};

/// Consistency level requested from the store for one operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    One,
    #[default]
    Quorum,
    All,
}

/// Named sub-columns of one cell.
pub type CellValue = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub column: OrderingKey,
    pub value: CellValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

/// A bounded slice of one row.
///
/// `start` is always the low bound and `end` the high bound. With
/// `Direction::Reverse` cells come back highest key first and `limit` keeps
/// the highest ones.
#[derive(Debug, Clone)]
pub struct ColumnRange {
    pub start: Bound<OrderingKey>,
    pub end: Bound<OrderingKey>,
    pub limit: usize,
    pub direction: Direction,
}

impl ColumnRange {
    pub fn forward(start: Bound<OrderingKey>, end: Bound<OrderingKey>, limit: usize) -> Self {
        Self {
            start,
            end,
            limit,
            direction: Direction::Forward,
        }
    }

    pub fn reverse(start: Bound<OrderingKey>, end: Bound<OrderingKey>, limit: usize) -> Self {
        Self {
            start,
            end,
            limit,
            direction: Direction::Reverse,
        }
    }

    /// The first `limit` cells of the row.
    pub fn head(limit: usize) -> Self {
        Self::forward(Bound::Unbounded, Bound::Unbounded, limit)
    }
}

/// ColumnStore は wide-column store への per-row 操作
#[async_trait]
pub trait ColumnStore: Send + Sync {
    /// Write several cells to one row in a single atomic mutation.
    async fn write_cells(
        &self,
        row: &RowKey,
        cells: Vec<Cell>,
        ttl: Option<Duration>,
        consistency: Consistency,
    ) -> Result<(), StoreError>;

    async fn read_cell(
        &self,
        row: &RowKey,
        column: OrderingKey,
        consistency: Consistency,
    ) -> Result<Option<Cell>, StoreError>;

    async fn read_range(
        &self,
        row: &RowKey,
        range: ColumnRange,
        consistency: Consistency,
    ) -> Result<Vec<Cell>, StoreError>;

    /// Deleting a missing cell is not an error.
    async fn delete_cell(
        &self,
        row: &RowKey,
        column: OrderingKey,
        consistency: Consistency,
    ) -> Result<(), StoreError>;

    async fn delete_row(&self, row: &RowKey, consistency: Consistency) -> Result<(), StoreError>;
}
