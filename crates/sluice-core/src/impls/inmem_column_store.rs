//! InMemoryColumnStore - 開発・テスト用の wide-column store
//!
//! # 実装詳細
//! - `HashMap<RowKey, BTreeMap<OrderingKey, StoredCell>>` で行ごとにソート済みの cell を保持
//! - TTL は書き込み時に絶対時刻（ミリ秒）へ変換し、読み取り時に判定
//! - 整合性レベルは受け取るだけで無視（単一プロセスなので常に最新）
//! - `set_available(false)` で障害を再現できる

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{OrderingKey, RowKey, StoreError};
use crate::ports::{Cell, CellValue, Clock, ColumnRange, ColumnStore, Consistency, Direction};

#[derive(Debug, Clone)]
struct StoredCell {
    value: CellValue,
    expires_at_ms: Option<i64>,
}

impl StoredCell {
    fn is_live(&self, now_ms: i64) -> bool {
        self.expires_at_ms.is_none_or(|at| at > now_ms)
    }
}

type Row = BTreeMap<OrderingKey, StoredCell>;

pub struct InMemoryColumnStore {
    rows: RwLock<HashMap<RowKey, Row>>,
    clock: Arc<dyn Clock>,
    available: AtomicBool,
}

impl InMemoryColumnStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            clock,
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: every operation fails with `Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Rows that hold at least one live cell.
    pub async fn row_count(&self) -> usize {
        let now = self.clock.now_millis();
        let rows = self.rows.read().await;
        rows.values()
            .filter(|row| row.values().any(|cell| cell.is_live(now)))
            .count()
    }

    pub async fn live_cell_count(&self, row: &RowKey) -> usize {
        let now = self.clock.now_millis();
        let rows = self.rows.read().await;
        rows.get(row)
            .map(|r| r.values().filter(|cell| cell.is_live(now)).count())
            .unwrap_or(0)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("in-memory store switched off".into()))
        }
    }
}

#[async_trait]
impl ColumnStore for InMemoryColumnStore {
    async fn write_cells(
        &self,
        row: &RowKey,
        cells: Vec<Cell>,
        ttl: Option<Duration>,
        _consistency: Consistency,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let expires_at_ms = ttl.map(|ttl| {
            let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
            self.clock.now_millis().saturating_add(ttl_ms)
        });

        let mut rows = self.rows.write().await;
        let target = rows.entry(row.clone()).or_default();
        for cell in cells {
            target.insert(
                cell.column,
                StoredCell {
                    value: cell.value,
                    expires_at_ms,
                },
            );
        }
        Ok(())
    }

    async fn read_cell(
        &self,
        row: &RowKey,
        column: OrderingKey,
        _consistency: Consistency,
    ) -> Result<Option<Cell>, StoreError> {
        self.check_available()?;
        let now = self.clock.now_millis();
        let rows = self.rows.read().await;
        let cell = rows
            .get(row)
            .and_then(|r| r.get(&column))
            .filter(|cell| cell.is_live(now))
            .map(|cell| Cell {
                column,
                value: cell.value.clone(),
            });
        Ok(cell)
    }

    async fn read_range(
        &self,
        row: &RowKey,
        range: ColumnRange,
        _consistency: Consistency,
    ) -> Result<Vec<Cell>, StoreError> {
        self.check_available()?;
        if range.limit == 0 || !valid_bounds(&range) {
            return Ok(Vec::new());
        }
        let now = self.clock.now_millis();
        let rows = self.rows.read().await;
        let Some(r) = rows.get(row) else {
            return Ok(Vec::new());
        };

        let slice = r.range((range.start, range.end));
        let to_cell = |(column, cell): (&OrderingKey, &StoredCell)| Cell {
            column: *column,
            value: cell.value.clone(),
        };
        let cells = match range.direction {
            Direction::Forward => slice
                .filter(|(_, cell)| cell.is_live(now))
                .take(range.limit)
                .map(to_cell)
                .collect(),
            Direction::Reverse => slice
                .rev()
                .filter(|(_, cell)| cell.is_live(now))
                .take(range.limit)
                .map(to_cell)
                .collect(),
        };
        Ok(cells)
    }

    async fn delete_cell(
        &self,
        row: &RowKey,
        column: OrderingKey,
        _consistency: Consistency,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut rows = self.rows.write().await;
        if let Some(r) = rows.get_mut(row) {
            r.remove(&column);
            if r.is_empty() {
                rows.remove(row);
            }
        }
        Ok(())
    }

    async fn delete_row(&self, row: &RowKey, _consistency: Consistency) -> Result<(), StoreError> {
        self.check_available()?;
        self.rows.write().await.remove(row);
        Ok(())
    }
}

/// `BTreeMap::range` panics on inverted or doubly-excluded equal bounds;
/// such ranges are simply empty here.
fn valid_bounds(range: &ColumnRange) -> bool {
    use std::ops::Bound::{Excluded, Included, Unbounded};
    match (&range.start, &range.end) {
        (Unbounded, _) | (_, Unbounded) => true,
        (Included(s), Included(e)) => s <= e,
        (Included(s), Excluded(e)) | (Excluded(s), Included(e)) => s < e,
        (Excluded(s), Excluded(e)) => s < e,
    }
}
