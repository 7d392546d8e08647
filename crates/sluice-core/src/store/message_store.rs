//! MessageStore - wide-column store 上のメッセージ CRUD
//!
//! # 設計原則
//! - 1 メッセージ = 1 cell。行は `hash(queue)_shard_partition`
//! - send は partition をランダムに選び、1 回の書き込みで完了
//! - batch は全件で 1 つの partition を共有し、1 回の書き込みにまとめる
//! - delete は冪等（壊れた handle はログに残して無視）
//! - 読み取り系（get / peek）では壊れた id を呼び出し側へ返す
//!
//! # 実装
//! - send / batch / delete / get / clear: このファイル
//! - peek / peek_random: `peek.rs`

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{
    BatchEntry, Message, MessageId, NewMessage, OrderingKey, QueueConfig, ReceiptHandle, RowKey,
    SluiceError,
};
use crate::ports::{
    Cell, Clock, ColumnRange, ColumnStore, Consistency, OrderingKeyGenerator, QueueDirectory,
};

use super::{codec, keys};

/// Upper bound on entries in one batch send.
pub const MAX_BATCH_ENTRIES: usize = 10;

/// Tunables of the store, usually derived from `ServiceConfig`.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub consistency: Consistency,
    /// Layout used when the directory cannot answer.
    pub default_partitions: u32,
    pub default_shards: u32,
    pub max_delay_secs: u32,
    /// `get_messages` switches to range reads above this many ids.
    pub bulk_get_threshold: usize,
    /// Page size of one bulk range read.
    pub bulk_range_limit: usize,
    /// Bound applied when a peek walks onto an adjacent partition.
    pub peek_walk_window: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            consistency: Consistency::Quorum,
            default_partitions: 1,
            default_shards: 1,
            max_delay_secs: 900,
            bulk_get_threshold: 100,
            bulk_range_limit: 200,
            peek_walk_window: Duration::from_secs(14 * 24 * 60 * 60),
        }
    }
}

/// How undecodable cells are treated by a multi-cell read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CorruptPolicy {
    Fail,
    /// Log and drop the cell.
    Skip,
}

/// One page of due messages from a single row.
#[derive(Debug)]
pub(crate) struct DuePage {
    pub messages: Vec<Message>,
    /// Set when the page was full; the next page starts after this key.
    pub resume_after: Option<OrderingKey>,
}

/// Physical layout of one queue as far as this store knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Layout {
    pub queue_hash: String,
    pub shards: u32,
    pub partitions: u32,
}

impl Layout {
    pub fn row(&self, shard: u32, partition: u32) -> RowKey {
        RowKey::new(self.queue_hash.clone(), shard, partition)
    }

    pub fn owns(&self, row: &RowKey) -> bool {
        row.queue_hash() == self.queue_hash
    }
}

pub struct MessageStore {
    pub(crate) cells: Arc<dyn ColumnStore>,
    directory: Arc<dyn QueueDirectory>,
    keys: Arc<dyn OrderingKeyGenerator>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) settings: StoreSettings,
}

impl MessageStore {
    pub fn new(
        cells: Arc<dyn ColumnStore>,
        directory: Arc<dyn QueueDirectory>,
        keys: Arc<dyn OrderingKeyGenerator>,
        clock: Arc<dyn Clock>,
        settings: StoreSettings,
    ) -> Self {
        Self {
            cells,
            directory,
            keys,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// Store one message on a random partition of `shard`.
    pub async fn send(
        &self,
        queue: &QueueConfig,
        shard: u32,
        message: &NewMessage,
    ) -> Result<MessageId, SluiceError> {
        check_shard(queue, shard)?;
        let row = keys::row_key(&queue.url, shard, keys::random_partition(queue.partitions));
        let now = self.clock.now_millis();
        let (cell, id) = self.prepare(queue, &row, message, now)?;

        self.cells
            .write_cells(&row, vec![cell], Some(retention(queue)), self.settings.consistency)
            .await?;

        tracing::debug!(
            event = "send_message",
            queue = %queue.relative_url(),
            msg_id = %id,
            ttl_secs = queue.retention_secs,
        );
        Ok(id)
    }

    /// Store several messages in one write to one random partition.
    ///
    /// Returns client token → assigned message id.
    pub async fn send_batch(
        &self,
        queue: &QueueConfig,
        shard: u32,
        entries: &[BatchEntry],
    ) -> Result<HashMap<String, MessageId>, SluiceError> {
        check_shard(queue, shard)?;
        check_batch(entries)?;

        let row = keys::row_key(&queue.url, shard, keys::random_partition(queue.partitions));
        let now = self.clock.now_millis();
        let mut cells = Vec::with_capacity(entries.len());
        let mut ids = HashMap::with_capacity(entries.len());
        for entry in entries {
            let (cell, id) = self.prepare(queue, &row, &entry.message, now)?;
            cells.push(cell);
            ids.insert(entry.client_token.clone(), id);
        }

        self.cells
            .write_cells(&row, cells, Some(retention(queue)), self.settings.consistency)
            .await?;

        tracing::debug!(
            event = "send_message_batch",
            queue = %queue.relative_url(),
            row = %row,
            count = entries.len(),
        );
        Ok(ids)
    }

    fn prepare(
        &self,
        queue: &QueueConfig,
        row: &RowKey,
        message: &NewMessage,
        now_ms: i64,
    ) -> Result<(Cell, MessageId), SluiceError> {
        if message.body.is_empty() {
            return Err(SluiceError::InvalidMessageContents(
                "message body must not be empty".into(),
            ));
        }
        let delay = message.attributes.delay_seconds()?;
        if delay > self.settings.max_delay_secs {
            return Err(SluiceError::InvalidMessageContents(format!(
                "delay of {delay}s exceeds the maximum of {}s",
                self.settings.max_delay_secs
            )));
        }

        let key = self.keys.next_key(now_ms + i64::from(delay) * 1000);
        let id = ReceiptHandle::new(row.clone(), key);
        let mut attributes = message.attributes.clone();
        attributes.set_sent_timestamp(now_ms);
        let value = codec::encode(&id, &message.body, &attributes, queue.compressed)?;
        Ok((Cell { column: key, value }, id))
    }

    /// Delete the message addressed by `receipt_handle`.
    ///
    /// A missing or malformed handle, or one that belongs to another queue, is
    /// logged and ignored. Returns the handle that was deleted.
    pub async fn delete(
        &self,
        queue_url: &str,
        receipt_handle: Option<&str>,
    ) -> Result<Option<ReceiptHandle>, SluiceError> {
        let Some(raw) = receipt_handle else {
            tracing::warn!(event = "delete_message", queue = %queue_url, "missing receipt handle");
            return Ok(None);
        };
        let handle = match raw.parse::<ReceiptHandle>() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(
                    event = "delete_message",
                    queue = %queue_url,
                    handle = %raw,
                    error = %e,
                    "ignoring malformed receipt handle"
                );
                return Ok(None);
            }
        };
        if handle.row().queue_hash() != keys::hash_queue_url(queue_url) {
            tracing::warn!(
                event = "delete_message",
                queue = %queue_url,
                handle = %raw,
                "ignoring receipt handle of another queue"
            );
            return Ok(None);
        }

        self.cells
            .delete_cell(handle.row(), handle.key(), self.settings.consistency)
            .await?;
        tracing::debug!(event = "delete_message", queue = %queue_url, handle = %handle);
        Ok(Some(handle))
    }

    /// Look up messages by id. Every requested id is a key of the result;
    /// ids whose message is gone map to `None`.
    pub async fn get_messages(
        &self,
        queue_url: &str,
        ids: &[String],
    ) -> Result<HashMap<String, Option<Message>>, SluiceError> {
        if ids.len() > self.settings.bulk_get_threshold {
            return self.get_messages_bulk(queue_url, ids).await;
        }

        let wanted = parse_ids(queue_url, ids)?;
        let mut found = HashMap::with_capacity(wanted.len());
        for (raw, id) in wanted {
            let cell = self
                .cells
                .read_cell(id.row(), id.key(), self.settings.consistency)
                .await?;
            let message = cell.map(|cell| codec::decode(id.row(), &cell)).transpose()?;
            found.insert(raw, message);
        }
        Ok(found)
    }

    /// Same result as `get_messages`, using one paged range read per
    /// distinct row covering only `[min, max]` of the ids wanted there.
    pub async fn get_messages_bulk(
        &self,
        queue_url: &str,
        ids: &[String],
    ) -> Result<HashMap<String, Option<Message>>, SluiceError> {
        let wanted = parse_ids(queue_url, ids)?;
        let mut by_row: BTreeMap<RowKey, HashMap<OrderingKey, Vec<String>>> = BTreeMap::new();
        for (raw, id) in &wanted {
            by_row
                .entry(id.row().clone())
                .or_default()
                .entry(id.key())
                .or_default()
                .push(raw.clone());
        }

        let mut found: HashMap<String, Option<Message>> =
            wanted.into_iter().map(|(raw, _)| (raw, None)).collect();
        let page = self.settings.bulk_range_limit.max(1);

        for (row, columns) in &by_row {
            let (Some(low), Some(high)) = (columns.keys().min(), columns.keys().max()) else {
                continue;
            };
            let mut start = Bound::Included(*low);
            let mut reads = 0usize;
            loop {
                let cells = self
                    .cells
                    .read_range(
                        row,
                        ColumnRange::forward(start, Bound::Included(*high), page),
                        self.settings.consistency,
                    )
                    .await?;
                reads += 1;
                for cell in &cells {
                    if let Some(raws) = columns.get(&cell.column) {
                        let message = codec::decode(row, cell)?;
                        for raw in raws {
                            found.insert(raw.clone(), Some(message.clone()));
                        }
                    }
                }
                match cells.last() {
                    Some(last) if cells.len() == page => start = Bound::Excluded(last.column),
                    _ => break,
                }
            }
            tracing::trace!(event = "get_messages_bulk", row = %row, wanted = columns.len(), reads);
        }
        Ok(found)
    }

    /// Delete every partition row of `shard`. Not atomic across partitions.
    pub async fn clear(&self, queue_url: &str, shard: u32) -> Result<(), SluiceError> {
        let layout = self.layout(queue_url).await;
        if shard >= layout.shards {
            return Err(SluiceError::InvalidQueryParameter(format!(
                "shard {shard} out of range 0..{}",
                layout.shards
            )));
        }
        self.clear_rows(&layout, shard).await?;
        tracing::info!(event = "clear_queue", queue = %queue_url, shard, partitions = layout.partitions);
        Ok(())
    }

    /// `clear` for every shard of the queue.
    pub async fn clear_queue(&self, queue_url: &str) -> Result<(), SluiceError> {
        let layout = self.layout(queue_url).await;
        for shard in 0..layout.shards {
            self.clear_rows(&layout, shard).await?;
        }
        tracing::info!(
            event = "clear_queue",
            queue = %queue_url,
            shards = layout.shards,
            partitions = layout.partitions,
        );
        Ok(())
    }

    async fn clear_rows(&self, layout: &Layout, shard: u32) -> Result<(), SluiceError> {
        for partition in 0..layout.partitions {
            self.cells
                .delete_row(&layout.row(shard, partition), self.settings.consistency)
                .await?;
        }
        Ok(())
    }

    /// Messages of `row` whose ordering key is due (`<= now`), after `after`.
    /// Undecodable cells are skipped.
    pub(crate) async fn read_due(
        &self,
        row: &RowKey,
        after: Option<OrderingKey>,
        limit: usize,
    ) -> Result<DuePage, SluiceError> {
        let start = after.map_or(Bound::Unbounded, Bound::Excluded);
        let end = Bound::Included(OrderingKey::latest_at(self.clock.now_millis()));
        let cells = self
            .cells
            .read_range(row, ColumnRange::forward(start, end, limit), self.settings.consistency)
            .await?;
        let resume_after = if cells.len() >= limit {
            cells.last().map(|cell| cell.column)
        } else {
            None
        };
        Ok(DuePage {
            messages: decode_cells(row, &cells, CorruptPolicy::Skip)?,
            resume_after,
        })
    }

    /// Resolve the queue's layout, falling back to the configured defaults
    /// when the directory does not know the queue or does not answer.
    pub(crate) async fn layout(&self, queue_url: &str) -> Layout {
        let queue_hash = keys::hash_queue_url(queue_url);
        let fallback = |queue_hash| Layout {
            queue_hash,
            shards: self.settings.default_shards.max(1),
            partitions: self.settings.default_partitions.max(1),
        };
        match self.directory.resolve(queue_url).await {
            Ok(Some(queue)) => Layout {
                queue_hash,
                shards: queue.shards.max(1),
                partitions: queue.partitions.max(1),
            },
            Ok(None) => {
                tracing::warn!(event = "queue_layout", queue = %queue_url, "queue not in directory, using default layout");
                fallback(queue_hash)
            }
            Err(e) => {
                tracing::warn!(event = "queue_layout", queue = %queue_url, error = %e, "directory lookup failed, using default layout");
                fallback(queue_hash)
            }
        }
    }
}

pub(crate) fn decode_cells(
    row: &RowKey,
    cells: &[Cell],
    policy: CorruptPolicy,
) -> Result<Vec<Message>, SluiceError> {
    let mut messages = Vec::with_capacity(cells.len());
    for cell in cells {
        match codec::decode(row, cell) {
            Ok(message) => messages.push(message),
            Err(e) if policy == CorruptPolicy::Skip => {
                tracing::error!(event = "corrupt_record", row = %row, column = %cell.column, error = %e);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(messages)
}

fn parse_ids(queue_url: &str, ids: &[String]) -> Result<Vec<(String, MessageId)>, SluiceError> {
    let queue_hash = keys::hash_queue_url(queue_url);
    ids.iter()
        .map(|raw| {
            let id = raw.parse::<MessageId>()?;
            if id.row().queue_hash() != queue_hash {
                return Err(SluiceError::corrupt(format!(
                    "message id {raw} does not belong to queue {queue_url}"
                )));
            }
            Ok((raw.clone(), id))
        })
        .collect()
}

fn check_shard(queue: &QueueConfig, shard: u32) -> Result<(), SluiceError> {
    if shard >= queue.shards {
        return Err(SluiceError::InvalidParameterValue(format!(
            "shard {shard} out of range 0..{}",
            queue.shards
        )));
    }
    Ok(())
}

fn check_batch(entries: &[BatchEntry]) -> Result<(), SluiceError> {
    if entries.is_empty() {
        return Err(SluiceError::InvalidQueryParameter("empty batch".into()));
    }
    if entries.len() > MAX_BATCH_ENTRIES {
        return Err(SluiceError::InvalidQueryParameter(format!(
            "batch of {} entries exceeds the maximum of {MAX_BATCH_ENTRIES}",
            entries.len()
        )));
    }
    let mut seen = HashSet::with_capacity(entries.len());
    for entry in entries {
        if entry.client_token.is_empty() {
            return Err(SluiceError::InvalidQueryParameter(
                "batch entry without client token".into(),
            ));
        }
        if !seen.insert(entry.client_token.as_str()) {
            return Err(SluiceError::InvalidQueryParameter(format!(
                "duplicate client token {}",
                entry.client_token
            )));
        }
    }
    Ok(())
}

fn retention(queue: &QueueConfig) -> Duration {
    Duration::from_secs(u64::from(queue.retention_secs))
}
