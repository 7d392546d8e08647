//! Non-consuming listing of a queue shard.
//!
//! A page is a view stitched across partitions: reading starts in the
//! partition named by the cursor and, while the page is short, walks to the
//! adjacent partition. Walking forward, the next partition is read from the
//! start of the window (`now - peek_walk_window`); walking backward it is
//! read from the end of the window (`now + peek_walk_window`). The walk stops
//! at partition 0 or P-1 and never probes outside that range.

use std::ops::Bound;

use crate::domain::{Message, OrderingKey, ReceiptHandle, SluiceError};
use crate::ports::{ColumnRange, Direction};

use super::keys;
use super::message_store::{CorruptPolicy, Layout, MessageStore, decode_cells};

/// Where a peek page starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeekCursor {
    /// First page: partition 0, oldest first.
    Start,
    /// Messages after this handle, walking partitions upward.
    After(ReceiptHandle),
    /// Messages before this handle, walking partitions downward.
    Before(ReceiptHandle),
}

impl PeekCursor {
    /// Build a cursor from the optional handle pair of the paging API.
    ///
    /// `prev_handle` pages onward from that handle (`After`), `next_handle`
    /// pages back from it (`Before`). Empty strings count as absent.
    pub fn from_handles(
        prev_handle: Option<&str>,
        next_handle: Option<&str>,
    ) -> Result<Self, SluiceError> {
        let prev = prev_handle.filter(|h| !h.is_empty());
        let next = next_handle.filter(|h| !h.is_empty());
        match (prev, next) {
            (None, None) => Ok(PeekCursor::Start),
            (Some(prev), None) => Ok(PeekCursor::After(prev.parse()?)),
            (None, Some(next)) => Ok(PeekCursor::Before(next.parse()?)),
            (Some(_), Some(_)) => Err(SluiceError::InvalidQueryParameter(
                "only one of prev handle and next handle may be set".into(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartitionWalk {
    At(u32),
    Exhausted,
}

impl PartitionWalk {
    fn step(self, direction: Direction, partitions: u32) -> Self {
        match (self, direction) {
            (PartitionWalk::Exhausted, _) => PartitionWalk::Exhausted,
            (PartitionWalk::At(p), Direction::Forward) if p < partitions.saturating_sub(1) => {
                PartitionWalk::At(p + 1)
            }
            (PartitionWalk::At(p), Direction::Reverse) if p > 0 => PartitionWalk::At(p - 1),
            _ => PartitionWalk::Exhausted,
        }
    }
}

impl MessageStore {
    /// Page through `shard` with the handle pair of the paging API.
    pub async fn peek(
        &self,
        queue_url: &str,
        shard: u32,
        prev_handle: Option<&str>,
        next_handle: Option<&str>,
        length: usize,
    ) -> Result<Vec<Message>, SluiceError> {
        let cursor = PeekCursor::from_handles(prev_handle, next_handle)?;
        self.peek_page(queue_url, shard, &cursor, length).await
    }

    /// Up to `length` messages in ordering-key order, starting at `cursor`.
    ///
    /// Fewer than `length` messages means the walk ran out of partitions.
    pub async fn peek_page(
        &self,
        queue_url: &str,
        shard: u32,
        cursor: &PeekCursor,
        length: usize,
    ) -> Result<Vec<Message>, SluiceError> {
        let layout = self.layout(queue_url).await;
        let (direction, mut row, mut bound) = match cursor {
            PeekCursor::Start => {
                check_shard(&layout, shard)?;
                (Direction::Forward, layout.row(shard, 0), Bound::Unbounded)
            }
            PeekCursor::After(handle) => {
                check_cursor(&layout, handle)?;
                (Direction::Forward, handle.row().clone(), Bound::Excluded(handle.key()))
            }
            PeekCursor::Before(handle) => {
                check_cursor(&layout, handle)?;
                (Direction::Reverse, handle.row().clone(), Bound::Excluded(handle.key()))
            }
        };
        if length == 0 {
            return Ok(Vec::new());
        }

        let now = self.clock.now_millis();
        let window = i64::try_from(self.settings.peek_walk_window.as_millis()).unwrap_or(i64::MAX);
        let mut page: Vec<Message> = Vec::with_capacity(length);
        let mut walk = PartitionWalk::At(row.partition());
        let mut rows_read = 0usize;

        while let PartitionWalk::At(partition) = walk {
            row = row.with_partition(partition);
            let remaining = length - page.len();
            let range = match direction {
                Direction::Forward => ColumnRange::forward(bound, Bound::Unbounded, remaining),
                Direction::Reverse => ColumnRange::reverse(Bound::Unbounded, bound, remaining),
            };
            let cells = self
                .cells
                .read_range(&row, range, self.settings.consistency)
                .await?;
            rows_read += 1;
            let mut found = decode_cells(&row, &cells, CorruptPolicy::Fail)?;
            match direction {
                Direction::Forward => page.append(&mut found),
                Direction::Reverse => {
                    found.reverse();
                    found.append(&mut page);
                    page = found;
                }
            }
            if page.len() >= length {
                break;
            }

            walk = walk.step(direction, layout.partitions);
            bound = match direction {
                Direction::Forward => {
                    Bound::Included(OrderingKey::earliest_at(now.saturating_sub(window)))
                }
                Direction::Reverse => {
                    Bound::Included(OrderingKey::latest_at(now.saturating_add(window)))
                }
            };
        }

        tracing::debug!(
            event = "peek",
            queue = %queue_url,
            shard = row.shard(),
            returned = page.len(),
            rows_read,
            exhausted = page.len() < length,
        );
        Ok(page)
    }

    /// Approximate sample: at most one message from each of `length` distinct
    /// random partitions. With more requested than partitions exist this is
    /// a plain first-page peek instead.
    pub async fn peek_random(
        &self,
        queue_url: &str,
        shard: u32,
        length: usize,
    ) -> Result<Vec<Message>, SluiceError> {
        let layout = self.layout(queue_url).await;
        check_shard(&layout, shard)?;
        if length > layout.partitions as usize {
            return self.peek_page(queue_url, shard, &PeekCursor::Start, length).await;
        }

        let order = keys::shuffled(layout.partitions);
        let mut sample = Vec::with_capacity(length);
        for partition in order {
            if sample.len() >= length {
                break;
            }
            let row = layout.row(shard, partition);
            let cells = self
                .cells
                .read_range(&row, ColumnRange::head(1), self.settings.consistency)
                .await?;
            sample.extend(decode_cells(&row, &cells, CorruptPolicy::Fail)?);
        }
        tracing::debug!(event = "peek_random", queue = %queue_url, shard, returned = sample.len());
        Ok(sample)
    }
}

fn check_shard(layout: &Layout, shard: u32) -> Result<(), SluiceError> {
    if shard >= layout.shards {
        return Err(SluiceError::InvalidQueryParameter(format!(
            "shard {shard} out of range 0..{}",
            layout.shards
        )));
    }
    Ok(())
}

fn check_cursor(layout: &Layout, handle: &ReceiptHandle) -> Result<(), SluiceError> {
    let row = handle.row();
    if !layout.owns(row) {
        return Err(SluiceError::corrupt(format!(
            "cursor {handle} belongs to another queue"
        )));
    }
    if row.shard() >= layout.shards || row.partition() >= layout.partitions {
        return Err(SluiceError::corrupt(format!(
            "cursor {handle} is outside {} shards x {} partitions",
            layout.shards, layout.partitions
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(PartitionWalk::At(0), Direction::Forward, 3, PartitionWalk::At(1))]
    #[case(PartitionWalk::At(2), Direction::Forward, 3, PartitionWalk::Exhausted)]
    #[case(PartitionWalk::At(2), Direction::Reverse, 3, PartitionWalk::At(1))]
    #[case(PartitionWalk::At(0), Direction::Reverse, 3, PartitionWalk::Exhausted)]
    #[case(PartitionWalk::At(0), Direction::Forward, 1, PartitionWalk::Exhausted)]
    #[case(PartitionWalk::Exhausted, Direction::Forward, 3, PartitionWalk::Exhausted)]
    fn walk_stops_at_the_edges(
        #[case] from: PartitionWalk,
        #[case] direction: Direction,
        #[case] partitions: u32,
        #[case] expected: PartitionWalk,
    ) {
        assert_eq!(from.step(direction, partitions), expected);
    }

    #[test]
    fn cursor_from_handles() {
        assert_eq!(PeekCursor::from_handles(None, None).unwrap(), PeekCursor::Start);
        assert_eq!(PeekCursor::from_handles(Some(""), None).unwrap(), PeekCursor::Start);

        let raw = "ab_0_1:100:7";
        let handle: ReceiptHandle = raw.parse().unwrap();
        assert_eq!(
            PeekCursor::from_handles(Some(raw), None).unwrap(),
            PeekCursor::After(handle.clone())
        );
        assert_eq!(
            PeekCursor::from_handles(None, Some(raw)).unwrap(),
            PeekCursor::Before(handle)
        );
    }

    #[test]
    fn cursor_rejects_bad_input() {
        assert!(matches!(
            PeekCursor::from_handles(Some("ab_0_1:1:1"), Some("ab_0_1:2:2")),
            Err(SluiceError::InvalidQueryParameter(_))
        ));
        assert!(matches!(
            PeekCursor::from_handles(Some("x:y"), None),
            Err(SluiceError::CorruptRecord(_))
        ));
    }
}
