//! QueueService - send / receive / delete の表面
//!
//! # 受信フロー
//! 1. 引数検証（max_messages, visibility, wait time）
//! 2. store を 1 回読む。見つかればそのまま返す（coordinator は使わない）
//! 3. 空で wait time > 0 なら coordinator に park
//! 4. park 直後にもう一度読む（park 前の send を取りこぼさない）
//! 5. 起こされたら 3 から繰り返す。deadline を過ぎたら空リストを返す
//!
//! # 送信フロー
//! - store に書いたあと、遅延なしのメッセージ数だけ waiter を起こす
//! - 遅延付きは配送可能になる時刻に通知をスケジュールする

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::domain::{
    BatchEntry, Message, MessageId, NewMessage, QueueConfig, ReceiptHandle, ReceiveId,
    SluiceError, queue_id, relative_url,
};
use crate::longpoll::{LongPollCoordinator, WaitOutcome};
use crate::ports::{Clock, QueueDirectory};
use crate::store::{MessageStore, PeekCursor, keys};

use super::config::ServiceConfig;
use super::observability::QueueStats;
use super::visibility::VisibilityTracker;

/// Arguments of one receive call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveRequest {
    pub queue_url: String,
    pub max_messages: usize,
    /// Service default when absent.
    pub visibility_timeout_secs: Option<u64>,
    /// No waiting when absent or zero.
    pub wait_time_secs: Option<u64>,
}

impl ReceiveRequest {
    pub fn new(queue_url: impl Into<String>) -> Self {
        Self {
            queue_url: queue_url.into(),
            max_messages: 1,
            visibility_timeout_secs: None,
            wait_time_secs: None,
        }
    }

    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = max_messages;
        self
    }

    pub fn with_visibility_timeout(mut self, secs: u64) -> Self {
        self.visibility_timeout_secs = Some(secs);
        self
    }

    pub fn with_wait_time(mut self, secs: u64) -> Self {
        self.wait_time_secs = Some(secs);
        self
    }
}

pub struct QueueService {
    store: MessageStore,
    directory: Arc<dyn QueueDirectory>,
    coordinator: LongPollCoordinator,
    visibility: VisibilityTracker,
    clock: Arc<dyn Clock>,
    config: ServiceConfig,
}

impl QueueService {
    pub(crate) fn new(
        store: MessageStore,
        directory: Arc<dyn QueueDirectory>,
        coordinator: LongPollCoordinator,
        clock: Arc<dyn Clock>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            store,
            directory,
            coordinator,
            visibility: VisibilityTracker::new(),
            clock,
            config,
        }
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn coordinator(&self) -> &LongPollCoordinator {
        &self.coordinator
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Look the queue up in the directory.
    ///
    /// An unknown queue is `NonExistentQueue`; a directory failure falls back
    /// to the default layout so the queue stays usable.
    pub async fn resolve_queue(&self, queue_url: &str) -> Result<QueueConfig, SluiceError> {
        if relative_url(queue_url).is_empty() {
            return Err(SluiceError::NonExistentQueue("queue url is empty".into()));
        }
        match self.directory.resolve(queue_url).await {
            Ok(Some(queue)) => Ok(queue),
            Ok(None) => Err(SluiceError::NonExistentQueue(queue_url.to_string())),
            Err(e) => {
                tracing::warn!(
                    event = "queue_lookup",
                    queue = %queue_url,
                    error = %e,
                    "directory lookup failed, using default layout"
                );
                Ok(QueueConfig::new(queue_url)
                    .with_shards(self.config.default_shards)
                    .with_partitions(self.config.default_partitions))
            }
        }
    }

    pub async fn send(&self, queue_url: &str, message: NewMessage) -> Result<MessageId, SluiceError> {
        let queue = self.resolve_queue(queue_url).await?;
        let delay = message.attributes.delay_seconds()?;
        let shard = keys::random_partition(queue.shards);
        let id = self.store.send(&queue, shard, &message).await?;
        self.announce(&queue, &[delay]);
        Ok(id)
    }

    pub async fn send_batch(
        &self,
        queue_url: &str,
        entries: &[BatchEntry],
    ) -> Result<HashMap<String, MessageId>, SluiceError> {
        let queue = self.resolve_queue(queue_url).await?;
        let delays = entries
            .iter()
            .map(|entry| entry.message.attributes.delay_seconds())
            .collect::<Result<Vec<_>, _>>()?;
        let shard = keys::random_partition(queue.shards);
        let ids = self.store.send_batch(&queue, shard, entries).await?;
        self.announce(&queue, &delays);
        Ok(ids)
    }

    /// Wake waiters for messages that are deliverable now, and schedule a
    /// wake for each delayed group.
    fn announce(&self, queue: &QueueConfig, delays: &[u32]) {
        let mut by_delay: BTreeMap<u32, usize> = BTreeMap::new();
        for delay in delays {
            *by_delay.entry(*delay).or_default() += 1;
        }
        let queue_id = queue.queue_id();
        for (delay, count) in by_delay {
            self.notify_later(&queue_id, Duration::from_secs(u64::from(delay)), count);
        }
    }

    /// Wake `count` waiters of `queue_id` once `after` has passed.
    fn notify_later(&self, queue_id: &str, after: Duration, count: usize) {
        if after.is_zero() {
            self.coordinator.notify(queue_id, count);
            return;
        }
        let coordinator = self.coordinator.clone();
        let queue_id = queue_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            coordinator.notify(&queue_id, count);
        });
    }

    /// Receive up to `max_messages`, waiting up to `wait_time_secs` for one
    /// to arrive. An empty result is a normal outcome.
    pub async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<Message>, SluiceError> {
        let wait = self.validate_receive(request)?;
        let visibility = Duration::from_secs(
            request
                .visibility_timeout_secs
                .unwrap_or(self.config.default_visibility_timeout_secs),
        );
        let queue = self.resolve_queue(&request.queue_url).await?;
        let receive_id = ReceiveId::generate();

        let queue_id = queue.queue_id();
        let found = self.try_receive(&queue, request.max_messages, visibility).await?;
        if !found.is_empty() {
            self.notify_later(&queue_id, visibility, found.len());
        }
        if !found.is_empty() || wait.is_zero() {
            tracing::debug!(event = "receive", receive = %receive_id, returned = found.len());
            return Ok(found);
        }

        let deadline = Instant::now() + wait;
        loop {
            let parked = self.coordinator.park(&queue_id, deadline);
            let found = match self.try_receive(&queue, request.max_messages, visibility).await {
                Ok(found) => found,
                Err(e) => {
                    parked.fail(&e.to_string());
                    return Err(e);
                }
            };
            if !found.is_empty() {
                // a wake taken during the re-read is passed on by cancel
                parked.cancel();
                self.notify_later(&queue_id, visibility, found.len());
                tracing::debug!(event = "receive", receive = %receive_id, returned = found.len(), waited = true);
                return Ok(found);
            }
            if parked.wait().await == WaitOutcome::TimedOut {
                tracing::debug!(event = "receive_timeout", receive = %receive_id, queue_id = %queue_id);
                return Ok(Vec::new());
            }
        }
    }

    fn validate_receive(&self, request: &ReceiveRequest) -> Result<Duration, SluiceError> {
        let max = self.config.max_receive_messages;
        if request.max_messages == 0 || request.max_messages > max {
            return Err(SluiceError::InvalidParameterValue(format!(
                "max messages must be between 1 and {max}, got {}",
                request.max_messages
            )));
        }
        if let Some(secs) = request.visibility_timeout_secs
            && secs > self.config.max_visibility_timeout_secs
        {
            return Err(SluiceError::InvalidParameterValue(format!(
                "visibility timeout must be at most {}s, got {secs}s",
                self.config.max_visibility_timeout_secs
            )));
        }
        let wait = request.wait_time_secs.unwrap_or(0);
        if wait == 0 {
            return Ok(Duration::ZERO);
        }
        if !self.config.long_poll_enabled {
            return Err(SluiceError::InvalidParameterValue(
                "long polling is disabled".into(),
            ));
        }
        let (min, max) = (self.config.min_wait_time_secs, self.config.max_wait_time_secs);
        if wait < min || wait > max {
            return Err(SluiceError::InvalidParameterValue(format!(
                "wait time must be between {min} and {max} seconds, got {wait}"
            )));
        }
        Ok(Duration::from_secs(wait))
    }

    /// One pass over the queue: shards and partitions in random order,
    /// claiming due messages that are not in flight.
    async fn try_receive(
        &self,
        queue: &QueueConfig,
        max_messages: usize,
        visibility: Duration,
    ) -> Result<Vec<Message>, SluiceError> {
        let now = self.clock.now_millis();
        self.visibility.record_receive(now);
        let retain_until = now.saturating_add(i64::from(queue.retention_secs) * 1000);
        let page = max_messages.max(1) * 2;
        let mut received = Vec::with_capacity(max_messages);

        for shard in keys::shuffled(queue.shards) {
            for partition in keys::shuffled(queue.partitions) {
                let row = keys::row_key(&queue.url, shard, partition);
                let mut after = None;
                loop {
                    let due = self.store.read_due(&row, after, page).await?;
                    for mut message in due.messages {
                        let Some(claim) = self.visibility.try_claim(
                            &message.message_id,
                            now,
                            visibility,
                            retain_until,
                        ) else {
                            continue;
                        };
                        message.attributes.set_receive_count(claim.receive_count);
                        message
                            .attributes
                            .set_first_receive_timestamp(claim.first_receive_ms);
                        message.receipt_handle = Some(message.message_id.clone());
                        received.push(message);
                        if received.len() >= max_messages {
                            return Ok(received);
                        }
                    }
                    match due.resume_after {
                        Some(key) => after = Some(key),
                        None => break,
                    }
                }
            }
        }
        Ok(received)
    }

    /// Delete a received message. Bad or stale handles are ignored.
    pub async fn delete(
        &self,
        queue_url: &str,
        receipt_handle: Option<&str>,
    ) -> Result<(), SluiceError> {
        self.resolve_queue(queue_url).await?;
        if let Some(handle) = self.store.delete(queue_url, receipt_handle).await? {
            self.visibility.forget(&handle);
        }
        Ok(())
    }

    /// Restart the visibility window of a received message; zero makes it
    /// visible again right away.
    pub async fn change_message_visibility(
        &self,
        queue_url: &str,
        receipt_handle: &str,
        visibility_timeout_secs: u64,
    ) -> Result<(), SluiceError> {
        let queue = self.resolve_queue(queue_url).await?;
        if visibility_timeout_secs > self.config.max_visibility_timeout_secs {
            return Err(SluiceError::InvalidParameterValue(format!(
                "visibility timeout must be at most {}s, got {visibility_timeout_secs}s",
                self.config.max_visibility_timeout_secs
            )));
        }
        let handle: ReceiptHandle = receipt_handle.parse()?;
        if handle.row().queue_hash() != keys::hash_queue_url(queue_url) {
            return Err(SluiceError::InvalidParameterValue(format!(
                "receipt handle {receipt_handle} does not belong to {queue_url}"
            )));
        }
        let now = self.clock.now_millis();
        let timeout = Duration::from_secs(visibility_timeout_secs);
        if !self.visibility.change_visibility(&handle, now, timeout) {
            return Err(SluiceError::InvalidParameterValue(format!(
                "message {receipt_handle} is not in flight"
            )));
        }
        self.notify_later(&queue.queue_id(), timeout, 1);
        Ok(())
    }

    pub async fn get_messages(
        &self,
        queue_url: &str,
        ids: &[String],
    ) -> Result<HashMap<String, Option<Message>>, SluiceError> {
        self.store.get_messages(queue_url, ids).await
    }

    pub async fn peek(
        &self,
        queue_url: &str,
        shard: u32,
        prev_handle: Option<&str>,
        next_handle: Option<&str>,
        length: usize,
    ) -> Result<Vec<Message>, SluiceError> {
        self.store
            .peek(queue_url, shard, prev_handle, next_handle, length)
            .await
    }

    pub async fn peek_page(
        &self,
        queue_url: &str,
        shard: u32,
        cursor: &PeekCursor,
        length: usize,
    ) -> Result<Vec<Message>, SluiceError> {
        self.store.peek_page(queue_url, shard, cursor, length).await
    }

    pub async fn peek_random(
        &self,
        queue_url: &str,
        shard: u32,
        length: usize,
    ) -> Result<Vec<Message>, SluiceError> {
        self.store.peek_random(queue_url, shard, length).await
    }

    /// Remove every message of the queue, in all shards.
    pub async fn clear(&self, queue_url: &str) -> Result<(), SluiceError> {
        self.resolve_queue(queue_url).await?;
        self.store.clear_queue(queue_url).await?;
        let forgotten = self.visibility.forget_queue(&keys::hash_queue_url(queue_url));
        tracing::debug!(event = "queue_cleared", queue = %queue_url, forgotten);
        Ok(())
    }

    pub fn stats(&self, queue_url: &str) -> QueueStats {
        let queue_id = queue_id(queue_url);
        QueueStats {
            waiting_receives: self.coordinator.waiting_count(&queue_id),
            in_flight: self
                .visibility
                .in_flight_count(&keys::hash_queue_url(queue_url), self.clock.now_millis()),
            queue_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ServiceBuilder;
    use crate::domain::AttributeName;
    use crate::impls::{InMemoryColumnStore, InMemoryQueueDirectory};
    use crate::ports::FixedClock;
    use rstest::rstest;

    const URL: &str = "http://localhost:6059/123456789012/orders";

    struct Fixture {
        clock: Arc<FixedClock>,
        directory: Arc<InMemoryQueueDirectory>,
        service: QueueService,
    }

    async fn fixture(config: ServiceConfig) -> Fixture {
        let clock = Arc::new(FixedClock::from_millis(1_700_000_000_000));
        let directory = Arc::new(InMemoryQueueDirectory::new());
        directory
            .register(QueueConfig::new(URL).with_shards(2).with_partitions(3))
            .await
            .unwrap();
        let service = ServiceBuilder::new()
            .column_store(Arc::new(InMemoryColumnStore::new(clock.clone())))
            .directory(directory.clone())
            .clock(clock.clone())
            .config(config)
            .build()
            .unwrap();
        Fixture {
            clock,
            directory,
            service,
        }
    }

    #[tokio::test]
    async fn received_message_is_hidden_then_reappears() {
        let f = fixture(ServiceConfig::default()).await;
        f.service.send(URL, NewMessage::new("job")).await.unwrap();

        let request = ReceiveRequest::new(URL).with_visibility_timeout(30);
        let first = f.service.receive(&request).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].attributes.receive_count(), 1);
        assert!(first[0].receipt_handle.is_some());
        assert!(f.service.receive(&request).await.unwrap().is_empty());
        assert_eq!(f.service.stats(URL).in_flight, 1);

        f.clock.advance(Duration::from_secs(31));
        let again = f.service.receive(&request).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].attributes.receive_count(), 2);
        assert_eq!(
            again[0].attributes.first_receive_timestamp(),
            first[0].attributes.first_receive_timestamp()
        );
    }

    #[tokio::test]
    async fn delete_removes_for_good() {
        let f = fixture(ServiceConfig::default()).await;
        f.service.send(URL, NewMessage::new("job")).await.unwrap();
        let request = ReceiveRequest::new(URL).with_visibility_timeout(0);
        let received = f.service.receive(&request).await.unwrap();
        let handle = received[0].receipt_handle.as_ref().unwrap().to_string();

        f.service.delete(URL, Some(&handle)).await.unwrap();
        f.service.delete(URL, Some(&handle)).await.unwrap();
        assert!(f.service.receive(&request).await.unwrap().is_empty());
        assert_eq!(f.service.stats(URL).in_flight, 0);
    }

    #[tokio::test]
    async fn delayed_message_waits_for_its_time() {
        let f = fixture(ServiceConfig::default()).await;
        f.service
            .send(URL, NewMessage::new("later").with_delay_seconds(60))
            .await
            .unwrap();
        let request = ReceiveRequest::new(URL);
        assert!(f.service.receive(&request).await.unwrap().is_empty());

        f.clock.advance(Duration::from_secs(60));
        let received = f.service.receive(&request).await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].attributes.get(AttributeName::DelaySeconds.as_str()), Some("60"));
    }

    #[tokio::test]
    async fn change_visibility_to_zero_releases() {
        let f = fixture(ServiceConfig::default()).await;
        f.service.send(URL, NewMessage::new("job")).await.unwrap();
        let request = ReceiveRequest::new(URL).with_visibility_timeout(300);
        let received = f.service.receive(&request).await.unwrap();
        let handle = received[0].receipt_handle.as_ref().unwrap().to_string();

        f.service.change_message_visibility(URL, &handle, 0).await.unwrap();
        assert_eq!(f.service.receive(&request).await.unwrap().len(), 1);

        let err = f
            .service
            .change_message_visibility(URL, &handle, 999_999)
            .await
            .unwrap_err();
        assert!(matches!(err, SluiceError::InvalidParameterValue(_)));
    }

    #[tokio::test]
    async fn max_messages_caps_the_result() {
        let f = fixture(ServiceConfig::default()).await;
        for i in 0..25 {
            f.service.send(URL, NewMessage::new(format!("m{i}"))).await.unwrap();
        }
        let request = ReceiveRequest::new(URL).with_max_messages(10);
        assert_eq!(f.service.receive(&request).await.unwrap().len(), 10);
        assert_eq!(f.service.receive(&request).await.unwrap().len(), 10);
        assert_eq!(f.service.receive(&request).await.unwrap().len(), 5);
    }

    #[rstest]
    #[case::zero_messages(ReceiveRequest::new(URL).with_max_messages(0))]
    #[case::too_many_messages(ReceiveRequest::new(URL).with_max_messages(11))]
    #[case::wait_too_long(ReceiveRequest::new(URL).with_wait_time(21))]
    #[case::visibility_too_long(ReceiveRequest::new(URL).with_visibility_timeout(43_201))]
    #[tokio::test]
    async fn receive_arguments_are_checked(#[case] request: ReceiveRequest) {
        let f = fixture(ServiceConfig::default()).await;
        let err = f.service.receive(&request).await.unwrap_err();
        assert!(matches!(err, SluiceError::InvalidParameterValue(_)));
    }

    #[tokio::test]
    async fn wait_requires_long_polling() {
        let config = ServiceConfig {
            long_poll_enabled: false,
            ..ServiceConfig::default()
        };
        let f = fixture(config).await;
        let err = f
            .service
            .receive(&ReceiveRequest::new(URL).with_wait_time(5))
            .await
            .unwrap_err();
        assert!(matches!(err, SluiceError::InvalidParameterValue(_)));
    }

    #[tokio::test]
    async fn unknown_queue_is_reported() {
        let f = fixture(ServiceConfig::default()).await;
        let err = f
            .service
            .send("123456789012/missing", NewMessage::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, SluiceError::NonExistentQueue(_)));
        let err = f.service.send("", NewMessage::new("x")).await.unwrap_err();
        assert!(matches!(err, SluiceError::NonExistentQueue(_)));
    }

    #[tokio::test]
    async fn directory_outage_falls_back_to_default_layout() {
        let f = fixture(ServiceConfig::default()).await;
        f.directory.set_available(false);
        let id = f.service.send(URL, NewMessage::new("x")).await.unwrap();
        assert_eq!((id.row().shard(), id.row().partition()), (0, 0));
        assert_eq!(f.service.receive(&ReceiveRequest::new(URL)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn batch_send_is_received() {
        let f = fixture(ServiceConfig::default()).await;
        let entries: Vec<BatchEntry> = (0..3)
            .map(|i| BatchEntry::new(format!("c{i}"), NewMessage::new(format!("b{i}"))))
            .collect();
        let ids = f.service.send_batch(URL, &entries).await.unwrap();
        assert_eq!(ids.len(), 3);

        let received = f
            .service
            .receive(&ReceiveRequest::new(URL).with_max_messages(10))
            .await
            .unwrap();
        assert_eq!(received.len(), 3);
    }

    #[tokio::test]
    async fn clear_drops_in_flight_entries() {
        let f = fixture(ServiceConfig::default()).await;
        for _ in 0..4 {
            f.service.send(URL, NewMessage::new("x")).await.unwrap();
        }
        let request = ReceiveRequest::new(URL).with_max_messages(3);
        assert_eq!(f.service.receive(&request).await.unwrap().len(), 3);
        assert_eq!(f.service.stats(URL).in_flight, 3);

        f.service.clear(URL).await.unwrap();
        assert_eq!(f.service.stats(URL).in_flight, 0);
    }

    #[tokio::test]
    async fn clear_empties_the_queue() {
        let f = fixture(ServiceConfig::default()).await;
        for _ in 0..6 {
            f.service.send(URL, NewMessage::new("x")).await.unwrap();
        }
        f.service.clear(URL).await.unwrap();
        let request = ReceiveRequest::new(URL).with_max_messages(10);
        assert!(f.service.receive(&request).await.unwrap().is_empty());
    }
}
