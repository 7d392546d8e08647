#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use sluice_core::app::{QueueService, ServiceBuilder, ServiceConfig};
use sluice_core::domain::QueueConfig;
use sluice_core::impls::{InMemoryColumnStore, InMemoryQueueDirectory};
use sluice_core::ports::{Clock, ClockSeqGenerator, ColumnStore, FixedClock};
use sluice_core::store::{MessageStore, StoreSettings};
use tokio::time::Instant;

pub const QUEUE_URL: &str = "http://localhost:6059/123456789012/orders";
pub const START_MS: i64 = 1_700_000_000_000;

/// Store time that follows tokio's (pausable) clock.
pub struct TokioClock {
    base_ms: i64,
    started: Instant,
}

impl TokioClock {
    pub fn new(base_ms: i64) -> Self {
        Self {
            base_ms,
            started: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.now_millis()).unwrap()
    }

    fn now_millis(&self) -> i64 {
        self.base_ms + self.started.elapsed().as_millis() as i64
    }
}

pub struct StoreHarness {
    pub clock: Arc<FixedClock>,
    pub cells: Arc<InMemoryColumnStore>,
    pub directory: Arc<InMemoryQueueDirectory>,
    pub store: Arc<MessageStore>,
    pub queue: QueueConfig,
}

pub async fn store_harness(queue: QueueConfig) -> StoreHarness {
    store_harness_with(queue, StoreSettings::default()).await
}

pub async fn store_harness_with(queue: QueueConfig, settings: StoreSettings) -> StoreHarness {
    let clock = Arc::new(FixedClock::from_millis(START_MS));
    let cells = Arc::new(InMemoryColumnStore::new(clock.clone()));
    let directory = Arc::new(InMemoryQueueDirectory::new());
    directory.register(queue.clone()).await.unwrap();
    let store = Arc::new(MessageStore::new(
        cells.clone(),
        directory.clone(),
        Arc::new(ClockSeqGenerator::new()),
        clock.clone(),
        settings,
    ));
    StoreHarness {
        clock,
        cells,
        directory,
        store,
        queue,
    }
}

/// A service whose store time follows tokio time, so paused-time tests can
/// move both deadlines and message due times.
pub async fn service(queue: QueueConfig) -> Arc<QueueService> {
    service_over(queue, |cells| cells as Arc<dyn ColumnStore>).await
}

/// Like [`service`], with the in-memory store wrapped by `wrap`.
pub async fn service_over<F>(queue: QueueConfig, wrap: F) -> Arc<QueueService>
where
    F: FnOnce(Arc<InMemoryColumnStore>) -> Arc<dyn ColumnStore>,
{
    let clock: Arc<dyn Clock> = Arc::new(TokioClock::new(START_MS));
    let directory = Arc::new(InMemoryQueueDirectory::new());
    directory.register(queue).await.unwrap();
    let service = ServiceBuilder::new()
        .column_store(wrap(Arc::new(InMemoryColumnStore::new(clock.clone()))))
        .directory(directory)
        .clock(clock)
        .config(ServiceConfig::default())
        .build()
        .unwrap();
    Arc::new(service)
}
