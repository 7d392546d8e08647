use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use sluice_core::app::config::load_from_file;
use sluice_core::app::{ServiceBuilder, ServiceConfig, init_tracing};
use sluice_core::domain::{BatchEntry, Message, NewMessage, QueueConfig};
use sluice_core::impls::{InMemoryColumnStore, InMemoryQueueDirectory};
use sluice_core::ports::SystemClock;
use sluice_core::ReceiveRequest;
use tokio::time::{Duration, sleep};

const DEMO_QUEUE: &str = "http://localhost:6059/000000000000/demo";

/// 表示用：Message を JSON にする
#[derive(Debug, Serialize)]
struct MessageView<'a> {
    message_id: String,
    body: Option<&'a str>,
    attributes: Vec<(&'a str, &'a str)>,
    receipt_handle: Option<String>,
}

impl<'a> From<&'a Message> for MessageView<'a> {
    fn from(m: &'a Message) -> Self {
        Self {
            message_id: m.message_id.to_string(),
            body: m.body_str(),
            attributes: m.attributes.iter().collect(),
            receipt_handle: m.receipt_handle.as_ref().map(ToString::to_string),
        }
    }
}

fn print_messages(label: &str, messages: &[Message]) -> Result<(), serde_json::Error> {
    let views: Vec<MessageView<'_>> = messages.iter().map(MessageView::from).collect();
    println!("{label}: {}", serde_json::to_string_pretty(&views)?);
    Ok(())
}

/// 引数にパスがあれば YAML 設定を読む。読めなければ既定値
fn load_config() -> ServiceConfig {
    let Some(path) = std::env::args().nth(1) else {
        return ServiceConfig::default();
    };
    match load_from_file(Path::new(&path)) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(event = "config_fallback", path = %path, error = %e);
            ServiceConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    // (A) in-memory の column store と directory を用意し、デモ用キューを登録
    let clock = Arc::new(SystemClock);
    let directory = Arc::new(InMemoryQueueDirectory::new());
    directory
        .register(QueueConfig::new(DEMO_QUEUE).with_partitions(4).compressed(true))
        .await?;
    let service = Arc::new(
        ServiceBuilder::new()
            .column_store(Arc::new(InMemoryColumnStore::new(clock.clone())))
            .directory(directory)
            .clock(clock)
            .config(load_config())
            .build()?,
    );

    // (B) 空のキューで long-poll receive を待たせる
    let receiver = {
        let service = service.clone();
        tokio::spawn(async move {
            let request = ReceiveRequest::new(DEMO_QUEUE)
                .with_max_messages(5)
                .with_wait_time(10);
            service.receive(&request).await
        })
    };
    sleep(Duration::from_millis(100)).await;
    println!("stats: {}", serde_json::to_string(&service.stats(DEMO_QUEUE))?);

    // (C) 送信すると待機中の receive が起きる
    let id = service
        .send(DEMO_QUEUE, NewMessage::new("hello, sluice").with_attribute("SenderId", "cli"))
        .await?;
    println!("sent: {id}");
    let received = receiver.await??;
    print_messages("received", &received)?;

    // (D) バッチ送信して peek で一覧
    let entries: Vec<BatchEntry> = (0..3)
        .map(|i| BatchEntry::new(format!("entry-{i}"), NewMessage::new(format!("batch {i}"))))
        .collect();
    service.send_batch(DEMO_QUEUE, &entries).await?;
    let page = service.peek(DEMO_QUEUE, 0, None, None, 10).await?;
    print_messages("peek", &page)?;

    // (E) 受信したメッセージを削除
    for message in &received {
        let handle = message.receipt_handle.as_ref().map(ToString::to_string);
        service.delete(DEMO_QUEUE, handle.as_deref()).await?;
    }
    println!("stats: {}", serde_json::to_string(&service.stats(DEMO_QUEUE))?);
    Ok(())
}
