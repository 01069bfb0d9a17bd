use crate::core::engine::{SyncReport, SyncStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// 同步进度
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgress {
    pub current_event: Option<String>,
    pub current_file: Option<String>,
    pub events_total: usize,
    pub events_completed: usize,
    pub bytes_total: u64,
    pub bytes_completed: u64,
    pub current_file_bytes: u64,
}

/// 对外广播的同步事件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SyncEvent {
    StateChanged { from: SyncStatus, to: SyncStatus },
    Progress(SyncProgress),
    EventCompleted { event: String },
    EventFailed { event: String, error: String },
    Completed(SyncReport),
    Failed { error: String },
}

/// 多订阅者事件总线
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// 没有订阅者时直接丢弃
    pub fn emit(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// 以 Stream 形式订阅，跳过因订阅者落后而丢失的消息
    pub fn stream(&self) -> impl futures::Stream<Item = SyncEvent> + Send + 'static {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|item| match item {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::debug!("事件订阅者落后: {}", e);
                None
            }
        })
    }
}
