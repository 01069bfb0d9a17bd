use crate::error::{Result, SyncError};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// 单次同步的暂停 / 取消控制
///
/// 协作式：只在事件、文件和分块边界检查，正在进行的分块会先完成。
#[derive(Debug, Clone)]
pub struct SyncControl {
    pause_tx: Arc<watch::Sender<bool>>,
    cancel: CancellationToken,
}

impl Default for SyncControl {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncControl {
    pub fn new() -> Self {
        let (pause_tx, _) = watch::channel(false);
        Self {
            pause_tx: Arc::new(pause_tx),
            cancel: CancellationToken::new(),
        }
    }

    pub fn pause(&self) {
        self.pause_tx.send_replace(true);
    }

    pub fn resume(&self) {
        self.pause_tx.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.pause_tx.borrow()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// 暂停期间挂起，取消时立即返回错误
    pub async fn wait_while_paused(&self) -> Result<()> {
        let mut rx = self.pause_tx.subscribe();
        loop {
            self.check_cancelled()?;
            if !*rx.borrow_and_update() {
                return Ok(());
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(SyncError::Cancelled),
                changed = rx.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// 取消检查 + 暂停等待
    pub async fn checkpoint(&self) -> Result<()> {
        self.check_cancelled()?;
        self.wait_while_paused().await
    }
}
