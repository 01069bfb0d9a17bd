use camsync_lib::core::{MemoryNotesStore, SyncEvent};
use camsync_lib::logging::{get_log_dir, init_logging};
use camsync_lib::storage::LocalStorage;
use camsync_lib::{AppState, DriveSync, SettingsPatch, StartSyncOptions, SyncMode};
use clap::Parser;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 对比两个行车记录仪驱动器并同步缺失或更新的事件
#[derive(Parser, Debug)]
#[command(name = "camsync", version)]
struct Args {
    /// 源驱动器目录
    source: PathBuf,

    /// 目标驱动器目录
    dest: PathBuf,

    /// 复制并校验后删除源事件
    #[arg(long = "move", default_value_t = false)]
    move_events: bool,

    /// 本次同步跳过复制后校验
    #[arg(long, default_value_t = false)]
    no_verify: bool,

    /// 同步事件备注
    #[arg(long, default_value_t = false)]
    notes: bool,

    /// 只对比，不复制
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

impl Args {
    fn mode(&self) -> SyncMode {
        if self.move_events {
            SyncMode::Move
        } else {
            SyncMode::Copy
        }
    }

    /// 命令行参数只影响本次同步
    fn overrides(&self) -> Option<SettingsPatch> {
        self.no_verify.then(|| SettingsPatch {
            verify_after_copy: Some(false),
            ..Default::default()
        })
    }
}

fn label_of(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(&get_log_dir());

    let state = AppState::new().await?;
    let sync = Arc::new(DriveSync::from_app_state(&state, Arc::new(MemoryNotesStore::new())));

    let source_id = sync
        .add_drive(label_of(&args.source), Arc::new(LocalStorage::new(&args.source)?))
        .await?;
    let dest_id = sync
        .add_drive(label_of(&args.dest), Arc::new(LocalStorage::new(&args.dest)?))
        .await?;
    sync.set_source(&source_id)?;
    sync.set_destination(&dest_id)?;

    if let Some(checkpoint) = sync.resume_checkpoint().await? {
        warn!(
            "上次同步未完成，剩余 {} 个事件",
            checkpoint.remaining().len()
        );
    }

    let comparison = sync.compare_events().await?;
    let overview = &comparison.statistics.overview;
    info!(
        "源 {} 个事件, 目标 {} 个事件, 同步率 {}%, 待传输 {} 字节",
        overview.source_events,
        overview.dest_events,
        overview.sync_percent,
        comparison.statistics.storage.to_transfer
    );

    if args.dry_run || comparison.events.selected().is_empty() {
        info!("没有需要同步的事件");
        state.cleanup().await;
        return Ok(());
    }

    // 日志输出进度事件
    let mut events = Box::pin(sync.event_stream());
    let progress_task = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                SyncEvent::EventCompleted { event } => info!("完成: {}", event),
                SyncEvent::EventFailed { event, error } => warn!("失败: {} ({})", event, error),
                SyncEvent::Completed(_) | SyncEvent::Failed { .. } => break,
                _ => {}
            }
        }
    });

    // Ctrl-C 取消同步
    let cancel_handle = {
        let sync = sync.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                sync.cancel();
            }
        })
    };

    let result = sync
        .start_sync(StartSyncOptions {
            selected_events: None,
            mode: args.mode(),
            sync_notes: args.notes,
            overrides: args.overrides(),
        })
        .await;

    cancel_handle.abort();
    if tokio::time::timeout(Duration::from_secs(1), progress_task).await.is_err() {
        warn!("进度输出任务未及时退出");
    }

    let outcome = match result {
        Ok(report) => {
            info!(
                "同步完成: {}/{} 个事件, {} 字节, {} 个错误",
                report.events_completed,
                report.events_total,
                report.bytes_completed,
                report.errors.len()
            );
            for err in &report.errors {
                warn!("{}: {}", err.event, err.error);
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    };

    state.cleanup().await;
    outcome
}
