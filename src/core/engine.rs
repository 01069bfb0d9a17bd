use crate::config::{NotesConflictPolicy, SyncSettings};
use crate::core::checkpoint::{CheckpointStore, ResumeCheckpoint};
use crate::core::comparator::ComparedEvent;
use crate::core::control::SyncControl;
use crate::core::events::{EventBus, SyncEvent, SyncProgress};
use crate::core::manifest::SyncManifest;
use crate::core::notes::{merge_notes, notes_key, AnnotationStore, NoteDiff, NotesComparison};
use crate::core::preset::Preset;
use crate::core::transfer::{self, ChunkProgress};
use crate::drive::{Drive, EventType};
use crate::error::{Result, SyncError};
use crate::storage::{PermissionMode, PermissionState, Storage};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// 同步状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Idle,
    Comparing,
    Syncing,
    Paused,
    Verifying,
    Complete,
    Cancelled,
    Error,
}

impl SyncStatus {
    /// 同步进行中（含暂停和校验）
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncStatus::Syncing | SyncStatus::Paused | SyncStatus::Verifying
        )
    }
}

/// 同步模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Copy,
    /// 复制并校验后删除源事件
    Move,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventError {
    pub event: String,
    pub error: String,
}

/// 同步状态机快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub status: SyncStatus,
    pub mode: Option<SyncMode>,
    pub current_event: Option<String>,
    pub current_file: Option<String>,
    pub events_total: usize,
    pub events_completed: usize,
    pub bytes_total: u64,
    pub bytes_completed: u64,
    pub current_file_bytes: u64,
    pub errors: Vec<EventError>,
    pub can_resume: bool,
    /// 第一个失败事件的下标
    pub resume_point: Option<usize>,
    /// 毫秒时间戳
    pub start_time: Option<i64>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            status: SyncStatus::Idle,
            mode: None,
            current_event: None,
            current_file: None,
            events_total: 0,
            events_completed: 0,
            bytes_total: 0,
            bytes_completed: 0,
            current_file_bytes: 0,
            errors: Vec::new(),
            can_resume: false,
            resume_point: None,
            start_time: None,
        }
    }
}

impl SyncState {
    pub fn progress(&self) -> SyncProgress {
        SyncProgress {
            current_event: self.current_event.clone(),
            current_file: self.current_file.clone(),
            events_total: self.events_total,
            events_completed: self.events_completed,
            bytes_total: self.bytes_total,
            bytes_completed: self.bytes_completed,
            current_file_bytes: self.current_file_bytes,
        }
    }
}

/// 一次同步的输入
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub source: Drive,
    pub dest: Drive,
    /// 按顺序处理
    pub events: Vec<ComparedEvent>,
    pub mode: SyncMode,
    pub sync_notes: bool,
    pub notes_comparison: NotesComparison,
    /// 写入清单的相关预设
    pub presets: Vec<Preset>,
    pub settings: SyncSettings,
}

/// 同步报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub status: SyncStatus,
    pub mode: SyncMode,
    pub events_total: usize,
    pub events_completed: usize,
    pub bytes_total: u64,
    pub bytes_completed: u64,
    pub errors: Vec<EventError>,
    /// 已复制或合并的备注数
    pub notes_synced: usize,
    /// `ask` 策略下留给调用方处理的备注冲突
    pub unresolved_notes: Vec<NoteDiff>,
    pub manifest_written: bool,
    pub start_time: i64,
    pub end_time: i64,
}

/// 已完成事件的记录（写入清单用）
struct SyncedEvent {
    name: String,
    source_size: u64,
    verified: bool,
}

/// 同步引擎
///
/// 每个实例同一时间只允许一个同步任务。状态锁不会跨 await 持有。
pub struct SyncEngine {
    state: Mutex<SyncState>,
    control: Mutex<SyncControl>,
    running: AtomicBool,
    events: EventBus,
    notes: Arc<dyn AnnotationStore>,
    checkpoints: CheckpointStore,
}

impl SyncEngine {
    pub fn new(
        events: EventBus,
        notes: Arc<dyn AnnotationStore>,
        checkpoints: CheckpointStore,
    ) -> Self {
        Self {
            state: Mutex::new(SyncState::default()),
            control: Mutex::new(SyncControl::new()),
            running: AtomicBool::new(false),
            events,
            notes,
            checkpoints,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_control(&self) -> MutexGuard<'_, SyncControl> {
        self.control.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 当前状态快照
    pub fn snapshot(&self) -> SyncState {
        self.lock_state().clone()
    }

    pub fn status(&self) -> SyncStatus {
        self.lock_state().status
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// 设置状态并广播变更
    pub fn set_status(&self, to: SyncStatus) {
        let from = {
            let mut state = self.lock_state();
            std::mem::replace(&mut state.status, to)
        };
        if from != to {
            debug!("状态变更: {:?} -> {:?}", from, to);
            self.events.emit(SyncEvent::StateChanged { from, to });
        }
    }

    /// 仅在 syncing 状态下生效
    pub fn pause(&self) -> bool {
        let paused = {
            let mut state = self.lock_state();
            if state.status == SyncStatus::Syncing {
                state.status = SyncStatus::Paused;
                self.lock_control().pause();
                true
            } else {
                false
            }
        };

        if paused {
            info!("同步已暂停");
            self.events.emit(SyncEvent::StateChanged {
                from: SyncStatus::Syncing,
                to: SyncStatus::Paused,
            });
        }
        paused
    }

    /// 仅在 paused 状态下生效
    pub fn resume(&self) -> bool {
        let resumed = {
            let mut state = self.lock_state();
            if state.status == SyncStatus::Paused {
                state.status = SyncStatus::Syncing;
                self.lock_control().resume();
                true
            } else {
                false
            }
        };

        if resumed {
            info!("同步已恢复");
            self.events.emit(SyncEvent::StateChanged {
                from: SyncStatus::Paused,
                to: SyncStatus::Syncing,
            });
        }
        resumed
    }

    /// 取消正在进行的同步
    pub fn cancel(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        info!("请求取消同步");
        self.lock_control().cancel();
        true
    }

    /// 执行同步
    pub async fn start_sync(&self, request: SyncRequest) -> Result<SyncReport> {
        if request.events.is_empty() {
            return Err(SyncError::Usage("没有选择任何事件".to_string()));
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SyncError::Usage("已有同步任务在运行".to_string()));
        }
        let _running = scopeguard::guard((), |_| self.running.store(false, Ordering::SeqCst));

        let control = SyncControl::new();
        *self.lock_control() = control.clone();

        let start_time = chrono::Utc::now().timestamp_millis();
        {
            let mut state = self.lock_state();
            *state = SyncState {
                status: state.status,
                mode: Some(request.mode),
                events_total: request.events.len(),
                bytes_total: request.events.iter().map(|e| e.fingerprint.total_size).sum(),
                start_time: Some(start_time),
                ..SyncState::default()
            };
        }
        self.set_status(SyncStatus::Syncing);

        info!(
            "开始同步: {} -> {}, {} 个事件, 模式 {:?}",
            request.source.label,
            request.dest.label,
            request.events.len(),
            request.mode
        );

        match self.run(&request, &control, start_time).await {
            Ok(report) => {
                self.events.emit(SyncEvent::Completed(report.clone()));
                Ok(report)
            }
            Err(e) => {
                let status = match e {
                    SyncError::Cancelled => SyncStatus::Cancelled,
                    _ => SyncStatus::Error,
                };
                if status == SyncStatus::Cancelled {
                    info!("同步已取消");
                } else {
                    error!("同步失败: {}", e);
                }
                self.set_status(status);
                self.events.emit(SyncEvent::Failed {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        request: &SyncRequest,
        control: &SyncControl,
        start_time: i64,
    ) -> Result<SyncReport> {
        ensure_permissions(request).await?;

        let dest = request.dest.storage.as_ref();
        for event_type in EventType::ALL {
            dest.create_dir(event_type.folder_name()).await?;
        }

        let selected: Vec<String> = request.events.iter().map(|e| e.event.name.clone()).collect();
        let mut synced = Vec::new();

        for (index, item) in request.events.iter().enumerate() {
            control.checkpoint().await?;

            {
                let mut state = self.lock_state();
                state.current_event = Some(item.event.name.clone());
                state.current_file = None;
                state.current_file_bytes = 0;
            }

            match self.sync_event(request, item, control).await {
                Ok(verified) => {
                    let progress = {
                        let mut state = self.lock_state();
                        state.events_completed += 1;
                        state.progress()
                    };
                    synced.push(SyncedEvent {
                        name: item.event.name.clone(),
                        source_size: item.fingerprint.total_size,
                        verified,
                    });
                    self.events.emit(SyncEvent::EventCompleted {
                        event: item.event.name.clone(),
                    });
                    self.events.emit(SyncEvent::Progress(progress));
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("事件 {} 同步失败: {}", item.event.name, e);
                    self.record_failure(request, index, &item.event.name, &e, &selected)
                        .await;
                }
            }
        }

        {
            let mut state = self.lock_state();
            state.current_event = None;
            state.current_file = None;
            state.current_file_bytes = 0;
        }

        let (notes_synced, unresolved_notes) = if request.sync_notes {
            self.sync_notes(request)
        } else {
            (0, Vec::new())
        };

        let manifest_written = if request.settings.write_sync_file {
            self.write_manifest(request, &synced).await
        } else {
            false
        };

        let snapshot = self.snapshot();
        if snapshot.errors.is_empty() {
            if let Err(e) = self
                .checkpoints
                .clear(&request.source.label, &request.dest.label)
                .await
            {
                warn!("清除断点记录失败: {}", e);
            }
        }
        self.set_status(SyncStatus::Complete);

        info!(
            "同步完成: {}/{} 个事件, {} 字节, {} 个错误",
            snapshot.events_completed,
            snapshot.events_total,
            snapshot.bytes_completed,
            snapshot.errors.len()
        );

        Ok(SyncReport {
            status: SyncStatus::Complete,
            mode: request.mode,
            events_total: snapshot.events_total,
            events_completed: snapshot.events_completed,
            bytes_total: snapshot.bytes_total,
            bytes_completed: snapshot.bytes_completed,
            errors: snapshot.errors,
            notes_synced,
            unresolved_notes,
            manifest_written,
            start_time,
            end_time: chrono::Utc::now().timestamp_millis(),
        })
    }

    /// 复制、校验（可选）、移动模式下删除源事件；返回是否经过校验
    async fn sync_event(
        &self,
        request: &SyncRequest,
        item: &ComparedEvent,
        control: &SyncControl,
    ) -> Result<bool> {
        let src = request.source.storage.as_ref();
        let dst = request.dest.storage.as_ref();
        let settings = &request.settings;

        let mut on_chunk = |p: ChunkProgress<'_>| {
            let progress = {
                let mut state = self.lock_state();
                if state.current_file.as_deref() != Some(p.file) {
                    state.current_file = Some(p.file.to_string());
                }
                state.bytes_completed += p.chunk;
                state.current_file_bytes = p.file_bytes;
                state.progress()
            };
            self.events.emit(SyncEvent::Progress(progress));
        };

        transfer::copy_event(
            src,
            dst,
            &item.event.path,
            &item.fingerprint,
            settings.chunk_size,
            control,
            &mut on_chunk,
        )
        .await?;

        let verified = if settings.verify_after_copy {
            self.enter_verifying(control).await?;
            let result =
                transfer::verify_event(src, dst, &item.fingerprint, settings.checksum_threshold)
                    .await;
            self.set_status(SyncStatus::Syncing);

            if !result? {
                return Err(SyncError::Verification(item.event.name.clone()));
            }
            true
        } else {
            false
        };

        if request.mode == SyncMode::Move {
            src.delete_dir(&item.event.path).await?;
            debug!("已删除源事件: {}", item.event.path);
        }

        Ok(verified)
    }

    /// 进入校验前先等待暂停结束，再从 syncing 切换到 verifying
    async fn enter_verifying(&self, control: &SyncControl) -> Result<()> {
        loop {
            control.checkpoint().await?;

            let entered = {
                let mut state = self.lock_state();
                if state.status == SyncStatus::Syncing {
                    state.status = SyncStatus::Verifying;
                    true
                } else {
                    false
                }
            };

            if entered {
                self.events.emit(SyncEvent::StateChanged {
                    from: SyncStatus::Syncing,
                    to: SyncStatus::Verifying,
                });
                return Ok(());
            }
            tokio::task::yield_now().await;
        }
    }

    async fn record_failure(
        &self,
        request: &SyncRequest,
        index: usize,
        event_name: &str,
        err: &SyncError,
        selected: &[String],
    ) {
        let resume_point = {
            let mut state = self.lock_state();
            state.errors.push(EventError {
                event: event_name.to_string(),
                error: err.to_string(),
            });
            state.can_resume = true;
            *state.resume_point.get_or_insert(index)
        };

        self.events.emit(SyncEvent::EventFailed {
            event: event_name.to_string(),
            error: err.to_string(),
        });

        let checkpoint = ResumeCheckpoint {
            source_label: request.source.label.clone(),
            dest_label: request.dest.label.clone(),
            last_completed_event: resume_point.checked_sub(1),
            selected_events: selected.to_vec(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        if let Err(e) = self.checkpoints.save(&checkpoint).await {
            warn!("保存断点记录失败: {}", e);
        }
    }

    /// 同步备注：源端独有的复制到目标端，冲突按策略处理
    fn sync_notes(&self, request: &SyncRequest) -> (usize, Vec<NoteDiff>) {
        let comparison = &request.notes_comparison;
        let source_id = &request.source.id;
        let dest_id = &request.dest.id;
        let mut synced = 0;
        let mut unresolved = Vec::new();

        for diff in &comparison.source_only {
            if let Some(notes) = &diff.source_notes {
                self.notes
                    .save_notes(&notes_key(dest_id, &diff.event_name), notes.clone());
                synced += 1;
            }
        }

        for diff in &comparison.conflict {
            match request.settings.notes_conflict_policy {
                NotesConflictPolicy::Ask => unresolved.push(diff.clone()),
                NotesConflictPolicy::Merge => {
                    let (Some(source), Some(dest)) = (&diff.source_notes, &diff.dest_notes) else {
                        continue;
                    };
                    let merged = merge_notes(source, dest);
                    self.notes
                        .save_notes(&notes_key(source_id, &diff.event_name), merged.clone());
                    self.notes
                        .save_notes(&notes_key(dest_id, &diff.event_name), merged);
                    synced += 1;
                }
            }
        }

        debug!("备注同步: {} 条, {} 条冲突待处理", synced, unresolved.len());
        (synced, unresolved)
    }

    /// 读-改-写目标端清单，失败只记录日志
    async fn write_manifest(&self, request: &SyncRequest, synced: &[SyncedEvent]) -> bool {
        let dest = request.dest.storage.as_ref();
        let now = chrono::Utc::now().to_rfc3339();

        let mut manifest = SyncManifest::load(dest).await;
        manifest.last_sync = Some(now.clone());
        manifest.source_info = Some(crate::core::manifest::SourceInfo {
            id: request.source.id.clone(),
            label: request.source.label.clone(),
        });
        for event in synced {
            manifest.record_event(&event.name, event.source_size, event.verified, &now);
        }

        for item in &request.events {
            let name = &item.event.name;
            let notes = self
                .notes
                .notes(&notes_key(&request.dest.id, name))
                .or_else(|| self.notes.notes(&notes_key(&request.source.id, name)))
                .filter(|n| !n.is_empty());
            if let Some(notes) = notes {
                manifest.notes.insert(name.clone(), notes);
            }
        }

        manifest.settings = Some(request.settings.clone());
        manifest.merge_presets(&request.presets);

        match manifest.save(dest).await {
            Ok(()) => true,
            Err(e) => {
                warn!("写入同步清单失败: {}", e);
                false
            }
        }
    }
}

/// 源端读权限（移动模式需要读写），目标端读写权限
async fn ensure_permissions(request: &SyncRequest) -> Result<()> {
    let source_mode = match request.mode {
        SyncMode::Copy => PermissionMode::Read,
        SyncMode::Move => PermissionMode::ReadWrite,
    };

    ensure_permission(request.source.storage.as_ref(), &request.source.label, source_mode).await?;
    ensure_permission(
        request.dest.storage.as_ref(),
        &request.dest.label,
        PermissionMode::ReadWrite,
    )
    .await
}

async fn ensure_permission(storage: &dyn Storage, label: &str, mode: PermissionMode) -> Result<()> {
    let mut state = storage.query_permission(mode).await?;
    if state != PermissionState::Granted {
        debug!("请求权限 {} {:?}", label, mode);
        state = storage.request_permission(mode).await?;
    }

    if state == PermissionState::Granted {
        Ok(())
    } else {
        Err(SyncError::Permission(format!("{} ({:?})", label, mode)))
    }
}
