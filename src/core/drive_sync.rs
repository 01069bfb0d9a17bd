//! 对外门面：驱动器选择、对比、同步控制、预设与配置

use crate::config::{SettingsPatch, SyncSettings};
use crate::core::checkpoint::{CheckpointStore, ResumeCheckpoint};
use crate::core::comparator::{ClassifiedEvents, ComparedEvent, DiffClassifier, EventStatus};
use crate::core::engine::{SyncEngine, SyncMode, SyncReport, SyncRequest, SyncState, SyncStatus};
use crate::core::events::{EventBus, SyncEvent};
use crate::core::notes::{AnnotationStore, NotesComparison, NotesDiff};
use crate::core::preset::{Preset, PresetPatch, PresetStore};
use crate::core::statistics::{Statistics, StatisticsAggregator};
use crate::drive::{Drive, DriveRegistry};
use crate::error::{Result, SyncError};
use crate::storage::Storage;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// 一次对比的完整结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    #[serde(flatten)]
    pub events: ClassifiedEvents,
    pub notes_comparison: NotesComparison,
    pub statistics: Statistics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSyncOptions {
    /// 为空时使用对比结果中被选中的事件
    #[serde(default)]
    pub selected_events: Option<Vec<String>>,
    pub mode: SyncMode,
    #[serde(default)]
    pub sync_notes: bool,
    /// 仅对本次同步生效，不写入配置文件
    #[serde(default)]
    pub overrides: Option<SettingsPatch>,
}

impl Default for StartSyncOptions {
    fn default() -> Self {
        Self {
            selected_events: None,
            mode: SyncMode::Copy,
            sync_notes: false,
            overrides: None,
        }
    }
}

#[derive(Default)]
struct Selection {
    source: Option<String>,
    dest: Option<String>,
    comparison: Option<ComparisonResult>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// 驱动器同步门面
pub struct DriveSync {
    drives: Mutex<DriveRegistry>,
    selection: Mutex<Selection>,
    settings: Mutex<SyncSettings>,
    config_dir: Option<PathBuf>,
    engine: SyncEngine,
    classifier: DiffClassifier,
    notes: Arc<dyn AnnotationStore>,
    presets: PresetStore,
    checkpoints: CheckpointStore,
    events: EventBus,
}

impl DriveSync {
    pub fn new(
        db: Arc<SqlitePool>,
        notes: Arc<dyn AnnotationStore>,
        settings: SyncSettings,
        config_dir: Option<PathBuf>,
    ) -> Self {
        let events = EventBus::new();
        let checkpoints = CheckpointStore::new(db.clone());
        Self {
            drives: Mutex::new(DriveRegistry::new()),
            selection: Mutex::new(Selection::default()),
            settings: Mutex::new(settings),
            config_dir,
            engine: SyncEngine::new(events.clone(), notes.clone(), checkpoints.clone()),
            classifier: DiffClassifier::new(),
            notes,
            presets: PresetStore::new(db),
            checkpoints,
            events,
        }
    }

    /// 使用应用状态（数据库 + 配置目录）创建
    pub fn from_app_state(state: &crate::AppState, notes: Arc<dyn AnnotationStore>) -> Self {
        let settings = SyncSettings::load(&state.config_dir);
        Self::new(state.db.clone(), notes, settings, Some(state.config_dir.clone()))
    }

    // ========== 驱动器 ==========

    /// 打开并注册驱动器，返回驱动器 id
    pub async fn add_drive(&self, label: impl Into<String>, storage: Arc<dyn Storage>) -> Result<String> {
        let drive = Drive::open(label, storage).await?;
        let id = lock(&self.drives).insert(drive);
        Ok(id)
    }

    pub fn remove_drive(&self, id: &str) -> Option<Drive> {
        let removed = lock(&self.drives).remove(id);
        if removed.is_some() {
            let mut selection = lock(&self.selection);
            if selection.source.as_deref() == Some(id) {
                selection.source = None;
                selection.comparison = None;
            }
            if selection.dest.as_deref() == Some(id) {
                selection.dest = None;
                selection.comparison = None;
            }
        }
        removed
    }

    pub fn drive(&self, id: &str) -> Option<Drive> {
        lock(&self.drives).get(id).cloned()
    }

    pub fn set_source(&self, drive_id: &str) -> Result<()> {
        self.require_drive(drive_id)?;
        let mut selection = lock(&self.selection);
        selection.source = Some(drive_id.to_string());
        selection.comparison = None;
        Ok(())
    }

    pub fn set_destination(&self, drive_id: &str) -> Result<()> {
        self.require_drive(drive_id)?;
        let mut selection = lock(&self.selection);
        selection.dest = Some(drive_id.to_string());
        selection.comparison = None;
        Ok(())
    }

    fn require_drive(&self, drive_id: &str) -> Result<Drive> {
        self.drive(drive_id)
            .ok_or_else(|| SyncError::NotFound(format!("驱动器 {}", drive_id)))
    }

    fn selected_pair(&self) -> Result<(Drive, Drive)> {
        let (source, dest) = {
            let selection = lock(&self.selection);
            (selection.source.clone(), selection.dest.clone())
        };
        let (Some(source), Some(dest)) = (source, dest) else {
            return Err(SyncError::Usage("未选择源或目标驱动器".to_string()));
        };
        Ok((self.require_drive(&source)?, self.require_drive(&dest)?))
    }

    // ========== 对比 ==========

    /// 对比源和目标，idle -> comparing -> idle
    pub async fn compare_events(&self) -> Result<ComparisonResult> {
        let (mut source, mut dest) = self.selected_pair()?;
        if self.engine.is_running() {
            return Err(SyncError::Usage("同步进行中，无法对比".to_string()));
        }

        self.engine.set_status(SyncStatus::Comparing);

        let classified = self
            .classifier
            .classify(
                source.storage.as_ref(),
                &mut source.events,
                dest.storage.as_ref(),
                &mut dest.events,
            )
            .await;
        let notes_comparison =
            NotesDiff::compare(&source.id, &source.events, &dest.id, self.notes.as_ref());
        let statistics = StatisticsAggregator::aggregate(&classified);

        // 回写补全了元数据的事件列表
        {
            let mut drives = lock(&self.drives);
            for updated in [source, dest] {
                if let Some(drive) = drives.get_mut(&updated.id) {
                    drive.events = updated.events;
                }
            }
        }

        let result = ComparisonResult {
            events: classified,
            notes_comparison,
            statistics,
        };
        lock(&self.selection).comparison = Some(result.clone());

        self.engine.set_status(SyncStatus::Idle);
        Ok(result)
    }

    /// 最近一次对比结果
    pub fn comparison(&self) -> Option<ComparisonResult> {
        lock(&self.selection).comparison.clone()
    }

    /// 修改最近一次对比结果中某个事件的选中状态
    pub fn set_event_selected(&self, name: &str, selected: bool) -> bool {
        lock(&self.selection)
            .comparison
            .as_mut()
            .is_some_and(|c| c.events.set_selected(name, selected))
    }

    // ========== 同步 ==========

    pub async fn start_sync(&self, options: StartSyncOptions) -> Result<SyncReport> {
        let (source, dest) = self.selected_pair()?;
        let comparison = self
            .comparison()
            .ok_or_else(|| SyncError::Usage("请先对比驱动器".to_string()))?;

        let events = match &options.selected_events {
            None => comparison.events.selected(),
            Some(names) => pick_events(&comparison.events, names)?,
        };
        if events.is_empty() {
            return Err(SyncError::Usage("没有选择任何事件".to_string()));
        }

        let presets = match self.presets.for_destination(&dest.label).await {
            Ok(p) => p,
            Err(e) => {
                warn!("读取预设失败: {}", e);
                Vec::new()
            }
        };

        let mut settings = self.settings();
        if let Some(patch) = &options.overrides {
            settings.apply(patch);
        }

        let request = SyncRequest {
            source,
            dest,
            events,
            mode: options.mode,
            sync_notes: options.sync_notes,
            notes_comparison: comparison.notes_comparison,
            presets,
            settings,
        };
        let source_id = request.source.id.clone();
        let dest_id = request.dest.id.clone();

        let result = self.engine.start_sync(request).await;
        if let Err(SyncError::Usage(_)) = &result {
            return result;
        }

        // 驱动器内容已变化，对比结果作废
        lock(&self.selection).comparison = None;
        self.rescan(&source_id).await;
        self.rescan(&dest_id).await;

        result
    }

    async fn rescan(&self, drive_id: &str) {
        let Some(mut drive) = self.drive(drive_id) else {
            return;
        };
        if let Err(e) = drive.rescan().await {
            warn!("重新扫描驱动器 {} 失败: {}", drive.label, e);
            return;
        }
        if let Some(existing) = lock(&self.drives).get_mut(drive_id) {
            existing.events = drive.events;
        }
    }

    pub fn pause(&self) -> bool {
        self.engine.pause()
    }

    pub fn resume(&self) -> bool {
        self.engine.resume()
    }

    pub fn cancel(&self) -> bool {
        self.engine.cancel()
    }

    pub fn state(&self) -> SyncState {
        self.engine.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn event_stream(&self) -> impl futures::Stream<Item = SyncEvent> + Send + 'static {
        self.events.stream()
    }

    /// 当前源 / 目标组合的断点记录
    pub async fn resume_checkpoint(&self) -> Result<Option<ResumeCheckpoint>> {
        let (source, dest) = self.selected_pair()?;
        self.checkpoints.load(&source.label, &dest.label).await
    }

    pub fn notes(&self) -> &Arc<dyn AnnotationStore> {
        &self.notes
    }

    // ========== 预设 ==========

    pub async fn get_all_presets(&self) -> Result<Vec<Preset>> {
        self.presets.get_all().await
    }

    pub async fn add_preset(
        &self,
        name: impl Into<String>,
        source_label: impl Into<String>,
        dest_label: impl Into<String>,
    ) -> Result<Preset> {
        self.presets
            .add(Preset::new(name, source_label, dest_label))
            .await
    }

    pub async fn update_preset(&self, id: &str, patch: PresetPatch) -> Result<Preset> {
        self.presets.update(id, patch).await
    }

    pub async fn delete_preset(&self, id: &str) -> Result<()> {
        self.presets.delete(id).await
    }

    pub async fn import_presets_from_drive(&self, drive_id: &str) -> Result<usize> {
        let drive = self.require_drive(drive_id)?;
        self.presets.import_from_drive(&drive).await
    }

    /// 应用预设：按标签选中源和目标，任一无法解析时返回 false
    pub async fn apply_preset(&self, id: &str) -> Result<bool> {
        let registry = lock(&self.drives).clone();
        let Some((source, dest)) = self.presets.apply(id, &registry).await? else {
            return Ok(false);
        };

        self.set_source(&source.id)?;
        self.set_destination(&dest.id)?;
        info!("已应用预设: {} -> {}", source.label, dest.label);
        Ok(true)
    }

    // ========== 配置 ==========

    pub fn settings(&self) -> SyncSettings {
        lock(&self.settings).clone()
    }

    /// 部分更新配置并持久化
    pub fn update_settings(&self, patch: SettingsPatch) -> Result<SyncSettings> {
        let updated = {
            let mut settings = lock(&self.settings);
            settings.apply(&patch);
            settings.clone()
        };
        if let Some(dir) = &self.config_dir {
            updated.save(dir)?;
        }
        Ok(updated)
    }
}

/// 按给定名称顺序从对比结果中取事件（不含仅目标端事件）
fn pick_events(classified: &ClassifiedEvents, names: &[String]) -> Result<Vec<ComparedEvent>> {
    names
        .iter()
        .map(|name| {
            classified
                .iter()
                .find(|(status, e)| *status != EventStatus::DestOnly && &e.event.name == name)
                .map(|(_, e)| e.clone())
                .ok_or_else(|| SyncError::Usage(format!("事件不在对比结果中: {}", name)))
        })
        .collect()
}
