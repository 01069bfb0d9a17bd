//! 应用配置模块

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 校验阈值：小于该大小的文件做完整校验和比较（10 MiB）
pub const DEFAULT_CHECKSUM_THRESHOLD: u64 = 10 * 1024 * 1024;

/// 备注冲突处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotesConflictPolicy {
    /// 交给调用方决定，引擎不处理冲突
    Ask,
    /// 文本拼接，标签取并集
    Merge,
}

/// 同步配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    /// 复制后校验
    #[serde(default = "default_true")]
    pub verify_after_copy: bool,
    /// 同步完成后写入目标驱动器的清单文件
    #[serde(default = "default_true")]
    pub write_sync_file: bool,
    #[serde(default = "default_notes_policy")]
    pub notes_conflict_policy: NotesConflictPolicy,
    /// 小于该大小的文件校验完整内容，否则只比较大小
    #[serde(default = "default_checksum_threshold")]
    pub checksum_threshold: u64,
    /// 流式复制的分块大小（字节）
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_true() -> bool {
    true
}

fn default_notes_policy() -> NotesConflictPolicy {
    NotesConflictPolicy::Ask
}

fn default_checksum_threshold() -> u64 {
    DEFAULT_CHECKSUM_THRESHOLD
}

fn default_chunk_size() -> usize {
    crate::storage::DEFAULT_CHUNK_SIZE
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            verify_after_copy: default_true(),
            write_sync_file: default_true(),
            notes_conflict_policy: default_notes_policy(),
            checksum_threshold: default_checksum_threshold(),
            chunk_size: default_chunk_size(),
        }
    }
}

/// 部分更新
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub verify_after_copy: Option<bool>,
    pub write_sync_file: Option<bool>,
    pub notes_conflict_policy: Option<NotesConflictPolicy>,
    pub checksum_threshold: Option<u64>,
    pub chunk_size: Option<usize>,
}

impl SyncSettings {
    /// 从配置文件加载同步配置
    pub fn load(config_dir: &Path) -> Self {
        let config_file = config_dir.join("config.json");
        fs::read_to_string(&config_file)
            .ok()
            .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
            .and_then(|config| config.get("sync").cloned())
            .and_then(|sync| serde_json::from_value::<SyncSettings>(sync).ok())
            .unwrap_or_default()
    }

    /// 保存同步配置
    pub fn save(&self, config_dir: &Path) -> Result<()> {
        let config_file = config_dir.join("config.json");

        // 读取现有配置
        let mut config: serde_json::Value = if config_file.exists() {
            let content = fs::read_to_string(&config_file)?;
            serde_json::from_str(&content).unwrap_or_else(|_| serde_json::json!({}))
        } else {
            serde_json::json!({})
        };

        if !config.is_object() {
            config = serde_json::json!({});
        }
        config["sync"] = serde_json::to_value(self)?;

        fs::create_dir_all(config_dir)?;
        fs::write(&config_file, serde_json::to_string_pretty(&config)?)?;

        Ok(())
    }

    /// 应用部分更新
    pub fn apply(&mut self, patch: &SettingsPatch) {
        if let Some(v) = patch.verify_after_copy {
            self.verify_after_copy = v;
        }
        if let Some(v) = patch.write_sync_file {
            self.write_sync_file = v;
        }
        if let Some(v) = patch.notes_conflict_policy {
            self.notes_conflict_policy = v;
        }
        if let Some(v) = patch.checksum_threshold {
            self.checksum_threshold = v;
        }
        if let Some(v) = patch.chunk_size {
            // 分块至少 4KB
            self.chunk_size = v.max(4096);
        }
    }
}
