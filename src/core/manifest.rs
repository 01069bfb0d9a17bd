//! 目标驱动器根目录下的同步清单 `.teslacam-sync.json`

use crate::config::SyncSettings;
use crate::core::notes::EventNotes;
use crate::core::preset::Preset;
use crate::error::Result;
use crate::storage::Storage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub const MANIFEST_FILE: &str = ".teslacam-sync.json";
pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncedEventRecord {
    /// RFC 3339
    pub synced_at: String,
    pub source_size: u64,
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncManifest {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub last_sync: Option<String>,
    #[serde(default)]
    pub source_info: Option<SourceInfo>,
    #[serde(default)]
    pub synced_events: BTreeMap<String, SyncedEventRecord>,
    #[serde(default)]
    pub notes: BTreeMap<String, EventNotes>,
    #[serde(default)]
    pub settings: Option<SyncSettings>,
    #[serde(default)]
    pub presets: Vec<Preset>,
}

fn default_version() -> u32 {
    MANIFEST_VERSION
}

impl Default for SyncManifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            last_sync: None,
            source_info: None,
            synced_events: BTreeMap::new(),
            notes: BTreeMap::new(),
            settings: None,
            presets: Vec::new(),
        }
    }
}

impl SyncManifest {
    /// 读取清单；不存在或损坏时视为没有历史记录
    pub async fn load(storage: &dyn Storage) -> Self {
        let text = match storage.exists(MANIFEST_FILE).await {
            Ok(true) => storage.read_text(MANIFEST_FILE).await,
            Ok(false) => return Self::default(),
            Err(e) => Err(e),
        };

        let text = match text {
            Ok(t) => t,
            Err(e) => {
                warn!("读取同步清单失败 ({}): {}", storage.name(), e);
                return Self::default();
            }
        };

        match serde_json::from_str::<SyncManifest>(&text) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!("同步清单已损坏，忽略 ({}): {}", storage.name(), e);
                Self::default()
            }
        }
    }

    pub async fn save(&self, storage: &dyn Storage) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        storage.write(MANIFEST_FILE, json.into_bytes()).await?;
        debug!("同步清单已写入 {}", storage.name());
        Ok(())
    }

    pub fn record_event(&mut self, name: &str, source_size: u64, verified: bool, synced_at: &str) {
        self.synced_events.insert(
            name.to_string(),
            SyncedEventRecord {
                synced_at: synced_at.to_string(),
                source_size,
                verified,
            },
        );
    }

    /// 按名称合并预设，同名覆盖
    pub fn merge_presets(&mut self, presets: &[Preset]) {
        for preset in presets {
            match self.presets.iter_mut().find(|p| p.name == preset.name) {
                Some(existing) => *existing = preset.clone(),
                None => self.presets.push(preset.clone()),
            }
        }
    }
}
