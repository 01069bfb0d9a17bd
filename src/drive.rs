//! 驱动器与事件模型
//!
//! 只负责按目录结构解析事件列表，不做任何写操作。

use crate::storage::{join_path, Storage};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// 事件类型（即驱动器根目录下的分类文件夹）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    SavedClips,
    SentryClips,
    RecentClips,
}

impl EventType {
    pub const ALL: [EventType; 3] = [
        EventType::SavedClips,
        EventType::SentryClips,
        EventType::RecentClips,
    ];

    pub fn folder_name(&self) -> &'static str {
        match self {
            EventType::SavedClips => "SavedClips",
            EventType::SentryClips => "SentryClips",
            EventType::RecentClips => "RecentClips",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.folder_name())
    }
}

/// event.json 中的元数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventMetadata {
    pub timestamp: Option<String>,
    pub city: Option<String>,
    pub street: Option<String>,
    pub est_lat: Option<String>,
    pub est_lon: Option<String>,
    pub reason: Option<String>,
    pub camera: Option<String>,
}

/// 事件：一个包含若干视频片段的命名文件夹
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub name: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// 相对驱动器根目录的路径，如 `SavedClips/2024-01-01_10-00-00`
    pub path: String,
    pub metadata: Option<EventMetadata>,
}

impl Event {
    pub fn new(name: impl Into<String>, event_type: EventType) -> Self {
        let name = name.into();
        let path = join_path(event_type.folder_name(), &name);
        Self {
            name,
            event_type,
            path,
            metadata: None,
        }
    }

    pub fn city(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.city.as_deref())
            .filter(|c| !c.trim().is_empty())
    }
}

/// 驱动器：用户选择的一个根目录
#[derive(Clone)]
pub struct Drive {
    pub id: String,
    pub label: String,
    pub events: Vec<Event>,
    pub storage: Arc<dyn Storage>,
}

impl fmt::Debug for Drive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Drive")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("events", &self.events.len())
            .field("storage", &self.storage.name())
            .finish()
    }
}

impl Drive {
    /// 打开驱动器并解析事件列表
    pub async fn open(label: impl Into<String>, storage: Arc<dyn Storage>) -> Result<Self> {
        let mut drive = Self {
            id: uuid::Uuid::new_v4().to_string(),
            label: label.into(),
            events: Vec::new(),
            storage,
        };
        drive.rescan().await?;
        Ok(drive)
    }

    /// 重新解析事件列表（整体替换 events）
    pub async fn rescan(&mut self) -> Result<()> {
        self.events = parse_events(self.storage.as_ref()).await?;
        info!(
            "驱动器 {} ({}) 解析完成: {} 个事件",
            self.label,
            self.storage.name(),
            self.events.len()
        );
        Ok(())
    }

    pub fn event(&self, name: &str) -> Option<&Event> {
        self.events.iter().find(|e| e.name == name)
    }
}

/// 解析驱动器的三个分类文件夹，每个子目录视为一个事件
pub async fn parse_events(storage: &dyn Storage) -> Result<Vec<Event>> {
    let mut events = Vec::new();

    for event_type in EventType::ALL {
        let mut entries = storage.list_dir(event_type.folder_name()).await?;
        entries.retain(|e| e.is_dir());
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        debug!("{}: {} 个事件文件夹", event_type, entries.len());

        events.extend(entries.into_iter().map(|e| Event::new(e.name, event_type)));
    }

    Ok(events)
}

/// 已注册的驱动器集合
#[derive(Debug, Default, Clone)]
pub struct DriveRegistry {
    drives: HashMap<String, Drive>,
}

impl DriveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, drive: Drive) -> String {
        let id = drive.id.clone();
        self.drives.insert(id.clone(), drive);
        id
    }

    pub fn remove(&mut self, id: &str) -> Option<Drive> {
        self.drives.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Drive> {
        self.drives.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Drive> {
        self.drives.get_mut(id)
    }

    /// 按显示名称精确查找
    pub fn find_by_label(&self, label: &str) -> Option<&Drive> {
        self.drives.values().find(|d| d.label == label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Drive> {
        self.drives.values()
    }

    pub fn len(&self) -> usize {
        self.drives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drives.is_empty()
    }
}
