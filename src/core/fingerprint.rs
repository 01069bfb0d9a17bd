use crate::drive::{Event, EventMetadata, EventType};
use crate::storage::{join_path, Storage, PARTIAL_SUFFIX};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const EVENT_METADATA_FILE: &str = "event.json";

/// 事件文件夹中的单个文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    /// 相对驱动器根目录的路径
    pub path: String,
    pub size: u64,
    /// 修改时间（毫秒时间戳）
    pub last_modified: i64,
}

/// 事件指纹：文件列表与聚合信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    pub name: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub file_count: usize,
    pub total_size: u64,
    /// 最新文件的修改时间，无文件时为 0
    pub newest_file: i64,
    /// 按文件名排序
    pub files: Vec<FileEntry>,
}

impl Fingerprint {
    pub fn from_files(name: impl Into<String>, event_type: EventType, mut files: Vec<FileEntry>) -> Self {
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            name: name.into(),
            event_type,
            file_count: files.len(),
            total_size: files.iter().map(|f| f.size).sum(),
            newest_file: files.iter().map(|f| f.last_modified).max().unwrap_or(0),
            files,
        }
    }

    pub fn file(&self, name: &str) -> Option<&FileEntry> {
        self.files
            .binary_search_by(|f| f.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.files[i])
    }
}

/// 事件指纹计算器
///
/// 尽力而为：列举失败只记录日志，返回已收集到的部分结果。
#[derive(Debug, Default, Clone, Copy)]
pub struct EventFingerprinter;

impl EventFingerprinter {
    pub fn new() -> Self {
        Self
    }

    /// 计算事件指纹，遇到 event.json 且事件尚无元数据时顺带解析
    pub async fn fingerprint(&self, storage: &dyn Storage, event: &mut Event) -> Fingerprint {
        let mut files = Vec::new();

        match storage.list_dir(&event.path).await {
            Ok(entries) => {
                for entry in entries {
                    if !entry.is_file() || entry.name.ends_with(PARTIAL_SUFFIX) {
                        continue;
                    }

                    if entry.name == EVENT_METADATA_FILE && event.metadata.is_none() {
                        event.metadata = load_metadata(storage, &event.path).await;
                    }

                    files.push(FileEntry {
                        path: join_path(&event.path, &entry.name),
                        name: entry.name,
                        size: entry.size,
                        last_modified: entry.modified,
                    });
                }
            }
            Err(e) => {
                warn!("列举事件文件失败 {} ({}): {}", event.path, storage.name(), e);
            }
        }

        let fingerprint = Fingerprint::from_files(&event.name, event.event_type, files);
        debug!(
            "指纹 {}: {} 个文件, {} 字节",
            event.path, fingerprint.file_count, fingerprint.total_size
        );
        fingerprint
    }
}

async fn load_metadata(storage: &dyn Storage, event_path: &str) -> Option<EventMetadata> {
    let path = join_path(event_path, EVENT_METADATA_FILE);
    let text = match storage.read_text(&path).await {
        Ok(t) => t,
        Err(e) => {
            warn!("读取 {} 失败: {}", path, e);
            return None;
        }
    };

    match serde_json::from_str::<EventMetadata>(&text) {
        Ok(meta) => Some(meta),
        Err(e) => {
            warn!("解析 {} 失败: {}", path, e);
            None
        }
    }
}
