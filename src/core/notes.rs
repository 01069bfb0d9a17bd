//! 事件备注（文本 + 标签）的对比与合并

use crate::drive::Event;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

/// 合并备注时的分隔符
pub const MERGE_SEPARATOR: &str = "\n\n---\n\n";

/// 单个事件的备注
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventNotes {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl EventNotes {
    pub fn new(text: impl Into<String>, tags: &[&str]) -> Self {
        Self {
            text: text.into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// 文本为空且无标签视为没有备注
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.tags.is_empty()
    }

    fn tag_set(&self) -> BTreeSet<&str> {
        self.tags.iter().map(String::as_str).collect()
    }

    /// 内容是否一致（标签按集合比较）
    pub fn same_content(&self, other: &EventNotes) -> bool {
        self.text == other.text && self.tag_set() == other.tag_set()
    }
}

/// 备注存储的组合键
pub fn notes_key(drive_id: &str, event_name: &str) -> String {
    format!("{}:{}", drive_id, event_name)
}

/// 备注存储接口
pub trait AnnotationStore: Send + Sync {
    fn notes(&self, key: &str) -> Option<EventNotes>;

    fn save_notes(&self, key: &str, notes: EventNotes);

    fn all(&self) -> HashMap<String, EventNotes>;
}

/// 内存备注存储
#[derive(Debug, Default)]
pub struct MemoryNotesStore {
    notes: RwLock<HashMap<String, EventNotes>>,
}

impl MemoryNotesStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AnnotationStore for MemoryNotesStore {
    fn notes(&self, key: &str) -> Option<EventNotes> {
        let guard = self.notes.read().unwrap_or_else(|e| e.into_inner());
        guard.get(key).cloned()
    }

    fn save_notes(&self, key: &str, notes: EventNotes) {
        let mut guard = self.notes.write().unwrap_or_else(|e| e.into_inner());
        guard.insert(key.to_string(), notes);
    }

    fn all(&self) -> HashMap<String, EventNotes> {
        let guard = self.notes.read().unwrap_or_else(|e| e.into_inner());
        guard.clone()
    }
}

/// 一侧或两侧的备注
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteDiff {
    pub event_name: String,
    pub source_notes: Option<EventNotes>,
    pub dest_notes: Option<EventNotes>,
}

/// 备注对比结果
///
/// 备注不记录时间戳，`newer_on_source` / `newer_on_dest` 始终为空。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotesComparison {
    pub source_only: Vec<NoteDiff>,
    pub dest_only: Vec<NoteDiff>,
    pub newer_on_source: Vec<NoteDiff>,
    pub newer_on_dest: Vec<NoteDiff>,
    pub conflict: Vec<NoteDiff>,
}

impl NotesComparison {
    pub fn is_empty(&self) -> bool {
        self.source_only.is_empty()
            && self.dest_only.is_empty()
            && self.newer_on_source.is_empty()
            && self.newer_on_dest.is_empty()
            && self.conflict.is_empty()
    }
}

pub struct NotesDiff;

impl NotesDiff {
    /// 对源端每个事件比较两侧备注
    pub fn compare(
        source_drive_id: &str,
        source_events: &[Event],
        dest_drive_id: &str,
        store: &dyn AnnotationStore,
    ) -> NotesComparison {
        let mut result = NotesComparison::default();

        for event in source_events {
            let source_notes = store
                .notes(&notes_key(source_drive_id, &event.name))
                .filter(|n| !n.is_empty());
            let dest_notes = store
                .notes(&notes_key(dest_drive_id, &event.name))
                .filter(|n| !n.is_empty());

            let diff = |source_notes, dest_notes| NoteDiff {
                event_name: event.name.clone(),
                source_notes,
                dest_notes,
            };

            match (source_notes, dest_notes) {
                (Some(s), None) => result.source_only.push(diff(Some(s), None)),
                (None, Some(d)) => result.dest_only.push(diff(None, Some(d))),
                (Some(s), Some(d)) if !s.same_content(&d) => {
                    result.conflict.push(diff(Some(s), Some(d)))
                }
                _ => {}
            }
        }

        result
    }
}

/// 合并两侧备注：文本用分隔符拼接，标签取并集
pub fn merge_notes(source: &EventNotes, dest: &EventNotes) -> EventNotes {
    let text = if source.text.trim().is_empty() || source.text == dest.text {
        dest.text.clone()
    } else if dest.text.trim().is_empty() {
        source.text.clone()
    } else {
        format!("{}{}{}", source.text, MERGE_SEPARATOR, dest.text)
    };

    let tags: BTreeSet<String> = source.tags.iter().chain(dest.tags.iter()).cloned().collect();

    EventNotes {
        text,
        tags: tags.into_iter().collect(),
    }
}
