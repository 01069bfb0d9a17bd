use crate::core::fingerprint::{EventFingerprinter, Fingerprint};
use crate::drive::Event;
use crate::storage::Storage;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// 两侧同名事件的比较结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventRelation {
    /// 内容相同
    Same,
    /// 源端更新（新增文件或修改时间更晚）
    Newer,
    /// 文件大小不一致
    DifferentSize,
}

/// 比较两个指纹
///
/// 文件数一致时逐个文件比较，`Newer` 优先于 `DifferentSize`；
/// 文件数不一致时交给 [`classify_by_file_count`]。
pub fn compare_fingerprints(source: &Fingerprint, dest: &Fingerprint) -> EventRelation {
    if source.file_count != dest.file_count {
        return classify_by_file_count(source, dest);
    }

    let mut newer = false;
    let mut different_size = false;

    for file in &source.files {
        let Some(other) = dest.file(&file.name) else {
            // 目标端没有该文件，说明源端新增了文件
            return EventRelation::Newer;
        };

        if file.size != other.size {
            different_size = true;
        }
        if file.last_modified > other.last_modified {
            newer = true;
        }
    }

    if newer {
        EventRelation::Newer
    } else if different_size {
        EventRelation::DifferentSize
    } else {
        EventRelation::Same
    }
}

/// 文件数不一致时的粗略判定：源端文件更多视为更新，否则视为大小不同
///
/// 不检查单个文件，源端删掉一个文件又新增一个更大的文件时会被判为 `DifferentSize`。
pub fn classify_by_file_count(source: &Fingerprint, dest: &Fingerprint) -> EventRelation {
    if source.file_count > dest.file_count {
        EventRelation::Newer
    } else {
        EventRelation::DifferentSize
    }
}

/// 事件分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventStatus {
    Missing,
    Newer,
    DifferentSize,
    Same,
    DestOnly,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Missing => "missing",
            EventStatus::Newer => "newer",
            EventStatus::DifferentSize => "differentSize",
            EventStatus::Same => "same",
            EventStatus::DestOnly => "destOnly",
        }
    }
}

impl From<EventRelation> for EventStatus {
    fn from(relation: EventRelation) -> Self {
        match relation {
            EventRelation::Same => EventStatus::Same,
            EventRelation::Newer => EventStatus::Newer,
            EventRelation::DifferentSize => EventStatus::DifferentSize,
        }
    }
}

/// 分类后的单个事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparedEvent {
    pub event: Event,
    /// 源端指纹；`DestOnly` 条目为目标端指纹
    pub fingerprint: Fingerprint,
    pub dest_fingerprint: Option<Fingerprint>,
    /// 是否参与同步，调用方可在开始同步前修改
    pub selected: bool,
}

/// 一次对比的五类结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedEvents {
    pub missing: Vec<ComparedEvent>,
    pub newer: Vec<ComparedEvent>,
    pub different_size: Vec<ComparedEvent>,
    pub same: Vec<ComparedEvent>,
    pub dest_only: Vec<ComparedEvent>,
}

impl ClassifiedEvents {
    pub fn list(&self, status: EventStatus) -> &[ComparedEvent] {
        match status {
            EventStatus::Missing => &self.missing,
            EventStatus::Newer => &self.newer,
            EventStatus::DifferentSize => &self.different_size,
            EventStatus::Same => &self.same,
            EventStatus::DestOnly => &self.dest_only,
        }
    }

    pub fn list_mut(&mut self, status: EventStatus) -> &mut Vec<ComparedEvent> {
        match status {
            EventStatus::Missing => &mut self.missing,
            EventStatus::Newer => &mut self.newer,
            EventStatus::DifferentSize => &mut self.different_size,
            EventStatus::Same => &mut self.same,
            EventStatus::DestOnly => &mut self.dest_only,
        }
    }

    /// 按分类顺序遍历所有条目
    pub fn iter(&self) -> impl Iterator<Item = (EventStatus, &ComparedEvent)> {
        [
            EventStatus::Missing,
            EventStatus::Newer,
            EventStatus::DifferentSize,
            EventStatus::Same,
            EventStatus::DestOnly,
        ]
        .into_iter()
        .flat_map(move |status| self.list(status).iter().map(move |e| (status, e)))
    }

    /// 当前被选中的源端事件（按分类顺序）
    pub fn selected(&self) -> Vec<ComparedEvent> {
        self.iter()
            .filter(|(status, e)| *status != EventStatus::DestOnly && e.selected)
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// 设置某个事件的选中状态，返回是否找到
    pub fn set_selected(&mut self, name: &str, selected: bool) -> bool {
        for status in [
            EventStatus::Missing,
            EventStatus::Newer,
            EventStatus::DifferentSize,
            EventStatus::Same,
        ] {
            if let Some(entry) = self.list_mut(status).iter_mut().find(|e| e.event.name == name) {
                entry.selected = selected;
                return true;
            }
        }
        false
    }
}

/// 差异分类器
#[derive(Debug, Default, Clone, Copy)]
pub struct DiffClassifier {
    fingerprinter: EventFingerprinter,
}

impl DiffClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// 对两侧事件指纹化并分类
    ///
    /// 事件列表以可变引用传入，指纹化过程中会补全事件元数据。
    pub async fn classify(
        &self,
        source_storage: &dyn Storage,
        source_events: &mut [Event],
        dest_storage: &dyn Storage,
        dest_events: &mut [Event],
    ) -> ClassifiedEvents {
        let mut result = ClassifiedEvents::default();

        let dest_index: HashMap<String, usize> = dest_events
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.clone(), i))
            .collect();
        let source_names: HashSet<String> =
            source_events.iter().map(|e| e.name.clone()).collect();

        for event in source_events.iter_mut() {
            let fingerprint = self.fingerprinter.fingerprint(source_storage, event).await;

            let Some(&dest_idx) = dest_index.get(&event.name) else {
                result.missing.push(ComparedEvent {
                    event: event.clone(),
                    fingerprint,
                    dest_fingerprint: None,
                    selected: true,
                });
                continue;
            };

            let dest_fp = self
                .fingerprinter
                .fingerprint(dest_storage, &mut dest_events[dest_idx])
                .await;
            let status = EventStatus::from(compare_fingerprints(&fingerprint, &dest_fp));
            debug!("{}: {}", event.name, status.as_str());

            result.list_mut(status).push(ComparedEvent {
                event: event.clone(),
                fingerprint,
                dest_fingerprint: Some(dest_fp),
                selected: status == EventStatus::Newer,
            });
        }

        for event in dest_events.iter_mut() {
            if source_names.contains(&event.name) {
                continue;
            }
            let fingerprint = self.fingerprinter.fingerprint(dest_storage, event).await;
            result.dest_only.push(ComparedEvent {
                event: event.clone(),
                fingerprint,
                dest_fingerprint: None,
                selected: false,
            });
        }

        info!(
            "对比完成: 缺失 {}, 更新 {}, 大小不同 {}, 相同 {}, 仅目标端 {}",
            result.missing.len(),
            result.newer.len(),
            result.different_size.len(),
            result.same.len(),
            result.dest_only.len()
        );

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fingerprint::FileEntry;
    use crate::drive::EventType;

    fn fp(files: &[(&str, u64, i64)]) -> Fingerprint {
        let files = files
            .iter()
            .map(|(name, size, mtime)| FileEntry {
                name: name.to_string(),
                path: format!("SavedClips/evt/{}", name),
                size: *size,
                last_modified: *mtime,
            })
            .collect();
        Fingerprint::from_files("evt", EventType::SavedClips, files)
    }

    #[test]
    fn test_identical_is_same() {
        let a = fp(&[("front.mp4", 100, 1000), ("back.mp4", 50, 2000)]);
        assert_eq!(compare_fingerprints(&a, &a.clone()), EventRelation::Same);
    }

    #[test]
    fn test_size_mismatch_same_mtime() {
        let src = fp(&[("front.mp4", 100, 1000)]);
        let dst = fp(&[("front.mp4", 90, 1000)]);
        assert_eq!(compare_fingerprints(&src, &dst), EventRelation::DifferentSize);
    }

    #[test]
    fn test_newer_wins_over_size() {
        let src = fp(&[("front.mp4", 100, 2000), ("back.mp4", 10, 1000)]);
        let dst = fp(&[("front.mp4", 90, 1000), ("back.mp4", 10, 1000)]);
        assert_eq!(compare_fingerprints(&src, &dst), EventRelation::Newer);
    }

    #[test]
    fn test_older_source_is_not_newer() {
        let src = fp(&[("front.mp4", 100, 500)]);
        let dst = fp(&[("front.mp4", 100, 1000)]);
        assert_eq!(compare_fingerprints(&src, &dst), EventRelation::Same);
    }

    #[test]
    fn test_renamed_file_is_newer() {
        let src = fp(&[("front.mp4", 100, 1000)]);
        let dst = fp(&[("left.mp4", 100, 1000)]);
        assert_eq!(compare_fingerprints(&src, &dst), EventRelation::Newer);
    }

    #[test]
    fn test_file_count_fallback() {
        let one = fp(&[("front.mp4", 100, 1000)]);
        let two = fp(&[("front.mp4", 100, 1000), ("back.mp4", 10, 1000)]);
        assert_eq!(classify_by_file_count(&two, &one), EventRelation::Newer);
        assert_eq!(classify_by_file_count(&one, &two), EventRelation::DifferentSize);
        // 文件数不同时不看单个文件
        let big_single = fp(&[("front.mp4", 9999, 9999)]);
        assert_eq!(compare_fingerprints(&big_single, &two), EventRelation::DifferentSize);
    }

    #[test]
    fn test_set_selected() {
        let entry = ComparedEvent {
            event: Event::new("evt", EventType::SavedClips),
            fingerprint: fp(&[]),
            dest_fingerprint: None,
            selected: false,
        };
        let mut classified = ClassifiedEvents {
            same: vec![entry],
            ..Default::default()
        };
        assert!(classified.selected().is_empty());
        assert!(classified.set_selected("evt", true));
        assert_eq!(classified.selected().len(), 1);
        assert!(!classified.set_selected("other", true));
    }
}
