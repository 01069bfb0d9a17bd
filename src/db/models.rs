use crate::core::checkpoint::ResumeCheckpoint;
use crate::core::preset::Preset;

// 数据库表模型
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PresetRow {
    pub id: String,
    pub name: String,
    pub source_label: String,
    pub dest_label: String,
    pub created_at: i64,
    pub last_used: Option<i64>,
    pub imported_from: Option<String>,
}

impl From<PresetRow> for Preset {
    fn from(row: PresetRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            source_label: row.source_label,
            dest_label: row.dest_label,
            created_at: row.created_at,
            last_used: row.last_used,
            imported_from: row.imported_from,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CheckpointRow {
    pub source_label: String,
    pub dest_label: String,
    pub last_completed_event: Option<i64>,
    /// JSON 数组
    pub selected_events: String,
    pub timestamp: i64,
}

impl TryFrom<CheckpointRow> for ResumeCheckpoint {
    type Error = serde_json::Error;

    fn try_from(row: CheckpointRow) -> Result<Self, Self::Error> {
        Ok(Self {
            source_label: row.source_label,
            dest_label: row.dest_label,
            last_completed_event: row
                .last_completed_event
                .and_then(|i| usize::try_from(i).ok()),
            selected_events: serde_json::from_str(&row.selected_events)?,
            timestamp: row.timestamp,
        })
    }
}
