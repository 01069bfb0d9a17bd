use crate::db::CheckpointRow;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;

/// 断点续传记录，按 (源标签, 目标标签) 保存
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeCheckpoint {
    pub source_label: String,
    pub dest_label: String,
    /// 最后一个成功完成的事件下标
    pub last_completed_event: Option<usize>,
    /// 本次同步选中的事件名（按顺序）
    pub selected_events: Vec<String>,
    pub timestamp: i64,
}

impl ResumeCheckpoint {
    /// 尚未完成的事件名
    pub fn remaining(&self) -> &[String] {
        let start = self.last_completed_event.map_or(0, |i| i + 1);
        self.selected_events.get(start..).unwrap_or(&[])
    }
}

/// 断点存储
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    db: Arc<SqlitePool>,
}

impl CheckpointStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    pub async fn save(&self, checkpoint: &ResumeCheckpoint) -> Result<()> {
        let selected = serde_json::to_string(&checkpoint.selected_events)?;

        sqlx::query(
            r#"
            INSERT INTO resume_checkpoints (source_label, dest_label, last_completed_event, selected_events, timestamp)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(source_label, dest_label) DO UPDATE SET
                last_completed_event = excluded.last_completed_event,
                selected_events = excluded.selected_events,
                timestamp = excluded.timestamp
            "#,
        )
        .bind(&checkpoint.source_label)
        .bind(&checkpoint.dest_label)
        .bind(checkpoint.last_completed_event.map(|i| i as i64))
        .bind(&selected)
        .bind(checkpoint.timestamp)
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }

    pub async fn load(&self, source_label: &str, dest_label: &str) -> Result<Option<ResumeCheckpoint>> {
        let row = sqlx::query_as::<_, CheckpointRow>(
            "SELECT * FROM resume_checkpoints WHERE source_label = ? AND dest_label = ?",
        )
        .bind(source_label)
        .bind(dest_label)
        .fetch_optional(self.db.as_ref())
        .await?;

        match row {
            Some(r) => Ok(Some(r.try_into()?)),
            None => Ok(None),
        }
    }

    pub async fn clear(&self, source_label: &str, dest_label: &str) -> Result<()> {
        sqlx::query("DELETE FROM resume_checkpoints WHERE source_label = ? AND dest_label = ?")
            .bind(source_label)
            .bind(dest_label)
            .execute(self.db.as_ref())
            .await?;
        Ok(())
    }
}
