use crate::core::manifest::SyncManifest;
use crate::db::PresetRow;
use crate::drive::{Drive, DriveRegistry};
use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info};

/// 源 / 目标标签组合
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub id: String,
    pub name: String,
    pub source_label: String,
    pub dest_label: String,
    /// 毫秒时间戳
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<i64>,
    /// 从哪个驱动器的清单导入
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imported_from: Option<String>,
}

impl Preset {
    pub fn new(
        name: impl Into<String>,
        source_label: impl Into<String>,
        dest_label: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            source_label: source_label.into(),
            dest_label: dest_label.into(),
            created_at: chrono::Utc::now().timestamp_millis(),
            last_used: None,
            imported_from: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetPatch {
    pub name: Option<String>,
    pub source_label: Option<String>,
    pub dest_label: Option<String>,
}

/// 预设存储（sqlite）
#[derive(Debug, Clone)]
pub struct PresetStore {
    db: Arc<SqlitePool>,
}

impl PresetStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    pub async fn get_all(&self) -> Result<Vec<Preset>> {
        let rows = sqlx::query_as::<_, PresetRow>("SELECT * FROM presets ORDER BY created_at ASC")
            .fetch_all(self.db.as_ref())
            .await?;
        Ok(rows.into_iter().map(Preset::from).collect())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Preset>> {
        let row = sqlx::query_as::<_, PresetRow>("SELECT * FROM presets WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.as_ref())
            .await?;
        Ok(row.map(Preset::from))
    }

    pub async fn add(&self, preset: Preset) -> Result<Preset> {
        self.save(&preset).await?;
        info!("添加预设: {} ({} -> {})", preset.name, preset.source_label, preset.dest_label);
        Ok(preset)
    }

    async fn save(&self, preset: &Preset) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO presets (id, name, source_label, dest_label, created_at, last_used, imported_from)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                source_label = excluded.source_label,
                dest_label = excluded.dest_label,
                last_used = excluded.last_used,
                imported_from = excluded.imported_from
            "#,
        )
        .bind(&preset.id)
        .bind(&preset.name)
        .bind(&preset.source_label)
        .bind(&preset.dest_label)
        .bind(preset.created_at)
        .bind(preset.last_used)
        .bind(&preset.imported_from)
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    pub async fn update(&self, id: &str, patch: PresetPatch) -> Result<Preset> {
        let mut preset = self
            .get(id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("预设 {}", id)))?;

        if let Some(name) = patch.name {
            preset.name = name;
        }
        if let Some(label) = patch.source_label {
            preset.source_label = label;
        }
        if let Some(label) = patch.dest_label {
            preset.dest_label = label;
        }

        self.save(&preset).await?;
        Ok(preset)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM presets WHERE id = ?")
            .bind(id)
            .execute(self.db.as_ref())
            .await?;
        Ok(())
    }

    pub async fn mark_used(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE presets SET last_used = ? WHERE id = ?")
            .bind(chrono::Utc::now().timestamp_millis())
            .bind(id)
            .execute(self.db.as_ref())
            .await?;
        Ok(())
    }

    /// 按标签精确匹配找到源和目标驱动器，任一找不到返回 None
    pub async fn apply(&self, id: &str, drives: &DriveRegistry) -> Result<Option<(Drive, Drive)>> {
        let Some(preset) = self.get(id).await? else {
            return Ok(None);
        };

        let source = drives.find_by_label(&preset.source_label);
        let dest = drives.find_by_label(&preset.dest_label);
        let (Some(source), Some(dest)) = (source, dest) else {
            debug!(
                "预设 {} 无法解析驱动器: {} / {}",
                preset.name, preset.source_label, preset.dest_label
            );
            return Ok(None);
        };

        let pair = (source.clone(), dest.clone());
        self.mark_used(id).await?;
        Ok(Some(pair))
    }

    /// 与某个目标标签相关的预设
    pub async fn for_destination(&self, dest_label: &str) -> Result<Vec<Preset>> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .filter(|p| p.dest_label == dest_label)
            .collect())
    }

    /// 从驱动器清单导入本地没有的预设（按名称判断），返回导入数量
    pub async fn import_from_drive(&self, drive: &Drive) -> Result<usize> {
        let manifest = SyncManifest::load(drive.storage.as_ref()).await;
        let existing = self.get_all().await?;

        let mut imported = 0;
        for preset in manifest.presets {
            if existing.iter().any(|p| p.name == preset.name) {
                continue;
            }

            let mut preset = Preset {
                imported_from: Some(drive.label.clone()),
                ..preset
            };
            if self.get(&preset.id).await?.is_some() {
                preset.id = uuid::Uuid::new_v4().to_string();
            }
            self.save(&preset).await?;
            imported += 1;
        }

        if imported > 0 {
            info!("从 {} 导入 {} 个预设", drive.label, imported);
        }
        Ok(imported)
    }
}
