use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;

pub mod config;
pub mod core;
pub mod db;
pub mod drive;
pub mod error;
pub mod logging;
pub mod storage;

pub use crate::core::{
    ComparisonResult, DriveSync, StartSyncOptions, SyncEngine, SyncMode, SyncReport, SyncState,
    SyncStatus,
};
pub use config::{NotesConflictPolicy, SettingsPatch, SyncSettings};
pub use drive::{Drive, DriveRegistry, Event, EventType};
pub use error::{Result, SyncError};

const APP_DIR_NAME: &str = "camsync";

/// 应用状态：数据库连接池与配置目录
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<SqlitePool>,
    pub config_dir: PathBuf,
}

impl AppState {
    pub async fn new() -> Result<Self> {
        Self::with_config_dir(resolve_config_dir()).await
    }

    /// 使用指定目录存放配置和数据库
    pub async fn with_config_dir(config_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&config_dir)?;

        let db = db::connect(&config_dir.join("camsync.db")).await?;

        Ok(Self {
            db: Arc::new(db),
            config_dir,
        })
    }

    /// 清理资源（退出时调用）
    pub async fn cleanup(&self) {
        tracing::debug!("关闭数据库连接池...");
        self.db.close().await;
        tracing::info!("资源清理完成");
    }
}

/// 配置目录：默认 `<系统配置目录>/camsync`，config.json 中的 `data_path` 可覆盖
pub fn resolve_config_dir() -> PathBuf {
    let default_config_dir = dirs::config_dir()
        .map(|p| p.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(".camsync"));

    let _ = std::fs::create_dir_all(&default_config_dir);

    // 尝试读取自定义数据路径
    let config_file = default_config_dir.join("config.json");
    std::fs::read_to_string(&config_file)
        .ok()
        .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
        .and_then(|config| config.get("data_path")?.as_str().map(PathBuf::from))
        .filter(|p| p.exists() && p.is_dir())
        .inspect(|p| tracing::debug!("使用自定义数据路径: {:?}", p))
        .unwrap_or(default_config_dir)
}

pub mod dirs {
    use std::path::PathBuf;

    pub fn config_dir() -> Option<PathBuf> {
        if cfg!(target_os = "windows") {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library").join("Application Support"))
        } else {
            // Linux
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".config"))
                })
        }
    }
}
