//! 错误类型

use thiserror::Error;

/// 同步引擎错误
#[derive(Error, Debug)]
pub enum SyncError {
    /// 调用方使用错误（未选择驱动器、选择为空等），在任何状态变更之前抛出
    #[error("参数错误: {0}")]
    Usage(String),

    /// 平台拒绝了读/写权限
    #[error("权限被拒绝: {0}")]
    Permission(String),

    /// 用户取消
    #[error("同步已取消")]
    Cancelled,

    /// 复制后校验失败
    #[error("校验失败: {0}")]
    Verification(String),

    #[error("未找到: {0}")]
    NotFound(String),

    /// 存储后端错误（后端使用 anyhow）
    #[error(transparent)]
    Storage(#[from] anyhow::Error),

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库迁移失败: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// 是否为整批致命错误（取消、权限），这类错误不按事件隔离
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Cancelled | SyncError::Permission(_))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
