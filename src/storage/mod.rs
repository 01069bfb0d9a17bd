pub mod local;
pub mod operator;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

pub use local::LocalStorage;
pub use operator::{AccessPolicy, OperatorStorage};

// ============ 公共常量 ============

/// 默认分块大小（字节）
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;
/// 未完成写入的临时文件后缀
pub const PARTIAL_SUFFIX: &str = ".camsync-partial";

/// 目录项类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// 目录项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    /// 修改时间（毫秒时间戳）
    pub modified: i64,
}

impl DirEntry {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// 文件元数据
#[derive(Debug, Clone)]
pub struct FileMeta {
    pub size: u64,
    /// 修改时间（毫秒时间戳）
    pub modified: i64,
    pub is_dir: bool,
}

/// 访问模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionMode {
    Read,
    ReadWrite,
}

/// 权限状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    /// 需要向用户请求
    Prompt,
}

/// 分块字节流
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// 目标文件写入器
///
/// 成功路径必须调用 `close`，任何失败路径必须调用 `abort`，
/// 否则写了一半的文件可能被当成完整文件。
#[async_trait]
pub trait FileSink: Send {
    async fn write(&mut self, chunk: Bytes) -> Result<()>;

    async fn close(&mut self) -> Result<()>;

    async fn abort(&mut self) -> Result<()>;
}

/// 驱动器存储抽象接口
///
/// 路径统一使用 `/` 分隔且相对于驱动器根目录。
#[async_trait]
pub trait Storage: Send + Sync {
    /// 列出目录下的直接子项，目录不存在时返回空列表
    async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>>;

    /// 获取文件元数据
    async fn stat(&self, path: &str) -> Result<Option<FileMeta>>;

    /// 读取整个文件
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// 读取文本文件
    async fn read_text(&self, path: &str) -> Result<String> {
        let data = self.read(path).await?;
        Ok(String::from_utf8(data)?)
    }

    /// 以分块流的方式读取文件
    async fn read_stream(&self, path: &str, chunk_size: usize) -> Result<ByteStream>;

    /// 写入整个文件
    async fn write(&self, path: &str, data: Vec<u8>) -> Result<()>;

    /// 打开流式写入器（父目录按需创建）
    async fn create_writer(&self, path: &str) -> Result<Box<dyn FileSink>>;

    /// 创建目录（已存在时不报错）
    async fn create_dir(&self, path: &str) -> Result<()>;

    /// 删除文件
    async fn delete(&self, path: &str) -> Result<()>;

    /// 递归删除目录
    async fn delete_dir(&self, path: &str) -> Result<()>;

    /// 检查文件是否存在
    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.stat(path).await?.is_some())
    }

    /// 查询当前权限
    async fn query_permission(&self, _mode: PermissionMode) -> Result<PermissionState> {
        Ok(PermissionState::Granted)
    }

    /// 请求权限
    async fn request_permission(&self, mode: PermissionMode) -> Result<PermissionState> {
        self.query_permission(mode).await
    }

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;
}

/// 拼接驱动器内的相对路径
pub fn join_path(parent: &str, name: &str) -> String {
    let parent = parent.trim_end_matches('/');
    if parent.is_empty() {
        name.trim_start_matches('/').to_string()
    } else {
        format!("{}/{}", parent, name.trim_start_matches('/'))
    }
}
