use super::{
    ByteStream, DirEntry, EntryKind, FileMeta, FileSink, PermissionMode, PermissionState, Storage,
};
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use opendal::{Metakey, Operator};
use std::sync::atomic::{AtomicU8, Ordering};

/// 模拟浏览器的权限授予状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPolicy {
    ReadWrite,
    ReadOnly,
    /// 首次查询返回 Prompt，请求后授予读写
    PromptThenGrant,
    Denied,
}

impl AccessPolicy {
    fn to_u8(self) -> u8 {
        match self {
            AccessPolicy::ReadWrite => 0,
            AccessPolicy::ReadOnly => 1,
            AccessPolicy::PromptThenGrant => 2,
            AccessPolicy::Denied => 3,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => AccessPolicy::ReadWrite,
            1 => AccessPolicy::ReadOnly,
            2 => AccessPolicy::PromptThenGrant,
            _ => AccessPolicy::Denied,
        }
    }
}

/// 基于 OpenDAL Operator 的驱动器（fs / memory 服务）
pub struct OperatorStorage {
    operator: Operator,
    name: String,
    access: AtomicU8,
}

impl OperatorStorage {
    pub fn new(operator: Operator, name: impl Into<String>) -> Self {
        Self {
            operator,
            name: name.into(),
            access: AtomicU8::new(AccessPolicy::ReadWrite.to_u8()),
        }
    }

    /// 内存驱动器
    pub fn memory(label: &str) -> Result<Self> {
        use opendal::services::Memory;

        let operator = Operator::new(Memory::default())?.finish();
        Ok(Self::new(operator, format!("memory:{}", label)))
    }

    /// 文件系统驱动器
    pub fn fs(root: &str) -> Result<Self> {
        use opendal::services::Fs;

        let operator = Operator::new(Fs::default().root(root))?.finish();
        Ok(Self::new(operator, format!("fs:{}", root)))
    }

    pub fn with_access(self, policy: AccessPolicy) -> Self {
        self.set_access(policy);
        self
    }

    pub fn set_access(&self, policy: AccessPolicy) {
        self.access.store(policy.to_u8(), Ordering::SeqCst);
    }

    fn access(&self) -> AccessPolicy {
        AccessPolicy::from_u8(self.access.load(Ordering::SeqCst))
    }

    fn dir_path(path: &str) -> String {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            "/".to_string()
        } else {
            format!("{}/", trimmed)
        }
    }

    fn file_path(path: &str) -> String {
        path.trim_start_matches('/').to_string()
    }
}

#[async_trait]
impl Storage for OperatorStorage {
    async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let dir = Self::dir_path(path);
        let mut entries = Vec::new();

        let mut lister = match self
            .operator
            .lister_with(&dir)
            .metakey(Metakey::ContentLength | Metakey::LastModified | Metakey::Mode)
            .await
        {
            Ok(l) => l,
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = lister.try_next().await? {
            // 跳过目录自身
            if entry.path() == dir || entry.path().trim_matches('/') == dir.trim_matches('/') {
                continue;
            }

            let meta = entry.metadata();
            let kind = if meta.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };

            entries.push(DirEntry {
                name: entry.name().trim_end_matches('/').to_string(),
                kind,
                size: if meta.is_dir() { 0 } else { meta.content_length() },
                modified: meta.last_modified().map_or(0, |t| t.timestamp_millis()),
            });
        }

        Ok(entries)
    }

    async fn stat(&self, path: &str) -> Result<Option<FileMeta>> {
        match self.operator.stat(&Self::file_path(path)).await {
            Ok(meta) => Ok(Some(FileMeta {
                size: meta.content_length(),
                modified: meta.last_modified().map_or(0, |t| t.timestamp_millis()),
                is_dir: meta.is_dir(),
            })),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let data = self.operator.read(&Self::file_path(path)).await?;
        Ok(data.to_vec())
    }

    async fn read_stream(&self, path: &str, chunk_size: usize) -> Result<ByteStream> {
        let path = Self::file_path(path);
        let size = self.operator.stat(&path).await?.content_length();
        let chunk = chunk_size.max(1) as u64;
        let operator = self.operator.clone();

        // 按区间分块读取
        let ranges = (0..size).step_by(chunk as usize).map(move |start| start..(start + chunk).min(size));
        let stream = futures::stream::iter(ranges).then(move |range| {
            let operator = operator.clone();
            let path = path.clone();
            async move {
                let data = operator.read_with(&path).range(range).await?;
                Ok::<Bytes, anyhow::Error>(Bytes::from(data.to_vec()))
            }
        });

        Ok(Box::pin(stream))
    }

    async fn write(&self, path: &str, data: Vec<u8>) -> Result<()> {
        self.operator.write(&Self::file_path(path), data).await?;
        Ok(())
    }

    async fn create_writer(&self, path: &str) -> Result<Box<dyn FileSink>> {
        let writer = self.operator.writer(&Self::file_path(path)).await?;
        Ok(Box::new(OperatorFileSink {
            writer: Some(writer),
        }))
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        self.operator.create_dir(&Self::dir_path(path)).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.operator.delete(&Self::file_path(path)).await?;
        Ok(())
    }

    async fn delete_dir(&self, path: &str) -> Result<()> {
        self.operator.remove_all(&Self::dir_path(path)).await?;
        Ok(())
    }

    async fn query_permission(&self, mode: PermissionMode) -> Result<PermissionState> {
        let state = match (self.access(), mode) {
            (AccessPolicy::ReadWrite, _) => PermissionState::Granted,
            (AccessPolicy::ReadOnly, PermissionMode::Read) => PermissionState::Granted,
            (AccessPolicy::ReadOnly, PermissionMode::ReadWrite) => PermissionState::Denied,
            (AccessPolicy::PromptThenGrant, _) => PermissionState::Prompt,
            (AccessPolicy::Denied, _) => PermissionState::Denied,
        };
        Ok(state)
    }

    async fn request_permission(&self, mode: PermissionMode) -> Result<PermissionState> {
        if self.access() == AccessPolicy::PromptThenGrant {
            tracing::debug!("{} 授予权限: {:?}", self.name, mode);
            self.set_access(AccessPolicy::ReadWrite);
        }
        self.query_permission(mode).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct OperatorFileSink {
    writer: Option<opendal::Writer>,
}

#[async_trait]
impl FileSink for OperatorFileSink {
    async fn write(&mut self, chunk: Bytes) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("写入器已关闭"))?;
        writer.write(chunk).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| anyhow::anyhow!("写入器已关闭"))?;
        writer.close().await?;
        Ok(())
    }

    async fn abort(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.abort().await?;
        }
        Ok(())
    }
}
