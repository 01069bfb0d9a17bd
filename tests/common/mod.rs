#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use camsync_lib::core::MemoryNotesStore;
use camsync_lib::storage::{
    ByteStream, DirEntry, FileMeta, FileSink, PermissionMode, PermissionState, Storage,
};
use camsync_lib::{DriveSync, SyncSettings};
use futures::StreamExt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// 固定的文件修改时间
pub fn mtime(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
}

/// 在驱动器目录下创建一个事件，files 为 (文件名, 大小)
pub fn write_event(root: &Path, event_type: &str, name: &str, files: &[(&str, usize)], modified: SystemTime) {
    let dir = root.join(event_type).join(name);
    fs::create_dir_all(&dir).unwrap();
    for (file, size) in files {
        let path = dir.join(file);
        let data: Vec<u8> = (0..*size).map(|i| (i % 251) as u8).collect();
        fs::write(&path, data).unwrap();
        let handle = fs::File::options().write(true).open(&path).unwrap();
        handle.set_modified(modified).unwrap();
    }
}

pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}

pub async fn new_sync(settings: SyncSettings) -> DriveSync {
    let db = camsync_lib::db::connect_in_memory().await.unwrap();
    DriveSync::new(Arc::new(db), Arc::new(MemoryNotesStore::new()), settings, None)
}

/// 读取路径包含指定标记的文件时失败
pub struct FlakyStorage {
    inner: Arc<dyn Storage>,
    marker: String,
}

impl FlakyStorage {
    pub fn new(inner: Arc<dyn Storage>, marker: impl Into<String>) -> Self {
        Self {
            inner,
            marker: marker.into(),
        }
    }
}

/// 每个分块之间插入延迟
pub struct SlowStorage {
    inner: Arc<dyn Storage>,
    delay: Duration,
}

impl SlowStorage {
    pub fn new(inner: Arc<dyn Storage>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl Storage for FlakyStorage {
    async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        self.inner.list_dir(path).await
    }

    async fn stat(&self, path: &str) -> Result<Option<FileMeta>> {
        self.inner.stat(path).await
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.inner.read(path).await
    }

    async fn write(&self, path: &str, data: Vec<u8>) -> Result<()> {
        self.inner.write(path, data).await
    }

    async fn create_writer(&self, path: &str) -> Result<Box<dyn FileSink>> {
        self.inner.create_writer(path).await
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        self.inner.create_dir(path).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.inner.delete(path).await
    }

    async fn delete_dir(&self, path: &str) -> Result<()> {
        self.inner.delete_dir(path).await
    }

    async fn query_permission(&self, mode: PermissionMode) -> Result<PermissionState> {
        self.inner.query_permission(mode).await
    }

    async fn request_permission(&self, mode: PermissionMode) -> Result<PermissionState> {
        self.inner.request_permission(mode).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn read_stream(&self, path: &str, chunk_size: usize) -> Result<ByteStream> {
        if path.contains(&self.marker) {
            anyhow::bail!("模拟读取失败: {}", path);
        }
        self.inner.read_stream(path, chunk_size).await
    }
}

#[async_trait]
impl Storage for SlowStorage {
    async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        self.inner.list_dir(path).await
    }

    async fn stat(&self, path: &str) -> Result<Option<FileMeta>> {
        self.inner.stat(path).await
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.inner.read(path).await
    }

    async fn write(&self, path: &str, data: Vec<u8>) -> Result<()> {
        self.inner.write(path, data).await
    }

    async fn create_writer(&self, path: &str) -> Result<Box<dyn FileSink>> {
        self.inner.create_writer(path).await
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        self.inner.create_dir(path).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.inner.delete(path).await
    }

    async fn delete_dir(&self, path: &str) -> Result<()> {
        self.inner.delete_dir(path).await
    }

    async fn query_permission(&self, mode: PermissionMode) -> Result<PermissionState> {
        self.inner.query_permission(mode).await
    }

    async fn request_permission(&self, mode: PermissionMode) -> Result<PermissionState> {
        self.inner.request_permission(mode).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn read_stream(&self, path: &str, chunk_size: usize) -> Result<ByteStream> {
        let delay = self.delay;
        let stream = self.inner.read_stream(path, chunk_size).await?;
        let slowed = stream.then(move |chunk| async move {
            tokio::time::sleep(delay).await;
            chunk
        });
        Ok(Box::pin(slowed))
    }
}

/// 视频文件的 stat 多报一个字节，让复制后校验失败
pub struct MisreportingStorage {
    inner: Arc<dyn Storage>,
}

impl MisreportingStorage {
    pub fn new(inner: Arc<dyn Storage>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Storage for MisreportingStorage {
    async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        self.inner.list_dir(path).await
    }

    async fn stat(&self, path: &str) -> Result<Option<FileMeta>> {
        let meta = self.inner.stat(path).await?;
        Ok(meta.map(|mut m| {
            if !m.is_dir && path.ends_with(".mp4") {
                m.size += 1;
            }
            m
        }))
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.inner.read(path).await
    }

    async fn write(&self, path: &str, data: Vec<u8>) -> Result<()> {
        self.inner.write(path, data).await
    }

    async fn create_writer(&self, path: &str) -> Result<Box<dyn FileSink>> {
        self.inner.create_writer(path).await
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        self.inner.create_dir(path).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.inner.delete(path).await
    }

    async fn delete_dir(&self, path: &str) -> Result<()> {
        self.inner.delete_dir(path).await
    }

    async fn query_permission(&self, mode: PermissionMode) -> Result<PermissionState> {
        self.inner.query_permission(mode).await
    }

    async fn request_permission(&self, mode: PermissionMode) -> Result<PermissionState> {
        self.inner.request_permission(mode).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn read_stream(&self, path: &str, chunk_size: usize) -> Result<ByteStream> {
        self.inner.read_stream(path, chunk_size).await
    }
}
