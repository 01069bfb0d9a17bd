use super::{
    ByteStream, DirEntry, EntryKind, FileMeta, FileSink, PermissionMode, PermissionState,
    Storage, PARTIAL_SUFFIX,
};
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use walkdir::WalkDir;

/// 本地目录驱动器
pub struct LocalStorage {
    base_path: PathBuf,
    name: String,
}

impl LocalStorage {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let base_path = path.as_ref().to_path_buf();
        if !base_path.exists() {
            std::fs::create_dir_all(&base_path)?;
        }
        let name = format!("local:{}", base_path.display());
        Ok(Self { base_path, name })
    }

    pub fn root(&self) -> &Path {
        &self.base_path
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        let path = path.trim_start_matches('/').trim_start_matches('\\');
        if path.is_empty() {
            self.base_path.clone()
        } else {
            self.base_path.join(path)
        }
    }

    fn modified_millis(metadata: &std::fs::Metadata) -> i64 {
        metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_millis() as i64)
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let dir = self.resolve_path(path);

        if !dir.exists() {
            return Ok(Vec::new());
        }

        // 使用 spawn_blocking 避免阻塞 async runtime
        let entries = tokio::task::spawn_blocking(move || {
            WalkDir::new(&dir)
                .min_depth(1)
                .max_depth(1)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter_map(|entry| {
                    let metadata = entry.metadata().ok()?;
                    let name = entry.file_name().to_str()?.to_string();
                    let kind = if metadata.is_dir() {
                        EntryKind::Directory
                    } else {
                        EntryKind::File
                    };

                    Some(DirEntry {
                        name,
                        kind,
                        size: if metadata.is_dir() { 0 } else { metadata.len() },
                        modified: Self::modified_millis(&metadata),
                    })
                })
                .collect::<Vec<_>>()
        })
        .await?;

        Ok(entries)
    }

    async fn stat(&self, path: &str) -> Result<Option<FileMeta>> {
        let full_path = self.resolve_path(path);

        match fs::metadata(&full_path).await {
            Ok(metadata) => Ok(Some(FileMeta {
                size: if metadata.is_dir() { 0 } else { metadata.len() },
                modified: Self::modified_millis(&metadata),
                is_dir: metadata.is_dir(),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let data = fs::read(self.resolve_path(path)).await?;
        Ok(data)
    }

    async fn read_stream(&self, path: &str, chunk_size: usize) -> Result<ByteStream> {
        let file = fs::File::open(self.resolve_path(path)).await?;
        let stream = ReaderStream::with_capacity(file, chunk_size.max(1)).map_err(anyhow::Error::from);
        Ok(Box::pin(stream))
    }

    async fn write(&self, path: &str, data: Vec<u8>) -> Result<()> {
        let full_path = self.resolve_path(path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // 使用临时文件写入，然后原子重命名
        let temp_path = partial_path(&full_path);
        fs::write(&temp_path, data).await?;
        fs::rename(&temp_path, &full_path).await?;

        Ok(())
    }

    async fn create_writer(&self, path: &str) -> Result<Box<dyn FileSink>> {
        let final_path = self.resolve_path(path);

        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = partial_path(&final_path);
        let file = fs::File::create(&temp_path).await?;

        Ok(Box::new(LocalFileSink {
            file: Some(file),
            temp_path,
            final_path,
        }))
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        fs::create_dir_all(self.resolve_path(path)).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.resolve_path(path);

        match fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_dir(&self, path: &str) -> Result<()> {
        let full_path = self.resolve_path(path);

        if !full_path.exists() {
            return Ok(());
        }

        fs::remove_dir_all(&full_path).await?;
        Ok(())
    }

    async fn query_permission(&self, mode: PermissionMode) -> Result<PermissionState> {
        let metadata = match fs::metadata(&self.base_path).await {
            Ok(m) => m,
            Err(_) => return Ok(PermissionState::Denied),
        };

        if !metadata.is_dir() {
            return Ok(PermissionState::Denied);
        }

        if fs::read_dir(&self.base_path).await.is_err() {
            return Ok(PermissionState::Denied);
        }

        match mode {
            PermissionMode::Read => Ok(PermissionState::Granted),
            PermissionMode::ReadWrite if metadata.permissions().readonly() => {
                Ok(PermissionState::Denied)
            }
            PermissionMode::ReadWrite => Ok(PermissionState::Granted),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn partial_path(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    final_path.with_file_name(name)
}

/// 本地写入器：先写临时文件，close 时重命名为目标文件
struct LocalFileSink {
    file: Option<fs::File>,
    temp_path: PathBuf,
    final_path: PathBuf,
}

#[async_trait]
impl FileSink for LocalFileSink {
    async fn write(&mut self, chunk: Bytes) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("写入器已关闭: {}", self.final_path.display()))?;
        file.write_all(&chunk).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| anyhow::anyhow!("写入器已关闭: {}", self.final_path.display()))?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&self.temp_path, &self.final_path).await?;
        Ok(())
    }

    async fn abort(&mut self) -> Result<()> {
        drop(self.file.take());
        match fs::remove_file(&self.temp_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
