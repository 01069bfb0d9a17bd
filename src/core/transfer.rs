//! 复制与校验原语

use crate::core::control::SyncControl;
use crate::core::fingerprint::Fingerprint;
use crate::error::{Result, SyncError};
use crate::storage::{join_path, FileSink, Storage};
use futures::TryStreamExt;
use tracing::{debug, info, warn};

/// 用户数据备份文件（由外部组件写入，同步时只检查是否存在）
pub const USERDATA_FILE: &str = ".teslacam-userdata.json";

/// 分块进度
#[derive(Debug, Clone, Copy)]
pub struct ChunkProgress<'a> {
    pub file: &'a str,
    /// 本次分块字节数
    pub chunk: u64,
    /// 当前文件已复制字节数
    pub file_bytes: u64,
}

/// 流式复制单个文件
///
/// 成功时关闭写入器；任何错误（包括取消）都会先 abort 写入器再返回。
pub async fn copy_file(
    src: &dyn Storage,
    src_path: &str,
    dst: &dyn Storage,
    dst_path: &str,
    chunk_size: usize,
    control: &SyncControl,
    on_chunk: &mut (dyn FnMut(ChunkProgress<'_>) + Send),
) -> Result<u64> {
    let mut sink = dst.create_writer(dst_path).await?;

    match stream_into(src, src_path, sink.as_mut(), chunk_size, control, on_chunk).await {
        Ok(copied) => {
            sink.close().await?;
            debug!("复制完成: {} ({} 字节)", dst_path, copied);
            Ok(copied)
        }
        Err(e) => {
            if let Err(abort_err) = sink.abort().await {
                warn!("中止写入失败 {}: {}", dst_path, abort_err);
            }
            Err(e)
        }
    }
}

async fn stream_into(
    src: &dyn Storage,
    src_path: &str,
    sink: &mut dyn FileSink,
    chunk_size: usize,
    control: &SyncControl,
    on_chunk: &mut (dyn FnMut(ChunkProgress<'_>) + Send),
) -> Result<u64> {
    let mut stream = src.read_stream(src_path, chunk_size).await?;
    let mut copied = 0u64;

    while let Some(chunk) = stream.try_next().await? {
        let len = chunk.len() as u64;
        sink.write(chunk).await?;
        copied += len;
        on_chunk(ChunkProgress {
            file: src_path,
            chunk: len,
            file_bytes: copied,
        });

        control.checkpoint().await?;
    }

    Ok(copied)
}

/// 复制整个事件（按指纹中的文件顺序），返回复制的字节数
///
/// 源端存在但不在指纹内的用户数据备份文件会一并复制，不计入字节数。
pub async fn copy_event(
    src: &dyn Storage,
    dst: &dyn Storage,
    event_path: &str,
    fingerprint: &Fingerprint,
    chunk_size: usize,
    control: &SyncControl,
    on_chunk: &mut (dyn FnMut(ChunkProgress<'_>) + Send),
) -> Result<u64> {
    dst.create_dir(event_path).await?;

    let mut total = 0u64;
    for file in &fingerprint.files {
        control.checkpoint().await?;
        total += copy_file(src, &file.path, dst, &file.path, chunk_size, control, on_chunk).await?;
    }

    copy_userdata(src, dst, event_path, fingerprint, chunk_size, control).await?;

    Ok(total)
}

async fn copy_userdata(
    src: &dyn Storage,
    dst: &dyn Storage,
    event_path: &str,
    fingerprint: &Fingerprint,
    chunk_size: usize,
    control: &SyncControl,
) -> Result<()> {
    if fingerprint.file(USERDATA_FILE).is_some() {
        return Ok(());
    }

    let path = join_path(event_path, USERDATA_FILE);
    if !src.exists(&path).await? {
        return Ok(());
    }

    copy_file(src, &path, dst, &path, chunk_size, control, &mut |_| {}).await?;
    debug!("已复制用户数据备份: {}", path);
    Ok(())
}

/// 校验单个文件
///
/// 先比较大小；小于阈值的文件再比较完整内容的 blake3 校验和，大文件只比较大小。
pub async fn verify_file(
    src: &dyn Storage,
    src_path: &str,
    dst: &dyn Storage,
    dst_path: &str,
    checksum_threshold: u64,
) -> Result<bool> {
    let src_meta = src
        .stat(src_path)
        .await?
        .ok_or_else(|| SyncError::NotFound(src_path.to_string()))?;
    let Some(dst_meta) = dst.stat(dst_path).await? else {
        return Ok(false);
    };

    if src_meta.size != dst_meta.size {
        return Ok(false);
    }

    if src_meta.size >= checksum_threshold {
        return Ok(true);
    }

    let src_hash = checksum(src, src_path).await?;
    let dst_hash = checksum(dst, dst_path).await?;
    Ok(src_hash == dst_hash)
}

/// 计算文件内容的 blake3 校验和
pub async fn checksum(storage: &dyn Storage, path: &str) -> Result<blake3::Hash> {
    let mut hasher = blake3::Hasher::new();
    let mut stream = storage
        .read_stream(path, crate::storage::DEFAULT_CHUNK_SIZE)
        .await?;

    while let Some(chunk) = stream.try_next().await? {
        hasher.update(&chunk);
    }

    Ok(hasher.finalize())
}

/// 校验整个事件，任何文件不一致返回 false
pub async fn verify_event(
    src: &dyn Storage,
    dst: &dyn Storage,
    fingerprint: &Fingerprint,
    checksum_threshold: u64,
) -> Result<bool> {
    for file in &fingerprint.files {
        if !verify_file(src, &file.path, dst, &file.path, checksum_threshold).await? {
            info!("校验不通过: {}", file.path);
            return Ok(false);
        }
    }
    Ok(true)
}
