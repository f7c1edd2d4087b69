//! Filesystem-backed `Share` implementation (§4.8).
//!
//! `LocalFsShare` is rooted at a directory on disk. Callers are expected to
//! have already run the path through `validate_path` and stripped the share
//! name (`ProtoPath::share_relative`) before handing it here — traversal via
//! `..` is rejected upstream, never by walking the filesystem.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use net_protocol::{FileMeta, ProtoPath, Share, ShareError};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

pub struct LocalFsShare {
    root: PathBuf,
}

impl LocalFsShare {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &ProtoPath) -> PathBuf {
        let relative = path.share_relative();
        let relative = relative.trim_start_matches('/');
        if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        }
    }

    async fn entry_meta(path: &Path) -> Result<FileMeta, ShareError> {
        let metadata = tokio::fs::metadata(path).await.map_err(map_io_err)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(FileMeta {
            name,
            is_dir: metadata.is_dir(),
            size_bytes: metadata.len(),
        })
    }
}

fn map_io_err(e: std::io::Error) -> ShareError {
    if e.kind() == std::io::ErrorKind::NotFound {
        ShareError::NotFound
    } else {
        ShareError::Io(e)
    }
}

#[async_trait]
impl Share for LocalFsShare {
    async fn get_file_meta(&self, path: &ProtoPath) -> Result<FileMeta, ShareError> {
        Self::entry_meta(&self.resolve(path)).await
    }

    async fn dir_files(&self, path: &ProtoPath, page: u32) -> Result<Vec<FileMeta>, ShareError> {
        let dir = self.resolve(path);
        let metadata = tokio::fs::metadata(&dir).await.map_err(map_io_err)?;
        if !metadata.is_dir() {
            return Err(ShareError::NotADirectory);
        }

        let mut entries = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&dir).await.map_err(map_io_err)?;
        while let Some(entry) = read_dir.next_entry().await.map_err(map_io_err)? {
            entries.push(Self::entry_meta(&entry.path()).await?);
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        let start = page as usize * net_protocol::PAGE_SIZE;
        if start >= entries.len() {
            return Ok(Vec::new());
        }
        let end = (start + net_protocol::PAGE_SIZE).min(entries.len());
        Ok(entries[start..end].to_vec())
    }

    async fn get_file(
        &self,
        path: &ProtoPath,
        offset: u64,
        limit: u64,
    ) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>, ShareError> {
        let file_path = self.resolve(path);
        let metadata = tokio::fs::metadata(&file_path).await.map_err(map_io_err)?;
        if metadata.is_dir() {
            return Err(ShareError::IsADirectory);
        }
        let size = metadata.len();

        let mut file = tokio::fs::File::open(&file_path).await.map_err(map_io_err)?;
        let clamped_offset = offset.min(size);
        file.seek(std::io::SeekFrom::Start(clamped_offset))
            .await
            .map_err(map_io_err)?;

        let remaining = size - clamped_offset;
        let effective_limit = if limit == 0 { remaining } else { limit.min(remaining) };
        Ok(Box::new(file.take(effective_limit)))
    }
}
