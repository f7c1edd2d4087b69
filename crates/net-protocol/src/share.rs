//! Share library contract (§4.8, §6). No implementation lives here —
//! `crates/share-fs` provides the filesystem-backed adapter; this crate
//! only names the seam the room's `GET_DIR_FILES` / `GET_FILE_META` /
//! `GET_FILE` handlers are written against.

use thiserror::Error;

use crate::path::ProtoPath;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub name: String,
    pub is_dir: bool,
    pub size_bytes: u64,
}

#[derive(Debug, Error)]
pub enum ShareError {
    #[error("no such file or directory")]
    NotFound,
    #[error("path does not refer to a directory")]
    NotADirectory,
    #[error("path refers to a directory, not a file")]
    IsADirectory,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// A named collection of files a room exposes, addressed by the first
/// path segment after share-dispatch (§4.8). One `Share` per registered
/// name; implementations never see the share-name segment itself.
#[async_trait::async_trait]
pub trait Share: Send + Sync {
    async fn get_file_meta(&self, path: &ProtoPath) -> Result<FileMeta, ShareError>;

    /// One page (§6 `PAGE_SIZE`) of directory entries, zero-indexed.
    async fn dir_files(&self, path: &ProtoPath, page: u32) -> Result<Vec<FileMeta>, ShareError>;

    async fn get_file(
        &self,
        path: &ProtoPath,
        offset: u64,
        limit: u64,
    ) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>, ShareError>;
}
