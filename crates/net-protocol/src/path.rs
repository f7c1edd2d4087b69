//! Path validation and share dispatch (§3, §4.8).
//!
//! Precedence when multiple faults apply: UTF-8 → NUL → absoluteness →
//! trailing slash → duplicate slash → dot segments. `validate_path` takes
//! raw bytes so the UTF-8 check can run before anything else touches the
//! data as `&str`.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PathErrorCode {
    #[error("path is blank")]
    Blank,
    #[error("path is not absolute")]
    NotAbsolute,
    #[error("path is not valid UTF-8")]
    InvalidUtf8,
    #[error("path contains a NUL byte")]
    NullByte,
    #[error("path ends with a slash")]
    EndsWithSlash,
    #[error("path contains a duplicate slash")]
    DuplicateSlash,
    #[error("path contains a `.` or `..` segment")]
    ContainsDots,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid path {path:?}: {code}")]
pub struct PathError {
    pub code: PathErrorCode,
    pub path: Vec<u8>,
}

/// A validated, normalized path. First segment is the share name; the
/// remainder is the intra-share path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoPath {
    raw: String,
}

impl ProtoPath {
    pub fn is_root(&self) -> bool {
        self.raw == "/"
    }

    /// Segments after the leading `/`, split on `/`. Empty for the root path.
    pub fn segments(&self) -> Vec<&str> {
        if self.is_root() {
            return Vec::new();
        }
        self.raw.trim_start_matches('/').split('/').collect()
    }

    /// The first segment, i.e. the share name. `None` for the root path.
    pub fn share_name(&self) -> Option<&str> {
        self.segments().first().copied()
    }

    /// The path within the share (everything after the share name), with a
    /// leading `/`.
    pub fn share_relative(&self) -> String {
        let segs = self.segments();
        if segs.len() <= 1 {
            "/".to_owned()
        } else {
            format!("/{}", segs[1..].join("/"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl std::fmt::Display for ProtoPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Validate a raw path per spec.md §3, applying the documented precedence.
pub fn validate_path(raw: &[u8]) -> Result<ProtoPath, PathError> {
    let fail = |code: PathErrorCode| PathError {
        code,
        path: raw.to_vec(),
    };

    let s = std::str::from_utf8(raw).map_err(|_| fail(PathErrorCode::InvalidUtf8))?;

    if raw.contains(&0) {
        return Err(fail(PathErrorCode::NullByte));
    }
    if s.is_empty() {
        return Err(fail(PathErrorCode::Blank));
    }
    if !s.starts_with('/') {
        return Err(fail(PathErrorCode::NotAbsolute));
    }
    if s.len() > 1 && s.ends_with('/') {
        return Err(fail(PathErrorCode::EndsWithSlash));
    }
    if s.contains("//") {
        return Err(fail(PathErrorCode::DuplicateSlash));
    }
    if s.trim_start_matches('/')
        .split('/')
        .any(|seg| seg == "." || seg == "..")
    {
        return Err(fail(PathErrorCode::ContainsDots));
    }

    Ok(ProtoPath { raw: s.to_owned() })
}
