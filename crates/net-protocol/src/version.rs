//! Protocol version negotiation (§3, §4.3).
//!
//! Two versions are compatible iff `major` and `minor` match; `patch` is
//! informational only. Ordering is lexicographic over `(major, minor,
//! patch)`, used by the lobby to decide `too_old` vs `too_new`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl ProtocolVersion {
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Whether `self` and `other` agree on `major` and `minor`. `patch` never matters.
    pub fn is_compatible_with(&self, other: &Self) -> bool {
        self.major == other.major && self.minor == other.minor
    }

    /// Decide a rejection reason for `client` against `server`, or `None` if compatible.
    pub fn negotiate(server: &Self, client: &Self) -> Option<VersionRejectedReason> {
        if server.is_compatible_with(client) {
            return None;
        }
        Some(if client < server {
            VersionRejectedReason::TooOld
        } else {
            VersionRejectedReason::TooNew
        })
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionRejectedReason {
    TooOld,
    TooNew,
    Unspecified,
}
