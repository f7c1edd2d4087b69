//! Normalized identifiers: room name, username, hostname.
//!
//! Room names and usernames share the same normalization rule (§3): 1-16
//! characters, each a member of `[a-z0-9_]` after lowercasing. The zero
//! value of either type is never constructed through the public API; the
//! only way to observe one is `Default`, whose `as_str` panics, matching
//! spec.md's "accessing its string form is a programming error".

use std::fmt;

/// Why a raw room name or username failed to normalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("identifier is empty")]
    Empty,
    #[error("identifier is longer than 16 characters")]
    TooLong,
    #[error("identifier contains a character outside [a-z0-9_]")]
    Invalid,
}

macro_rules! normalized_identifier {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Normalize a raw identifier: lowercase, then validate length and charset.
            pub fn normalize(raw: &str) -> Result<Self, IdentifierError> {
                if raw.is_empty() {
                    return Err(IdentifierError::Empty);
                }
                if raw.chars().count() > 16 {
                    return Err(IdentifierError::TooLong);
                }
                let lowered: String = raw.chars().flat_map(|c| c.to_lowercase()).collect();
                if lowered.chars().count() > 16 {
                    return Err(IdentifierError::TooLong);
                }
                if !lowered
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
                {
                    return Err(IdentifierError::Invalid);
                }
                Ok(Self(lowered))
            }

            /// The normalized string form.
            ///
            /// # Panics
            /// Panics if called on the zero value (`Self::default()`), which is never
            /// produced by [`Self::normalize`]. Constructing the zero value and then
            /// reading its string form is always a programming error.
            pub fn as_str(&self) -> &str {
                if self.0.is_empty() {
                    panic!(concat!(
                        stringify!($name),
                        "::as_str called on the zero value"
                    ));
                }
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdentifierError;
            fn try_from(raw: String) -> Result<Self, Self::Error> {
                Self::normalize(&raw)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> String {
                value.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({:?})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }
    };
}

normalized_identifier!(RoomName, "A room name normalized per spec.md §3.");
normalized_identifier!(Username, "A username normalized per spec.md §3.");

/// Normalize a hostname per §3: lowercase, IPv4 dotted-quad, IPv6 compressed
/// canonical form with optional `%zone`, brackets stripped, non-IP names
/// through IDNA to ASCII (punycode), trailing dot removed.
///
/// Any failure in the IDNA step returns the original string unchanged, per
/// spec.md — this function never fails.
pub fn normalize_hostname(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_brackets = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed);

    if let Ok(addr) = without_brackets.parse::<std::net::Ipv4Addr>() {
        return addr.to_string();
    }

    // IPv6 with an optional zone id, e.g. "fe80::1%eth0".
    let (addr_part, zone) = match without_brackets.split_once('%') {
        Some((a, z)) => (a, Some(z)),
        None => (without_brackets, None),
    };
    if let Ok(addr) = addr_part.parse::<std::net::Ipv6Addr>() {
        return match zone {
            Some(z) => format!("{addr}%{z}"),
            None => addr.to_string(),
        };
    }

    let lowered = trimmed.to_lowercase();
    let no_trailing_dot = lowered.strip_suffix('.').unwrap_or(&lowered);
    match idna::domain_to_ascii(no_trailing_dot) {
        Ok(ascii) => ascii,
        Err(_) => raw.to_owned(),
    }
}
