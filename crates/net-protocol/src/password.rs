//! Password-hashing library contract (§6). No implementation lives here —
//! `crates/password` provides the Argon2-backed adapter; this crate only
//! names the seam the lobby's authentication step (§4.3) is written against.

/// Outcome of verifying a plaintext password against a stored MCF hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyOutcome {
    pub matches: bool,
    /// True when the stored hash used weaker parameters than the library's
    /// current defaults and should be re-hashed and persisted.
    pub needs_rehash: bool,
}

pub trait PasswordHasher: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Verify `plaintext` against a stored MCF-encoded hash.
    fn verify(&self, plaintext: &str, mcf: &str) -> Result<VerifyOutcome, Self::Error>;

    /// Hash `plaintext` with the library's current parameters.
    fn hash(&self, plaintext: &str) -> Result<String, Self::Error>;
}
