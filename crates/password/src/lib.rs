//! Argon2-backed implementation of the `PasswordHasher` contract (§6).

use argon2::{Argon2, Params, PasswordHash, PasswordHasher as _, PasswordVerifier as _};
use net_protocol::password::{PasswordHasher, VerifyOutcome};
use password_hash::rand_core::OsRng;
use password_hash::SaltString;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Argon2Error {
    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// The current set of Argon2 parameters. A stored hash whose parameters
/// don't match this is flagged `needs_rehash` on successful verify (§4.3).
pub struct Argon2PasswordHasher {
    argon2: Argon2<'static>,
}

impl Default for Argon2PasswordHasher {
    fn default() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }
}

impl PasswordHasher for Argon2PasswordHasher {
    type Error = Argon2Error;

    fn verify(&self, plaintext: &str, mcf: &str) -> Result<VerifyOutcome, Self::Error> {
        let parsed = PasswordHash::new(mcf).map_err(|e| Argon2Error::Hash(e.to_string()))?;
        let matches = self
            .argon2
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok();
        let needs_rehash = matches && !self.matches_current_params(&parsed);
        Ok(VerifyOutcome {
            matches,
            needs_rehash,
        })
    }

    fn hash(&self, plaintext: &str) -> Result<String, Self::Error> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| Argon2Error::Hash(e.to_string()))
    }
}

impl Argon2PasswordHasher {
    fn matches_current_params(&self, parsed: &PasswordHash<'_>) -> bool {
        let Ok(stored) = Params::try_from(parsed) else {
            return false;
        };
        let current = self.argon2.params();
        stored.m_cost() == current.m_cost()
            && stored.t_cost() == current.t_cost()
            && stored.p_cost() == current.p_cost()
    }
}
