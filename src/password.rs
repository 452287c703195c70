//! Password digesting with Argon2id.
//!
//! The digest is deterministic: the salt is the user's stable id rather than
//! a random value embedded in a PHC string, so the same (password, user id)
//! pair always yields the same hex digest and two users with identical
//! passwords never collide.

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::types::{PasswordDigest, UserId};

/// Length of the raw digest in bytes.
pub const DIGEST_LEN: usize = 32;

#[derive(Debug, Error)]
#[error("password hashing failed: {0}")]
pub struct HashError(String);

/// Argon2 cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashCost {
    /// Memory size in KiB
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u32,
    /// Number of passes
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    /// Degree of parallelism
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

fn default_memory_kib() -> u32 {
    Params::DEFAULT_M_COST
}

fn default_iterations() -> u32 {
    Params::DEFAULT_T_COST
}

fn default_parallelism() -> u32 {
    Params::DEFAULT_P_COST
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            iterations: default_iterations(),
            parallelism: default_parallelism(),
        }
    }
}

/// Salted, deliberately slow one-way password digest.
#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher {
    pub fn new(cost: HashCost) -> Result<Self, HashError> {
        let params = Params::new(
            cost.memory_kib,
            cost.iterations,
            cost.parallelism,
            Some(DIGEST_LEN),
        )
        .map_err(|e| HashError(e.to_string()))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Digest a cleartext password with the owning user's id as salt.
    pub fn digest(&self, cleartext: &str, salt: &UserId) -> Result<PasswordDigest, HashError> {
        let mut out = [0u8; DIGEST_LEN];
        self.argon2
            .hash_password_into(cleartext.as_bytes(), salt.as_str().as_bytes(), &mut out)
            .map_err(|e| HashError(e.to_string()))?;
        Ok(PasswordDigest::new(hex::encode(out)))
    }

    /// Check a presented password against a stored digest.
    pub fn verify(
        &self,
        cleartext: &str,
        salt: &UserId,
        stored: &PasswordDigest,
    ) -> Result<bool, HashError> {
        let presented = self.digest(cleartext, salt)?;
        Ok(constant_time_eq(presented.as_str(), stored.as_str()))
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }
}

/// Compare two secrets without an early exit on the first differing byte.
///
/// Both sides are hashed first so the comparison always runs over 32 bytes,
/// whatever the input lengths.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = Sha256::digest(a.as_bytes());
    let b = Sha256::digest(b.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap_hasher() -> PasswordHasher {
        PasswordHasher::new(HashCost {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap()
    }

    #[test]
    fn test_digest_is_deterministic() {
        let hasher = cheap_hasher();
        let salt = UserId::new("6f1c1a2e-8c55-4f3e-9d0b-0c1f9a7e2b11");

        let d1 = hasher.digest("secret1", &salt).unwrap();
        let d2 = hasher.digest("secret1", &salt).unwrap();
        assert_eq!(d1, d2);
        assert_eq!(d1.as_str().len(), DIGEST_LEN * 2);
        assert!(d1.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_different_salts_differ() {
        let hasher = cheap_hasher();
        let d1 = hasher.digest("same-password", &UserId::generate()).unwrap();
        let d2 = hasher.digest("same-password", &UserId::generate()).unwrap();
        assert_ne!(d1, d2);
    }

    #[test]
    fn test_different_passwords_differ() {
        let hasher = cheap_hasher();
        let salt = UserId::generate();
        let d1 = hasher.digest("secret1", &salt).unwrap();
        let d2 = hasher.digest("secret2", &salt).unwrap();
        assert_ne!(d1, d2);
    }

    #[test]
    fn test_verify() {
        let hasher = cheap_hasher();
        let salt = UserId::generate();
        let stored = hasher.digest("secret1", &salt).unwrap();

        assert!(hasher.verify("secret1", &salt, &stored).unwrap());
        assert!(!hasher.verify("secret2", &salt, &stored).unwrap());
        assert!(!hasher.verify("secret1", &UserId::generate(), &stored).unwrap());
    }

    #[test]
    fn test_short_salt_is_an_error() {
        let hasher = cheap_hasher();
        assert!(hasher.digest("secret1", &UserId::new("abc")).is_err());
    }

    #[test]
    fn test_invalid_cost_rejected() {
        let result = PasswordHasher::new(HashCost {
            memory_kib: 1,
            iterations: 0,
            parallelism: 1,
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
        assert!(!constant_time_eq("", "a"));
    }
}
