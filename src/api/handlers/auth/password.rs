//! Credential hashing and verification.
//!
//! Argon2id with explicit cost parameters. The produced PHC string carries
//! algorithm, parameters and salt, so verification needs no side-channel
//! lookup.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

// Work factor is fixed service-wide; changing it only affects new hashes
// because verification reads the parameters back from the stored string.
const MEMORY_COST_KIB: u32 = 19 * 1024;
const TIME_COST: u32 = 2;
const PARALLELISM: u32 = 1;

fn hasher() -> Argon2<'static> {
    Params::new(MEMORY_COST_KIB, TIME_COST, PARALLELISM, None).map_or_else(
        |_| Argon2::default(),
        |params| Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
    )
}

/// Hash a password with a fresh random salt.
pub(super) fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    hasher()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow!("failed to hash password: {err}"))
}

/// Check a password against a stored hash.
///
/// Malformed or truncated hashes verify as `false`; this function never
/// panics or errors.
pub(super) fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    hasher()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
