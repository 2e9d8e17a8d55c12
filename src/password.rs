//! Password hashing and verification.
//!
//! New credentials are Argon2id hashes over a random salt. Credentials
//! written before hashing existed are [`Credential::Plaintext`]; they are
//! compared directly until startup migration rehashes them.

use argon2::password_hash::rand_core::{OsRng, RngCore};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use subtle::ConstantTimeEq;

use crate::model::{Credential, KdfParams};

/// Salt value that marked a plaintext row in legacy exports.
pub const SENTINEL_SALT: &str = "legacy";

pub const SALT_LEN: usize = 16;
pub const HASH_LEN: usize = 32;

#[derive(Debug)]
pub struct PasswordError(String);

impl std::fmt::Display for PasswordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "password hashing failed: {}", self.0)
    }
}

impl std::error::Error for PasswordError {}

fn argon2_for(params: KdfParams) -> Result<Argon2<'static>, PasswordError> {
    let params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(HASH_LEN),
    )
    .map_err(|e| PasswordError(format!("argon2 params: {e}")))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

fn derive(password: &str, salt: &[u8], params: KdfParams) -> Result<[u8; HASH_LEN], PasswordError> {
    let mut out = [0u8; HASH_LEN];
    argon2_for(params)?
        .hash_password_into(password.as_bytes(), salt, &mut out)
        .map_err(|e| PasswordError(format!("derive: {e}")))?;
    Ok(out)
}

/// Hashes new credentials with a fixed cost. Verification always uses the
/// cost stored in the credential itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct CredentialHasher {
    params: KdfParams,
}

impl CredentialHasher {
    pub fn with_params(params: KdfParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> KdfParams {
        self.params
    }

    pub fn hash(&self, password: &str) -> Result<Credential, PasswordError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let hash = derive(password, &salt, self.params)?;
        Ok(Credential::HashedV1 {
            salt: STANDARD_NO_PAD.encode(salt),
            hash: STANDARD_NO_PAD.encode(hash),
            params: self.params,
        })
    }

    /// Hash on the blocking pool; Argon2 is deliberately slow.
    pub async fn hash_blocking(&self, password: String) -> Result<Credential, PasswordError> {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| PasswordError(format!("hash task: {e}")))?
    }
}

/// Check `password` against a stored credential. Undecodable stored data
/// counts as a mismatch.
pub fn verify(password: &str, credential: &Credential) -> bool {
    match credential {
        Credential::Plaintext(stored) => bool::from(password.as_bytes().ct_eq(stored.as_bytes())),
        Credential::HashedV1 { salt, hash, params } => {
            let (Ok(salt), Ok(expected)) = (STANDARD_NO_PAD.decode(salt), STANDARD_NO_PAD.decode(hash))
            else {
                return false;
            };
            match derive(password, &salt, *params) {
                Ok(actual) => bool::from(actual.as_slice().ct_eq(expected.as_slice())),
                Err(e) => {
                    tracing::warn!("credential verification skipped: {e}");
                    false
                }
            }
        }
        Credential::Foreign { .. } => false,
    }
}

/// Stand-in checked when an email has no credential, so an unknown email
/// costs the same Argon2 work as a known one. The all-zero hash never matches.
pub fn timing_decoy(params: KdfParams) -> Credential {
    Credential::HashedV1 {
        salt: STANDARD_NO_PAD.encode([0u8; SALT_LEN]),
        hash: STANDARD_NO_PAD.encode([0u8; HASH_LEN]),
        params,
    }
}

/// Verify on the blocking pool.
pub async fn verify_blocking(password: String, credential: Credential) -> bool {
    tokio::task::spawn_blocking(move || verify(&password, &credential))
        .await
        .unwrap_or(false)
}

/// Build a credential from a legacy `(hash, salt)` column pair. The sentinel
/// salt (or no salt) marks plaintext; anything else was produced by the legacy
/// hasher and is kept as [`Credential::Foreign`].
pub fn credential_from_legacy(stored_hash: &str, stored_salt: Option<&str>) -> Credential {
    match stored_salt {
        None => Credential::Plaintext(stored_hash.to_string()),
        Some(salt) if salt == SENTINEL_SALT => Credential::Plaintext(stored_hash.to_string()),
        Some(salt) => Credential::Foreign {
            hash: stored_hash.to_string(),
            salt: salt.to_string(),
        },
    }
}

/// Three-argument legacy form: verify against raw `(hash, salt)` columns.
pub fn verify_with_salt(password: &str, stored_hash: &str, stored_salt: &str) -> bool {
    verify(password, &credential_from_legacy(stored_hash, Some(stored_salt)))
}

/// Cheap parameters so tests stay fast.
#[cfg(test)]
pub(crate) fn fast_hasher() -> CredentialHasher {
    CredentialHasher::with_params(KdfParams {
        memory_kib: 256,
        iterations: 1,
        parallelism: 1,
    })
}
