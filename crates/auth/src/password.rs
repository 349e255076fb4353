//! Password hashing contract and strength policy.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordVerifier, Version};
use serde::{Deserialize, Serialize};

use warden_core::{AppError, AppResult, ValidationKind};

/// One-way hash plus constant-time verification.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> AppResult<String>;

    /// `Ok(false)` on mismatch; `Err` only when the stored hash is unusable.
    fn verify(&self, password: &str, hash: &str) -> AppResult<bool>;
}

impl<H> PasswordHasher for std::sync::Arc<H>
where
    H: PasswordHasher + ?Sized,
{
    fn hash(&self, password: &str) -> AppResult<String> {
        (**self).hash(password)
    }

    fn verify(&self, password: &str, hash: &str) -> AppResult<bool> {
        (**self).verify(password, hash)
    }
}

/// Argon2id in PHC string format.
#[derive(Debug, Clone)]
pub struct Argon2Hasher {
    params: Params,
}

impl Argon2Hasher {
    pub fn new() -> Self {
        Self {
            params: Params::default(),
        }
    }

    /// Custom cost parameters (memory in KiB, iterations).
    pub fn with_cost(memory_kib: u32, iterations: u32) -> AppResult<Self> {
        let params = Params::new(memory_kib, iterations, 1, None)
            .map_err(|e| AppError::internal(format!("invalid argon2 parameters: {e}")))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> AppResult<String> {
        use argon2::PasswordHasher as _;

        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| AppError::internal(format!("password hashing failed: {e}")))
    }

    fn verify(&self, password: &str, hash: &str) -> AppResult<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| AppError::internal(format!("invalid hash format: {e}")))?;
        // Verification uses the parameters recorded in the hash itself.
        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AppError::internal(format!("password verification failed: {e}"))),
        }
    }
}

/// Minimum strength requirements for new passwords.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub min_entropy_bits: f64,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 10,
            min_entropy_bits: 50.0,
        }
    }
}

impl PasswordPolicy {
    pub fn check(&self, password: &str) -> AppResult<()> {
        let length = password.chars().count();
        if length < self.min_length {
            return Err(AppError::validation(
                ValidationKind::WeakPassword,
                format!("password must be at least {} characters", self.min_length),
            ));
        }
        let bits = estimate_entropy_bits(password);
        if bits < self.min_entropy_bits {
            return Err(AppError::validation(
                ValidationKind::WeakPassword,
                "password is too predictable; mix letter case, digits and symbols",
            ));
        }
        Ok(())
    }
}

/// Random 24-character password for seeded accounts that were given none.
pub fn generate_password() -> String {
    use base64::Engine;

    let mut rng = rand::rng();
    let bytes: [u8; 18] = rand::Rng::random(&mut rng);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Character-pool estimate: `length * log2(pool)`, with repeated characters
/// counted once per distinct run to discourage padding.
pub fn estimate_entropy_bits(password: &str) -> f64 {
    let mut pool = 0u32;
    if password.chars().any(|c| c.is_ascii_lowercase()) {
        pool += 26;
    }
    if password.chars().any(|c| c.is_ascii_uppercase()) {
        pool += 26;
    }
    if password.chars().any(|c| c.is_ascii_digit()) {
        pool += 10;
    }
    if password.chars().any(|c| c.is_ascii_punctuation() || c == ' ') {
        pool += 33;
    }
    if password.chars().any(|c| !c.is_ascii()) {
        pool += 100;
    }
    if pool == 0 {
        return 0.0;
    }

    let mut effective_len = 0usize;
    let mut prev = None;
    for c in password.chars() {
        if prev != Some(c) {
            effective_len += 1;
        }
        prev = Some(c);
    }
    effective_len as f64 * f64::from(pool).log2()
}
