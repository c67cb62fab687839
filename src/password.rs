//! Salted one-way password hashing (bcrypt).
//!
//! Both operations are CPU-bound, so they are moved onto tokio's blocking pool
//! rather than run on the async workers.

/// Lowest cost accepted from configuration in production.
pub const MIN_PRODUCTION_COST: u32 = 10;

/// Cost used when nothing is configured.
pub const DEFAULT_COST: u32 = 12;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("bcrypt failure: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),

    #[error("hashing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// PasswordHasher
///
/// Hashes and verifies passwords with a fixed bcrypt cost factor.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self { cost: DEFAULT_COST }
    }
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// hash
    ///
    /// Produces a bcrypt digest with a fresh random salt. Two calls with the same
    /// plaintext never return the same digest.
    pub async fn hash(&self, plaintext: &str) -> Result<String, PasswordError> {
        let cost = self.cost;
        let plaintext = plaintext.to_owned();
        let digest = tokio::task::spawn_blocking(move || bcrypt::hash(plaintext, cost)).await??;
        Ok(digest)
    }

    /// verify
    ///
    /// Returns `Ok(false)` on a mismatch. Only a malformed digest or a failed
    /// blocking task is an error.
    pub async fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, PasswordError> {
        let plaintext = plaintext.to_owned();
        let digest = digest.to_owned();
        let matches =
            tokio::task::spawn_blocking(move || bcrypt::verify(plaintext, &digest)).await??;
        Ok(matches)
    }
}
