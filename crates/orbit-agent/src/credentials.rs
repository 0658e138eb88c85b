//! Ordered pool of interchangeable API credentials with a rotating cursor.

use tracing::info;

use crate::provider::ProviderError;

/// Round-robin credential pool.
///
/// Rotation never removes a key: quota exhaustion is usually transient, so a
/// key that failed early in a run is still eligible when the cursor wraps.
#[derive(Debug, Clone)]
pub struct CredentialPool {
    keys: Vec<String>,
    active: usize,
}

impl CredentialPool {
    /// Build a pool from raw keys, trimming whitespace and dropping blanks.
    pub fn new<I, S>(keys: I) -> Result<Self, ProviderError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys: Vec<String> = keys
            .into_iter()
            .map(|k| k.as_ref().trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if keys.is_empty() {
            return Err(ProviderError::NoCredentials);
        }
        Ok(Self { keys, active: 0 })
    }

    pub fn active_credential(&self) -> &str {
        &self.keys[self.active]
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    /// 1-based slot number; safe to log, unlike the key itself.
    pub fn active_slot(&self) -> usize {
        self.active + 1
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Advance to the next credential.
    ///
    /// Returns `false` (and leaves the cursor alone) when there is nothing to
    /// rotate to.
    pub fn rotate(&mut self) -> bool {
        if self.keys.len() <= 1 {
            return false;
        }
        self.active = (self.active + 1) % self.keys.len();
        info!(slot = self.active_slot(), pool = self.keys.len(), "rotated to backup credential");
        true
    }
}
