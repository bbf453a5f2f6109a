//! Round-robin credential rotation.
//!
//! Every model call takes the next key in the pool, wrapping at the end, so
//! a burst of concurrent batches spreads across all configured keys instead
//! of exhausting one key's rate limit. Selection is a single atomic
//! `fetch_add`, done at dispatch time before the call suspends, so the order
//! keys are handed out follows dispatch order even on a multi-threaded
//! runtime.

use crate::error::ExamError;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// An API key. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    index: usize,
    key: String,
}

impl Credential {
    /// Position of this key in the pool.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn secret(&self) -> &str {
        &self.key
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(#{})", self.index)
    }
}

/// A non-empty pool of credentials with a rotation cursor.
#[derive(Debug)]
pub struct CredentialRotator {
    credentials: Vec<Credential>,
    cursor: AtomicUsize,
}

impl CredentialRotator {
    /// # Errors
    /// [`ExamError::NoCredentials`] if `keys` contains no non-blank key.
    pub fn new<I, S>(keys: I) -> Result<Self, ExamError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let credentials: Vec<Credential> = keys
            .into_iter()
            .map(Into::into)
            .filter(|k: &String| !k.trim().is_empty())
            .enumerate()
            .map(|(index, key)| Credential { index, key })
            .collect();
        if credentials.is_empty() {
            return Err(ExamError::NoCredentials);
        }
        Ok(Self {
            credentials,
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Take the next credential, wrapping at the end of the pool.
    pub fn next_credential(&self) -> &Credential {
        let n = self.cursor.fetch_add(1, Ordering::Relaxed);
        &self.credentials[n % self.credentials.len()]
    }
}
