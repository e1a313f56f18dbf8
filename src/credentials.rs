//! Ordered pool of interchangeable credentials with a persistent "current" pointer.

use crate::error::{Result, TranslateError};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A non-empty, cyclically rotated sequence of credentials for one provider.
///
/// Exactly one credential is current at a time. The pointer survives across
/// calls so a provider that found a working key keeps using it.
pub struct CredentialPool {
    credentials: Vec<String>,
    current: AtomicUsize,
}

impl CredentialPool {
    /// Build a pool for `provider`; fails with `NoCredentials` when `credentials` is empty.
    pub fn new<I, S>(provider: &str, credentials: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let credentials: Vec<String> = credentials
            .into_iter()
            .map(Into::into)
            .filter(|c| !c.trim().is_empty())
            .collect();

        if credentials.is_empty() {
            return Err(TranslateError::NoCredentials(provider.to_string()));
        }

        Ok(Self {
            credentials,
            current: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Always `false`; a pool cannot be constructed empty.
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Index of the current credential.
    pub fn current_index(&self) -> usize {
        self.current.load(Ordering::Acquire)
    }

    /// The current credential together with its index.
    pub fn current(&self) -> (usize, &str) {
        let index = self.current_index();
        (index, self.credentials[index].as_str())
    }

    /// Advance past the credential at `from` and return the new current index.
    ///
    /// If another call already moved the pointer away from `from`, the pointer
    /// is left where it is so a single quota failure never skips two keys.
    pub fn rotate_from(&self, from: usize) -> usize {
        let next = (from + 1) % self.credentials.len();
        match self
            .current
            .compare_exchange(from, next, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => next,
            Err(actual) => actual,
        }
    }
}

// Never print credential values.
impl fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPool")
            .field("len", &self.credentials.len())
            .field("current", &self.current_index())
            .finish()
    }
}
