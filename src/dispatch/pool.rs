//! Credential pool with uniform-random selection and failure accounting
//!
//! The pool owns the set of usable API credentials for the lifetime of the
//! process. Membership is fixed at startup; a credential that keeps failing
//! stays in rotation (its failure counter is observational - eviction is a
//! deliberate non-feature, see DESIGN.md).

use rand::Rng;
use std::sync::atomic::{AtomicU32, Ordering};

use super::DispatchError;
use crate::keystore::mask_secret;

/// One API credential: the secret itself plus a stable display nickname
/// and a monotonic failure counter.
pub struct Credential {
    nickname: String,
    key: String,
    failures: AtomicU32,
}

impl Credential {
    pub fn new(nickname: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            nickname: nickname.into(),
            key: key.into(),
            failures: AtomicU32::new(0),
        }
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }
}

// The secret must never reach logs, so Debug shows the masked form only.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("nickname", &self.nickname)
            .field("key", &mask_secret(&self.key))
            .field("failures", &self.failure_count())
            .finish()
    }
}

/// A credential chosen for one dispatch attempt. Carries owned copies so the
/// attempt can run without borrowing the pool.
#[derive(Debug, Clone)]
pub struct SelectedCredential {
    pub index: usize,
    pub nickname: String,
    key: String,
}

impl SelectedCredential {
    /// The secret, for building the authenticated endpoint. Handle with the
    /// same care as the pool does: never log it in full.
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Fixed set of interchangeable credentials.
///
/// Selection is uniform-random rather than round-robin: it spreads load
/// without any shared "next index" cursor, at the cost of short-term
/// fairness (fine while call volume is low relative to pool size).
pub struct CredentialPool {
    credentials: Vec<Credential>,
}

impl CredentialPool {
    pub fn new(credentials: Vec<Credential>) -> Self {
        if credentials.is_empty() {
            log::warn!("CredentialPool: created empty; every dispatch will fail until reconfigured");
        } else {
            log::info!("CredentialPool: {} credential(s) loaded", credentials.len());
        }
        Self { credentials }
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Pick a credential uniformly at random.
    ///
    /// Fails with `NoCredentialsConfigured` on an empty pool - fatal for the
    /// caller, there is no recovery short of reconfiguration.
    pub fn select(&self) -> Result<SelectedCredential, DispatchError> {
        if self.credentials.is_empty() {
            log::error!("CredentialPool: no valid credentials configured, cannot select");
            return Err(DispatchError::NoCredentialsConfigured);
        }
        let index = rand::thread_rng().gen_range(0..self.credentials.len());
        let credential = &self.credentials[index];
        Ok(SelectedCredential {
            index,
            nickname: credential.nickname.clone(),
            key: credential.key.clone(),
        })
    }

    /// Record one failure against the credential at `index`. Counters only
    /// ever increase and never affect rotation. Out-of-range indices are
    /// ignored (the pool never shrinks, so they can only come from a bug).
    pub fn report_failure(&self, index: usize) {
        if let Some(credential) = self.credentials.get(index) {
            let count = credential.failures.fetch_add(1, Ordering::Relaxed) + 1;
            log::warn!(
                "CredentialPool: failure count for '{}' is now {}",
                credential.nickname,
                count
            );
        }
    }

    /// Current failure count for the credential at `index`.
    pub fn failure_count(&self, index: usize) -> Option<u32> {
        self.credentials.get(index).map(Credential::failure_count)
    }

    pub fn credentials(&self) -> &[Credential] {
        &self.credentials
    }
}
