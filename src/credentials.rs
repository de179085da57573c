//! Credential selection for upstream sessions.
//!
//! The real pool (quota tracking, persistence, cooldowns) lives in the
//! embedding service; this crate only needs to pick a credential per
//! attempt and report how the attempt went.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::AdapterError;

#[derive(Debug, Clone)]
pub struct Credential {
    pub token: String,
    /// Pinned credentials were chosen by the caller and are never rotated
    /// away from on failure.
    pub pinned: bool,
}

impl Credential {
    #[must_use]
    pub fn pinned(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            pinned: true,
        }
    }
}

/// How an attempt with a credential ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialOutcome {
    Success,
    Blocked,
    RateLimited,
    Unauthorized,
    TransportFailure,
}

#[async_trait]
pub trait CredentialPool: Send + Sync {
    /// Next usable credential.
    async fn acquire(&self) -> Result<Credential, AdapterError>;

    /// Report the outcome of an attempt so the pool can account for it.
    async fn report(&self, credential: &Credential, outcome: CredentialOutcome);
}

/// Round-robin pool over a fixed token list, with per-token failure
/// counts. Suitable for tests and single-tenant deployments.
pub struct StaticCredentialPool {
    tokens: Vec<String>,
    cursor: AtomicUsize,
    failures: Mutex<HashMap<String, u32>>,
}

impl StaticCredentialPool {
    #[must_use]
    pub fn new(tokens: Vec<String>) -> Self {
        Self {
            tokens,
            cursor: AtomicUsize::new(0),
            failures: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn failure_count(&self, token: &str) -> u32 {
        self.failures.lock().get(token).copied().unwrap_or(0)
    }
}

#[async_trait]
impl CredentialPool for StaticCredentialPool {
    async fn acquire(&self) -> Result<Credential, AdapterError> {
        if self.tokens.is_empty() {
            return Err(AdapterError::NoCredential);
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.tokens.len();
        Ok(Credential {
            token: self.tokens[index].clone(),
            pinned: false,
        })
    }

    async fn report(&self, credential: &Credential, outcome: CredentialOutcome) {
        match outcome {
            CredentialOutcome::Success => {}
            _ => {
                let mut failures = self.failures.lock();
                *failures.entry(credential.token.clone()).or_insert(0) += 1;
                tracing::debug!(outcome = ?outcome, "credential attempt failed");
            }
        }
    }
}
