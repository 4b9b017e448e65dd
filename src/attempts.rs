//! Durable record of verification attempts.
//!
//! Every TOTP or backup-code check appends exactly one record here,
//! success or failure. Records are immutable once written; the lockout
//! policy reads them back as the evidence basis for its decisions.

use crate::error::Result;
use crate::storage::AttemptStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;
use uuid::Uuid;

/// Maximum stored IP address length (IPv6 max).
const MAX_IP_LENGTH: usize = 45;

/// Truncate an over-long IP string before it reaches storage.
fn truncate_ip(ip: &str) -> &str {
    if ip.len() <= MAX_IP_LENGTH {
        ip
    } else {
        &ip[..MAX_IP_LENGTH]
    }
}

/// Which credential type an attempt presented.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptKind {
    Totp,
    BackupCode,
}

impl AttemptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Totp => "totp",
            Self::BackupCode => "backup_code",
        }
    }
}

impl fmt::Display for AttemptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One verification attempt. Write-once.
#[derive(Clone, Debug)]
pub struct AttemptRecord {
    pub id: Uuid,
    pub user_id: String,
    pub ip_address: Option<String>,
    pub kind: AttemptKind,
    pub success: bool,
    pub created_at: SystemTime,
}

impl AttemptRecord {
    pub fn new(user_id: &str, ip: Option<&str>, kind: AttemptKind, success: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            ip_address: ip.map(truncate_ip).map(str::to_string),
            kind,
            success,
            created_at: SystemTime::now(),
        }
    }
}

/// Append-only ledger of verification attempts.
///
/// `record` is a plain append with no uniqueness constraint; concurrent
/// callers never conflict. The failure-triggered lockout evaluation lives
/// on [`crate::flows::VerificationFlow::record_attempt`], which callers
/// use after a failed verification.
pub struct AttemptLedger<S> {
    store: S,
}

impl<S: AttemptStore> AttemptLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Append one attempt and return the stored record.
    ///
    /// A successful attempt does not erase earlier failures; the policy
    /// window slides past them on its own.
    pub async fn record(
        &self,
        user_id: &str,
        ip: Option<&str>,
        kind: AttemptKind,
        success: bool,
    ) -> Result<AttemptRecord> {
        let record = AttemptRecord::new(user_id, ip, kind, success);
        self.store.append_attempt(&record).await?;

        tracing::debug!(
            target: "auth.attempts.recorded",
            user_id = %user_id,
            kind = %kind,
            success = success,
            "Verification attempt recorded"
        );

        Ok(record)
    }

    /// Most recent attempts for one user, newest first.
    pub async fn list_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<AttemptRecord>> {
        self.store.attempts_for_user(user_id, limit).await
    }

    /// All attempts, newest first, paginated (1-based page).
    pub async fn list_all(&self, page: usize, limit: usize) -> Result<Vec<AttemptRecord>> {
        self.store.attempts_page(page.max(1), limit).await
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
