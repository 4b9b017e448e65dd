//! Append-only security audit trail.
//!
//! Every state-changing action in the subsystem lands here: automatic and
//! manual locks, unlocks, recovery successes, enrollment changes. Entries
//! are never updated or deleted.

use crate::error::Result;
use crate::storage::AuditStore;
use std::time::SystemTime;
use uuid::Uuid;

/// The enumerated registry of audit action tags.
///
/// Everything this subsystem writes uses one of these; free-form tags are
/// reserved for callers layering their own admin actions on top.
pub mod actions {
    pub const AUTO_LOCK: &str = "AUTO_LOCK";
    pub const MANUAL_LOCK: &str = "MANUAL_LOCK";
    pub const MANUAL_UNLOCK: &str = "MANUAL_UNLOCK";
    pub const RECOVERY_REQUESTED: &str = "2FA_RECOVERY_REQUESTED";
    pub const RECOVERY_SUCCESS: &str = "2FA_RECOVERY_SUCCESS";
    pub const TWO_FACTOR_ENABLED: &str = "2FA_ENABLED";
    pub const TWO_FACTOR_DISABLED: &str = "2FA_DISABLED";
    pub const BACKUP_CODES_REGENERATED: &str = "BACKUP_CODES_REGENERATED";

    /// All tags this crate emits.
    pub const ALL: &[&str] = &[
        AUTO_LOCK,
        MANUAL_LOCK,
        MANUAL_UNLOCK,
        RECOVERY_REQUESTED,
        RECOVERY_SUCCESS,
        TWO_FACTOR_ENABLED,
        TWO_FACTOR_DISABLED,
        BACKUP_CODES_REGENERATED,
    ];
}

/// One audit entry. Write-once.
#[derive(Clone, Debug)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub user_id: String,
    pub action: String,
    /// Structured payload; stored opaquely, never interpreted here.
    pub details: Option<serde_json::Value>,
    /// Present when an administrator performed the action.
    pub admin_id: Option<String>,
    pub created_at: SystemTime,
}

impl AuditLogEntry {
    pub fn new(
        user_id: &str,
        action: &str,
        details: Option<serde_json::Value>,
        admin_id: Option<&str>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            action: action.to_string(),
            details,
            admin_id: admin_id.map(str::to_string),
            created_at: SystemTime::now(),
        }
    }
}

/// Appends and reads audit entries.
pub struct AuditLogger<S> {
    store: S,
}

impl<S: AuditStore> AuditLogger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Append one entry and return it.
    pub async fn log(
        &self,
        user_id: &str,
        action: &str,
        details: Option<serde_json::Value>,
        admin_id: Option<&str>,
    ) -> Result<AuditLogEntry> {
        let entry = AuditLogEntry::new(user_id, action, details, admin_id);
        self.store.append_audit(&entry).await?;

        tracing::info!(
            target: "auth.audit.logged",
            user_id = %user_id,
            action = %action,
            admin_id = admin_id.unwrap_or("-"),
            "Audit entry written"
        );

        Ok(entry)
    }

    /// Entries for one user, newest first, paginated (1-based page).
    pub async fn user_logs(
        &self,
        user_id: &str,
        page: usize,
        limit: usize,
    ) -> Result<Vec<AuditLogEntry>> {
        self.store.audit_for_user(user_id, page.max(1), limit).await
    }

    /// All entries, newest first, paginated (1-based page).
    pub async fn all_logs(&self, page: usize, limit: usize) -> Result<Vec<AuditLogEntry>> {
        self.store.audit_page(page.max(1), limit).await
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
