//! Audit entry storage.

use crate::audit::AuditLogEntry;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Append-only storage for audit entries. Entries are never updated or
/// deleted by this subsystem.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<()>;

    /// Entries for one user, newest first, 1-based page.
    async fn audit_for_user(
        &self,
        user_id: &str,
        page: usize,
        limit: usize,
    ) -> Result<Vec<AuditLogEntry>>;

    /// All entries, newest first, 1-based page.
    async fn audit_page(&self, page: usize, limit: usize) -> Result<Vec<AuditLogEntry>>;
}

#[async_trait]
impl<T: AuditStore + ?Sized> AuditStore for Arc<T> {
    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<()> {
        (**self).append_audit(entry).await
    }

    async fn audit_for_user(
        &self,
        user_id: &str,
        page: usize,
        limit: usize,
    ) -> Result<Vec<AuditLogEntry>> {
        (**self).audit_for_user(user_id, page, limit).await
    }

    async fn audit_page(&self, page: usize, limit: usize) -> Result<Vec<AuditLogEntry>> {
        (**self).audit_page(page, limit).await
    }
}
