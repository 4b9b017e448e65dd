//! Attempt and lock record storage.

use crate::attempts::{AttemptKind, AttemptRecord};
use crate::error::Result;
use crate::lockout::{LockKind, LockRecord};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::SystemTime;

/// Append-only storage for verification attempts.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Append one record. No uniqueness constraint; plain insert.
    async fn append_attempt(&self, record: &AttemptRecord) -> Result<()>;

    /// Up to `limit` records for one user, newest first.
    async fn attempts_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<AttemptRecord>>;

    /// All records, newest first, 1-based page.
    async fn attempts_page(&self, page: usize, limit: usize) -> Result<Vec<AttemptRecord>>;

    /// Failed attempts of `kind` for `user_id` with `created_at >= since`.
    async fn count_recent_failures(
        &self,
        user_id: &str,
        kind: AttemptKind,
        since: SystemTime,
    ) -> Result<u32>;
}

/// Storage for lock records.
///
/// Locks are never deleted: unlocking rewrites `locked_until` into the
/// past so the lock history stays available to the audit trail.
#[async_trait]
pub trait LockStore: Send + Sync {
    async fn create_lock(&self, record: &LockRecord) -> Result<()>;

    /// The most recently created lock for `user_id` with
    /// `locked_until > now`, matching `kind` when given (any kind when
    /// `None`).
    async fn latest_active_lock(
        &self,
        user_id: &str,
        kind: Option<LockKind>,
        now: SystemTime,
    ) -> Result<Option<LockRecord>>;

    /// Set `locked_until = at` on every matching lock that is still
    /// active at `at`; return how many were updated.
    async fn expire_locks(
        &self,
        user_id: &str,
        kind: Option<LockKind>,
        at: SystemTime,
    ) -> Result<u32>;
}

#[async_trait]
impl<T: AttemptStore + ?Sized> AttemptStore for Arc<T> {
    async fn append_attempt(&self, record: &AttemptRecord) -> Result<()> {
        (**self).append_attempt(record).await
    }

    async fn attempts_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<AttemptRecord>> {
        (**self).attempts_for_user(user_id, limit).await
    }

    async fn attempts_page(&self, page: usize, limit: usize) -> Result<Vec<AttemptRecord>> {
        (**self).attempts_page(page, limit).await
    }

    async fn count_recent_failures(
        &self,
        user_id: &str,
        kind: AttemptKind,
        since: SystemTime,
    ) -> Result<u32> {
        (**self).count_recent_failures(user_id, kind, since).await
    }
}

#[async_trait]
impl<T: LockStore + ?Sized> LockStore for Arc<T> {
    async fn create_lock(&self, record: &LockRecord) -> Result<()> {
        (**self).create_lock(record).await
    }

    async fn latest_active_lock(
        &self,
        user_id: &str,
        kind: Option<LockKind>,
        now: SystemTime,
    ) -> Result<Option<LockRecord>> {
        (**self).latest_active_lock(user_id, kind, now).await
    }

    async fn expire_locks(
        &self,
        user_id: &str,
        kind: Option<LockKind>,
        at: SystemTime,
    ) -> Result<u32> {
        (**self).expire_locks(user_id, kind, at).await
    }
}
