//! Sliding-window lockout policy.
//!
//! On every failed attempt the engine counts that user's recent failures
//! of the same kind in the attempt ledger; crossing the threshold opens a
//! time-boxed lock. Locks expire by the clock alone — reading lock status
//! never writes — and unlocking rewrites `locked_until` into the past so
//! the history of who was locked when stays queryable.
//!
//! # Tracing events
//!
//! - `auth.lockout.auto_lock` - threshold crossed, lock created
//! - `auth.lockout.manual_lock` - admin-initiated lock
//! - `auth.lockout.unlocked` - locks cleared (admin or recovery)

use crate::attempts::AttemptKind;
use crate::audit::{actions, AuditLogEntry};
use crate::error::Result;
use crate::storage::{AttemptStore, AuditStore, LockStore};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Default failure threshold before a lock opens.
const DEFAULT_MAX_FAILURES: u32 = 5;

/// Default trailing window the failures are counted over (15 minutes).
const DEFAULT_FAILURE_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Default lock duration (30 minutes).
const DEFAULT_LOCK_DURATION: Duration = Duration::from_secs(30 * 60);

/// What a lock covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockKind {
    Totp,
    BackupCode,
    Login,
}

impl LockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Totp => "totp",
            Self::BackupCode => "backup_code",
            Self::Login => "login",
        }
    }
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<AttemptKind> for LockKind {
    fn from(kind: AttemptKind) -> Self {
        match kind {
            AttemptKind::Totp => Self::Totp,
            AttemptKind::BackupCode => Self::BackupCode,
        }
    }
}

/// One lock. Created once; `locked_until` is only ever rewritten into the
/// past by an unlock. Never deleted.
#[derive(Clone, Debug)]
pub struct LockRecord {
    pub id: Uuid,
    pub user_id: String,
    pub kind: LockKind,
    pub locked_until: SystemTime,
    pub created_at: SystemTime,
}

impl LockRecord {
    pub fn new(user_id: &str, kind: LockKind, locked_until: SystemTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            kind,
            locked_until,
            created_at: SystemTime::now(),
        }
    }
}

/// Lockout thresholds and durations.
///
/// These were fixed constants in earlier revisions of the surrounding
/// system; here they are configuration handed to the engine at
/// construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Failures of one kind within the window that open a lock.
    pub max_failures: u32,
    /// Trailing window the failures are counted over.
    pub failure_window: Duration,
    /// How long a new lock lasts.
    pub lock_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_failures: DEFAULT_MAX_FAILURES,
            failure_window: DEFAULT_FAILURE_WINDOW,
            lock_duration: DEFAULT_LOCK_DURATION,
        }
    }
}

impl LockoutPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Strict preset: 3 failures in 15 minutes, 1 hour lock.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            max_failures: 3,
            failure_window: Duration::from_secs(15 * 60),
            lock_duration: Duration::from_secs(60 * 60),
        }
    }

    /// Lenient preset: 10 failures in 15 minutes, 10 minute lock.
    #[must_use]
    pub fn lenient() -> Self {
        Self {
            max_failures: 10,
            failure_window: Duration::from_secs(15 * 60),
            lock_duration: Duration::from_secs(10 * 60),
        }
    }

    #[must_use]
    pub fn max_failures(mut self, max: u32) -> Self {
        self.max_failures = max;
        self
    }

    #[must_use]
    pub fn failure_window(mut self, window: Duration) -> Self {
        self.failure_window = window;
        self
    }

    #[must_use]
    pub fn lock_duration(mut self, duration: Duration) -> Self {
        self.lock_duration = duration;
        self
    }
}

/// Answer to "may this user attempt verification right now?".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockStatus {
    pub locked: bool,
    /// Kind of the governing lock, when locked.
    pub kind: Option<LockKind>,
    pub locked_until: Option<SystemTime>,
    /// Minutes until expiry, rounded up, when locked.
    pub remaining_minutes: Option<u64>,
}

impl LockStatus {
    fn unlocked() -> Self {
        Self {
            locked: false,
            kind: None,
            locked_until: None,
            remaining_minutes: None,
        }
    }

    fn from_record(record: &LockRecord, now: SystemTime) -> Self {
        let remaining = record
            .locked_until
            .duration_since(now)
            .unwrap_or_default()
            .as_secs();
        Self {
            locked: true,
            kind: Some(record.kind),
            locked_until: Some(record.locked_until),
            remaining_minutes: Some(remaining.div_ceil(60)),
        }
    }
}

/// Decides when failed attempts become locks, and answers lock-status
/// queries.
///
/// The engine never blocks a verification call itself; callers consult
/// [`is_locked`](Self::is_locked) (or the flow layer does it for them)
/// before invoking verification.
pub struct LockoutEngine<S> {
    store: S,
    policy: LockoutPolicy,
}

impl<S: AttemptStore + LockStore + AuditStore> LockoutEngine<S> {
    pub fn new(store: S, policy: LockoutPolicy) -> Self {
        Self { store, policy }
    }

    pub fn with_defaults(store: S) -> Self {
        Self::new(store, LockoutPolicy::default())
    }

    /// Re-evaluate a user after a failed attempt of the given kind.
    ///
    /// Counts that user's failures of the same kind inside the trailing
    /// window (measured from now, not a calendar bucket). At or past the
    /// threshold a lock opens and an `AUTO_LOCK` audit entry is written.
    /// An already-locked user is left alone: repeated failures while
    /// locked never extend the lock.
    ///
    /// Two concurrent evaluations may both open a lock; the overlapping
    /// records are harmless because status reads take the most recent one.
    pub async fn evaluate_failure(
        &self,
        user_id: &str,
        kind: AttemptKind,
    ) -> Result<Option<LockRecord>> {
        let now = SystemTime::now();
        let lock_kind = LockKind::from(kind);

        if self
            .store
            .latest_active_lock(user_id, Some(lock_kind), now)
            .await?
            .is_some()
        {
            return Ok(None);
        }

        let since = now - self.policy.failure_window;
        let failures = self
            .store
            .count_recent_failures(user_id, kind, since)
            .await?;
        if failures < self.policy.max_failures {
            return Ok(None);
        }

        let record = LockRecord::new(user_id, lock_kind, now + self.policy.lock_duration);
        self.store.create_lock(&record).await?;

        let lock_minutes = self.policy.lock_duration.as_secs() / 60;
        tracing::warn!(
            target: "auth.lockout.auto_lock",
            user_id = %user_id,
            kind = %lock_kind,
            failures = failures,
            lock_minutes = lock_minutes,
            "User locked after repeated failures"
        );

        self.store
            .append_audit(&AuditLogEntry::new(
                user_id,
                actions::AUTO_LOCK,
                Some(json!({
                    "kind": lock_kind.as_str(),
                    "failures": failures,
                    "lock_minutes": lock_minutes,
                })),
                None,
            ))
            .await?;

        Ok(Some(record))
    }

    /// Current lock status for a user, optionally scoped to one kind.
    ///
    /// Expiry is a pure read-time condition: once the clock passes
    /// `locked_until` this reports unlocked with no write anywhere.
    pub async fn is_locked(&self, user_id: &str, kind: Option<LockKind>) -> Result<LockStatus> {
        let now = SystemTime::now();
        Ok(self
            .store
            .latest_active_lock(user_id, kind, now)
            .await?
            .map(|record| LockStatus::from_record(&record, now))
            .unwrap_or_else(LockStatus::unlocked))
    }

    /// Clear locks for a user by rewriting `locked_until` into the past.
    ///
    /// Scoped to `kind` when given, otherwise all kinds. Returns how many
    /// locks were cleared. Used by the recovery flow; admins should go
    /// through [`admin_unlock`](Self::admin_unlock) so the action is
    /// audited.
    pub async fn unlock(&self, user_id: &str, kind: Option<LockKind>) -> Result<u32> {
        let past = SystemTime::now() - Duration::from_secs(1);
        let cleared = self.store.expire_locks(user_id, kind, past).await?;

        if cleared > 0 {
            tracing::info!(
                target: "auth.lockout.unlocked",
                user_id = %user_id,
                kind = kind.map(|k| k.as_str()).unwrap_or("all"),
                cleared = cleared,
                "Locks cleared"
            );
        }

        Ok(cleared)
    }

    /// Admin unlock: clears locks and writes a `MANUAL_UNLOCK` audit
    /// entry. Returns whether anything was actually cleared.
    pub async fn admin_unlock(
        &self,
        user_id: &str,
        kind: Option<LockKind>,
        admin_id: &str,
    ) -> Result<bool> {
        let cleared = self.unlock(user_id, kind).await?;

        if cleared > 0 {
            self.store
                .append_audit(&AuditLogEntry::new(
                    user_id,
                    actions::MANUAL_UNLOCK,
                    Some(json!({
                        "kind": kind.map(|k| k.as_str()),
                        "cleared": cleared,
                    })),
                    Some(admin_id),
                ))
                .await?;
        }

        Ok(cleared > 0)
    }

    /// Admin lock: open a lock without waiting for failures.
    pub async fn admin_lock(
        &self,
        user_id: &str,
        kind: LockKind,
        duration: Duration,
        admin_id: &str,
    ) -> Result<LockRecord> {
        let record = LockRecord::new(user_id, kind, SystemTime::now() + duration);
        self.store.create_lock(&record).await?;

        tracing::warn!(
            target: "auth.lockout.manual_lock",
            user_id = %user_id,
            kind = %kind,
            admin_id = %admin_id,
            lock_minutes = duration.as_secs() / 60,
            "User locked by admin"
        );

        self.store
            .append_audit(&AuditLogEntry::new(
                user_id,
                actions::MANUAL_LOCK,
                Some(json!({
                    "kind": kind.as_str(),
                    "lock_minutes": duration.as_secs() / 60,
                })),
                Some(admin_id),
            ))
            .await?;

        Ok(record)
    }

    #[must_use]
    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attempts::AttemptRecord;
    use crate::storage::InMemoryStore;

    fn engine(policy: LockoutPolicy) -> LockoutEngine<InMemoryStore> {
        LockoutEngine::new(InMemoryStore::new(), policy)
    }

    async fn push_failures(
        engine: &LockoutEngine<InMemoryStore>,
        user_id: &str,
        kind: AttemptKind,
        count: usize,
    ) {
        for _ in 0..count {
            engine
                .store()
                .append_attempt(&AttemptRecord::new(user_id, None, kind, false))
                .await
                .unwrap();
        }
    }

    #[test]
    fn test_policy_defaults() {
        let policy = LockoutPolicy::new();
        assert_eq!(policy.max_failures, 5);
        assert_eq!(policy.failure_window, Duration::from_secs(15 * 60));
        assert_eq!(policy.lock_duration, Duration::from_secs(30 * 60));
    }

    #[test]
    fn test_policy_builder() {
        let policy = LockoutPolicy::new()
            .max_failures(7)
            .failure_window(Duration::from_secs(60))
            .lock_duration(Duration::from_secs(120));

        assert_eq!(policy.max_failures, 7);
        assert_eq!(policy.failure_window, Duration::from_secs(60));
        assert_eq!(policy.lock_duration, Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_below_threshold_no_lock() {
        let engine = engine(LockoutPolicy::new());
        push_failures(&engine, "user-1", AttemptKind::Totp, 4).await;

        let created = engine
            .evaluate_failure("user-1", AttemptKind::Totp)
            .await
            .unwrap();
        assert!(created.is_none());

        let status = engine
            .is_locked("user-1", Some(LockKind::Totp))
            .await
            .unwrap();
        assert!(!status.locked);
    }

    #[tokio::test]
    async fn test_threshold_opens_lock() {
        let engine = engine(LockoutPolicy::new());
        push_failures(&engine, "user-1", AttemptKind::Totp, 5).await;

        let created = engine
            .evaluate_failure("user-1", AttemptKind::Totp)
            .await
            .unwrap();
        assert!(created.is_some());

        let status = engine
            .is_locked("user-1", Some(LockKind::Totp))
            .await
            .unwrap();
        assert!(status.locked);
        assert_eq!(status.kind, Some(LockKind::Totp));
        // 30 minute default, ceil'd
        let remaining = status.remaining_minutes.unwrap();
        assert!((29..=30).contains(&remaining), "remaining={}", remaining);
    }

    #[tokio::test]
    async fn test_auto_lock_writes_audit() {
        let engine = engine(LockoutPolicy::new());
        push_failures(&engine, "user-1", AttemptKind::Totp, 5).await;
        engine
            .evaluate_failure("user-1", AttemptKind::Totp)
            .await
            .unwrap();

        let logs = engine.store().audit_for_user("user-1", 1, 10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, actions::AUTO_LOCK);
        let details = logs[0].details.as_ref().unwrap();
        assert_eq!(details["failures"], 5);
        assert_eq!(details["lock_minutes"], 30);
    }

    #[tokio::test]
    async fn test_old_failures_outside_window_ignored() {
        let engine = engine(LockoutPolicy::new());

        // Failures 20 minutes old, outside the 15-minute window.
        for _ in 0..5 {
            let mut record = AttemptRecord::new("user-1", None, AttemptKind::Totp, false);
            record.created_at = SystemTime::now() - Duration::from_secs(20 * 60);
            engine.store().append_attempt(&record).await.unwrap();
        }

        let created = engine
            .evaluate_failure("user-1", AttemptKind::Totp)
            .await
            .unwrap();
        assert!(created.is_none());
    }

    #[tokio::test]
    async fn test_kinds_counted_separately() {
        let engine = engine(LockoutPolicy::new());
        push_failures(&engine, "user-1", AttemptKind::BackupCode, 5).await;

        // TOTP evaluation must not see backup-code failures.
        let created = engine
            .evaluate_failure("user-1", AttemptKind::Totp)
            .await
            .unwrap();
        assert!(created.is_none());

        let created = engine
            .evaluate_failure("user-1", AttemptKind::BackupCode)
            .await
            .unwrap();
        assert!(created.is_some());
    }

    #[tokio::test]
    async fn test_lock_does_not_stack() {
        let engine = engine(LockoutPolicy::new());
        push_failures(&engine, "user-1", AttemptKind::Totp, 5).await;

        let first = engine
            .evaluate_failure("user-1", AttemptKind::Totp)
            .await
            .unwrap()
            .unwrap();

        // More failures while locked: no new lock, expiry unchanged.
        push_failures(&engine, "user-1", AttemptKind::Totp, 3).await;
        let second = engine
            .evaluate_failure("user-1", AttemptKind::Totp)
            .await
            .unwrap();
        assert!(second.is_none());

        let status = engine
            .is_locked("user-1", Some(LockKind::Totp))
            .await
            .unwrap();
        assert_eq!(status.locked_until, Some(first.locked_until));
    }

    #[tokio::test]
    async fn test_expired_lock_reads_unlocked_without_write() {
        let engine = engine(LockoutPolicy::new());

        let mut record = LockRecord::new(
            "user-1",
            LockKind::Totp,
            SystemTime::now() - Duration::from_secs(60),
        );
        record.created_at = SystemTime::now() - Duration::from_secs(31 * 60);
        engine.store().create_lock(&record).await.unwrap();

        let status = engine
            .is_locked("user-1", Some(LockKind::Totp))
            .await
            .unwrap();
        assert!(!status.locked);

        // The record itself is still there, untouched.
        let all = engine.store().locks_for_user("user-1");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].locked_until, record.locked_until);
    }

    #[tokio::test]
    async fn test_unscoped_status_sees_any_kind() {
        let engine = engine(LockoutPolicy::new());
        engine
            .store()
            .create_lock(&LockRecord::new(
                "user-1",
                LockKind::Login,
                SystemTime::now() + Duration::from_secs(600),
            ))
            .await
            .unwrap();

        let status = engine.is_locked("user-1", None).await.unwrap();
        assert!(status.locked);
        assert_eq!(status.kind, Some(LockKind::Login));

        // A totp-scoped query does not match the login lock.
        let status = engine
            .is_locked("user-1", Some(LockKind::Totp))
            .await
            .unwrap();
        assert!(!status.locked);
    }

    #[tokio::test]
    async fn test_admin_unlock_clears_and_audits() {
        let engine = engine(LockoutPolicy::new());
        push_failures(&engine, "user-1", AttemptKind::Totp, 5).await;
        engine
            .evaluate_failure("user-1", AttemptKind::Totp)
            .await
            .unwrap();

        let cleared = engine
            .admin_unlock("user-1", Some(LockKind::Totp), "admin-9")
            .await
            .unwrap();
        assert!(cleared);

        let status = engine
            .is_locked("user-1", Some(LockKind::Totp))
            .await
            .unwrap();
        assert!(!status.locked);

        let logs = engine.store().audit_for_user("user-1", 1, 10).await.unwrap();
        assert_eq!(logs[0].action, actions::MANUAL_UNLOCK);
        assert_eq!(logs[0].admin_id.as_deref(), Some("admin-9"));
    }

    #[tokio::test]
    async fn test_admin_unlock_noop_when_not_locked() {
        let engine = engine(LockoutPolicy::new());

        let cleared = engine.admin_unlock("user-1", None, "admin-9").await.unwrap();
        assert!(!cleared);

        let logs = engine.store().audit_for_user("user-1", 1, 10).await.unwrap();
        assert!(logs.is_empty());
    }

    #[tokio::test]
    async fn test_admin_lock() {
        let engine = engine(LockoutPolicy::new());

        engine
            .admin_lock("user-1", LockKind::Login, Duration::from_secs(600), "admin-9")
            .await
            .unwrap();

        let status = engine
            .is_locked("user-1", Some(LockKind::Login))
            .await
            .unwrap();
        assert!(status.locked);

        let logs = engine.store().audit_for_user("user-1", 1, 10).await.unwrap();
        assert_eq!(logs[0].action, actions::MANUAL_LOCK);
    }

    #[tokio::test]
    async fn test_unlock_scoped_leaves_other_kinds() {
        let engine = engine(LockoutPolicy::new());
        let until = SystemTime::now() + Duration::from_secs(600);
        engine
            .store()
            .create_lock(&LockRecord::new("user-1", LockKind::Totp, until))
            .await
            .unwrap();
        engine
            .store()
            .create_lock(&LockRecord::new("user-1", LockKind::BackupCode, until))
            .await
            .unwrap();

        engine.unlock("user-1", Some(LockKind::Totp)).await.unwrap();

        assert!(!engine
            .is_locked("user-1", Some(LockKind::Totp))
            .await
            .unwrap()
            .locked);
        assert!(engine
            .is_locked("user-1", Some(LockKind::BackupCode))
            .await
            .unwrap()
            .locked);
    }
}
