//! In-memory store implementing every storage trait.
//!
//! The reference implementation for the conditional-write contracts and
//! the store used by this crate's own tests. Each conditional operation
//! holds the relevant write lock across its check-then-mutate section,
//! which is exactly the atomicity a SQL implementation gets from a
//! conditional `UPDATE`.

use crate::attempts::{AttemptKind, AttemptRecord};
use crate::audit::AuditLogEntry;
use crate::backup::BackupCodeGenerator;
use crate::error::Result;
use crate::lockout::{LockKind, LockRecord};
use crate::recovery::RecoveryRequest;
use crate::storage::{
    AccountStore, AttemptStore, AuditStore, Contact, LockStore, RecoveryStore, TwoFactorState,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::SystemTime;

#[derive(Default)]
struct AccountState {
    two_factor: TwoFactorState,
    contact: Option<Contact>,
}

/// In-memory implementation of all five store traits.
#[derive(Default)]
pub struct InMemoryStore {
    accounts: RwLock<HashMap<String, AccountState>>,
    attempts: RwLock<Vec<AttemptRecord>>,
    locks: RwLock<Vec<LockRecord>>,
    recoveries: RwLock<Vec<RecoveryRequest>>,
    audit: RwLock<Vec<AuditLogEntry>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set contact details for a user (notification emails).
    pub fn set_contact(&self, user_id: &str, name: Option<&str>, email: &str) {
        let mut accounts = self.accounts.write().unwrap();
        accounts.entry(user_id.to_string()).or_default().contact = Some(Contact {
            name: name.map(str::to_string),
            email: email.to_string(),
        });
    }

    /// Every lock record for a user, including expired ones.
    pub fn locks_for_user(&self, user_id: &str) -> Vec<LockRecord> {
        self.locks
            .read()
            .unwrap()
            .iter()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Every recovery request on file, in creation order.
    pub fn recovery_requests(&self) -> Vec<RecoveryRequest> {
        self.recoveries.read().unwrap().clone()
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn two_factor_state(&self, user_id: &str) -> Result<TwoFactorState> {
        Ok(self
            .accounts
            .read()
            .unwrap()
            .get(user_id)
            .map(|a| a.two_factor.clone())
            .unwrap_or_default())
    }

    async fn enable_two_factor(
        &self,
        user_id: &str,
        secret: &str,
        backup_codes: &[String],
        setup_at: SystemTime,
    ) -> Result<()> {
        let mut accounts = self.accounts.write().unwrap();
        let account = accounts.entry(user_id.to_string()).or_default();
        account.two_factor = TwoFactorState {
            enabled: true,
            secret: Some(secret.to_string()),
            backup_codes: Some(backup_codes.to_vec()),
            setup_at: Some(setup_at),
        };
        Ok(())
    }

    async fn disable_two_factor(&self, user_id: &str) -> Result<()> {
        let mut accounts = self.accounts.write().unwrap();
        let account = accounts.entry(user_id.to_string()).or_default();
        account.two_factor = TwoFactorState::default();
        Ok(())
    }

    async fn replace_backup_codes(&self, user_id: &str, backup_codes: &[String]) -> Result<()> {
        let mut accounts = self.accounts.write().unwrap();
        let account = accounts.entry(user_id.to_string()).or_default();
        account.two_factor.backup_codes = Some(backup_codes.to_vec());
        Ok(())
    }

    async fn consume_backup_code(&self, user_id: &str, code: &str) -> Result<bool> {
        // Lookup and removal under one write lock: the conditional-write
        // contract. A concurrent call for the same code sees the reduced
        // set and returns false.
        let mut accounts = self.accounts.write().unwrap();
        let Some(account) = accounts.get_mut(user_id) else {
            return Ok(false);
        };
        let Some(codes) = account.two_factor.backup_codes.as_mut() else {
            return Ok(false);
        };

        match BackupCodeGenerator::matches(code, codes) {
            Some(index) => {
                codes.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn contact(&self, user_id: &str) -> Result<Option<Contact>> {
        Ok(self
            .accounts
            .read()
            .unwrap()
            .get(user_id)
            .and_then(|a| a.contact.clone()))
    }
}

#[async_trait]
impl AttemptStore for InMemoryStore {
    async fn append_attempt(&self, record: &AttemptRecord) -> Result<()> {
        self.attempts.write().unwrap().push(record.clone());
        Ok(())
    }

    async fn attempts_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<AttemptRecord>> {
        let mut records: Vec<_> = self
            .attempts
            .read()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut records, |r| r.created_at);
        records.truncate(limit);
        Ok(records)
    }

    async fn attempts_page(&self, page: usize, limit: usize) -> Result<Vec<AttemptRecord>> {
        let mut records: Vec<_> = self.attempts.read().unwrap().clone();
        newest_first(&mut records, |r| r.created_at);
        Ok(records
            .into_iter()
            .skip(page.saturating_sub(1) * limit)
            .take(limit)
            .collect())
    }

    async fn count_recent_failures(
        &self,
        user_id: &str,
        kind: AttemptKind,
        since: SystemTime,
    ) -> Result<u32> {
        Ok(self
            .attempts
            .read()
            .unwrap()
            .iter()
            .filter(|r| {
                r.user_id == user_id && r.kind == kind && !r.success && r.created_at >= since
            })
            .count() as u32)
    }
}

#[async_trait]
impl LockStore for InMemoryStore {
    async fn create_lock(&self, record: &LockRecord) -> Result<()> {
        self.locks.write().unwrap().push(record.clone());
        Ok(())
    }

    async fn latest_active_lock(
        &self,
        user_id: &str,
        kind: Option<LockKind>,
        now: SystemTime,
    ) -> Result<Option<LockRecord>> {
        Ok(self
            .locks
            .read()
            .unwrap()
            .iter()
            .filter(|l| {
                l.user_id == user_id
                    && kind.map_or(true, |k| l.kind == k)
                    && l.locked_until > now
            })
            .max_by_key(|l| l.created_at)
            .cloned())
    }

    async fn expire_locks(
        &self,
        user_id: &str,
        kind: Option<LockKind>,
        at: SystemTime,
    ) -> Result<u32> {
        let mut locks = self.locks.write().unwrap();
        let mut updated = 0;
        for lock in locks.iter_mut() {
            if lock.user_id == user_id
                && kind.map_or(true, |k| lock.kind == k)
                && lock.locked_until > at
            {
                lock.locked_until = at;
                updated += 1;
            }
        }
        Ok(updated)
    }
}

#[async_trait]
impl RecoveryStore for InMemoryStore {
    async fn create_recovery(&self, request: &RecoveryRequest) -> Result<()> {
        self.recoveries.write().unwrap().push(request.clone());
        Ok(())
    }

    async fn consume_recovery(
        &self,
        email: &str,
        code: &str,
        now: SystemTime,
    ) -> Result<Option<RecoveryRequest>> {
        // Match and mark-used under one write lock; the loser of a race
        // finds `used` already set and falls through to None.
        let mut recoveries = self.recoveries.write().unwrap();
        for request in recoveries.iter_mut() {
            if request.email == email
                && request.code == code
                && !request.used
                && request.expires_at > now
            {
                request.used = true;
                return Ok(Some(request.clone()));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl AuditStore for InMemoryStore {
    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<()> {
        self.audit.write().unwrap().push(entry.clone());
        Ok(())
    }

    async fn audit_for_user(
        &self,
        user_id: &str,
        page: usize,
        limit: usize,
    ) -> Result<Vec<AuditLogEntry>> {
        let mut entries: Vec<_> = self
            .audit
            .read()
            .unwrap()
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut entries, |e| e.created_at);
        Ok(entries
            .into_iter()
            .skip(page.saturating_sub(1) * limit)
            .take(limit)
            .collect())
    }

    async fn audit_page(&self, page: usize, limit: usize) -> Result<Vec<AuditLogEntry>> {
        let mut entries: Vec<_> = self.audit.read().unwrap().clone();
        newest_first(&mut entries, |e| e.created_at);
        Ok(entries
            .into_iter()
            .skip(page.saturating_sub(1) * limit)
            .take(limit)
            .collect())
    }
}

/// Sort newest first; ties keep the later-inserted record first so that
/// same-instant appends still read back in reverse insertion order.
fn newest_first<T, F: Fn(&T) -> SystemTime>(records: &mut [T], created_at: F) {
    records.reverse();
    records.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
}
