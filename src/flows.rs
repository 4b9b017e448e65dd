//! Verification flow: the caller-facing front door.
//!
//! Wires the token verifier, attempt ledger, and lockout engine together
//! in the order the guard contract requires: consult lock status, reject
//! un-enrolled users before any crypto work, verify, append the attempt,
//! and re-evaluate lockout after a failure. Embedding systems that drive
//! the pieces individually must follow the same order.
//!
//! # Tracing events
//!
//! - `auth.verify.blocked` - attempt rejected because a lock is active
//! - `auth.verify.backup_code_spent` - a backup code was consumed

use crate::attempts::{AttemptKind, AttemptLedger, AttemptRecord};
use crate::backup::normalize_code;
use crate::error::{BreakwaterError, Result};
use crate::lockout::{LockStatus, LockoutEngine, LockoutPolicy};
use crate::storage::{AccountStore, AttemptStore, AuditStore, LockStore};
use crate::totp::{TotpConfig, TotpManager};

/// Orchestrates TOTP and backup-code verification against one store.
pub struct VerificationFlow<S> {
    store: S,
    totp: TotpManager,
    ledger: AttemptLedger<S>,
    engine: LockoutEngine<S>,
}

impl<S> VerificationFlow<S>
where
    S: AccountStore + AttemptStore + LockStore + AuditStore + Clone,
{
    pub fn new(store: S, totp_config: TotpConfig, policy: LockoutPolicy) -> Self {
        Self {
            totp: TotpManager::new(totp_config),
            ledger: AttemptLedger::new(store.clone()),
            engine: LockoutEngine::new(store.clone(), policy),
            store,
        }
    }

    /// The guard callers consult before allowing an attempt.
    pub async fn check_allowed(&self, user_id: &str, kind: AttemptKind) -> Result<LockStatus> {
        self.engine.is_locked(user_id, Some(kind.into())).await
    }

    /// Verify a TOTP token for a user.
    ///
    /// Rejects with [`BreakwaterError::Locked`] while a totp lock is
    /// active and with [`BreakwaterError::NotEnrolled`] when the account
    /// has no secret — both before any token math. A wrong token is
    /// `Ok(false)`: the attempt is recorded and the lockout policy
    /// re-evaluated.
    pub async fn verify_totp(&self, user_id: &str, token: &str, ip: Option<&str>) -> Result<bool> {
        self.ensure_unlocked(user_id, AttemptKind::Totp).await?;

        let state = self.store.two_factor_state(user_id).await?;
        let secret = match (state.enabled, state.secret) {
            (true, Some(secret)) => secret,
            _ => return Err(BreakwaterError::NotEnrolled),
        };

        let valid = self.totp.verify(&secret, token, user_id)?;
        self.record_attempt(user_id, ip, AttemptKind::Totp, valid)
            .await?;
        Ok(valid)
    }

    /// Verify and consume a backup code for a user.
    ///
    /// Consumption is the store's single conditional write: of two
    /// concurrent submissions of the same code exactly one sees `true`,
    /// and the loser's outcome is indistinguishable from a code that was
    /// never valid. After a successful consumption the embedding system
    /// is expected to disable 2FA and prompt re-enrollment — spending a
    /// backup code retires the whole secret.
    pub async fn verify_backup_code(
        &self,
        user_id: &str,
        code: &str,
        ip: Option<&str>,
    ) -> Result<bool> {
        self.ensure_unlocked(user_id, AttemptKind::BackupCode).await?;

        let state = self.store.two_factor_state(user_id).await?;
        if !state.enabled || state.backup_codes.is_none() {
            return Err(BreakwaterError::NotEnrolled);
        }

        let valid = self
            .store
            .consume_backup_code(user_id, &normalize_code(code))
            .await?;
        self.record_attempt(user_id, ip, AttemptKind::BackupCode, valid)
            .await?;

        if valid {
            tracing::info!(
                target: "auth.verify.backup_code_spent",
                user_id = %user_id,
                "Backup code consumed; account should be re-enrolled"
            );
        }

        Ok(valid)
    }

    /// Append an attempt outcome and, on failure, re-evaluate lockout.
    ///
    /// This is the `record` operation of the caller contract: embedding
    /// systems that run verification themselves call this with the
    /// outcome so the failure evidence reaches the policy engine.
    pub async fn record_attempt(
        &self,
        user_id: &str,
        ip: Option<&str>,
        kind: AttemptKind,
        success: bool,
    ) -> Result<AttemptRecord> {
        let record = self.ledger.record(user_id, ip, kind, success).await?;
        if !success {
            self.engine.evaluate_failure(user_id, kind).await?;
        }
        Ok(record)
    }

    pub fn ledger(&self) -> &AttemptLedger<S> {
        &self.ledger
    }

    pub fn engine(&self) -> &LockoutEngine<S> {
        &self.engine
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn ensure_unlocked(&self, user_id: &str, kind: AttemptKind) -> Result<()> {
        let status = self.check_allowed(user_id, kind).await?;
        if status.locked {
            let remaining = status.remaining_minutes.unwrap_or(0);
            tracing::info!(
                target: "auth.verify.blocked",
                user_id = %user_id,
                kind = %kind,
                remaining_minutes = remaining,
                "Verification attempt blocked by active lock"
            );
            return Err(BreakwaterError::locked(remaining));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use std::sync::Arc;
    use std::time::SystemTime;

    fn flow() -> VerificationFlow<Arc<InMemoryStore>> {
        VerificationFlow::new(
            Arc::new(InMemoryStore::new()),
            TotpConfig::new("TestApp"),
            LockoutPolicy::new(),
        )
    }

    async fn enroll(flow: &VerificationFlow<Arc<InMemoryStore>>, user_id: &str) -> String {
        let setup = flow.totp.generate_setup("user@example.com").unwrap();
        flow.store()
            .enable_two_factor(
                user_id,
                &setup.secret,
                &["11111111".to_string(), "22222222".to_string()],
                SystemTime::now(),
            )
            .await
            .unwrap();
        setup.secret
    }

    #[tokio::test]
    async fn test_not_enrolled_rejected_before_verification() {
        let flow = flow();

        let err = flow.verify_totp("user-1", "123456", None).await.unwrap_err();
        assert!(matches!(err, BreakwaterError::NotEnrolled));

        // Nothing recorded for a pre-empted attempt.
        let attempts = flow.ledger().list_for_user("user-1", 10).await.unwrap();
        assert!(attempts.is_empty());
    }

    #[tokio::test]
    async fn test_valid_token_accepted_and_recorded() {
        let flow = flow();
        let secret = enroll(&flow, "user-1").await;

        let token = flow.totp.generate_current(&secret, "user-1").unwrap();
        assert!(flow
            .verify_totp("user-1", &token, Some("1.2.3.4"))
            .await
            .unwrap());

        let attempts = flow.ledger().list_for_user("user-1", 10).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert!(attempts[0].success);
        assert_eq!(attempts[0].kind, AttemptKind::Totp);
    }

    #[tokio::test]
    async fn test_fifth_failure_locks() {
        let flow = flow();
        enroll(&flow, "user-1").await;

        for _ in 0..4 {
            assert!(!flow.verify_totp("user-1", "000000", None).await.unwrap());
        }
        let status = flow.check_allowed("user-1", AttemptKind::Totp).await.unwrap();
        assert!(!status.locked);

        assert!(!flow.verify_totp("user-1", "000000", None).await.unwrap());
        let status = flow.check_allowed("user-1", AttemptKind::Totp).await.unwrap();
        assert!(status.locked);

        // Sixth attempt is pre-empted entirely.
        let err = flow.verify_totp("user-1", "000000", None).await.unwrap_err();
        assert!(matches!(err, BreakwaterError::Locked { .. }));
        let attempts = flow.ledger().list_for_user("user-1", 10).await.unwrap();
        assert_eq!(attempts.len(), 5);
    }

    #[tokio::test]
    async fn test_backup_code_single_use() {
        let flow = flow();
        enroll(&flow, "user-1").await;

        assert!(flow
            .verify_backup_code("user-1", "1111-1111", None)
            .await
            .unwrap());
        assert!(!flow
            .verify_backup_code("user-1", "11111111", None)
            .await
            .unwrap());

        let state = flow.store().two_factor_state("user-1").await.unwrap();
        assert_eq!(state.backup_codes.unwrap(), vec!["22222222".to_string()]);
    }

    #[tokio::test]
    async fn test_backup_failures_lock_separately_from_totp() {
        let flow = flow();
        enroll(&flow, "user-1").await;

        for _ in 0..5 {
            assert!(!flow
                .verify_backup_code("user-1", "00000000", None)
                .await
                .unwrap());
        }

        let backup_status = flow
            .check_allowed("user-1", AttemptKind::BackupCode)
            .await
            .unwrap();
        assert!(backup_status.locked);

        let totp_status = flow.check_allowed("user-1", AttemptKind::Totp).await.unwrap();
        assert!(!totp_status.locked);
    }

    #[tokio::test]
    async fn test_record_attempt_success_does_not_lock() {
        let flow = flow();

        for _ in 0..10 {
            flow.record_attempt("user-1", None, AttemptKind::Totp, true)
                .await
                .unwrap();
        }

        let status = flow.check_allowed("user-1", AttemptKind::Totp).await.unwrap();
        assert!(!status.locked);
    }
}
