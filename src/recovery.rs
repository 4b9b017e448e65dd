//! Email-based account recovery.
//!
//! Issues short-lived, single-use 6-digit codes over the mail
//! collaborator; a verified code clears the user's TOTP and backup-code
//! locks so they can get back in with a fresh attempt budget.
//!
//! # Tracing events
//!
//! - `auth.recovery.requested` - recovery code issued (email dispatched)
//! - `auth.recovery.mail_failed` - delivery failed (request still stands)
//! - `auth.recovery.succeeded` - code verified, locks cleared
//! - `auth.recovery.rejected` - unknown, expired, or already-used code

use crate::audit::{actions, AuditLogEntry};
use crate::email::{Email, Mailer};
use crate::error::Result;
use crate::lockout::LockKind;
use crate::storage::{AuditStore, LockStore, RecoveryStore};
use serde_json::json;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Default recovery-code lifetime (1 hour).
const DEFAULT_CODE_TTL: Duration = Duration::from_secs(60 * 60);

/// One issued recovery code. `used` flips exactly once, atomically with
/// the lookup that validates it.
#[derive(Clone, Debug)]
pub struct RecoveryRequest {
    pub id: Uuid,
    pub user_id: String,
    pub email: String,
    /// 6-digit decimal code as mailed to the user.
    pub code: String,
    pub expires_at: SystemTime,
    pub used: bool,
    pub created_at: SystemTime,
}

impl RecoveryRequest {
    pub fn new(user_id: &str, email: &str, code: &str, ttl: Duration) -> Self {
        let now = SystemTime::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            email: email.to_string(),
            code: code.to_string(),
            expires_at: now + ttl,
            used: false,
            created_at: now,
        }
    }
}

/// Issues and verifies recovery codes.
pub struct RecoveryFlow<S, M> {
    store: S,
    mailer: M,
    mail_from: String,
    code_ttl: Duration,
}

impl<S, M> RecoveryFlow<S, M>
where
    S: RecoveryStore + LockStore + AuditStore,
    M: Mailer,
{
    pub fn new(store: S, mailer: M, mail_from: impl Into<String>) -> Self {
        Self {
            store,
            mailer,
            mail_from: mail_from.into(),
            code_ttl: DEFAULT_CODE_TTL,
        }
    }

    /// Set the recovery-code lifetime.
    #[must_use]
    pub fn with_code_ttl(mut self, ttl: Duration) -> Self {
        self.code_ttl = ttl;
        self
    }

    /// Issue a recovery code for a user and mail it to `email`.
    ///
    /// The mail dispatch is best-effort: a delivery failure is logged and
    /// the request still stands (the code can be re-sent out-of-band).
    pub async fn create_request(&self, user_id: &str, email: &str) -> Result<RecoveryRequest> {
        let code = generate_recovery_code();
        let request = RecoveryRequest::new(user_id, email, &code, self.code_ttl);
        self.store.create_recovery(&request).await?;

        self.store
            .append_audit(&AuditLogEntry::new(
                user_id,
                actions::RECOVERY_REQUESTED,
                Some(json!({ "email": email })),
                None,
            ))
            .await?;

        let ttl_minutes = self.code_ttl.as_secs() / 60;
        let message = Email::new(&self.mail_from, email, "Your account recovery code")
            .text(format!(
                "Your recovery code is {}. It expires in {} minutes and can be used once.",
                code, ttl_minutes
            ))
            .html(format!(
                "<p>Your recovery code is <strong>{}</strong>.</p>\
                 <p>It expires in {} minutes and can be used once.</p>",
                code, ttl_minutes
            ));
        if let Err(e) = self.mailer.send(&message).await {
            tracing::warn!(
                target: "auth.recovery.mail_failed",
                user_id = %user_id,
                email = %email,
                error = %e,
                "Recovery email could not be delivered"
            );
        }

        tracing::info!(
            target: "auth.recovery.requested",
            user_id = %user_id,
            email = %email,
            expires_in_secs = self.code_ttl.as_secs(),
            "Recovery code issued"
        );

        Ok(request)
    }

    /// Verify a submitted recovery code.
    ///
    /// Lookup and mark-used are one atomic store operation, so a code
    /// verifies at most once even under concurrent submissions; the loser
    /// of the race gets `None`, indistinguishable from a code that was
    /// never valid. On success the user's `totp` and `backup_code` locks
    /// are cleared and a `2FA_RECOVERY_SUCCESS` audit entry is written.
    pub async fn verify(&self, email: &str, code: &str) -> Result<Option<RecoveryRequest>> {
        let now = SystemTime::now();
        let Some(request) = self.store.consume_recovery(email, code, now).await? else {
            tracing::info!(
                target: "auth.recovery.rejected",
                email = %email,
                "Recovery code rejected"
            );
            return Ok(None);
        };

        let past = now - Duration::from_secs(1);
        let mut cleared = 0;
        for kind in [LockKind::Totp, LockKind::BackupCode] {
            cleared += self
                .store
                .expire_locks(&request.user_id, Some(kind), past)
                .await?;
        }

        self.store
            .append_audit(&AuditLogEntry::new(
                &request.user_id,
                actions::RECOVERY_SUCCESS,
                Some(json!({ "email": email, "locks_cleared": cleared })),
                None,
            ))
            .await?;

        tracing::info!(
            target: "auth.recovery.succeeded",
            user_id = %request.user_id,
            locks_cleared = cleared,
            "Recovery code verified"
        );

        Ok(Some(request))
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

/// Uniform random 6-digit decimal code.
fn generate_recovery_code() -> String {
    format!("{:06}", fastrand::u32(0..1_000_000))
}
