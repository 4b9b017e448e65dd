//! Two-factor enrollment lifecycle.
//!
//! An account moves `disabled -> pending setup -> enabled -> disabled`.
//! "Pending" is just the [`TotpSetup`] value held by the caller; nothing
//! touches the account until the user proves they can produce a token
//! for the new secret, at which point secret, backup codes, and the
//! enabled flag are persisted in a single store write.
//!
//! # Tracing events
//!
//! - `auth.enrollment.enabled` - 2FA turned on
//! - `auth.enrollment.disabled` - 2FA turned off
//! - `auth.enrollment.codes_regenerated` - fresh backup-code batch
//! - `auth.enrollment.mail_failed` - confirmation mail failed (non-fatal)

use crate::audit::{actions, AuditLogEntry};
use crate::backup::{BackupCodeGenerator, BackupCodes};
use crate::email::{Email, Mailer};
use crate::error::{BreakwaterError, Result};
use crate::storage::{AccountStore, AuditStore};
use crate::totp::{TotpConfig, TotpManager, TotpSetup};
use std::time::SystemTime;

/// Orchestrates enabling and disabling two-factor auth for accounts.
pub struct EnrollmentManager<S, M> {
    store: S,
    mailer: M,
    totp: TotpManager,
    backup: BackupCodeGenerator,
    mail_from: String,
}

impl<S, M> EnrollmentManager<S, M>
where
    S: AccountStore + AuditStore,
    M: Mailer,
{
    pub fn new(store: S, mailer: M, totp_config: TotpConfig, mail_from: impl Into<String>) -> Self {
        Self {
            store,
            mailer,
            totp: TotpManager::new(totp_config),
            backup: BackupCodeGenerator::new(),
            mail_from: mail_from.into(),
        }
    }

    /// Start enrollment: generate a secret and provisioning data.
    ///
    /// Nothing is persisted; the caller shows the QR/URI to the user and
    /// comes back with a first token via [`enable`](Self::enable).
    pub fn begin(&self, account_name: &str) -> Result<TotpSetup> {
        self.totp.generate_setup(account_name)
    }

    /// Turn 2FA on after verifying the user's first token against the
    /// pending secret.
    ///
    /// A wrong token rejects with no partial state. On success the
    /// backup codes are returned to the caller exactly once here; a
    /// confirmation email carrying them is best-effort.
    pub async fn enable(&self, user_id: &str, token: &str, secret: &str) -> Result<BackupCodes> {
        if !self.totp.verify(secret, token, user_id)? {
            return Err(BreakwaterError::bad_request("Invalid setup token"));
        }

        let codes = self.backup.generate()?;
        self.store
            .enable_two_factor(user_id, secret, &codes.codes, SystemTime::now())
            .await?;

        self.store
            .append_audit(&AuditLogEntry::new(
                user_id,
                actions::TWO_FACTOR_ENABLED,
                None,
                None,
            ))
            .await?;

        tracing::info!(
            target: "auth.enrollment.enabled",
            user_id = %user_id,
            "Two-factor authentication enabled"
        );

        self.send_codes_mail(
            user_id,
            "Two-factor authentication enabled",
            "Two-factor authentication is now active on your account.",
            &codes,
        )
        .await;

        Ok(codes)
    }

    /// Turn 2FA off, clearing secret, backup codes, and setup timestamp.
    pub async fn disable(&self, user_id: &str) -> Result<()> {
        self.store.disable_two_factor(user_id).await?;

        self.store
            .append_audit(&AuditLogEntry::new(
                user_id,
                actions::TWO_FACTOR_DISABLED,
                None,
                None,
            ))
            .await?;

        tracing::info!(
            target: "auth.enrollment.disabled",
            user_id = %user_id,
            "Two-factor authentication disabled"
        );

        Ok(())
    }

    /// Replace the stored backup codes with a fresh batch.
    ///
    /// Old codes are invalid the moment the store write lands. Requires
    /// an enrolled account.
    pub async fn regenerate_backup_codes(&self, user_id: &str) -> Result<BackupCodes> {
        let state = self.store.two_factor_state(user_id).await?;
        if !state.enabled {
            return Err(BreakwaterError::NotEnrolled);
        }

        let codes = self.backup.generate()?;
        self.store
            .replace_backup_codes(user_id, &codes.codes)
            .await?;

        self.store
            .append_audit(&AuditLogEntry::new(
                user_id,
                actions::BACKUP_CODES_REGENERATED,
                None,
                None,
            ))
            .await?;

        tracing::info!(
            target: "auth.enrollment.codes_regenerated",
            user_id = %user_id,
            "Backup codes regenerated"
        );

        self.send_codes_mail(
            user_id,
            "New backup codes",
            "Your previous backup codes no longer work.",
            &codes,
        )
        .await;

        Ok(codes)
    }

    /// The stored backup codes, for the authenticated "view my codes"
    /// path. `None` when not enrolled.
    pub async fn backup_codes(&self, user_id: &str) -> Result<Option<Vec<String>>> {
        Ok(self.store.two_factor_state(user_id).await?.backup_codes)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Best-effort mail carrying a backup-code batch.
    async fn send_codes_mail(&self, user_id: &str, subject: &str, lead: &str, codes: &BackupCodes) {
        let contact = match self.store.contact(user_id).await {
            Ok(Some(contact)) => contact,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(
                    target: "auth.enrollment.mail_failed",
                    user_id = %user_id,
                    error = %e,
                    "Could not read contact details for confirmation mail"
                );
                return;
            }
        };

        let greeting = contact.name.as_deref().unwrap_or("there");
        let code_list = codes.display_codes().join("\n");
        let message = Email::new(&self.mail_from, &contact.email, subject)
            .text(format!(
                "Hi {},\n\n{}\n\nYour backup codes (each works once):\n{}\n\nStore them somewhere safe.",
                greeting, lead, code_list
            ))
            .html(format!(
                "<p>Hi {},</p><p>{}</p><p>Your backup codes (each works once):</p><pre>{}</pre>\
                 <p>Store them somewhere safe.</p>",
                greeting, lead, code_list
            ));

        if let Err(e) = self.mailer.send(&message).await {
            tracing::warn!(
                target: "auth.enrollment.mail_failed",
                user_id = %user_id,
                error = %e,
                "Confirmation mail could not be delivered"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::MemoryMailer;
    use crate::storage::InMemoryStore;
    use std::sync::Arc;

    fn manager() -> EnrollmentManager<Arc<InMemoryStore>, MemoryMailer> {
        EnrollmentManager::new(
            Arc::new(InMemoryStore::new()),
            MemoryMailer::new(),
            TotpConfig::new("TestApp"),
            "noreply@example.com",
        )
    }

    async fn enable_for(
        manager: &EnrollmentManager<Arc<InMemoryStore>, MemoryMailer>,
        user_id: &str,
    ) -> (String, BackupCodes) {
        let setup = manager.begin("user@example.com").unwrap();
        let token = manager
            .totp
            .generate_current(&setup.secret, user_id)
            .unwrap();
        let codes = manager.enable(user_id, &token, &setup.secret).await.unwrap();
        (setup.secret, codes)
    }

    #[tokio::test]
    async fn test_enable_round_trip() {
        let manager = manager();
        let (secret, codes) = enable_for(&manager, "user-1").await;

        assert_eq!(codes.codes.len(), 10);

        let state = manager.store().two_factor_state("user-1").await.unwrap();
        assert!(state.enabled);
        assert_eq!(state.secret.as_deref(), Some(secret.as_str()));
        assert_eq!(state.backup_codes.as_ref().unwrap().len(), 10);
        assert!(state.setup_at.is_some());

        let logs = manager.store().audit_for_user("user-1", 1, 10).await.unwrap();
        assert_eq!(logs[0].action, actions::TWO_FACTOR_ENABLED);
    }

    #[tokio::test]
    async fn test_enable_rejects_bad_token_with_no_state() {
        let manager = manager();
        let setup = manager.begin("user@example.com").unwrap();

        let result = manager.enable("user-1", "000000", &setup.secret).await;
        assert!(matches!(result, Err(BreakwaterError::BadRequest(_))));

        let state = manager.store().two_factor_state("user-1").await.unwrap();
        assert!(!state.enabled);
        assert!(state.secret.is_none());
        assert!(state.backup_codes.is_none());
    }

    #[tokio::test]
    async fn test_disable_clears_everything() {
        let manager = manager();
        enable_for(&manager, "user-1").await;

        manager.disable("user-1").await.unwrap();

        let state = manager.store().two_factor_state("user-1").await.unwrap();
        assert!(!state.enabled);
        assert!(state.secret.is_none());
        assert!(state.backup_codes.is_none());
        assert!(state.setup_at.is_none());

        let logs = manager.store().audit_for_user("user-1", 1, 10).await.unwrap();
        assert_eq!(logs[0].action, actions::TWO_FACTOR_DISABLED);
    }

    #[tokio::test]
    async fn test_regenerate_invalidates_old_codes() {
        let manager = manager();
        let (_, old_codes) = enable_for(&manager, "user-1").await;

        let new_codes = manager.regenerate_backup_codes("user-1").await.unwrap();
        assert_eq!(new_codes.codes.len(), 10);

        let stored = manager.backup_codes("user-1").await.unwrap().unwrap();
        assert_eq!(stored, new_codes.codes);
        // The old batch is gone in one swap.
        assert!(old_codes.codes.iter().all(|c| !stored.contains(c)));
    }

    #[tokio::test]
    async fn test_regenerate_requires_enrollment() {
        let manager = manager();
        let result = manager.regenerate_backup_codes("user-1").await;
        assert!(matches!(result, Err(BreakwaterError::NotEnrolled)));
    }

    #[tokio::test]
    async fn test_confirmation_mail_contains_codes() {
        let manager = manager();
        manager
            .store()
            .set_contact("user-1", Some("Ada"), "ada@example.com");

        let (_, codes) = enable_for(&manager, "user-1").await;

        let sent = manager.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ada@example.com");
        let body = sent[0].text.as_ref().unwrap();
        assert!(body.contains("Ada"));
        assert!(body.contains(&codes.display_codes()[0]));
    }

    #[tokio::test]
    async fn test_mail_failure_does_not_roll_back_enable() {
        let manager = manager();
        manager
            .store()
            .set_contact("user-1", None, "user@example.com");
        manager.mailer.fail_sends(true);

        enable_for(&manager, "user-1").await;

        let state = manager.store().two_factor_state("user-1").await.unwrap();
        assert!(state.enabled);
    }

    #[tokio::test]
    async fn test_view_codes_not_enrolled() {
        let manager = manager();
        assert!(manager.backup_codes("user-1").await.unwrap().is_none());
    }
}
