//! Account two-factor fields.

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::SystemTime;

/// Contact details used to address notification emails.
#[derive(Clone, Debug)]
pub struct Contact {
    pub name: Option<String>,
    pub email: String,
}

/// Snapshot of one account's two-factor fields.
///
/// Invariant: `secret` and `backup_codes` are both present when `enabled`
/// is true, and both absent when it is false. [`AccountStore`]
/// implementations keep this by mutating all fields in the single
/// `enable`/`disable` calls below.
#[derive(Clone, Debug, Default)]
pub struct TwoFactorState {
    pub enabled: bool,
    pub secret: Option<String>,
    pub backup_codes: Option<Vec<String>>,
    pub setup_at: Option<SystemTime>,
}

/// Read/write access to an account's two-factor fields.
///
/// # Example
///
/// ```rust,ignore
/// use breakwater::storage::AccountStore;
/// use async_trait::async_trait;
///
/// struct MyAccountStore {
///     db: DatabasePool,
/// }
///
/// #[async_trait]
/// impl AccountStore for MyAccountStore {
///     async fn two_factor_state(&self, user_id: &str) -> Result<TwoFactorState> {
///         // SELECT two_factor_enabled, two_factor_secret, ... WHERE id = $1
///     }
///
///     // ... implement other methods
/// }
/// ```
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Current two-factor fields for a user. A user with no row yet
    /// reads as the default (disabled) state.
    async fn two_factor_state(&self, user_id: &str) -> Result<TwoFactorState>;

    /// Persist `{enabled, secret, backup_codes, setup_at}` in one write.
    async fn enable_two_factor(
        &self,
        user_id: &str,
        secret: &str,
        backup_codes: &[String],
        setup_at: SystemTime,
    ) -> Result<()>;

    /// Clear all four two-factor fields in one write.
    async fn disable_two_factor(&self, user_id: &str) -> Result<()>;

    /// Overwrite the stored backup-code set. Old codes are invalid the
    /// moment this returns.
    async fn replace_backup_codes(&self, user_id: &str, backup_codes: &[String]) -> Result<()>;

    /// Remove `code` from the stored set if present, persisting the
    /// reduced set; return whether it was present.
    ///
    /// This MUST be a single conditional write (`UPDATE ... WHERE` the
    /// set still contains the code, or an equivalent serializable
    /// transaction): two concurrent calls presenting the same code must
    /// not both return true. The code arrives already normalized
    /// (digits only, separators stripped).
    async fn consume_backup_code(&self, user_id: &str, code: &str) -> Result<bool>;

    /// `{name, email}` for notification content, if known.
    async fn contact(&self, user_id: &str) -> Result<Option<Contact>>;
}

#[async_trait]
impl<T: AccountStore + ?Sized> AccountStore for Arc<T> {
    async fn two_factor_state(&self, user_id: &str) -> Result<TwoFactorState> {
        (**self).two_factor_state(user_id).await
    }

    async fn enable_two_factor(
        &self,
        user_id: &str,
        secret: &str,
        backup_codes: &[String],
        setup_at: SystemTime,
    ) -> Result<()> {
        (**self)
            .enable_two_factor(user_id, secret, backup_codes, setup_at)
            .await
    }

    async fn disable_two_factor(&self, user_id: &str) -> Result<()> {
        (**self).disable_two_factor(user_id).await
    }

    async fn replace_backup_codes(&self, user_id: &str, backup_codes: &[String]) -> Result<()> {
        (**self).replace_backup_codes(user_id, backup_codes).await
    }

    async fn consume_backup_code(&self, user_id: &str, code: &str) -> Result<bool> {
        (**self).consume_backup_code(user_id, code).await
    }

    async fn contact(&self, user_id: &str) -> Result<Option<Contact>> {
        (**self).contact(user_id).await
    }
}
