//! Recovery request storage.

use crate::error::Result;
use crate::recovery::RecoveryRequest;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::SystemTime;

#[async_trait]
pub trait RecoveryStore: Send + Sync {
    async fn create_recovery(&self, request: &RecoveryRequest) -> Result<()>;

    /// Find an unused, unexpired request matching `(email, code)` and mark
    /// it used, returning it; `None` when nothing matched.
    ///
    /// Check and mark MUST be one atomic operation (conditional
    /// `UPDATE ... WHERE used = false AND expires_at > now` with an
    /// affected-row check, or equivalent): two concurrent calls with the
    /// same code must not both observe it unused. A separate read
    /// followed by a write is a real bug here, not a style concern.
    async fn consume_recovery(
        &self,
        email: &str,
        code: &str,
        now: SystemTime,
    ) -> Result<Option<RecoveryRequest>>;
}

#[async_trait]
impl<T: RecoveryStore + ?Sized> RecoveryStore for Arc<T> {
    async fn create_recovery(&self, request: &RecoveryRequest) -> Result<()> {
        (**self).create_recovery(request).await
    }

    async fn consume_recovery(
        &self,
        email: &str,
        code: &str,
        now: SystemTime,
    ) -> Result<Option<RecoveryRequest>> {
        (**self).consume_recovery(email, code, now).await
    }
}
