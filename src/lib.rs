//! Breakwater - two-factor authentication and account lockout
//!
//! Breakwater is the 2FA core of a login system: TOTP enrollment and
//! verification, one-time backup codes, sliding-window brute-force
//! lockout, email recovery, and an append-only security audit trail.
//! Persistence and mail delivery stay behind traits so it drops into any
//! storage layer.
//!
//! # Features
//!
//! - **TOTP**: standard otpauth provisioning (QR included), ±1 step skew
//! - **Backup codes**: single-use batches with atomic consumption
//! - **Lockout**: N failures in a trailing window opens a timed lock
//! - **Recovery**: emailed single-use codes that clear 2FA locks
//! - **Audit**: every state change logged, nothing ever deleted
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use breakwater::{
//!     ConfigBuilder, EnrollmentManager, MemoryMailer, VerificationFlow,
//!     storage::InMemoryStore,
//! };
//!
//! #[tokio::main]
//! async fn main() -> breakwater::Result<()> {
//!     breakwater::init_tracing();
//!
//!     let config = ConfigBuilder::new().from_env().build()?;
//!     let store = Arc::new(InMemoryStore::new());
//!     let mailer = MemoryMailer::new();
//!
//!     let enrollment = EnrollmentManager::new(
//!         store.clone(),
//!         mailer.clone(),
//!         config.totp.clone(),
//!         config.mail.from.clone(),
//!     );
//!     let verification =
//!         VerificationFlow::new(store.clone(), config.totp.clone(), config.lockout.clone());
//!
//!     // Enroll: show setup.uri / setup.qr_code_base64 to the user...
//!     let setup = enrollment.begin("user@example.com")?;
//!     // ...then confirm with their first token:
//!     // let codes = enrollment.enable("user-1", &first_token, &setup.secret).await?;
//!
//!     // Verify at login:
//!     let ok = verification.verify_totp("user-1", "123456", None).await?;
//!     let _ = (setup, ok);
//!     Ok(())
//! }
//! ```

pub mod attempts;
pub mod audit;
pub mod backup;
mod config;
pub mod email;
pub mod enrollment;
mod error;
pub mod flows;
pub mod lockout;
pub mod recovery;
pub mod storage;
pub mod totp;
pub mod utils;

// Re-exports for public API
pub use attempts::{AttemptKind, AttemptLedger, AttemptRecord};
pub use audit::{actions, AuditLogEntry, AuditLogger};
pub use backup::{BackupCodeGenerator, BackupCodes};
pub use config::{Config, ConfigBuilder, LoggingConfig, MailConfig};
pub use email::{ConsoleMailer, Email, Mailer, MemoryMailer};
pub use enrollment::EnrollmentManager;
pub use error::{BreakwaterError, Result};
pub use flows::VerificationFlow;
pub use lockout::{LockKind, LockRecord, LockStatus, LockoutEngine, LockoutPolicy};
pub use recovery::{RecoveryFlow, RecoveryRequest};
pub use storage::{
    AccountStore, AttemptStore, AuditStore, Contact, InMemoryStore, LockStore, RecoveryStore,
    TwoFactorState,
};
pub use totp::{TotpConfig, TotpManager, TotpSetup};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging with sensible defaults
///
/// Call early, typically in main() before constructing services.
///
/// # Environment Variables
///
/// - `RUST_LOG`: log level filter (e.g., "info", "breakwater=debug")
/// - `BREAKWATER_LOG_JSON`: set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("BREAKWATER_LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Initialize tracing from a [`Config`]'s logging section.
pub fn init_tracing_with_config(config: &Config) {
    let env_filter = EnvFilter::new(&config.logging.level);

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
