//! TOTP secret generation and token verification.
//!
//! Secrets are generated with 160 bits of entropy and encoded as base32;
//! provisioning URIs follow the standard `otpauth://totp/...` format
//! (SHA-1, 6 digits, 30-second period) consumable by any authenticator
//! app. Verification tolerates ±1 time step of clock skew.

use crate::error::{BreakwaterError, Result};
use totp_rs::{Algorithm, Secret, TOTP};

/// Configuration for TOTP generation and verification.
#[derive(Clone)]
pub struct TotpConfig {
    /// Issuer shown in authenticator apps (e.g., "MyBlog").
    pub issuer: String,
    /// Number of digits in a code (default: 6).
    pub digits: usize,
    /// Time step in seconds (default: 30).
    pub step: u64,
    /// Accepted clock skew in steps on either side (default: 1).
    pub skew: u8,
    /// Hash algorithm (default: SHA1 for authenticator compatibility).
    pub algorithm: Algorithm,
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self {
            issuer: "App".to_string(),
            digits: 6,
            step: 30,
            skew: 1,
            algorithm: Algorithm::SHA1,
        }
    }
}

impl TotpConfig {
    /// Create a config with the given issuer and standard defaults.
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn digits(mut self, digits: usize) -> Self {
        self.digits = digits;
        self
    }

    #[must_use]
    pub fn step(mut self, step: u64) -> Self {
        self.step = step;
        self
    }

    #[must_use]
    pub fn skew(mut self, skew: u8) -> Self {
        self.skew = skew;
        self
    }
}

/// Output of starting a TOTP setup for a user.
///
/// This is the "pending setup" value: nothing has been persisted yet.
/// Callers hold it until the user confirms with a first valid token, then
/// hand the secret to the enrollment manager.
pub struct TotpSetup {
    /// Base32-encoded secret for the account record.
    pub secret: String,
    /// Provisioning URI (`otpauth://totp/...`) for authenticator apps.
    pub uri: String,
    /// QR code rendering of the URI, base64-encoded PNG.
    pub qr_code_base64: String,
}

/// Generates TOTP setups and verifies submitted tokens.
///
/// Pure with respect to storage: nothing here reads or writes accounts.
#[derive(Clone)]
pub struct TotpManager {
    config: TotpConfig,
}

impl TotpManager {
    pub fn new(config: TotpConfig) -> Self {
        Self { config }
    }

    /// Generate a fresh secret and provisioning data for a user.
    pub fn generate_setup(&self, account_name: &str) -> Result<TotpSetup> {
        let secret = Secret::generate_secret();
        let secret_base32 = secret.to_encoded().to_string();

        let totp = self.build_totp(&secret_base32, account_name)?;
        let uri = totp.get_url();
        let qr_code_base64 = totp
            .get_qr_base64()
            .map_err(|e| BreakwaterError::internal(format!("Failed to render QR code: {}", e)))?;

        Ok(TotpSetup {
            secret: secret_base32,
            uri,
            qr_code_base64,
        })
    }

    /// Verify a submitted token against a stored secret.
    ///
    /// Accepts tokens valid at the current step or one step before/after.
    /// A wrong token is `Ok(false)`, never an error.
    pub fn verify(&self, secret: &str, token: &str, account_name: &str) -> Result<bool> {
        let totp = self.build_totp(secret, account_name)?;
        let token = normalize_token(token);

        match totp.check_current(&token) {
            Ok(valid) => Ok(valid),
            Err(e) => {
                // A system clock problem; treat as a failed check rather
                // than leaking why verification could not run.
                tracing::warn!(
                    target: "auth.totp.clock_error",
                    error = %e,
                    "TOTP verification could not read system time"
                );
                Ok(false)
            }
        }
    }

    /// Verify against an explicit Unix timestamp.
    ///
    /// Used by tests to pin the clock; same skew window as [`verify`](Self::verify).
    pub fn verify_at(
        &self,
        secret: &str,
        token: &str,
        account_name: &str,
        time: u64,
    ) -> Result<bool> {
        let totp = self.build_totp(secret, account_name)?;
        Ok(totp.check(&normalize_token(token), time))
    }

    /// Generate the token for an explicit Unix timestamp.
    ///
    /// For tests and local tooling; production callers never need to
    /// mint tokens.
    pub fn generate_at(&self, secret: &str, account_name: &str, time: u64) -> Result<String> {
        let totp = self.build_totp(secret, account_name)?;
        Ok(totp.generate(time))
    }

    /// Generate the current token.
    pub fn generate_current(&self, secret: &str, account_name: &str) -> Result<String> {
        let totp = self.build_totp(secret, account_name)?;
        totp.generate_current()
            .map_err(|e| BreakwaterError::internal(format!("Failed to generate TOTP: {}", e)))
    }

    fn build_totp(&self, secret: &str, account_name: &str) -> Result<TOTP> {
        TOTP::new(
            self.config.algorithm,
            self.config.digits,
            self.config.skew,
            self.config.step,
            Secret::Encoded(secret.to_string())
                .to_bytes()
                .map_err(|e| BreakwaterError::bad_request(format!("Invalid TOTP secret: {}", e)))?,
            Some(self.config.issuer.clone()),
            account_name.to_string(),
        )
        .map_err(|e| BreakwaterError::internal(format!("Failed to build TOTP: {}", e)))
    }
}

/// Strip the separators users paste in along with their codes.
fn normalize_token(token: &str) -> String {
    token.replace([' ', '-'], "")
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP: u64 = 30;

    fn manager() -> TotpManager {
        TotpManager::new(TotpConfig::new("TestApp"))
    }

    #[test]
    fn test_setup_shape() {
        let setup = manager().generate_setup("user@example.com").unwrap();

        assert!(!setup.secret.is_empty());
        assert!(setup.uri.starts_with("otpauth://totp/"));
        assert!(setup.uri.contains("TestApp"));
        assert!(!setup.qr_code_base64.is_empty());
    }

    #[test]
    fn test_generate_and_verify() {
        let manager = manager();
        let setup = manager.generate_setup("user@example.com").unwrap();

        let code = manager
            .generate_current(&setup.secret, "user@example.com")
            .unwrap();
        assert!(manager
            .verify(&setup.secret, &code, "user@example.com")
            .unwrap());
    }

    #[test]
    fn test_skew_window_accepts_adjacent_steps() {
        let manager = manager();
        let setup = manager.generate_setup("user@example.com").unwrap();
        let now = 1_700_000_100;

        for offset in [-1i64, 0, 1] {
            let t = (now as i64 + offset * STEP as i64) as u64;
            let code = manager
                .generate_at(&setup.secret, "user@example.com", t)
                .unwrap();
            assert!(
                manager
                    .verify_at(&setup.secret, &code, "user@example.com", now)
                    .unwrap(),
                "token for step offset {} should verify",
                offset
            );
        }
    }

    #[test]
    fn test_skew_window_rejects_two_steps_out() {
        let manager = manager();
        let setup = manager.generate_setup("user@example.com").unwrap();
        let now = 1_700_000_100;

        for offset in [-2i64, 2] {
            let t = (now as i64 + offset * STEP as i64) as u64;
            let code = manager
                .generate_at(&setup.secret, "user@example.com", t)
                .unwrap();
            // A token two steps away may still collide by chance with a
            // valid one; regenerate is deterministic, so inequality of
            // windows is what we check.
            let in_window = manager
                .verify_at(&setup.secret, &code, "user@example.com", now)
                .unwrap();
            let at_source = manager
                .verify_at(&setup.secret, &code, "user@example.com", t)
                .unwrap();
            assert!(at_source);
            assert!(!in_window, "token for step offset {} should not verify", offset);
        }
    }

    #[test]
    fn test_token_with_separators() {
        let manager = manager();
        let setup = manager.generate_setup("user@example.com").unwrap();

        let code = manager
            .generate_current(&setup.secret, "user@example.com")
            .unwrap();
        let spaced = format!("{} {}", &code[..3], &code[3..]);
        assert!(manager
            .verify(&setup.secret, &spaced, "user@example.com")
            .unwrap());
    }

    #[test]
    fn test_wrong_token_is_false_not_error() {
        let manager = manager();
        let setup = manager.generate_setup("user@example.com").unwrap();

        assert!(!manager
            .verify(&setup.secret, "000000", "user@example.com")
            .unwrap());
    }

    #[test]
    fn test_garbage_secret_is_bad_request() {
        let manager = manager();
        let err = manager
            .verify("not-base32!!", "123456", "user@example.com")
            .unwrap_err();
        assert!(matches!(err, BreakwaterError::BadRequest(_)));
    }
}
