use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::lockout::LockoutPolicy;
use crate::totp::TotpConfig;
use crate::utils::get_env_with_prefix;

/// Main configuration for the two-factor subsystem.
///
/// Handed to services at construction; there is no ambient global state.
#[derive(Clone)]
pub struct Config {
    pub totp: TotpConfig,
    pub lockout: LockoutPolicy,
    /// Lifetime of emailed recovery codes.
    pub recovery_code_ttl: Duration,
    pub mail: MailConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MailConfig {
    /// Sender address on every notification this subsystem mails.
    #[serde(default = "default_mail_from")]
    pub from: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_json")]
    pub json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            totp: TotpConfig::default(),
            lockout: LockoutPolicy::default(),
            recovery_code_ttl: Duration::from_secs(60 * 60),
            mail: MailConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from: default_mail_from(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: default_json(),
        }
    }
}

fn default_mail_from() -> String {
    "noreply@localhost".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_json() -> bool {
    false
}

/// Builder for [`Config`] with environment variable support.
#[must_use = "builder does nothing until you call build()"]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.config.totp.issuer = issuer.into();
        self
    }

    pub fn with_totp(mut self, totp: TotpConfig) -> Self {
        self.config.totp = totp;
        self
    }

    pub fn with_lockout(mut self, lockout: LockoutPolicy) -> Self {
        self.config.lockout = lockout;
        self
    }

    pub fn with_max_failures(mut self, max: u32) -> Self {
        self.config.lockout.max_failures = max;
        self
    }

    pub fn with_failure_window(mut self, window: Duration) -> Self {
        self.config.lockout.failure_window = window;
        self
    }

    pub fn with_lock_duration(mut self, duration: Duration) -> Self {
        self.config.lockout.lock_duration = duration;
        self
    }

    pub fn with_recovery_code_ttl(mut self, ttl: Duration) -> Self {
        self.config.recovery_code_ttl = ttl;
        self
    }

    pub fn with_mail_from(mut self, from: impl Into<String>) -> Self {
        self.config.mail.from = from.into();
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn with_json_logging(mut self, enabled: bool) -> Self {
        self.config.logging.json = enabled;
        self
    }

    /// Load configuration from environment variables with BREAKWATER_
    /// prefix (unprefixed fallback).
    pub fn from_env(mut self) -> Self {
        if let Some(issuer) = get_env_with_prefix("TOTP_ISSUER") {
            self.config.totp.issuer = issuer;
        }
        if let Some(digits) = get_env_with_prefix("TOTP_DIGITS") {
            if let Ok(d) = digits.parse() {
                self.config.totp.digits = d;
            }
        }
        if let Some(max) = get_env_with_prefix("LOCKOUT_MAX_FAILURES") {
            if let Ok(m) = max.parse() {
                self.config.lockout.max_failures = m;
            }
        }
        if let Some(secs) = get_env_with_prefix("LOCKOUT_WINDOW_SECS") {
            if let Ok(s) = secs.parse() {
                self.config.lockout.failure_window = Duration::from_secs(s);
            }
        }
        if let Some(secs) = get_env_with_prefix("LOCKOUT_DURATION_SECS") {
            if let Ok(s) = secs.parse() {
                self.config.lockout.lock_duration = Duration::from_secs(s);
            }
        }
        if let Some(secs) = get_env_with_prefix("RECOVERY_CODE_TTL_SECS") {
            if let Ok(s) = secs.parse() {
                self.config.recovery_code_ttl = Duration::from_secs(s);
            }
        }
        if let Some(from) = get_env_with_prefix("MAIL_FROM") {
            self.config.mail.from = from;
        }
        if let Some(level) = get_env_with_prefix("LOG_LEVEL") {
            self.config.logging.level = level;
        }
        if let Some(json) = get_env_with_prefix("LOG_JSON") {
            self.config.logging.json = json.parse().unwrap_or(false);
        }
        self
    }

    /// Build the configuration, validating all settings.
    pub fn build(self) -> crate::error::Result<Config> {
        use crate::error::BreakwaterError;

        if self.config.totp.issuer.is_empty() {
            return Err(BreakwaterError::bad_request("TOTP issuer must not be empty"));
        }
        if !(6..=8).contains(&self.config.totp.digits) {
            return Err(BreakwaterError::bad_request(format!(
                "TOTP digits must be 6-8, got: {}",
                self.config.totp.digits
            )));
        }
        if self.config.totp.step == 0 {
            return Err(BreakwaterError::bad_request(
                "TOTP step must be greater than 0",
            ));
        }
        if self.config.lockout.max_failures == 0 {
            return Err(BreakwaterError::bad_request(
                "Lockout max_failures must be greater than 0",
            ));
        }
        if self.config.lockout.failure_window.is_zero() {
            return Err(BreakwaterError::bad_request(
                "Lockout failure window must be greater than 0",
            ));
        }
        if self.config.lockout.lock_duration.is_zero() {
            return Err(BreakwaterError::bad_request(
                "Lock duration must be greater than 0",
            ));
        }
        if self.config.recovery_code_ttl.is_zero() {
            return Err(BreakwaterError::bad_request(
                "Recovery code TTL must be greater than 0",
            ));
        }
        if self.config.mail.from.is_empty() {
            return Err(BreakwaterError::bad_request(
                "Mail 'from' address must not be empty",
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.config.logging.level.to_lowercase().as_str()) {
            return Err(BreakwaterError::bad_request(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.config.logging.level,
                valid_log_levels.join(", ")
            )));
        }

        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
