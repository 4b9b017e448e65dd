//! Mail collaborator interface.
//!
//! Delivery itself lives outside this crate; services here only need a
//! `send` seam that is best-effort by contract — no security decision in
//! this subsystem ever waits on, or fails because of, an email.
//!
//! Backends:
//! - [`ConsoleMailer`] - prints to stdout (development)
//! - [`MemoryMailer`] - captures sent mail (tests)

mod console;

pub use console::ConsoleMailer;

use crate::error::{BreakwaterError, Result};
use async_trait::async_trait;
use std::sync::{Arc, RwLock};

/// An email message to be sent.
#[derive(Debug, Clone)]
pub struct Email {
    pub from: String,
    pub to: String,
    pub subject: String,
    /// Plain text body (optional if html is provided).
    pub text: Option<String>,
    /// HTML body (optional if text is provided).
    pub html: Option<String>,
}

impl Email {
    pub fn new(from: impl Into<String>, to: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            subject: subject.into(),
            text: None,
            html: None,
        }
    }

    #[must_use]
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.text = Some(body.into());
        self
    }

    #[must_use]
    pub fn html(mut self, body: impl Into<String>) -> Self {
        self.html = Some(body.into());
        self
    }

    /// Validate the message has the required fields.
    pub fn validate(&self) -> Result<()> {
        if self.from.is_empty() {
            return Err(BreakwaterError::bad_request("Email 'from' is required"));
        }
        if self.to.is_empty() {
            return Err(BreakwaterError::bad_request("Email 'to' is required"));
        }
        if self.subject.is_empty() {
            return Err(BreakwaterError::bad_request("Email 'subject' is required"));
        }
        if self.text.is_none() && self.html.is_none() {
            return Err(BreakwaterError::bad_request(
                "Email must have either 'text' or 'html' body",
            ));
        }
        Ok(())
    }
}

/// Mailer trait for sending emails.
///
/// Implement this against your delivery service. Callers in this crate
/// treat failures as non-fatal: they are logged, never propagated.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<()>;
}

#[async_trait]
impl<T: Mailer + ?Sized> Mailer for Arc<T> {
    async fn send(&self, email: &Email) -> Result<()> {
        (**self).send(email).await
    }
}

/// A mailer that captures messages instead of sending them.
///
/// For tests: assert on [`sent`](Self::sent) afterwards. Can be switched
/// into a failing mode to exercise best-effort call sites.
#[derive(Clone, Default)]
pub struct MemoryMailer {
    sent: Arc<RwLock<Vec<Email>>>,
    fail: Arc<RwLock<bool>>,
}

impl MemoryMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `send` fail.
    pub fn fail_sends(&self, fail: bool) {
        *self.fail.write().unwrap() = fail;
    }

    /// Everything sent so far, in order.
    pub fn sent(&self) -> Vec<Email> {
        self.sent.read().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        email.validate()?;
        if *self.fail.read().unwrap() {
            return Err(BreakwaterError::internal("mail backend unavailable"));
        }
        self.sent.write().unwrap().push(email.clone());
        Ok(())
    }
}
