//! Console mailer for development.
//!
//! Prints emails to stdout instead of sending them. Body content is
//! redacted by default: recovery codes and backup codes travel through
//! these messages, and stdout is often captured by log collectors.

use crate::email::{Email, Mailer};
use crate::error::Result;
use async_trait::async_trait;

/// A mailer that prints emails to stdout instead of sending them.
///
/// **For development use only.** Enable full output with
/// [`with_full_output`](Self::with_full_output) when you need to read a
/// code out of a local run.
#[derive(Debug, Clone)]
pub struct ConsoleMailer {
    prefix: String,
    show_full_content: bool,
}

impl ConsoleMailer {
    pub fn new() -> Self {
        Self {
            prefix: "[EMAIL]".to_string(),
            show_full_content: false,
        }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            show_full_content: false,
        }
    }

    /// Print full bodies instead of redacting them.
    #[must_use]
    pub fn with_full_output(mut self, enabled: bool) -> Self {
        if enabled {
            tracing::warn!(
                "ConsoleMailer: full output enabled - email content (including one-time codes) \
                 will be visible in logs"
            );
        }
        self.show_full_content = enabled;
        self
    }
}

impl Default for ConsoleMailer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mailer for ConsoleMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        email.validate()?;

        println!("{} To: {}", self.prefix, email.to);
        println!("{} From: {}", self.prefix, email.from);
        println!("{} Subject: {}", self.prefix, email.subject);
        if self.show_full_content {
            if let Some(text) = &email.text {
                println!("{} Text:\n{}", self.prefix, text);
            }
            if let Some(html) = &email.html {
                println!("{} Html:\n{}", self.prefix, html);
            }
        } else {
            println!("{} Body: <redacted>", self.prefix);
        }

        Ok(())
    }
}
