//! One-time backup codes.
//!
//! A batch of short numeric codes issued alongside TOTP enrollment. Each
//! code is spendable exactly once; consumption is the store's problem
//! (see [`crate::storage::AccountStore::consume_backup_code`]), matching
//! is this module's.

use crate::error::Result;

/// A freshly generated batch of backup codes.
///
/// Returned to the caller exactly once at generation time; afterwards the
/// stored set is the only copy.
#[derive(Clone, Debug)]
pub struct BackupCodes {
    pub codes: Vec<String>,
}

impl BackupCodes {
    /// Format codes for display (split in half for readability).
    pub fn display_codes(&self) -> Vec<String> {
        self.codes
            .iter()
            .map(|c| {
                if c.len() >= 8 {
                    format!("{}-{}", &c[..4], &c[4..])
                } else {
                    c.clone()
                }
            })
            .collect()
    }
}

/// Generates batches of uniform random numeric backup codes.
#[derive(Clone, Debug)]
pub struct BackupCodeGenerator {
    /// Number of codes per batch (default: 10).
    pub count: usize,
    /// Digits per code (default: 8).
    pub length: usize,
}

impl Default for BackupCodeGenerator {
    fn default() -> Self {
        Self {
            count: 10,
            length: 8,
        }
    }
}

impl BackupCodeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    #[must_use]
    pub fn with_length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }

    /// Generate a new batch. Nothing is persisted here.
    pub fn generate(&self) -> Result<BackupCodes> {
        use rand::Rng;

        let mut rng = rand::rngs::OsRng;
        let codes = (0..self.count)
            .map(|_| {
                (0..self.length)
                    .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
                    .collect()
            })
            .collect();

        Ok(BackupCodes { codes })
    }

    /// Match a submitted code against the stored set.
    ///
    /// Returns the index of the matched code so the store can remove it,
    /// or `None`. Comparison is constant-time per candidate.
    pub fn matches(code: &str, valid_codes: &[String]) -> Option<usize> {
        let normalized = normalize_code(code);
        valid_codes
            .iter()
            .position(|c| constant_time_eq(c, &normalized))
    }
}

/// Strip the separators users paste in with their codes.
pub(crate) fn normalize_code(code: &str) -> String {
    code.replace(['-', ' '], "")
}

/// Constant-time string comparison via the `subtle` crate.
pub(crate) fn constant_time_eq(a: &str, b: &str) -> bool {
    use subtle::ConstantTimeEq;
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
