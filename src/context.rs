//! Context names and running counters
//!
//! A context is a named, independently persisted log. Its counters track
//! how much raw text went in and how much encoded text came out.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SlcError};

/// Validated context name: non-empty, ASCII letters only, case-sensitive
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct ContextName(String);

impl ContextName {
    /// Validate a client-supplied name
    pub fn parse(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(SlcError::Context("context name is empty".into()));
        }
        if !name.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(SlcError::Context(format!(
                "context name is not an alphabetic word: {:?}",
                name
            )));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContextName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Counters persisted as `<ctx>.meta`
///
/// `succ + errs` is the number of PROCESS operations ever accepted for the
/// context. `b` and `bc` never decrease.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextStats {
    /// Raw bytes processed, one extra per line terminator
    pub b: u64,
    /// Encoded bytes produced, one extra per line terminator
    pub bc: u64,
    /// Successful appends
    pub succ: u64,
    /// Failed appends
    pub errs: u64,
}

impl ContextStats {
    /// Account for one processed line and its record
    pub fn record_line(&mut self, raw_len: usize, encoded_len: usize, appended: bool) {
        self.b += raw_len as u64 + 1;
        self.bc += encoded_len as u64 + 1;
        if appended {
            self.succ += 1;
        } else {
            self.errs += 1;
        }
    }

    /// Total PROCESS operations accepted
    pub fn total(&self) -> u64 {
        self.succ + self.errs
    }

    /// Share of raw bytes saved by encoding, rounded to whole percent
    pub fn saved_percent(&self) -> i64 {
        if self.b == 0 {
            return 0;
        }
        (100.0 * (1.0 - self.bc as f64 / self.b as f64)).round() as i64
    }
}
