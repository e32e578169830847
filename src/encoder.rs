//! Searchable line encoder
//!
//! `encode(line) = pack(numbers(ipv4(timestamps(line))))`. The pass order is
//! fixed: timestamps and addresses must be recognized before their digits are
//! swallowed by the generic numeric fold.
//!
//! There is no decoder. Records can be searched with [`Record::contains`] but
//! not turned back into the original text.

use serde::{Deserialize, Serialize};

use crate::fold::{fold_ipv4, fold_numbers, fold_timestamps, symbols};
use crate::pack::pack_runs;

/// Encoded form of one log line
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record(String);

impl Record {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in code points; a packed byte counts as one
    pub fn len(&self) -> usize {
        self.0.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check whether an encoded fragment occurs in this record
    pub fn contains(&self, needle: &Record) -> bool {
        self.0.contains(needle.as_str())
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Encode a log line (or a search term) into its searchable record
pub fn encode(line: &str) -> Record {
    let folded = fold_numbers(&fold_ipv4(&fold_timestamps(&symbols(line))));
    Record(pack_runs(&folded))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_on_plain_text() {
        for line in ["", "GET / ok", "A-B-C x.y", "ERROR: [DISK] FULL", "Hi Jo, ok?"] {
            assert_eq!(encode(line).as_str(), line);
        }
    }

    #[test]
    fn test_numeric_fold_keeps_surroundings() {
        let record = encode("PORT 8080 OPEN");
        assert_eq!(record.as_str(), "PORT \u{1F90} OPEN");

        let record = encode("port 8080 open");
        let chars: Vec<char> = record.as_str().chars().collect();
        let pos = chars.iter().position(|&c| c == '\u{1F90}').unwrap();
        assert_eq!(chars[pos - 1], ' ');
        assert_eq!(chars[pos + 1], ' ');
    }

    #[test]
    fn test_timestamp_fold() {
        let record = encode("12:34:56");
        let values: Vec<u32> = record.as_str().chars().map(u32::from).collect();
        assert_eq!(values, vec![12, 34, 56]);
    }

    #[test]
    fn test_ipv4_fold() {
        assert_eq!(encode("x1.2.3.4y").as_str(), "x1234y");
    }

    #[test]
    fn test_packing_boundary() {
        assert_eq!(encode("ab").as_str(), "ab");
        assert_eq!(encode("abc").len(), 2);
        assert_eq!(encode("abcd").len(), 3);
    }

    #[test]
    fn test_deterministic() {
        let line = "Jan 12 10:00:01 host sshd[42]: Accepted publickey for root from 1.2.3.4";
        assert_eq!(encode(line), encode(line));
    }

    #[test]
    fn test_syslog_line() {
        let record = encode("Jan 12 10:00:01 host sshd[42]: Accepted");
        let values: Vec<u32> = record.as_str().chars().map(u32::from).collect();
        assert_eq!(
            values,
            vec![
                0x4a, 0x61, 0x6e, 0x20, 0x0c, 0x20, 0x0a, 0x00, 0x01, 0x20, 0x3b, 0xa5, 0x30,
                0x20, 0x94, 0x8e, 0x30, 0x5b, 0x2a, 0x5d, 0x3a, 0x20, 0x41, 0x10, 0x88, 0xf9,
                0x90, 0x60,
            ]
        );
        assert!(record.len() < "Jan 12 10:00:01 host sshd[42]: Accepted".len());
    }

    #[test]
    fn test_search_alignment() {
        let record = encode("an error occurred");
        // Whole runs line up with the stored packing
        assert!(record.contains(&encode("error")));
        assert!(record.contains(&encode("an error")));
        assert!(record.contains(&encode("occurred")));
        // A run starting mid-word sits at a different bit offset
        assert!(!record.contains(&encode("rror")));
        assert!(!record.contains(&encode("ccurred")));
    }
}
