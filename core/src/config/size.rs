//! Human-readable byte sizes: `"10k"` is ten thousand bytes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::error::SizeParseError;

const SUFFIXES: [(char, usize); 3] = [('G', 1_000_000_000), ('M', 1_000_000), ('k', 1_000)];

/// Parse a decimal byte count with an optional `k`, `M` or `G` suffix (case-insensitive).
pub fn parse_size(input: &str) -> Result<usize, SizeParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(SizeParseError::Empty);
    }

    let invalid = || SizeParseError::Invalid { input: input.to_string() };

    let (digits, multiplier) = match trimmed.char_indices().last() {
        Some((at, last)) if last.is_ascii_alphabetic() => {
            let multiplier = SUFFIXES
                .iter()
                .find(|(suffix, _)| suffix.eq_ignore_ascii_case(&last))
                .map(|(_, multiplier)| *multiplier)
                .ok_or_else(invalid)?;
            (&trimmed[..at], multiplier)
        }
        _ => (trimmed, 1),
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let overflow = || SizeParseError::Overflow { input: input.to_string() };
    let value: usize = digits.parse().map_err(|_| overflow())?;
    value.checked_mul(multiplier).ok_or_else(overflow)
}

/// Format a byte count with the largest suffix that represents it exactly.
pub fn format_size(bytes: usize) -> String {
    SUFFIXES
        .iter()
        .find(|(_, multiplier)| bytes >= *multiplier && bytes % multiplier == 0)
        .map(|(suffix, multiplier)| format!("{}{suffix}", bytes / multiplier))
        .unwrap_or_else(|| bytes.to_string())
}

/// Byte count that reads and writes as a human-readable string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ByteSize(pub usize);

impl ByteSize {
    pub fn bytes(self) -> usize {
        self.0
    }
}

impl FromStr for ByteSize {
    type Err = SizeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_size(s).map(ByteSize)
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_size(self.0))
    }
}

impl Serialize for ByteSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_size(self.0))
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bytes(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Bytes(bytes) => usize::try_from(bytes)
                .map(ByteSize)
                .map_err(|_| de::Error::custom(format!("size {bytes} is too large"))),
            Raw::Text(text) => text.parse().map_err(de::Error::custom),
        }
    }
}
