//! Room codes.
//!
//! Codes are short upper-case alphanumeric strings handed to users so they
//! can share a room. Generation is not collision-checked here; the registry
//! rejects a duplicate and the caller decides what to do.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Default room code length.
pub const DEFAULT_CODE_LENGTH: usize = 6;

/// Characters a generated code is drawn from.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Maximum accepted length of a user-supplied code.
pub const MAX_CODE_LENGTH: usize = 64;

/// Errors produced when parsing a user-supplied room code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeError {
    /// The code was empty or only whitespace.
    #[error("Room code cannot be empty")]
    Empty,

    /// The code exceeds [`MAX_CODE_LENGTH`].
    #[error("Room code too long")]
    TooLong,

    /// The code contains characters outside `[A-Za-z0-9]`.
    #[error("Room code contains invalid characters")]
    InvalidCharacters,
}

/// A room code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    /// Parse a user-supplied code, trimming whitespace and upper-casing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the code is blank, too long, or not alphanumeric.
    pub fn parse(raw: &str) -> Result<Self, CodeError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CodeError::Empty);
        }
        if trimmed.len() > MAX_CODE_LENGTH {
            return Err(CodeError::TooLong);
        }
        if !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CodeError::InvalidCharacters);
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Get the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for RoomCode {
    type Err = CodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Produces fixed-length random room codes.
#[derive(Debug, Clone)]
pub struct RoomCodeGenerator {
    length: usize,
}

impl RoomCodeGenerator {
    /// Create a generator for codes of `length` characters (at least one).
    #[must_use]
    pub fn new(length: usize) -> Self {
        Self {
            length: length.max(1),
        }
    }

    /// Code length produced by this generator.
    #[must_use]
    pub fn length(&self) -> usize {
        self.length
    }

    /// Generate a new code.
    #[must_use]
    pub fn generate(&self) -> RoomCode {
        let mut rng = rand::thread_rng();
        let code = (0..self.length)
            .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
            .collect();
        RoomCode(code)
    }
}

impl Default for RoomCodeGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_LENGTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_code_shape() {
        let generator = RoomCodeGenerator::default();
        for _ in 0..100 {
            let code = generator.generate();
            assert_eq!(code.as_str().len(), DEFAULT_CODE_LENGTH);
            assert!(code
                .as_str()
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
        }
    }

    #[test]
    fn test_custom_length() {
        let generator = RoomCodeGenerator::new(10);
        assert_eq!(generator.generate().as_str().len(), 10);
        assert_eq!(RoomCodeGenerator::new(0).length(), 1);
    }

    #[test]
    fn test_parse_normalizes() {
        let code = RoomCode::parse("  abc123 ").unwrap();
        assert_eq!(code.as_str(), "ABC123");
        assert_eq!(code, "ABC123".parse().unwrap());
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(RoomCode::parse(""), Err(CodeError::Empty));
        assert_eq!(RoomCode::parse("   "), Err(CodeError::Empty));
        assert_eq!(RoomCode::parse("ab-12"), Err(CodeError::InvalidCharacters));
        assert_eq!(
            RoomCode::parse(&"A".repeat(MAX_CODE_LENGTH + 1)),
            Err(CodeError::TooLong)
        );
    }

    #[test]
    fn test_code_serializes_as_string() {
        let code = RoomCode::parse("XY12ZZ").unwrap();
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"XY12ZZ\"");
    }
}
