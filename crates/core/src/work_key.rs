//! Composite job identifiers.
//!
//! A sizing job is addressed by `(request_id, sheet_id)` and travels
//! through the queue as the single token `"<request_id>_<sheet_id>"`.
//! [`WorkKey::parse`] is the only way to turn a token back into a key,
//! so a malformed token never reaches the admission gate.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::CoreError;
use crate::types::SheetId;

/// Separator between the request id and the sheet id.
pub const KEY_SEPARATOR: char = '_';

/// A validated `(request_id, sheet_id)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct WorkKey {
    request_id: String,
    sheet_id: SheetId,
}

impl WorkKey {
    /// Build a key from parts.
    ///
    /// The request id must be non-empty and must not contain the separator,
    /// otherwise the encoded token could not be parsed back.
    pub fn new(request_id: impl Into<String>, sheet_id: SheetId) -> Result<Self, CoreError> {
        let request_id = request_id.into().trim().to_string();
        if request_id.is_empty() {
            return Err(CoreError::Validation(
                "Request id must not be empty".to_string(),
            ));
        }
        if request_id.contains(KEY_SEPARATOR) {
            return Err(CoreError::Validation(format!(
                "Request id '{request_id}' must not contain '{KEY_SEPARATOR}'"
            )));
        }
        Ok(Self {
            request_id,
            sheet_id,
        })
    }

    /// Parse a `"<request_id>_<sheet_id>"` token.
    ///
    /// Rules:
    /// - Exactly two `_`-separated parts.
    /// - The request id is non-empty after trimming.
    /// - The sheet id parses as a signed 32-bit integer.
    pub fn parse(token: &str) -> Result<Self, CoreError> {
        let parts: Vec<&str> = token.trim().split(KEY_SEPARATOR).collect();
        let [request_id, sheet] = parts.as_slice() else {
            return Err(CoreError::Validation(format!(
                "Work key '{token}' must have exactly 2 parts, got {}",
                parts.len()
            )));
        };

        let sheet_id: SheetId = sheet.trim().parse().map_err(|_| {
            CoreError::Validation(format!(
                "Work key '{token}' has a non-numeric sheet id '{sheet}'"
            ))
        })?;

        Self::new(*request_id, sheet_id)
    }

    /// The job's primary identifier. Results are grouped under it.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn sheet_id(&self) -> SheetId {
        self.sheet_id
    }

    /// The queue token for this key.
    pub fn token(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for WorkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{KEY_SEPARATOR}{}", self.request_id, self.sheet_id)
    }
}

impl FromStr for WorkKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
