//! Scalar kinds on both sides of the codec.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A column value as the relational store holds it.
///
/// NULL columns are never represented; an absent key means "not set".
/// Serializes untagged so HTTP bodies can use plain JSON scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredValue {
    Flag(bool),
    Decimal(f64),
    Text(String),
}

impl StoredValue {
    /// `true` for text that is empty after trimming.
    pub fn is_blank(&self) -> bool {
        matches!(self, StoredValue::Text(s) if s.trim().is_empty())
    }

    /// Interpret the value as a flag.
    ///
    /// Accepts native booleans, numeric 0/1 and the usual text spellings
    /// (`y`/`n`, `yes`/`no`, `true`/`false`, `t`/`f`, `1`/`0`).
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            StoredValue::Flag(b) => Some(*b),
            StoredValue::Decimal(x) => Some(*x != 0.0),
            StoredValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "y" | "yes" | "t" | "true" => Some(true),
                "0" | "n" | "no" | "f" | "false" => Some(false),
                _ => None,
            },
        }
    }

    /// Interpret the value as a finite decimal.
    pub fn as_decimal(&self) -> Option<f64> {
        let x = match self {
            StoredValue::Decimal(x) => *x,
            StoredValue::Text(s) => s.trim().parse().ok()?,
            StoredValue::Flag(_) => return None,
        };
        x.is_finite().then_some(x)
    }

    /// Interpret the value as text. Whole decimals render without a
    /// fractional part so numeric codes such as `80` stay readable.
    pub fn as_text(&self) -> Option<String> {
        match self {
            StoredValue::Text(s) => Some(s.trim().to_string()),
            // Only below 2^53 is every whole number exact and within i64.
            StoredValue::Decimal(x) if x.fract() == 0.0 && x.abs() < MAX_EXACT_INTEGER => {
                Some(format!("{}", *x as i64))
            }
            StoredValue::Decimal(x) => Some(x.to_string()),
            StoredValue::Flag(_) => None,
        }
    }
}

/// 2^53, the first integer an `f64` cannot step past by one.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// A sparse column-name → value map, as fetched from or written to a table.
pub type SparseRow = BTreeMap<String, StoredValue>;

/// The parameter kinds the engine's named-parameter interface accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Flag,
    Number,
    /// Unit label paired with a sibling `Number` parameter.
    Unit,
    Text,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParamKind::Flag => "flag",
            ParamKind::Number => "number",
            ParamKind::Unit => "unit",
            ParamKind::Text => "text",
        };
        f.write_str(s)
    }
}

/// A value on the engine side of the codec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum EngineValue {
    Flag(bool),
    Number(f64),
    Unit(String),
    Text(String),
}

impl EngineValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            EngineValue::Flag(_) => ParamKind::Flag,
            EngineValue::Number(_) => ParamKind::Number,
            EngineValue::Unit(_) => ParamKind::Unit,
            EngineValue::Text(_) => ParamKind::Text,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
