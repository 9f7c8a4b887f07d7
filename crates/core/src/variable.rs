//! Tagged-union variable values.
//!
//! Replaces the source's heterogeneous JSON values for `session.variables`,
//! `CustomerProfile` fields, and enforcement variable environments with an
//! explicit, exhaustively-matchable type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A single typed value held by a session variable or profile field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum VarValue {
    String(String),
    Number(f64),
    Bool(bool),
    DateTime(DateTime<Utc>),
    Blob(Vec<u8>),
}

impl VarValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            VarValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            VarValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            VarValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            VarValue::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            VarValue::Blob(b) => Some(b.as_slice()),
            _ => None,
        }
    }

    /// Truthiness used by the expression evaluator and template rendering:
    /// strings/blobs are truthy when non-empty, numbers when non-zero.
    pub fn is_truthy(&self) -> bool {
        match self {
            VarValue::String(s) => !s.is_empty(),
            VarValue::Number(n) => *n != 0.0,
            VarValue::Bool(b) => *b,
            VarValue::DateTime(_) => true,
            VarValue::Blob(b) => !b.is_empty(),
        }
    }
}

impl fmt::Display for VarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarValue::String(s) => write!(f, "{s}"),
            VarValue::Number(n) => write!(f, "{n}"),
            VarValue::Bool(b) => write!(f, "{b}"),
            VarValue::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            VarValue::Blob(b) => write!(f, "<blob:{} bytes>", b.len()),
        }
    }
}

impl From<String> for VarValue {
    fn from(value: String) -> Self {
        VarValue::String(value)
    }
}

impl From<&str> for VarValue {
    fn from(value: &str) -> Self {
        VarValue::String(value.to_string())
    }
}

impl From<f64> for VarValue {
    fn from(value: f64) -> Self {
        VarValue::Number(value)
    }
}

impl From<bool> for VarValue {
    fn from(value: bool) -> Self {
        VarValue::Bool(value)
    }
}

/// A named map of [`VarValue`]s, used for `session.variables` and for the
/// merged variable environment consulted by the expression evaluator.
pub type VarMap = HashMap<String, VarValue>;

/// Merge environments in priority order: later maps override earlier ones.
/// Used by the enforcer (profile → session → response-extracted) and the
/// scenario navigator (profile → session → context entities).
pub fn merge_environments<'a>(maps: impl IntoIterator<Item = &'a VarMap>) -> VarMap {
    let mut merged = VarMap::new();
    for map in maps {
        for (k, v) in map {
            merged.insert(k.clone(), v.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_map_overrides_earlier() {
        let mut a = VarMap::new();
        a.insert("tier".into(), VarValue::from("standard"));
        let mut b = VarMap::new();
        b.insert("tier".into(), VarValue::from("vip"));

        let merged = merge_environments([&a, &b]);
        assert_eq!(merged.get("tier").unwrap().as_str(), Some("vip"));
    }

    #[test]
    fn truthiness_rules() {
        assert!(!VarValue::from("").is_truthy());
        assert!(VarValue::from("x").is_truthy());
        assert!(!VarValue::from(0.0).is_truthy());
        assert!(VarValue::from(1.0).is_truthy());
    }
}
