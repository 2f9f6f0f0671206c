//! Name-syntax validation for caller-supplied identifiers.
//!
//! Anything arriving from outside the crate (spec names, subscription names,
//! block names, textual element ids) is checked here before it reaches the
//! store. Malformed input is a client error, never a storage error.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::model::ElementId;

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]{0,254}$").expect("identifier pattern compiles")
});

// Dataset-style block names: `/Primary/Processed/TIER#0b7d...`.
static BLOCK_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_/][A-Za-z0-9_.\-/#]{0,499}$").expect("block name pattern compiles")
});

/// Spec and subscription names: alphanumeric plus `_`, `-` and `.`.
pub fn identifier(value: &str) -> Result<&str> {
    if IDENTIFIER.is_match(value) {
        Ok(value)
    } else {
        Err(Error::InvalidInput(format!("malformed identifier: {value:?}")))
    }
}

/// Block names additionally allow `/` and `#`.
pub fn block_name(value: &str) -> Result<&str> {
    if BLOCK_NAME.is_match(value) {
        Ok(value)
    } else {
        Err(Error::InvalidInput(format!("malformed block name: {value:?}")))
    }
}

/// Parse a textual element id.
pub fn element_id(value: &str) -> Result<ElementId> {
    value
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .map(ElementId)
        .ok_or_else(|| Error::InvalidInput(format!("malformed element id: {value:?}")))
}

/// Priorities are never negative.
pub fn priority(value: i64) -> Result<i64> {
    if value < 0 {
        Err(Error::InvalidInput(format!(
            "priority must be non-negative, got {value}"
        )))
    } else {
        Ok(value)
    }
}
