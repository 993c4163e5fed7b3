//! Deterministic cache key rendering.
//!
//! Keys have the shape `prefix_logical:name1=value1,name2=value2`. The
//! renderer sorts parameters by name before serializing, so two callers
//! supplying the same parameter set in different orders always produce the
//! identical string. Versioning and epochs are layered on top by
//! [`super::registry::CacheKeyRegistry`]; this module stays a pure function
//! of its inputs.

use thiserror::Error;

/// Reserved parameter carrying the listing epoch inside listing keys.
pub const EPOCH_PARAM: &str = "epoch";

/// Invalid-input failures raised before any store interaction happens.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("cache key prefix must not be empty")]
    EmptyPrefix,
    #[error("cache key logical name must not be empty")]
    EmptyLogicalName,
    #[error("cache key parameter name must not be empty")]
    EmptyParameterName,
    #[error("duplicate cache key parameter `{name}`")]
    DuplicateParameter { name: String },
    #[error("parameter `{name}` is reserved for internal use")]
    ReservedParameter { name: String },
}

/// Render a cache key from a prefix, a logical name, and parameters.
///
/// Pure: identical inputs always yield the identical output string,
/// independent of call order or process.
pub fn render_key(
    prefix: &str,
    logical: &str,
    params: &[(&str, &str)],
) -> Result<String, KeyError> {
    if prefix.is_empty() {
        return Err(KeyError::EmptyPrefix);
    }
    if logical.is_empty() {
        return Err(KeyError::EmptyLogicalName);
    }

    let mut sorted: Vec<(&str, &str)> = params.to_vec();
    sorted.sort_unstable_by(|a, b| a.0.cmp(b.0));

    for pair in sorted.windows(2) {
        if pair[0].0 == pair[1].0 {
            return Err(KeyError::DuplicateParameter {
                name: pair[0].0.to_string(),
            });
        }
    }
    if sorted.iter().any(|(name, _)| name.is_empty()) {
        return Err(KeyError::EmptyParameterName);
    }

    let mut key = String::with_capacity(prefix.len() + logical.len() + 16 * sorted.len());
    key.push_str(prefix);
    key.push('_');
    key.push_str(logical);

    let mut first = true;
    for (name, value) in sorted {
        key.push(if first { ':' } else { ',' });
        first = false;
        key.push_str(name);
        key.push('=');
        key.push_str(value);
    }

    Ok(key)
}

/// Reject caller-supplied parameters that collide with reserved names.
pub(crate) fn reject_reserved(params: &[(&str, &str)]) -> Result<(), KeyError> {
    for (name, _) in params {
        if *name == EPOCH_PARAM {
            return Err(KeyError::ReservedParameter {
                name: (*name).to_string(),
            });
        }
    }
    Ok(())
}
