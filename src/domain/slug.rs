//! Deterministic, human-friendly slug derivation.
//!
//! The helpers here wrap the `slug` crate so titles like "Café & Co" become
//! `cafe-co` (lowercase, accent-stripped, non-alphanumeric runs collapsed to
//! a single separator). Uniqueness is not decided here: the allocation logic
//! in `application::slugs` treats the database's unique constraint as the
//! authority and retries with numeric suffixes on conflict.

use slug::slugify;
use thiserror::Error;

/// Errors that can occur while deriving a slug from source text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
}

/// Derive a base slug from the provided human-readable text.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let candidate = slugify(input);

    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    Ok(candidate)
}

/// Truncate a base slug so a numeric suffix still fits within `max_length`.
///
/// `suffix_reserve` is the number of characters to keep free for the longest
/// possible suffix (separator plus digits). Trailing separators left behind
/// by the cut are trimmed so `edital-` never ships as a slug.
pub fn truncate_for_suffix(base: &str, max_length: usize, suffix_reserve: usize) -> String {
    let cap = max_length.saturating_sub(suffix_reserve).max(1);
    if base.len() <= cap {
        return base.to_string();
    }

    // Slugs are ASCII after `slugify`, so byte indexing is char-safe here.
    let mut cut = &base[..cap];
    cut = cut.trim_end_matches('-');
    cut.to_string()
}
