//! Path normalizer (§4.1): turns raw JSON keys into warehouse-safe
//! identifiers and the dotted/underscored paths the rest of the pipeline
//! keys its schema and row fragments by.

use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

use crate::error::{Error, Result};

static INVALID_CHAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^0-9A-Za-z_]").unwrap());
static LEADING_DIGIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]").unwrap());

/// Normalizes a single raw key segment: NFKC-lowercase, replace every
/// non `[0-9A-Za-z_]` character with `_`, and prefix with `_f` if the
/// result starts with a decimal digit.
pub fn normalize_segment(raw: &str) -> Result<String> {
    let folded: String = raw.nfkc().collect::<String>().to_lowercase();
    let replaced = INVALID_CHAR.replace_all(&folded, "_").into_owned();
    if replaced.is_empty() {
        return Err(Error::Configuration(format!(
            "key {raw:?} normalizes to an empty segment"
        )));
    }
    if LEADING_DIGIT.is_match(&replaced) {
        Ok(format!("_f{replaced}"))
    } else {
        Ok(replaced)
    }
}

/// Result of normalizing one key in the context of its parent path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPath {
    /// Fully-qualified schema path, e.g. `"user_address_city"` or
    /// `"items.sku"`.
    pub full_path: String,
    /// Column name to use when writing the row for this field.
    pub column_name: String,
}

/// Computes `(full_path, column_name)` for `raw_key` given its parent
/// context, per §4.1.
///
/// - `parent`: `None` at the document root.
/// - `parent_is_array`: whether `parent` denotes an array element
///   (path segments join with `.`) rather than an object field (join with
///   `_`).
pub fn normalize_path(
    raw_key: &str,
    parent: Option<&str>,
    parent_is_array: bool,
) -> Result<NormalizedPath> {
    let segment = normalize_segment(raw_key)?;
    let (full_path, column_name) = match parent {
        None => (segment.clone(), segment),
        Some(parent) if parent_is_array => (format!("{parent}.{segment}"), raw_key.to_string()),
        Some(parent) => {
            let full = format!("{parent}_{segment}");
            (full.clone(), full)
        }
    };
    Ok(NormalizedPath {
        full_path,
        column_name,
    })
}

/// The column-name suffix after the last `.` in a path that traverses at
/// least one array, as used when naming child-table columns (§4.6).
pub fn suffix_after_last_array_join(path: &str) -> &str {
    path.rsplit('.').next().unwrap_or(path)
}
