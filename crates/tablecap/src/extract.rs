//! Per-column field extraction.
//!
//! An extractor turns a live row into one [`FieldValue`]. It never returns an
//! error: every lookup or coercion failure becomes `FieldValue::Unavailable`
//! so one broken cell cannot take down its row or the capture cycle.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{LiveDocument, Locator};
use crate::types::{FieldValue, RowHandle};

/// Characters dropped before numeric parsing: currency symbols, direction
/// markers, and thousands separators.
const NUMERIC_NOISE: &[char] = &['$', '€', '£', '¥', '▲', '▼', '↑', '↓', ','];

/// How a raw cell string becomes a value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    /// Trimmed text. Blank cells are unavailable.
    #[default]
    Text,
    /// Plain number. Values carrying `%` are rejected.
    Magnitude,
    /// Number with an optional trailing `%`, which is removed.
    Percent,
    /// Last `separator`-delimited segment, e.g. a query value from a link target.
    Token { separator: String },
}

impl FieldKind {
    /// Convert a raw string. `None` means the value is unusable.
    pub fn coerce(&self, raw: &str) -> Option<FieldValue> {
        match self {
            FieldKind::Text => {
                let text = raw.trim();
                if text.is_empty() {
                    None
                } else {
                    Some(FieldValue::Text(text.to_string()))
                }
            }
            FieldKind::Magnitude => parse_magnitude(raw).map(FieldValue::Number),
            FieldKind::Percent => parse_percent(raw).map(FieldValue::Number),
            FieldKind::Token { separator } => {
                let token = last_segment(raw, separator).trim();
                if token.is_empty() {
                    None
                } else {
                    Some(FieldValue::Text(token.to_string()))
                }
            }
        }
    }
}

/// Strip formatting noise from a displayed number.
///
/// Removes whitespace (including newlines and non-breaking spaces), currency
/// symbols, arrows, and thousands separators, and maps the typographic minus
/// to `-`. `%` is kept so callers can decide whether it is acceptable.
pub fn clean_numeric(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && !NUMERIC_NOISE.contains(c))
        .map(|c| if c == '−' { '-' } else { c })
        .collect()
}

/// Parse a plain magnitude such as `"$1,234.50▲"`.
pub fn parse_magnitude(raw: &str) -> Option<f64> {
    let cleaned = clean_numeric(raw);
    if cleaned.contains('%') {
        return None;
    }
    parse_finite(&cleaned)
}

/// Parse a percentage such as `"12.3%"` into `12.3`.
pub fn parse_percent(raw: &str) -> Option<f64> {
    let cleaned = clean_numeric(raw);
    let digits = cleaned.strip_suffix('%').unwrap_or(&cleaned);
    if digits.contains('%') {
        return None;
    }
    parse_finite(digits)
}

fn parse_finite(s: &str) -> Option<f64> {
    // f64::from_str also accepts "inf" and "NaN"
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn last_segment<'a>(raw: &'a str, separator: &str) -> &'a str {
    if separator.is_empty() {
        return raw;
    }
    raw.rsplit(separator).next().unwrap_or(raw)
}

/// Strategy that produces one column's value for a row.
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    async fn extract(&self, document: &dyn LiveDocument, row: &RowHandle) -> FieldValue;
}

/// Data-driven extractor: follow a locator, then coerce by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorExtractor {
    pub locator: Locator,
    #[serde(default)]
    pub kind: FieldKind,
}

impl LocatorExtractor {
    pub fn new(locator: Locator, kind: FieldKind) -> Self {
        Self { locator, kind }
    }
}

#[async_trait]
impl FieldExtractor for LocatorExtractor {
    async fn extract(&self, document: &dyn LiveDocument, row: &RowHandle) -> FieldValue {
        let raw = match document.read(row, &self.locator).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!("row {}: locator matched nothing", row.index());
                return FieldValue::Unavailable;
            }
            Err(e) => {
                tracing::debug!("row {}: read failed: {e}", row.index());
                return FieldValue::Unavailable;
            }
        };

        self.kind.coerce(&raw).unwrap_or_else(|| {
            tracing::debug!("row {}: cannot coerce {raw:?} as {:?}", row.index(), self.kind);
            FieldValue::Unavailable
        })
    }
}

/// A named column and the strategy that fills it.
#[derive(Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub extractor: Arc<dyn FieldExtractor>,
    /// Rows where this column is unavailable are not captured.
    pub required: bool,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, extractor: Arc<dyn FieldExtractor>) -> Self {
        Self {
            name: name.into(),
            extractor,
            required: false,
        }
    }

    /// Mark the column as required: a row is captured only if it has a value here.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Column backed by a [`LocatorExtractor`].
    pub fn located(name: impl Into<String>, locator: Locator, kind: FieldKind) -> Self {
        Self::new(name, Arc::new(LocatorExtractor::new(locator, kind)))
    }
}

impl fmt::Debug for ColumnSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnSpec")
            .field("name", &self.name)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}
