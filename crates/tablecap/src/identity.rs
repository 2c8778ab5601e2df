//! Row identity and the session's seen-set.
//!
//! A row is identified by its rendered text, not by its node: virtualized
//! lists recycle nodes, so two renders of the same logical row must map to
//! the same key. Two distinct rows with identical text collapse into one;
//! that is a known limitation of text identity.

use std::collections::HashSet;
use std::fmt;

use crate::document::LiveDocument;
use crate::types::{CaptureResult, RowHandle};

/// Dedup key derived from a row's rendered text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowIdentity(String);

impl RowIdentity {
    /// Normalize rendered text: whitespace runs collapse to one space, ends trimmed.
    pub fn from_text(text: &str) -> Self {
        Self(text.split_whitespace().collect::<Vec<_>>().join(" "))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the identity of a live row.
pub async fn identity(document: &dyn LiveDocument, row: &RowHandle) -> CaptureResult<RowIdentity> {
    let text = document.row_text(row).await?;
    Ok(RowIdentity::from_text(&text))
}

/// Identities captured so far in a session. Grows only.
#[derive(Debug, Default)]
pub struct SeenSet {
    seen: HashSet<RowIdentity>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an identity. Returns `false` if it was already present.
    pub fn insert(&mut self, identity: RowIdentity) -> bool {
        self.seen.insert(identity)
    }

    pub fn contains(&self, identity: &RowIdentity) -> bool {
        self.seen.contains(identity)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePage, FakeRow};

    #[test]
    fn test_identity_normalizes_whitespace() {
        assert_eq!(
            RowIdentity::from_text("  DAI\n Aave\t 1.2M "),
            RowIdentity::from_text("DAI Aave 1.2M")
        );
        assert_ne!(
            RowIdentity::from_text("DAI Aave"),
            RowIdentity::from_text("DAI Compound")
        );
    }

    #[tokio::test]
    async fn test_same_text_rows_share_identity() {
        let page = FakePage::single(vec![
            FakeRow::new("USDC Aave 4.1%"),
            FakeRow::new("USDC  Aave\n4.1%"),
            FakeRow::new("USDT Aave 3.9%"),
        ]);
        let rows = page.rows(&FakePage::scope()).await.unwrap();

        let a = identity(&page, &rows[0]).await.unwrap();
        let b = identity(&page, &rows[1]).await.unwrap();
        let c = identity(&page, &rows[2]).await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_seen_set_rejects_repeat() {
        let mut seen = SeenSet::new();
        assert!(seen.insert(RowIdentity::from_text("a")));
        assert!(!seen.insert(RowIdentity::from_text(" a ")));
        assert!(seen.contains(&RowIdentity::from_text("a")));
        assert_eq!(seen.len(), 1);
    }
}
