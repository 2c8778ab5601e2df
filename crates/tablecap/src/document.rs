//! Capabilities the capture loop consumes from its environment.
//!
//! `LiveDocument` reads the rendered page, `PageControl` mutates it, and
//! `Settle` waits for it. A browser adapter usually implements the first two
//! on the same tab object; tests implement them on an in-memory fake.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{CaptureResult, RowHandle, RowScope};

/// One hop from the current element to a descendant: the `index`-th match of
/// `selector` (zero-based, document order).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub selector: String,
    #[serde(default)]
    pub index: usize,
}

impl Step {
    pub fn new(selector: impl Into<String>, index: usize) -> Self {
        Self {
            selector: selector.into(),
            index,
        }
    }
}

/// What to read from the element a locator lands on.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Read {
    /// Rendered text.
    #[default]
    Text,
    /// Inner markup.
    Html,
    /// An attribute value.
    Attribute(String),
}

/// Path from a row to one of its cells.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Locator {
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub read: Read,
}

impl Locator {
    /// Read the row element itself.
    pub fn row(read: Read) -> Self {
        Self {
            steps: Vec::new(),
            read,
        }
    }

    pub fn step(mut self, selector: impl Into<String>, index: usize) -> Self {
        self.steps.push(Step::new(selector, index));
        self
    }

    pub fn reading(mut self, read: Read) -> Self {
        self.read = read;
        self
    }
}

/// Read access to the live document.
#[async_trait]
pub trait LiveDocument: Send + Sync {
    /// Enumerate rows in `scope` in document order.
    ///
    /// Starts a new handle generation; handles from earlier calls become
    /// stale. Fails with `ContainerMissing` when the container is absent.
    async fn rows(&self, scope: &RowScope) -> CaptureResult<Vec<RowHandle>>;

    /// Number of rows currently rendered in `scope`.
    async fn count_rows(&self, scope: &RowScope) -> CaptureResult<usize> {
        Ok(self.rows(scope).await?.len())
    }

    /// Full rendered text of a row.
    async fn row_text(&self, row: &RowHandle) -> CaptureResult<String>;

    /// Follow `locator` from `row`. `Ok(None)` when a step or attribute is missing.
    async fn read(&self, row: &RowHandle, locator: &Locator) -> CaptureResult<Option<String>>;
}

/// How far to scroll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAmount {
    /// One viewport height.
    Viewport,
    Pixels(i64),
}

/// A clickable control, optionally narrowed by its visible text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlTarget {
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ControlTarget {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            text: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Whether an element with this visible text satisfies the target.
    pub fn matches_text(&self, visible: &str) -> bool {
        match &self.text {
            Some(wanted) => visible.trim().contains(wanted.as_str()),
            None => true,
        }
    }
}

impl std::fmt::Display for ControlTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.text {
            Some(text) => write!(f, "{} (text \"{}\")", self.selector, text),
            None => f.write_str(&self.selector),
        }
    }
}

/// Side-effecting page actions.
#[async_trait]
pub trait PageControl: Send + Sync {
    async fn scroll_by(&self, amount: ScrollAmount) -> CaptureResult<()>;

    /// Click the first element matching `target`. `Ok(false)` when none matches.
    async fn click(&self, target: &ControlTarget) -> CaptureResult<bool>;
}

/// Delay primitive used after loader actions.
#[async_trait]
pub trait Settle: Send + Sync {
    async fn wait(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSettle;

#[async_trait]
impl Settle for TokioSettle {
    async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
