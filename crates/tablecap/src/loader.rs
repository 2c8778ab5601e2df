//! Progressive loading: the page action that may reveal more rows.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::document::{ControlTarget, LiveDocument, PageControl, ScrollAmount, Settle};
use crate::types::{CaptureError, CaptureResult, RowScope};

/// Settle time after a scroll when nothing else is configured.
pub const DEFAULT_SETTLE_MS: u64 = 2_000;

/// How the loader reveals rows.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LoaderMode {
    /// Scroll one viewport down per cycle.
    #[default]
    Scroll,
    /// Click an expand / "show all" control once.
    Reveal { control: ControlTarget },
    /// No action; the table is fully rendered up front.
    Static,
}

/// How long to wait after an applied loader action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum SettlePolicy {
    /// Fixed pause.
    Fixed { ms: u64 },
    /// Poll the row count every `interval_ms` until two consecutive counts
    /// agree, giving up after `max_polls`.
    UntilStable { interval_ms: u64, max_polls: u32 },
}

impl Default for SettlePolicy {
    fn default() -> Self {
        SettlePolicy::Fixed {
            ms: DEFAULT_SETTLE_MS,
        }
    }
}

/// Page-side capabilities the loader needs for one action.
pub struct LoaderContext<'a> {
    pub document: &'a dyn LiveDocument,
    pub page: &'a dyn PageControl,
    pub settle: &'a dyn Settle,
    pub scope: &'a RowScope,
}

/// Applies a [`LoaderMode`] once per cycle, then waits per its [`SettlePolicy`].
#[derive(Debug, Clone)]
pub struct ProgressiveLoader {
    mode: LoaderMode,
    settle: SettlePolicy,
    revealed: bool,
    invocations: u32,
}

impl ProgressiveLoader {
    pub fn new(mode: LoaderMode, settle: SettlePolicy) -> Self {
        Self {
            mode,
            settle,
            revealed: false,
            invocations: 0,
        }
    }

    pub fn mode(&self) -> &LoaderMode {
        &self.mode
    }

    /// Number of times [`advance`](Self::advance) has been called.
    pub fn invocations(&self) -> u32 {
        self.invocations
    }

    /// Perform the loader action and let the page settle.
    ///
    /// Returns whether an action was applied; it says nothing about whether
    /// new rows appeared. A reveal that already happened is a no-op. A reveal
    /// control that cannot be found on its first use is fatal.
    pub async fn advance(&mut self, ctx: &LoaderContext<'_>) -> CaptureResult<bool> {
        self.invocations += 1;

        let applied = match &self.mode {
            LoaderMode::Scroll => {
                ctx.page.scroll_by(ScrollAmount::Viewport).await?;
                true
            }
            LoaderMode::Reveal { control } => {
                if self.revealed {
                    false
                } else if ctx.page.click(control).await? {
                    tracing::debug!("Clicked reveal control {control}");
                    self.revealed = true;
                    true
                } else {
                    return Err(CaptureError::LoaderControlMissing(control.to_string()));
                }
            }
            LoaderMode::Static => false,
        };

        if applied {
            self.wait(ctx).await?;
        }
        Ok(applied)
    }

    async fn wait(&self, ctx: &LoaderContext<'_>) -> CaptureResult<()> {
        match self.settle {
            SettlePolicy::Fixed { ms } => {
                ctx.settle.wait(Duration::from_millis(ms)).await;
            }
            SettlePolicy::UntilStable {
                interval_ms,
                max_polls,
            } => {
                let interval = Duration::from_millis(interval_ms);
                let mut last = ctx.document.count_rows(ctx.scope).await?;
                for poll in 1..=max_polls {
                    ctx.settle.wait(interval).await;
                    let count = ctx.document.count_rows(ctx.scope).await?;
                    if count == last {
                        tracing::debug!("Row count stable at {count} after {poll} polls");
                        return Ok(());
                    }
                    last = count;
                }
                tracing::debug!("Row count still changing after {max_polls} polls");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePage, FakeRow, RecordingSettle};

    fn ctx<'a>(page: &'a FakePage, settle: &'a RecordingSettle, scope: &'a RowScope) -> LoaderContext<'a> {
        LoaderContext {
            document: page,
            page,
            settle,
            scope,
        }
    }

    #[tokio::test]
    async fn test_scroll_waits_fixed_interval() {
        let page = FakePage::single(vec![FakeRow::new("a")]);
        let settle = RecordingSettle::default();
        let scope = FakePage::scope();
        let mut loader = ProgressiveLoader::new(LoaderMode::Scroll, SettlePolicy::Fixed { ms: 250 });

        assert!(loader.advance(&ctx(&page, &settle, &scope)).await.unwrap());
        assert!(loader.advance(&ctx(&page, &settle, &scope)).await.unwrap());

        assert_eq!(page.scrolls(), 2);
        assert_eq!(settle.waits(), vec![Duration::from_millis(250); 2]);
        assert_eq!(loader.invocations(), 2);
    }

    #[tokio::test]
    async fn test_reveal_clicks_once() {
        let control = ControlTarget::new("button").with_text("Show All");
        let page = FakePage::single(vec![FakeRow::new("a")]).with_control(control.clone());
        let settle = RecordingSettle::default();
        let scope = FakePage::scope();
        let mut loader = ProgressiveLoader::new(LoaderMode::Reveal { control }, SettlePolicy::default());

        assert!(loader.advance(&ctx(&page, &settle, &scope)).await.unwrap());
        assert!(!loader.advance(&ctx(&page, &settle, &scope)).await.unwrap());

        assert_eq!(page.clicks(), 1);
        assert_eq!(settle.waits().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_reveal_control_is_fatal() {
        let page = FakePage::single(vec![FakeRow::new("a")]);
        let settle = RecordingSettle::default();
        let scope = FakePage::scope();
        let mut loader = ProgressiveLoader::new(
            LoaderMode::Reveal {
                control: ControlTarget::new("button.show-all"),
            },
            SettlePolicy::default(),
        );

        let result = loader.advance(&ctx(&page, &settle, &scope)).await;
        assert!(matches!(result, Err(CaptureError::LoaderControlMissing(_))));
        assert!(settle.waits().is_empty());
    }

    #[tokio::test]
    async fn test_static_mode_does_nothing() {
        let page = FakePage::single(vec![FakeRow::new("a")]);
        let settle = RecordingSettle::default();
        let scope = FakePage::scope();
        let mut loader = ProgressiveLoader::new(LoaderMode::Static, SettlePolicy::default());

        assert!(!loader.advance(&ctx(&page, &settle, &scope)).await.unwrap());
        assert_eq!(page.scrolls(), 0);
        assert!(settle.waits().is_empty());
    }

    #[tokio::test]
    async fn test_until_stable_stops_on_repeat_count() {
        let page = FakePage::single(vec![FakeRow::new("a")]).with_counts(vec![10, 20, 30, 30, 40]);
        let settle = RecordingSettle::default();
        let scope = FakePage::scope();
        let mut loader = ProgressiveLoader::new(
            LoaderMode::Scroll,
            SettlePolicy::UntilStable {
                interval_ms: 100,
                max_polls: 10,
            },
        );

        loader.advance(&ctx(&page, &settle, &scope)).await.unwrap();
        // 10 -> 20 -> 30 -> 30
        assert_eq!(settle.waits().len(), 3);
    }

    #[tokio::test]
    async fn test_until_stable_gives_up() {
        let page = FakePage::single(vec![FakeRow::new("a")]).with_counts(vec![1, 2, 3, 4, 5, 6]);
        let settle = RecordingSettle::default();
        let scope = FakePage::scope();
        let mut loader = ProgressiveLoader::new(
            LoaderMode::Scroll,
            SettlePolicy::UntilStable {
                interval_ms: 100,
                max_polls: 2,
            },
        );

        assert!(loader.advance(&ctx(&page, &settle, &scope)).await.unwrap());
        assert_eq!(settle.waits().len(), 2);
    }

    #[test]
    fn test_modes_from_json() {
        let mode: LoaderMode = serde_json::from_str(
            r#"{"mode":"reveal","control":{"selector":"button","text":"Show All"}}"#,
        )
        .unwrap();
        assert_eq!(
            mode,
            LoaderMode::Reveal {
                control: ControlTarget::new("button").with_text("Show All")
            }
        );
        let settle: SettlePolicy =
            serde_json::from_str(r#"{"policy":"until_stable","interval_ms":500,"max_polls":6}"#)
                .unwrap();
        assert!(matches!(settle, SettlePolicy::UntilStable { max_polls: 6, .. }));
    }
}
