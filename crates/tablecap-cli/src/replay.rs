//! Offline capture over saved HTML snapshots.
//!
//! Snapshot `n` stands for the page as rendered after `n` loader actions;
//! the last snapshot stays in place once the sequence is exhausted. A scroll
//! always moves forward; a click moves forward only if the control exists in
//! the current snapshot. Selectors are matched with `scraper`, against
//! descendants of the current element.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

use tablecap::{
    CaptureError, CaptureResult, ControlTarget, LiveDocument, Locator, PageControl, Read,
    RowHandle, RowScope, ScrollAmount, Settle,
};

#[derive(Debug, Default)]
struct ReplayState {
    position: usize,
    generation: u64,
    scope: Option<RowScope>,
}

/// A scripted sequence of HTML documents.
#[derive(Debug)]
pub struct SnapshotReplay {
    snapshots: Vec<String>,
    state: Mutex<ReplayState>,
}

impl SnapshotReplay {
    pub fn new(snapshots: Vec<String>) -> Self {
        Self {
            snapshots,
            state: Mutex::new(ReplayState::default()),
        }
    }

    /// Index of the snapshot currently "rendered".
    pub fn position(&self) -> usize {
        self.lock().position
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ReplayState> {
        // a poisoned lock only means a panicking test; the state is still usable
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn current(&self, state: &ReplayState) -> &str {
        let last = self.snapshots.len().saturating_sub(1);
        self.snapshots
            .get(state.position.min(last))
            .map(String::as_str)
            .unwrap_or("")
    }

    fn step_forward(&self) {
        let mut state = self.lock();
        if state.position + 1 < self.snapshots.len() {
            state.position += 1;
        }
    }

    /// Run `f` on the row behind `handle`, re-parsing the current snapshot.
    fn with_row<R>(&self, handle: &RowHandle, f: impl FnOnce(ElementRef<'_>) -> R) -> CaptureResult<R> {
        let state = self.lock();
        if handle.generation() != state.generation {
            return Err(CaptureError::StaleHandle {
                handle: handle.generation(),
                current: state.generation,
            });
        }
        let scope = state
            .scope
            .clone()
            .ok_or_else(|| CaptureError::Document("rows were never enumerated".into()))?;
        let html = Html::parse_document(self.current(&state));
        let rows = select_rows(&html, &scope)?;
        let row = rows
            .into_iter()
            .nth(handle.index())
            .ok_or_else(|| CaptureError::Document(format!("row {} not found", handle.index())))?;
        Ok(f(row))
    }
}

fn selector(s: &str) -> CaptureResult<Selector> {
    Selector::parse(s).map_err(|e| CaptureError::Document(format!("invalid selector {s:?}: {e:?}")))
}

fn select_rows<'a>(html: &'a Html, scope: &RowScope) -> CaptureResult<Vec<ElementRef<'a>>> {
    let container = html
        .select(&selector(&scope.container)?)
        .next()
        .ok_or_else(|| CaptureError::ContainerMissing(scope.container.clone()))?;
    let rows = selector(&scope.rows)?;
    Ok(container.select(&rows).collect())
}

/// Rendered text approximation: text nodes joined, whitespace collapsed.
fn visible_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn follow(row: ElementRef<'_>, locator: &Locator) -> CaptureResult<Option<String>> {
    let mut el = row;
    for step in &locator.steps {
        let sel = selector(&step.selector)?;
        match el.select(&sel).nth(step.index) {
            Some(next) => el = next,
            None => return Ok(None),
        }
    }
    Ok(match &locator.read {
        Read::Text => Some(visible_text(el)),
        Read::Html => Some(el.inner_html()),
        Read::Attribute(name) => el.value().attr(name).map(str::to_string),
    })
}

#[async_trait]
impl LiveDocument for SnapshotReplay {
    async fn rows(&self, scope: &RowScope) -> CaptureResult<Vec<RowHandle>> {
        let mut state = self.lock();
        let count = {
            let html = Html::parse_document(self.current(&state));
            select_rows(&html, scope)?.len()
        };
        state.generation += 1;
        state.scope = Some(scope.clone());
        let generation = state.generation;
        Ok((0..count).map(|i| RowHandle::new(generation, i)).collect())
    }

    async fn count_rows(&self, scope: &RowScope) -> CaptureResult<usize> {
        let state = self.lock();
        let html = Html::parse_document(self.current(&state));
        Ok(select_rows(&html, scope)?.len())
    }

    async fn row_text(&self, row: &RowHandle) -> CaptureResult<String> {
        self.with_row(row, visible_text)
    }

    async fn read(&self, row: &RowHandle, locator: &Locator) -> CaptureResult<Option<String>> {
        self.with_row(row, |el| follow(el, locator))?
    }
}

#[async_trait]
impl PageControl for SnapshotReplay {
    async fn scroll_by(&self, _amount: ScrollAmount) -> CaptureResult<()> {
        self.step_forward();
        Ok(())
    }

    async fn click(&self, target: &ControlTarget) -> CaptureResult<bool> {
        let found = {
            let state = self.lock();
            let html = Html::parse_document(self.current(&state));
            let sel = selector(&target.selector)?;
            html.select(&sel)
                .any(|el| target.matches_text(&visible_text(el)))
        };
        if found {
            self.step_forward();
        }
        Ok(found)
    }
}

/// Settle that returns immediately; snapshots do not change on their own.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSettle;

#[async_trait]
impl Settle for NoSettle {
    async fn wait(&self, _duration: Duration) {}
}
