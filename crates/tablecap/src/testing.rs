//! In-memory page used by unit tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::document::{ControlTarget, LiveDocument, Locator, PageControl, Read, ScrollAmount, Settle};
use crate::types::{CaptureError, CaptureResult, RowHandle, RowScope};

#[derive(Debug, Clone)]
pub struct FakeRow {
    text: String,
    cells: Vec<(Locator, String)>,
    detached: bool,
}

impl FakeRow {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            cells: Vec::new(),
            detached: false,
        }
    }

    pub fn cell(mut self, locator: Locator, value: &str) -> Self {
        self.cells.push((locator, value.to_string()));
        self
    }

    /// Row whose text read fails, as if removed mid-cycle.
    pub fn detached(mut self) -> Self {
        self.detached = true;
        self
    }
}

#[derive(Debug, Default)]
struct State {
    generation: u64,
    actions: usize,
    scrolls: usize,
    clicks: usize,
    count_polls: usize,
}

/// Staged document: stage `n` is what is rendered after `n` loader actions
/// (clamped to the last stage).
#[derive(Debug)]
pub struct FakePage {
    stages: Vec<Vec<FakeRow>>,
    control: Option<ControlTarget>,
    container_present: bool,
    /// Row counts reported by successive `count_rows` calls, if scripted.
    counts: Vec<usize>,
    state: Mutex<State>,
}

impl FakePage {
    pub fn staged(stages: Vec<Vec<FakeRow>>) -> Self {
        Self {
            stages,
            control: None,
            container_present: true,
            counts: Vec::new(),
            state: Mutex::new(State::default()),
        }
    }

    pub fn single(rows: Vec<FakeRow>) -> Self {
        Self::staged(vec![rows])
    }

    pub fn with_control(mut self, control: ControlTarget) -> Self {
        self.control = Some(control);
        self
    }

    pub fn without_container(mut self) -> Self {
        self.container_present = false;
        self
    }

    pub fn with_counts(mut self, counts: Vec<usize>) -> Self {
        self.counts = counts;
        self
    }

    pub fn scope() -> RowScope {
        RowScope::new("#table", "div.row")
    }

    pub fn scrolls(&self) -> usize {
        self.state.lock().unwrap().scrolls
    }

    pub fn clicks(&self) -> usize {
        self.state.lock().unwrap().clicks
    }

    fn current_stage(&self, state: &State) -> &[FakeRow] {
        let last = self.stages.len().saturating_sub(1);
        self.stages
            .get(state.actions.min(last))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn row(&self, handle: &RowHandle) -> CaptureResult<FakeRow> {
        let state = self.state.lock().unwrap();
        if handle.generation() != state.generation {
            return Err(CaptureError::StaleHandle {
                handle: handle.generation(),
                current: state.generation,
            });
        }
        self.current_stage(&state)
            .get(handle.index())
            .cloned()
            .ok_or_else(|| CaptureError::Document(format!("no row at {}", handle.index())))
    }
}

#[async_trait]
impl LiveDocument for FakePage {
    async fn rows(&self, scope: &RowScope) -> CaptureResult<Vec<RowHandle>> {
        if !self.container_present {
            return Err(CaptureError::ContainerMissing(scope.container.clone()));
        }
        let mut state = self.state.lock().unwrap();
        state.generation += 1;
        let generation = state.generation;
        Ok((0..self.current_stage(&state).len())
            .map(|i| RowHandle::new(generation, i))
            .collect())
    }

    async fn count_rows(&self, _scope: &RowScope) -> CaptureResult<usize> {
        let mut state = self.state.lock().unwrap();
        if self.counts.is_empty() {
            return Ok(self.current_stage(&state).len());
        }
        let i = state.count_polls.min(self.counts.len() - 1);
        state.count_polls += 1;
        Ok(self.counts[i])
    }

    async fn row_text(&self, row: &RowHandle) -> CaptureResult<String> {
        let row = self.row(row)?;
        if row.detached {
            return Err(CaptureError::Document("node is detached".into()));
        }
        Ok(row.text)
    }

    async fn read(&self, row: &RowHandle, locator: &Locator) -> CaptureResult<Option<String>> {
        let row = self.row(row)?;
        if locator.steps.is_empty() && locator.read == Read::Text {
            return Ok(Some(row.text));
        }
        Ok(row
            .cells
            .iter()
            .find(|(l, _)| l == locator)
            .map(|(_, v)| v.clone()))
    }
}

#[async_trait]
impl PageControl for FakePage {
    async fn scroll_by(&self, _amount: ScrollAmount) -> CaptureResult<()> {
        let mut state = self.state.lock().unwrap();
        state.scrolls += 1;
        state.actions += 1;
        Ok(())
    }

    async fn click(&self, target: &ControlTarget) -> CaptureResult<bool> {
        if self.control.as_ref() != Some(target) {
            return Ok(false);
        }
        let mut state = self.state.lock().unwrap();
        state.clicks += 1;
        state.actions += 1;
        Ok(true)
    }
}

/// Records requested waits instead of sleeping.
#[derive(Debug, Default)]
pub struct RecordingSettle {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSettle {
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }
}

#[async_trait]
impl Settle for RecordingSettle {
    async fn wait(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}
