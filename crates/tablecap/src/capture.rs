//! The capture loop: snapshot, load more, repeat until a snapshot yields
//! nothing new or the cycle bound is hit.

use serde::Serialize;

use crate::document::{LiveDocument, PageControl, Settle};
use crate::extract::ColumnSpec;
use crate::identity::SeenSet;
use crate::loader::{LoaderContext, LoaderMode, ProgressiveLoader, SettlePolicy};
use crate::snapshot::{capture_new_rows, ColumnSet};
use crate::types::{CaptureError, CaptureResult, RecordBatch, RowScope};

/// Capabilities supplied by the caller for one session.
#[derive(Clone, Copy)]
pub struct CaptureEnv<'a> {
    pub document: &'a dyn LiveDocument,
    pub page: &'a dyn PageControl,
    pub settle: &'a dyn Settle,
}

/// What to capture and how.
#[derive(Debug, Clone)]
pub struct CapturePlan {
    pub scope: RowScope,
    pub columns: Vec<ColumnSpec>,
    pub loader: LoaderMode,
    pub settle: SettlePolicy,
    pub max_cycles: u32,
}

impl CapturePlan {
    pub fn new(scope: RowScope, columns: Vec<ColumnSpec>, loader: LoaderMode, max_cycles: u32) -> Self {
        Self {
            scope,
            columns,
            loader,
            settle: SettlePolicy::default(),
            max_cycles,
        }
    }

    pub fn with_settle(mut self, settle: SettlePolicy) -> Self {
        self.settle = settle;
        self
    }
}

/// Loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    Running,
    /// A cycle produced no new rows.
    Converged,
    /// The cycle bound was exhausted first; data may be partial.
    LimitReached,
}

impl CaptureState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, CaptureState::Running)
    }
}

/// Per-cycle bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub cycle: u32,
    /// Whether the loader acted after this cycle's snapshot.
    pub loader_applied: bool,
    pub new_records: usize,
    pub total_records: usize,
}

/// Result of a finished session.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureOutcome {
    pub termination: CaptureState,
    pub cycles: Vec<CycleReport>,
    pub records: RecordBatch,
}

impl CaptureOutcome {
    pub fn is_converged(&self) -> bool {
        self.termination == CaptureState::Converged
    }

    pub fn cycle_count(&self) -> u32 {
        self.cycles.len() as u32
    }
}

/// Mutable state owned by one capture session.
#[derive(Debug)]
pub struct CaptureSession {
    columns: ColumnSet,
    loader: ProgressiveLoader,
    scope: RowScope,
    max_cycles: u32,
    seen: SeenSet,
    records: RecordBatch,
    cycles: Vec<CycleReport>,
    state: CaptureState,
}

impl CaptureSession {
    /// Validate the plan and start in `Running` with empty state.
    pub fn new(plan: CapturePlan) -> CaptureResult<Self> {
        if plan.max_cycles == 0 {
            return Err(CaptureError::InvalidPlan("max_cycles must be at least 1".into()));
        }
        Ok(Self {
            columns: ColumnSet::new(plan.columns)?,
            loader: ProgressiveLoader::new(plan.loader, plan.settle),
            scope: plan.scope,
            max_cycles: plan.max_cycles,
            seen: SeenSet::new(),
            records: RecordBatch::new(),
            cycles: Vec::new(),
            state: CaptureState::Running,
        })
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    pub fn records(&self) -> &RecordBatch {
        &self.records
    }

    pub fn cycles(&self) -> &[CycleReport] {
        &self.cycles
    }

    /// Run one cycle and return the resulting state. No-op once terminal.
    ///
    /// A cycle snapshots what is rendered, then, unless the cycle ended the
    /// session, applies the loader once. A session of `max_cycles` cycles
    /// therefore invokes the loader at most `max_cycles - 1` times, and the
    /// initial render is always captured.
    pub async fn step(&mut self, env: CaptureEnv<'_>) -> CaptureResult<CaptureState> {
        if self.state.is_terminal() {
            return Ok(self.state);
        }

        let cycle = self.cycles.len() as u32 + 1;
        let batch = capture_new_rows(env.document, &self.scope, &self.columns, &mut self.seen).await?;
        let new_records = batch.len();
        self.records.extend(batch);

        let state = if new_records == 0 {
            CaptureState::Converged
        } else if cycle >= self.max_cycles {
            CaptureState::LimitReached
        } else {
            CaptureState::Running
        };

        let loader_applied = if state == CaptureState::Running {
            let ctx = LoaderContext {
                document: env.document,
                page: env.page,
                settle: env.settle,
                scope: &self.scope,
            };
            self.loader.advance(&ctx).await?
        } else {
            false
        };

        self.cycles.push(CycleReport {
            cycle,
            loader_applied,
            new_records,
            total_records: self.records.len(),
        });
        tracing::info!(
            "Cycle {cycle}/{}: {new_records} new rows ({} total)",
            self.max_cycles,
            self.records.len()
        );

        self.state = state;
        Ok(self.state)
    }

    /// Drive cycles until a terminal state.
    pub async fn run(mut self, env: CaptureEnv<'_>) -> CaptureResult<CaptureOutcome> {
        while !self.step(env).await?.is_terminal() {}
        Ok(self.finish())
    }

    /// Hand the accumulated records to the caller.
    pub fn finish(self) -> CaptureOutcome {
        CaptureOutcome {
            termination: self.state,
            cycles: self.cycles,
            records: self.records,
        }
    }
}

/// Run a whole capture session.
pub async fn run_capture(env: CaptureEnv<'_>, plan: CapturePlan) -> CaptureResult<CaptureOutcome> {
    let max_cycles = plan.max_cycles;
    tracing::info!(
        "Capture started: {} columns, loader {:?}, max {max_cycles} cycles",
        plan.columns.len(),
        plan.loader
    );

    let outcome = CaptureSession::new(plan)?.run(env).await?;

    match outcome.termination {
        CaptureState::LimitReached => tracing::warn!(
            "Capture stopped at cycle limit {max_cycles} with {} records; table may be incomplete",
            outcome.records.len()
        ),
        _ => tracing::info!(
            "Capture converged after {} cycles with {} records",
            outcome.cycle_count(),
            outcome.records.len()
        ),
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ControlTarget, Locator};
    use crate::extract::FieldKind;
    use crate::testing::{FakePage, FakeRow, RecordingSettle};
    use crate::types::FieldValue;

    fn name() -> Locator {
        Locator::default().step("td", 0)
    }

    fn price() -> Locator {
        Locator::default().step("td", 1)
    }

    fn columns() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::located("name", name(), FieldKind::Text),
            ColumnSpec::located("price", price(), FieldKind::Magnitude),
        ]
    }

    fn row(n: usize) -> FakeRow {
        FakeRow::new(&format!("token-{n} ${n}00"))
            .cell(name(), &format!("token-{n}"))
            .cell(price(), &format!("${n}00"))
    }

    fn rows(range: std::ops::RangeInclusive<usize>) -> Vec<FakeRow> {
        range.map(row).collect()
    }

    fn env<'a>(page: &'a FakePage, settle: &'a RecordingSettle) -> CaptureEnv<'a> {
        CaptureEnv {
            document: page,
            page,
            settle,
        }
    }

    fn plan(loader: LoaderMode, max_cycles: u32) -> CapturePlan {
        CapturePlan::new(FakePage::scope(), columns(), loader, max_cycles)
    }

    fn names(outcome: &CaptureOutcome) -> Vec<String> {
        outcome
            .records
            .iter()
            .map(|r| r.get("name").unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_three_then_two_rows_converges_on_third_cycle() {
        // 3 rows initially, 2 more after one scroll, nothing after that
        let page = FakePage::staged(vec![rows(1..=3), rows(1..=5)]);
        let settle = RecordingSettle::default();

        let outcome = run_capture(env(&page, &settle), plan(LoaderMode::Scroll, 20))
            .await
            .unwrap();

        assert_eq!(outcome.termination, CaptureState::Converged);
        assert_eq!(outcome.cycle_count(), 3);
        assert_eq!(outcome.records.len(), 5);
        assert_eq!(
            names(&outcome),
            vec!["token-1", "token-2", "token-3", "token-4", "token-5"]
        );
        assert_eq!(
            outcome.cycles.iter().map(|c| c.new_records).collect::<Vec<_>>(),
            vec![3, 2, 0]
        );
        assert_eq!(page.scrolls(), 2);
    }

    #[tokio::test]
    async fn test_recycled_rows_keep_first_viewport() {
        // the scroll replaces the rendered window entirely
        let page = FakePage::staged(vec![rows(1..=3), rows(4..=5)]);
        let settle = RecordingSettle::default();

        let outcome = run_capture(env(&page, &settle), plan(LoaderMode::Scroll, 20))
            .await
            .unwrap();

        assert!(outcome.is_converged());
        assert_eq!(
            names(&outcome),
            vec!["token-1", "token-2", "token-3", "token-4", "token-5"]
        );
    }

    #[tokio::test]
    async fn test_limit_reached_is_distinguishable() {
        let page = FakePage::staged(vec![rows(1..=2), rows(1..=4), rows(1..=6)]);
        let settle = RecordingSettle::default();

        let outcome = run_capture(env(&page, &settle), plan(LoaderMode::Scroll, 2))
            .await
            .unwrap();

        assert_eq!(outcome.termination, CaptureState::LimitReached);
        assert!(!outcome.is_converged());
        assert_eq!(outcome.records.len(), 4);
        assert_eq!(page.scrolls(), 1);
        assert_eq!(settle.waits().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_cycle_wins_over_limit() {
        let page = FakePage::staged(vec![rows(1..=3), rows(1..=5)]);
        let settle = RecordingSettle::default();

        let outcome = run_capture(env(&page, &settle), plan(LoaderMode::Scroll, 3))
            .await
            .unwrap();
        assert_eq!(outcome.termination, CaptureState::Converged);
        assert_eq!(outcome.cycle_count(), 3);
    }

    #[tokio::test]
    async fn test_loader_invocations_never_exceed_bound() {
        // every scroll reveals one more row, forever
        let stages: Vec<Vec<FakeRow>> = (0..50).map(|n| rows(0..=n)).collect();
        for max in 1..=5 {
            let page = FakePage::staged(stages.clone());
            let settle = RecordingSettle::default();
            let outcome = run_capture(env(&page, &settle), plan(LoaderMode::Scroll, max))
                .await
                .unwrap();
            assert!(page.scrolls() <= max as usize);
            assert_eq!(page.scrolls(), max as usize - 1);
            assert_eq!(outcome.records.len(), max as usize);
            assert_eq!(outcome.termination, CaptureState::LimitReached);
        }
    }

    #[tokio::test]
    async fn test_seen_set_tracks_record_count() {
        let page = FakePage::staged(vec![rows(1..=2), rows(2..=4), rows(3..=7), rows(6..=7)]);
        let settle = RecordingSettle::default();
        let mut session = CaptureSession::new(plan(LoaderMode::Scroll, 10)).unwrap();

        let mut previous = 0;
        while !session.step(env(&page, &settle)).await.unwrap().is_terminal() {
            let total = session.records().len();
            assert_eq!(session.seen().len(), total);
            assert!(total > previous);
            previous = total;
        }

        assert_eq!(session.state(), CaptureState::Converged);
        assert_eq!(session.seen().len(), 7);
        let reports = session.cycles().to_vec();
        assert_eq!(
            reports.iter().map(|c| c.new_records).collect::<Vec<_>>(),
            vec![2, 2, 3, 0]
        );
        assert!(reports.windows(2).all(|w| w[0].total_records <= w[1].total_records));
    }

    #[tokio::test]
    async fn test_reveal_then_converge() {
        let control = ControlTarget::new("button").with_text("Show All");
        let page = FakePage::staged(vec![rows(1..=10), rows(1..=40)]).with_control(control.clone());
        let settle = RecordingSettle::default();

        let outcome = run_capture(env(&page, &settle), plan(LoaderMode::Reveal { control }, 20))
            .await
            .unwrap();

        assert!(outcome.is_converged());
        assert_eq!(outcome.records.len(), 40);
        assert_eq!(page.clicks(), 1);
        assert_eq!(
            outcome.cycles.iter().map(|c| c.new_records).collect::<Vec<_>>(),
            vec![10, 30, 0]
        );
        assert_eq!(
            outcome.cycles.iter().map(|c| c.loader_applied).collect::<Vec<_>>(),
            vec![true, false, false]
        );
    }

    #[tokio::test]
    async fn test_static_table_single_snapshot() {
        let page = FakePage::single(rows(1..=4));
        let settle = RecordingSettle::default();

        let outcome = run_capture(env(&page, &settle), plan(LoaderMode::Static, 20))
            .await
            .unwrap();

        assert!(outcome.is_converged());
        assert_eq!(outcome.cycle_count(), 2);
        assert_eq!(outcome.records.len(), 4);
        assert!(settle.waits().is_empty());
    }

    #[tokio::test]
    async fn test_missing_reveal_control_aborts() {
        let page = FakePage::single(rows(1..=3));
        let settle = RecordingSettle::default();
        let loader = LoaderMode::Reveal {
            control: ControlTarget::new("button.expand"),
        };

        let result = run_capture(env(&page, &settle), plan(loader, 5)).await;
        assert!(matches!(result, Err(CaptureError::LoaderControlMissing(_))));
    }

    #[tokio::test]
    async fn test_zero_cycle_bound_rejected() {
        let result = CaptureSession::new(plan(LoaderMode::Scroll, 0));
        assert!(matches!(result, Err(CaptureError::InvalidPlan(_))));
    }

    #[tokio::test]
    async fn test_records_keep_shape_when_fields_missing() {
        let broken = FakeRow::new("orphan row").cell(name(), "orphan");
        let page = FakePage::single(vec![broken, row(1)]);
        let settle = RecordingSettle::default();

        let outcome = run_capture(env(&page, &settle), plan(LoaderMode::Scroll, 5))
            .await
            .unwrap();

        let records = outcome.records.into_records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.values().len() == 2));
        assert_eq!(records[0].get("price"), Some(&FieldValue::Unavailable));
        assert_eq!(records[1].get("price"), Some(&FieldValue::Number(100.0)));
    }

    #[tokio::test]
    async fn test_step_after_terminal_is_noop() {
        let page = FakePage::single(vec![]);
        let settle = RecordingSettle::default();
        let mut session = CaptureSession::new(plan(LoaderMode::Scroll, 5)).unwrap();

        assert_eq!(session.step(env(&page, &settle)).await.unwrap(), CaptureState::Converged);
        assert_eq!(session.step(env(&page, &settle)).await.unwrap(), CaptureState::Converged);
        assert_eq!(page.scrolls(), 0);
    }
}
