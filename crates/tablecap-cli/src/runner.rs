//! Glue between a target file, a document adapter, and the capture loop.

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;

use tablecap::{run_capture, CaptureEnv, CaptureOutcome, TokioSettle};

use crate::browser::{BrowserOptions, BrowserSession, Readiness};
use crate::config::TargetConfig;
use crate::replay::{NoSettle, SnapshotReplay};

/// Capture `target` from a live Chromium tab.
///
/// The browser is closed whether or not the capture succeeds.
pub async fn capture_live(
    target: &TargetConfig,
    options: &BrowserOptions,
    max_cycles: u32,
) -> Result<CaptureOutcome> {
    let session = BrowserSession::launch(options).await?;
    let result = capture_in_session(&session, target, max_cycles).await;
    if let Err(e) = session.close().await {
        tracing::warn!("Failed to close browser: {e:#}");
    }
    result
}

async fn capture_in_session(
    session: &BrowserSession,
    target: &TargetConfig,
    max_cycles: u32,
) -> Result<CaptureOutcome> {
    let readiness = Readiness {
        initial_wait: Duration::from_millis(target.initial_wait_ms),
        container: target.scope.container.clone(),
        timeout: Duration::from_millis(target.ready_timeout_ms),
    };
    let page = session.open(&target.url, &readiness).await?;

    let env = CaptureEnv {
        document: &page,
        page: &page,
        settle: &TokioSettle,
    };
    let result = run_capture(env, target.plan(max_cycles))
        .await
        .with_context(|| format!("capture of {} failed", target.label()));

    page.close().await;
    result
}

/// Capture `target` from saved HTML snapshots, in order.
pub async fn capture_replay(
    target: &TargetConfig,
    snapshots: Vec<String>,
    max_cycles: u32,
) -> Result<CaptureOutcome> {
    let replay = SnapshotReplay::new(snapshots);
    let env = CaptureEnv {
        document: &replay,
        page: &replay,
        settle: &NoSettle,
    };
    run_capture(env, target.plan(max_cycles))
        .await
        .with_context(|| format!("replay of {} failed", target.label()))
}

/// Read snapshot files in the given order.
pub fn read_snapshots(paths: &[impl AsRef<Path>]) -> Result<Vec<String>> {
    paths
        .iter()
        .map(|p| {
            let p = p.as_ref();
            std::fs::read_to_string(p).with_context(|| format!("cannot read snapshot {}", p.display()))
        })
        .collect()
}
