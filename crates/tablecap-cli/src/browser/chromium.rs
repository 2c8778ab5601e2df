//! `LiveDocument` and `PageControl` over a chromiumoxide tab.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chromiumoxide::page::Page;
use serde::de::DeserializeOwned;

use tablecap::{
    CaptureError, CaptureResult, ControlTarget, LiveDocument, Locator, PageControl, RowHandle,
    RowScope, ScrollAmount,
};

use super::scripts::{self, Reply};

/// A Chromium tab the capture loop reads from and scrolls.
pub struct ChromiumPage {
    page: Page,
    generation: AtomicU64,
}

impl ChromiumPage {
    pub fn new(page: Page) -> Self {
        Self {
            page,
            generation: AtomicU64::new(0),
        }
    }

    /// The underlying tab.
    pub fn tab(&self) -> &Page {
        &self.page
    }

    async fn eval<T: DeserializeOwned>(&self, script: String) -> CaptureResult<Reply<T>> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| CaptureError::Document(format!("JS execution failed: {e}")))?;

        result
            .into_value()
            .map_err(|e| CaptureError::Document(format!("failed to convert JS result: {e}")))
    }

    fn check_generation(&self, row: &RowHandle) -> CaptureResult<()> {
        let current = self.generation.load(Ordering::SeqCst);
        if row.generation() != current {
            return Err(CaptureError::StaleHandle {
                handle: row.generation(),
                current,
            });
        }
        Ok(())
    }

    fn stale(&self, row: &RowHandle) -> CaptureError {
        CaptureError::StaleHandle {
            handle: row.generation(),
            current: self.generation.load(Ordering::SeqCst),
        }
    }

    /// Whether `selector` currently matches anything.
    pub async fn has_element(&self, selector: &str) -> CaptureResult<bool> {
        match self.eval::<bool>(scripts::has_element(selector)).await? {
            Reply::Ok { value } => Ok(value),
            Reply::Missing | Reply::Stale => Ok(false),
        }
    }

    /// Close the tab. Errors are logged, not returned.
    pub async fn close(self) {
        if let Err(e) = self.page.close().await {
            tracing::debug!("Closing tab failed: {e}");
        }
    }
}

#[async_trait]
impl LiveDocument for ChromiumPage {
    async fn rows(&self, scope: &RowScope) -> CaptureResult<Vec<RowHandle>> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        match self.eval::<usize>(scripts::enumerate_rows(scope, generation)).await? {
            Reply::Ok { value } => Ok((0..value).map(|i| RowHandle::new(generation, i)).collect()),
            Reply::Missing | Reply::Stale => Err(CaptureError::ContainerMissing(scope.container.clone())),
        }
    }

    async fn count_rows(&self, scope: &RowScope) -> CaptureResult<usize> {
        match self.eval::<usize>(scripts::count_rows(scope)).await? {
            Reply::Ok { value } => Ok(value),
            Reply::Missing | Reply::Stale => Err(CaptureError::ContainerMissing(scope.container.clone())),
        }
    }

    async fn row_text(&self, row: &RowHandle) -> CaptureResult<String> {
        self.check_generation(row)?;
        match self.eval::<String>(scripts::row_text(row.generation(), row.index())).await? {
            Reply::Ok { value } => Ok(value),
            Reply::Missing => Err(CaptureError::Document(format!(
                "row {} is no longer attached",
                row.index()
            ))),
            Reply::Stale => Err(self.stale(row)),
        }
    }

    async fn read(&self, row: &RowHandle, locator: &Locator) -> CaptureResult<Option<String>> {
        self.check_generation(row)?;
        match self
            .eval::<String>(scripts::read(row.generation(), row.index(), locator))
            .await?
        {
            Reply::Ok { value } => Ok(Some(value)),
            Reply::Missing => Ok(None),
            Reply::Stale => Err(self.stale(row)),
        }
    }
}

#[async_trait]
impl PageControl for ChromiumPage {
    async fn scroll_by(&self, amount: ScrollAmount) -> CaptureResult<()> {
        self.eval::<bool>(scripts::scroll(amount)).await?;
        Ok(())
    }

    async fn click(&self, target: &ControlTarget) -> CaptureResult<bool> {
        match self.eval::<bool>(scripts::click(target)).await? {
            Reply::Ok { value } => Ok(value),
            Reply::Missing | Reply::Stale => Ok(false),
        }
    }
}
