//! Headless Chromium session used for live captures.

pub mod chromium;
pub mod scripts;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::task::JoinHandle;

pub use chromium::ChromiumPage;

/// Environment variable pointing at a Chromium binary.
pub const CHROMIUM_ENV: &str = "TABLECAP_CHROMIUM_PATH";

const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. TABLECAP_CHROMIUM_PATH env
    if let Ok(p) = std::env::var(CHROMIUM_ENV) {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.tablecap/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".tablecap/chromium/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".tablecap/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".tablecap/chromium/chrome-linux64/chrome"),
                home.join(".tablecap/chromium/chrome"),
            ]
        };
        if let Some(found) = candidates.into_iter().find(|c| c.exists()) {
            return Some(found);
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Launch options.
#[derive(Debug, Clone, Default)]
pub struct BrowserOptions {
    /// Show the browser window.
    pub headed: bool,
    /// Explicit binary; discovered with [`find_chromium`] when unset.
    pub chromium_path: Option<PathBuf>,
}

/// How to decide a freshly opened page is ready for capture.
#[derive(Debug, Clone)]
pub struct Readiness {
    pub initial_wait: Duration,
    /// Selector that must match before capture starts.
    pub container: String,
    pub timeout: Duration,
}

/// A running Chromium instance. Call [`close`](Self::close) when done.
pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    /// Launch Chromium.
    pub async fn launch(options: &BrowserOptions) -> Result<Self> {
        let chrome_path = match &options.chromium_path {
            Some(path) => path.clone(),
            None => find_chromium()
                .with_context(|| format!("Chromium not found. Set {CHROMIUM_ENV} or install Chrome."))?,
        };
        tracing::info!("Launching Chromium: {}", chrome_path.display());

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions");
        builder = if options.headed {
            builder.with_head()
        } else {
            builder.arg("--headless=new")
        };
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("CDP handler event error: {e}");
                }
            }
        });

        Ok(Self { browser, handler })
    }

    /// Open `url` in a new tab and wait until the table container exists.
    ///
    /// The tab is closed again if navigation or the readiness wait fails.
    pub async fn open(&self, url: &str, readiness: &Readiness) -> Result<ChromiumPage> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;
        let page = ChromiumPage::new(page);

        match prepare(&page, url, readiness).await {
            Ok(()) => Ok(page),
            Err(e) => {
                page.close().await;
                Err(e)
            }
        }
    }

    /// Close the browser and stop the CDP handler.
    pub async fn close(mut self) -> Result<()> {
        let closed = self.browser.close().await;
        let _ = self.browser.wait().await;
        self.handler.abort();
        closed.context("failed to close Chromium")?;
        Ok(())
    }
}

async fn prepare(page: &ChromiumPage, url: &str, readiness: &Readiness) -> Result<()> {
    let start = Instant::now();
    page.tab()
        .goto(url)
        .await
        .with_context(|| format!("navigation to {url} failed"))?;
    let _ = page.tab().wait_for_navigation().await;
    tracing::info!("Loaded {url} in {}ms", start.elapsed().as_millis());

    tokio::time::sleep(readiness.initial_wait).await;

    let deadline = Instant::now() + readiness.timeout;
    loop {
        if page.has_element(&readiness.container).await? {
            return Ok(());
        }
        if Instant::now() >= deadline {
            bail!(
                "table container {:?} did not appear within {}ms",
                readiness.container,
                readiness.timeout.as_millis()
            );
        }
        tokio::time::sleep(READY_POLL_INTERVAL).await;
    }
}
