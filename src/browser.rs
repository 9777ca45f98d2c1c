//! Headless Chromium session used as the content source for discovery.
//!
//! A [`BrowserSession`] owns one browser and one page. Site modules drive it
//! (navigate, scroll, click) and read the rendered HTML back out; they never
//! touch `chromiumoxide` directly.

use crate::config::BrowserConfig;
use crate::error::ScrapeError;
use chromiumoxide::browser::{Browser, BrowserConfig as LaunchConfig};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, instrument, warn};

const SCROLL_TO_BOTTOM: &str = "window.scrollTo(0, document.body.scrollHeight)";
const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    /// Launch Chromium and open a blank page.
    #[instrument(level = "info", skip_all, fields(headless = config.headless))]
    pub async fn launch(config: &BrowserConfig, user_agent: &str) -> Result<Self, ScrapeError> {
        let mut builder = LaunchConfig::builder()
            .window_size(config.window_width, config.window_height)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg(format!("--user-agent={user_agent}"));
        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &config.chrome_path {
            builder = builder.chrome_executable(path);
        }
        let launch = builder
            .build()
            .map_err(|e| ScrapeError::Browser(format!("failed to build browser config: {e}")))?;

        let (browser, mut events) = Browser::launch(launch)
            .await
            .map_err(|e| ScrapeError::Browser(format!("failed to launch Chromium: {e}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(ScrapeError::browser)?;

        info!("Browser session started");
        Ok(Self {
            browser,
            page,
            handler,
        })
    }

    /// Navigate and wait for the load to finish, bounded by `limit`.
    #[instrument(level = "info", skip(self))]
    pub async fn goto(&self, url: &str, limit: Duration) -> Result<(), ScrapeError> {
        let start = Instant::now();
        match timeout(limit, self.page.goto(url)).await {
            Ok(Ok(_)) => {
                debug!(elapsed_ms = start.elapsed().as_millis() as u64, "Navigation complete");
                Ok(())
            }
            Ok(Err(e)) => Err(ScrapeError::fetch(url, e)),
            Err(_) => Err(ScrapeError::fetch(url, format!("navigation timed out after {limit:?}"))),
        }
    }

    /// Current rendered HTML of the page.
    pub async fn html(&self) -> Result<String, ScrapeError> {
        self.page.content().await.map_err(ScrapeError::browser)
    }

    /// Evaluate an expression (never a function declaration) returning a boolean.
    pub async fn eval_bool(&self, script: &str) -> Result<bool, ScrapeError> {
        let result = self
            .page
            .evaluate_expression(EvaluateParams::new(script))
            .await
            .map_err(ScrapeError::browser)?;
        result
            .into_value::<bool>()
            .map_err(|e| ScrapeError::Browser(format!("script did not return a boolean: {e}")))
    }

    pub async fn scroll_to_bottom(&self) -> Result<(), ScrapeError> {
        self.page
            .evaluate_expression(EvaluateParams::new(SCROLL_TO_BOTTOM))
            .await
            .map_err(ScrapeError::browser)?;
        Ok(())
    }

    /// Scroll to the bottom `passes` times, pausing after each.
    pub async fn scroll_passes(&self, passes: u32, pause: Duration) -> Result<(), ScrapeError> {
        for pass in 1..=passes {
            self.scroll_to_bottom().await?;
            sleep(pause).await;
            debug!(pass, "Scrolled to bottom");
        }
        Ok(())
    }

    /// Poll until `selector` matches an element or `limit` elapses.
    pub async fn wait_for_selector(&self, selector: &str, limit: Duration) -> Result<(), ScrapeError> {
        let deadline = Instant::now() + limit;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ScrapeError::Parse(format!(
                    "selector {selector:?} did not appear within {limit:?}"
                )));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// Click the first element matching `selector`.
    pub async fn click(&self, selector: &str) -> Result<(), ScrapeError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| ScrapeError::Trigger(format!("{selector:?} not found: {e}")))?;
        element
            .click()
            .await
            .map_err(|e| ScrapeError::Trigger(format!("{selector:?} not clickable: {e}")))?;
        Ok(())
    }

    /// Close the browser and stop its event handler.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "Browser did not close cleanly");
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
        info!("Browser session closed");
    }
}
