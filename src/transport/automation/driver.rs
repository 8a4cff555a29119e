// Browser primitives the automation client is built from.
//
// The client owns the session lifecycle; a driver owns the raw handles. Page
// actions take &self (the underlying CDP page is shared-reference based), so
// the client can run them under a retry policy. Lifecycle calls take
// &mut self since they create or drop handles.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{CreateBrowserContextParams, CreateTargetParams};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::debug;

/// How often `wait_for` re-checks the page for a selector.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Empties an input, or the contenteditable compose box, so typing starts
/// from nothing.
const CLEAR_FIELD_JS: &str = "function() {
    this.focus();
    if ('value' in this) {
        this.value = '';
    } else {
        document.getSelection().selectAllChildren(this);
        document.execCommand('delete');
    }
}";

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Start the automation engine and the browser process.
    async fn launch(&mut self) -> Result<()>;
    /// Create an isolated browser context (fresh cookies and storage).
    async fn open_context(&mut self) -> Result<()>;
    /// Open a blank page inside the context.
    async fn open_page(&mut self) -> Result<()>;

    async fn goto(&self, url: &str) -> Result<()>;
    /// Wait until `selector` matches an element, or fail after `timeout`.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()>;
    /// Replace the field's current value with `value`. Calling it twice
    /// leaves `value` once, not twice.
    async fn fill(&self, selector: &str, value: &str) -> Result<()>;
    async fn press_enter(&self, selector: &str) -> Result<()>;
    async fn click(&self, selector: &str) -> Result<()>;
    async fn scroll_to_bottom(&self) -> Result<()>;
    /// Current page HTML.
    async fn content(&self) -> Result<String>;
    async fn screenshot(&self, path: &Path) -> Result<()>;

    async fn close_page(&mut self) -> Result<()>;
    async fn close_context(&mut self) -> Result<()>;
    async fn close_browser(&mut self) -> Result<()>;
    async fn stop_engine(&mut self) -> Result<()>;
}

/// Chromium over the DevTools protocol.
pub struct ChromiumDriver {
    headless: bool,
    browser: Option<Browser>,
    /// Task pumping CDP events; the browser is dead without it.
    engine: Option<JoinHandle<()>>,
    context: Option<BrowserContextId>,
    page: Option<Page>,
}

impl ChromiumDriver {
    pub fn new(headless: bool) -> Self {
        Self {
            headless,
            browser: None,
            engine: None,
            context: None,
            page: None,
        }
    }

    fn page(&self) -> Result<&Page> {
        self.page.as_ref().ok_or_else(|| anyhow!("no page open"))
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn launch(&mut self) -> Result<()> {
        let mut builder = BrowserConfig::builder()
            .arg("--no-sandbox") // Required for containerized environments
            .arg("--disable-dev-shm-usage") // Avoid /dev/shm size issues in containers
            .window_size(1920, 1080);
        if !self.headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("Failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;

        let engine = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        self.browser = Some(browser);
        self.engine = Some(engine);
        Ok(())
    }

    async fn open_context(&mut self) -> Result<()> {
        let browser = self
            .browser
            .as_mut()
            .ok_or_else(|| anyhow!("browser not launched"))?;
        let id = browser
            .create_browser_context(CreateBrowserContextParams::default())
            .await
            .context("Failed to create browser context")?;
        self.context = Some(id);
        Ok(())
    }

    async fn open_page(&mut self) -> Result<()> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| anyhow!("browser not launched"))?;
        let context = self
            .context
            .clone()
            .ok_or_else(|| anyhow!("no browser context"))?;

        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context)
            .build()
            .map_err(|e| anyhow!("Failed to build page params: {e}"))?;

        let page = browser.new_page(params).await.context("Failed to open page")?;
        self.page = Some(page);
        Ok(())
    }

    async fn goto(&self, url: &str) -> Result<()> {
        debug!(url, "Navigating");
        self.page()?
            .goto(url)
            .await
            .with_context(|| format!("Navigation to {url} failed"))?;
        Ok(())
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()> {
        let page = self.page()?;
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                anyhow::bail!("{selector} did not appear within {timeout:?}");
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let element = self.page()?.find_element(selector).await?;
        element.click().await?;
        element.call_js_fn(CLEAR_FIELD_JS, false).await?;
        element.type_str(value).await?;
        Ok(())
    }

    async fn press_enter(&self, selector: &str) -> Result<()> {
        let element = self.page()?.find_element(selector).await?;
        element.press_key("Enter").await?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let element = self.page()?.find_element(selector).await?;
        element.click().await?;
        Ok(())
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        self.page()?
            .evaluate("window.scrollTo(0, document.body.scrollHeight)")
            .await?;
        Ok(())
    }

    async fn content(&self) -> Result<String> {
        Ok(self.page()?.content().await?)
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        let params = ScreenshotParams::builder().full_page(true).build();
        self.page()?.save_screenshot(params, path).await?;
        Ok(())
    }

    async fn close_page(&mut self) -> Result<()> {
        if let Some(page) = self.page.take() {
            page.close().await?;
        }
        Ok(())
    }

    async fn close_context(&mut self) -> Result<()> {
        let id = self.context.take();
        if let (Some(browser), Some(id)) = (self.browser.as_mut(), id) {
            browser.dispose_browser_context(id).await?;
        }
        Ok(())
    }

    async fn close_browser(&mut self) -> Result<()> {
        if let Some(mut browser) = self.browser.take() {
            browser.close().await?;
            browser.wait().await?;
        }
        Ok(())
    }

    async fn stop_engine(&mut self) -> Result<()> {
        if let Some(mut engine) = self.engine.take() {
            // The handler loop ends by itself once the browser is gone.
            if tokio::time::timeout(Duration::from_secs(5), &mut engine)
                .await
                .is_err()
            {
                engine.abort();
            }
        }
        Ok(())
    }
}
