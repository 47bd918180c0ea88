use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use headless_chrome::{Browser, LaunchOptions, Tab};

/// Page loads that take longer than this are abandoned.
const PAGE_LOAD_TIMEOUT: Duration = Duration::from_secs(15);

/// Fixed desktop user agent; the invite pages serve a stripped-down variant
/// to anything that looks like a bot.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// One isolated headless Chrome instance with a single tab. Dropping the
/// session kills the Chrome process, so releasing it on every exit path is
/// just a matter of scope.
pub struct ChromeSession {
    // Held for the lifetime of the tab; the process dies with it.
    _browser: Browser,
    tab: Arc<Tab>,
}

impl ChromeSession {
    pub fn launch() -> Result<Self> {
        let ua_arg = format!("--user-agent={}", USER_AGENT);
        let args = vec![
            OsStr::new("--disable-gpu"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--log-level=3"),
            OsStr::new("--disable-blink-features=AutomationControlled"),
            OsStr::new(&ua_arg),
        ];

        let options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .args(args)
            .build()
            .map_err(|e| anyhow!("failed to build Chrome launch options: {}", e))?;

        let browser = Browser::new(options).context("failed to launch headless Chrome")?;
        let tab = browser.new_tab().context("failed to open tab")?;
        tab.set_default_timeout(PAGE_LOAD_TIMEOUT);

        Ok(ChromeSession {
            _browser: browser,
            tab,
        })
    }

    /// Navigate and block until the page settles or [`PAGE_LOAD_TIMEOUT`] hits.
    pub fn navigate(&self, url: &str) -> Result<()> {
        self.tab.navigate_to(url)?;
        self.tab.wait_until_navigated()?;
        Ok(())
    }

    /// Wait for `selector` and read one attribute off it. `Ok(None)` means
    /// the element exists but lacks the attribute.
    pub fn wait_for_attribute(
        &self,
        selector: &str,
        attribute: &str,
        timeout: Duration,
    ) -> Result<Option<String>> {
        let element = self.tab.wait_for_element_with_custom_timeout(selector, timeout)?;
        let attributes = match element.get_attributes()? {
            Some(attrs) => attrs,
            None => return Ok(None),
        };
        // CDP returns an interleaved name/value list.
        Ok(attributes
            .chunks_exact(2)
            .find(|pair| pair[0] == attribute)
            .map(|pair| pair[1].clone()))
    }

    /// Wait for `selector` and return its rendered inner text.
    pub fn wait_for_text(&self, selector: &str, timeout: Duration) -> Result<String> {
        let element = self.tab.wait_for_element_with_custom_timeout(selector, timeout)?;
        element.get_inner_text()
    }
}
