use std::fmt;
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::browser::ChromeSession;
use crate::delay_manager;

/// Invite links that don't point at this host are rejected before any
/// browser is launched.
const REQUIRED_HOST: &str = "chat.whatsapp.com";

/// Group names are capped at 100 characters in every output.
const MAX_NAME_LEN: usize = 100;

/// Primary extraction target: the page title carried in the og:title meta tag.
const META_SELECTOR: &str = "meta[property='og:title']";
const META_WAIT: Duration = Duration::from_secs(5);

/// Fallback extraction target: the visible heading on the invite page.
const HEADING_SELECTOR: &str = "h3._9vd5";
const HEADING_WAIT: Duration = Duration::from_secs(10);

/// The closed set of ways a single link can fail to resolve. None of these
/// abort the run; they are recorded in place of a group name.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ResolveError {
    #[error("invalid link")]
    InvalidLink,
    #[error("navigation timed out")]
    NavigationTimeout,
    #[error("group name not found")]
    ElementNotFound,
    #[error("error: {0}")]
    Driver(String),
}

/// Outcome of attempting to fetch the display name for one link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "value", rename_all = "snake_case")]
pub enum Resolution {
    Name(String),
    Failed(ResolveError),
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Name(name) => write!(f, "{}", name),
            Resolution::Failed(err) => write!(f, "{}", err),
        }
    }
}

/// Seam between the orchestrator and the browser. Production code uses
/// [`ChromeFetcher`]; tests substitute stubs.
pub trait NameFetcher: Send + Sync {
    fn fetch(&self, link: &str) -> Resolution;
}

pub struct ChromeFetcher;

impl NameFetcher for ChromeFetcher {
    fn fetch(&self, link: &str) -> Resolution {
        resolve_group_name(link)
    }
}

/// The browser surface the extraction steps need. Lets the step logic be
/// exercised without a Chrome binary.
trait InvitePage {
    fn navigate(&self, url: &str) -> anyhow::Result<()>;
    fn wait_for_attribute(
        &self,
        selector: &str,
        attribute: &str,
        timeout: Duration,
    ) -> anyhow::Result<Option<String>>;
    fn wait_for_text(&self, selector: &str, timeout: Duration) -> anyhow::Result<String>;
}

impl InvitePage for ChromeSession {
    fn navigate(&self, url: &str) -> anyhow::Result<()> {
        ChromeSession::navigate(self, url)
    }

    fn wait_for_attribute(
        &self,
        selector: &str,
        attribute: &str,
        timeout: Duration,
    ) -> anyhow::Result<Option<String>> {
        ChromeSession::wait_for_attribute(self, selector, attribute, timeout)
    }

    fn wait_for_text(&self, selector: &str, timeout: Duration) -> anyhow::Result<String> {
        ChromeSession::wait_for_text(self, selector, timeout)
    }
}

/// A link is worth launching a browser for only if it is non-empty and
/// references the invite host.
pub fn validate_link(link: &str) -> bool {
    let trimmed = link.trim();
    !trimmed.is_empty() && trimmed.contains(REQUIRED_HOST)
}

/// Trim and cap a scraped name at [`MAX_NAME_LEN`] characters. Counted in
/// chars, not bytes; group names are frequently non-ASCII.
pub fn truncate_name(raw: &str) -> String {
    raw.trim().chars().take(MAX_NAME_LEN).collect()
}

/// Resolve one invite link to its group name. Launches an isolated browser
/// session, tries the meta tag first and the page heading second, and maps
/// every failure to a [`ResolveError`]. Never panics or propagates; the
/// session is released on every exit path.
pub fn resolve_group_name(link: &str) -> Resolution {
    if !validate_link(link) {
        return Resolution::Failed(ResolveError::InvalidLink);
    }

    let session = match ChromeSession::launch() {
        Ok(s) => s,
        Err(e) => {
            warn!("Failed to launch browser for {}: {}", link, e);
            return Resolution::Failed(ResolveError::Driver(e.to_string()));
        }
    };

    let resolution = extract_name(&session, link);

    // Throttle between fetches before the session (and its Chrome process)
    // is dropped.
    delay_manager::throttle_delay();

    resolution
}

fn extract_name<P: InvitePage>(page: &P, link: &str) -> Resolution {
    let navigated = page.navigate(link);
    if let Err(ref e) = navigated {
        info!("Navigation failed for {}: {}", link, e);
    }

    // First attempt: og:title meta tag. Pointless on a page that never
    // started loading.
    if navigated.is_ok() {
        if let Ok(Some(content)) = page.wait_for_attribute(META_SELECTOR, "content", META_WAIT) {
            let name = truncate_name(&content);
            if !name.is_empty() {
                delay_manager::politeness_delay();
                return Resolution::Name(name);
            }
        }
    }

    // Second attempt: the heading element rendered on the invite page.
    // Tried even after a failed navigation; a partially loaded page can
    // still render it.
    if let Ok(text) = page.wait_for_text(HEADING_SELECTOR, HEADING_WAIT) {
        let name = truncate_name(&text);
        if !name.is_empty() {
            return Resolution::Name(name);
        }
    }

    if navigated.is_err() {
        Resolution::Failed(ResolveError::NavigationTimeout)
    } else {
        Resolution::Failed(ResolveError::ElementNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_hostless_links_are_invalid() {
        assert!(!validate_link(""));
        assert!(!validate_link("   "));
        assert!(!validate_link("not-a-link"));
        assert!(!validate_link("https://example.com/group"));
    }

    #[test]
    fn invite_links_are_valid() {
        assert!(validate_link("https://chat.whatsapp.com/AbCdEf123"));
        assert!(validate_link("  chat.whatsapp.com/AbCdEf123  "));
    }

    #[test]
    fn names_are_trimmed_and_capped_at_100_chars() {
        assert_eq!(truncate_name("  Study Group  "), "Study Group");

        let long: String = "x".repeat(250);
        assert_eq!(truncate_name(&long).chars().count(), 100);

        // Multi-byte input must be cut on a char boundary.
        let arabic: String = "م".repeat(150);
        let truncated = truncate_name(&arabic);
        assert_eq!(truncated.chars().count(), 100);
        assert!(truncated.chars().all(|c| c == 'م'));
    }

    #[test]
    fn invalid_links_resolve_without_a_browser() {
        // No Chrome installed in the test environment; this only passes
        // because validation short-circuits before any launch.
        let resolution = resolve_group_name("not-a-link");
        assert_eq!(resolution, Resolution::Failed(ResolveError::InvalidLink));
    }

    #[test]
    fn error_tags_render_stable_text() {
        assert_eq!(
            Resolution::Failed(ResolveError::InvalidLink).to_string(),
            "invalid link"
        );
        assert_eq!(
            Resolution::Failed(ResolveError::ElementNotFound).to_string(),
            "group name not found"
        );
        assert_eq!(
            Resolution::Failed(ResolveError::Driver("boom".into())).to_string(),
            "error: boom"
        );
        assert_eq!(Resolution::Name("Study Group".into()).to_string(), "Study Group");
    }

    struct StubPage {
        navigate_ok: bool,
        meta: Option<String>,
        heading: Option<String>,
    }

    impl InvitePage for StubPage {
        fn navigate(&self, _url: &str) -> anyhow::Result<()> {
            if self.navigate_ok {
                Ok(())
            } else {
                Err(anyhow::anyhow!("net::ERR_TIMED_OUT"))
            }
        }

        fn wait_for_attribute(
            &self,
            _selector: &str,
            _attribute: &str,
            _timeout: Duration,
        ) -> anyhow::Result<Option<String>> {
            match &self.meta {
                Some(content) => Ok(Some(content.clone())),
                None => Err(anyhow::anyhow!("element wait timed out")),
            }
        }

        fn wait_for_text(&self, _selector: &str, _timeout: Duration) -> anyhow::Result<String> {
            match &self.heading {
                Some(text) => Ok(text.clone()),
                None => Err(anyhow::anyhow!("element wait timed out")),
            }
        }
    }

    const LINK: &str = "https://chat.whatsapp.com/AbCdEf123";

    #[test]
    fn failed_navigation_still_tries_the_heading() {
        // A page that timed out mid-load but rendered its heading.
        let page = StubPage {
            navigate_ok: false,
            meta: None,
            heading: Some("Study Group".to_string()),
        };
        assert_eq!(
            extract_name(&page, LINK),
            Resolution::Name("Study Group".to_string())
        );
    }

    #[test]
    fn failed_navigation_without_heading_is_a_timeout() {
        let page = StubPage {
            navigate_ok: false,
            meta: None,
            heading: None,
        };
        assert_eq!(
            extract_name(&page, LINK),
            Resolution::Failed(ResolveError::NavigationTimeout)
        );
    }

    #[test]
    fn loaded_page_without_either_element_is_not_found() {
        let page = StubPage {
            navigate_ok: true,
            meta: None,
            heading: None,
        };
        assert_eq!(
            extract_name(&page, LINK),
            Resolution::Failed(ResolveError::ElementNotFound)
        );
    }

    #[test]
    fn blank_meta_content_falls_back_to_heading() {
        let page = StubPage {
            navigate_ok: true,
            meta: Some("   ".to_string()),
            heading: Some("Study Group".to_string()),
        };
        assert_eq!(
            extract_name(&page, LINK),
            Resolution::Name("Study Group".to_string())
        );
    }

    #[test]
    fn resolution_survives_json_round_trip() {
        let original = Resolution::Failed(ResolveError::Driver("no binary".into()));
        let json = serde_json::to_string(&original).unwrap();
        let back: Resolution = serde_json::from_str(&json).unwrap();
        assert_eq!(original, back);
    }
}
