//! Browser abstraction for driving the remote listing site.
//!
//! Defines the `BrowserEngine`, `PageDriver` and `DownloadHandle` traits that
//! abstract over the browser engine (currently Chromium via chromiumoxide).
//! The pipeline stages only ever see these traits, so discovery and
//! acquisition are testable without a browser.

pub mod chromium;

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

/// A browser engine that can open driver pages.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    /// Open a new page (tab). Downloads triggered on the page land in
    /// `download_dir`, where the page's download watcher picks them up.
    async fn new_page(&self, download_dir: &Path) -> Result<Box<dyn PageDriver>>;

    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
}

/// A single browser page the pipeline can drive.
///
/// Every operation that touches the page can fail if the browser goes away;
/// such failures are fatal to the whole run, never retried here.
#[async_trait]
pub trait PageDriver: Send {
    /// Navigate to a URL with a timeout.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<()>;

    /// Wait a bounded interval for the page to settle after a navigation
    /// or an interaction that triggers lazy rendering.
    async fn settle(&self, ms: u64);

    /// Collect `attr` from every element currently matching `selector`,
    /// in document order. Elements without the attribute are omitted.
    async fn collect_attr(&self, selector: &str, attr: &str) -> Result<Vec<String>>;

    /// Scroll the last element matching `selector` into view.
    /// Returns false when nothing matches.
    async fn scroll_last_into_view(&self, selector: &str) -> Result<bool>;

    /// Click the first button-like element whose trimmed text equals `text`.
    /// Returns false when no such element exists.
    async fn click_text(&self, text: &str) -> Result<bool>;

    /// Click the first element matching `selector`.
    /// Returns false when nothing matches.
    async fn click_selector(&self, selector: &str) -> Result<bool>;

    /// Await the next download triggered on this page, within `timeout_ms`.
    async fn wait_for_download(&self, timeout_ms: u64) -> Result<Box<dyn DownloadHandle>>;

    /// Close this page.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A completed download that can be persisted to a destination path.
#[async_trait]
pub trait DownloadHandle: Send {
    /// Move the downloaded content to `dest`.
    async fn save(self: Box<Self>, dest: &Path) -> Result<()>;
}
