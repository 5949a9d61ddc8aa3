//! Chromium-based page driver using chromiumoxide.

use super::{BrowserEngine, DownloadHandle, PageDriver};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Poll interval for the download watcher.
const DOWNLOAD_POLL_MS: u64 = 250;

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. FONTGRAB_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("FONTGRAB_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.fontgrab/chromium/
    if let Some(home) = dirs::home_dir() {
        let local = home.join(".fontgrab/chromium/chrome");
        if local.exists() {
            return Some(local);
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
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Chromium-based browser engine.
pub struct ChromiumBrowser {
    browser: Browser,
}

impl ChromiumBrowser {
    /// Launch a headless Chromium instance.
    pub async fn launch() -> Result<Self> {
        let chrome_path = find_chromium()
            .context("Chromium not found. Install Chrome/Chromium or set FONTGRAB_CHROMIUM_PATH.")?;

        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // Spawn the handler task
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        Ok(Self { browser })
    }
}

#[async_trait]
impl BrowserEngine for ChromiumBrowser {
    async fn new_page(&self, download_dir: &Path) -> Result<Box<dyn PageDriver>> {
        std::fs::create_dir_all(download_dir).with_context(|| {
            format!("failed to create download dir {}", download_dir.display())
        })?;

        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        // Route downloads triggered on this page into the staging directory.
        let params = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(download_dir.to_string_lossy())
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build download behavior params: {e}"))?;
        page.execute(params)
            .await
            .context("failed to set download behavior")?;

        Ok(Box::new(ChromiumPage {
            page,
            download_dir: download_dir.to_path_buf(),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        // Browser process is reaped when ChromiumBrowser is dropped
        Ok(())
    }
}

/// A single Chromium page.
pub struct ChromiumPage {
    page: Page,
    download_dir: PathBuf,
}

impl ChromiumPage {
    async fn eval<T: serde::de::DeserializeOwned>(&self, script: String) -> Result<T> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;
        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert JS result: {e:?}"))
    }
}

/// Quote a string for embedding into an injected script.
fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_default()
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<()> {
        let result = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.page.goto(url),
        )
        .await;

        match result {
            Ok(Ok(_)) => {
                let _ = self.page.wait_for_navigation().await;
                Ok(())
            }
            Ok(Err(e)) => bail!("navigation to {url} failed: {e}"),
            Err(_) => bail!("navigation to {url} timed out after {timeout_ms}ms"),
        }
    }

    async fn settle(&self, ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    async fn collect_attr(&self, selector: &str, attr: &str) -> Result<Vec<String>> {
        let script = format!(
            "Array.from(document.querySelectorAll({sel})).map(el => el.getAttribute({attr}))",
            sel = js_str(selector),
            attr = js_str(attr),
        );
        let values: Vec<Option<String>> = self.eval(script).await?;
        Ok(values.into_iter().flatten().collect())
    }

    async fn scroll_last_into_view(&self, selector: &str) -> Result<bool> {
        let script = format!(
            "(() => {{ const els = document.querySelectorAll({sel}); \
             if (els.length === 0) return false; \
             els[els.length - 1].scrollIntoView({{block: 'end'}}); \
             return true; }})()",
            sel = js_str(selector),
        );
        self.eval(script).await
    }

    async fn click_text(&self, text: &str) -> Result<bool> {
        let script = format!(
            "(() => {{ \
             const nodes = document.querySelectorAll('button, a, [role=\"button\"]'); \
             for (const el of nodes) {{ \
               if (el.textContent && el.textContent.trim() === {text}) {{ el.click(); return true; }} \
             }} \
             return false; }})()",
            text = js_str(text),
        );
        self.eval(script).await
    }

    async fn click_selector(&self, selector: &str) -> Result<bool> {
        let script = format!(
            "(() => {{ const el = document.querySelector({sel}); \
             if (!el) return false; el.click(); return true; }})()",
            sel = js_str(selector),
        );
        self.eval(script).await
    }

    async fn wait_for_download(&self, timeout_ms: u64) -> Result<Box<dyn DownloadHandle>> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let mut previous_sizes: HashMap<PathBuf, u64> = HashMap::new();

        loop {
            let mut current_sizes: HashMap<PathBuf, u64> = HashMap::new();
            for entry in std::fs::read_dir(&self.download_dir)
                .context("failed to read download staging dir")?
            {
                let entry = entry.context("failed to read download staging dir entry")?;
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                // Chromium writes in-flight downloads as *.crdownload
                if path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("crdownload"))
                {
                    continue;
                }
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                if size == 0 {
                    continue;
                }
                // Complete once the size held steady across two polls
                if previous_sizes.get(&path) == Some(&size) {
                    return Ok(Box::new(ChromiumDownload { path }));
                }
                current_sizes.insert(path, size);
            }
            previous_sizes = current_sizes;

            if Instant::now() >= deadline {
                // Sweep partials so they don't surface for the next item
                if let Ok(entries) = std::fs::read_dir(&self.download_dir) {
                    for entry in entries.flatten() {
                        let _ = std::fs::remove_file(entry.path());
                    }
                }
                bail!("timed out waiting for download after {timeout_ms}ms");
            }
            tokio::time::sleep(Duration::from_millis(DOWNLOAD_POLL_MS)).await;
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let _ = self.page.close().await;
        Ok(())
    }
}

/// A download that landed in the staging directory.
pub struct ChromiumDownload {
    path: PathBuf,
}

#[async_trait]
impl DownloadHandle for ChromiumDownload {
    async fn save(self: Box<Self>, dest: &Path) -> Result<()> {
        // Copy + remove rather than rename: the staging dir and the
        // destination may sit on different filesystems.
        tokio::fs::copy(&self.path, dest)
            .await
            .with_context(|| format!("failed to persist download to {}", dest.display()))?;
        tokio::fs::remove_file(&self.path).await.ok();
        Ok(())
    }
}
