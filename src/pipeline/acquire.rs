//! Acquisition stage — turn each discovered reference into an archive on disk.
//!
//! Items are processed strictly in order. A missing download control or a
//! download timeout only affects that item; the batch always continues.
//! Navigation failure means the browser itself is gone and aborts the run.

use crate::browser::PageDriver;
use crate::pipeline::{
    AcquireReport, FetchOutcome, ItemRef, DOWNLOAD_CONTROL_TEXT, DOWNLOAD_TRIGGER_SELECTOR,
};
use anyhow::{Context, Result};
use indicatif::ProgressBar;
use std::path::{Path, PathBuf};
use url::Url;

/// Acquisition stage configuration.
#[derive(Debug, Clone)]
pub struct AcquireConfig {
    /// Site base that item hrefs are joined onto.
    pub base_url: String,
    /// Directory receiving the `<name>.zip` archives.
    pub out_dir: PathBuf,
    /// Navigation timeout per detail page.
    pub nav_timeout_ms: u64,
    /// How long to let a detail page settle before looking for controls.
    pub settle_ms: u64,
    /// How long to wait for a triggered download to complete.
    pub download_timeout_ms: u64,
}

impl AcquireConfig {
    pub fn new(base_url: impl Into<String>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_url: base_url.into(),
            out_dir: out_dir.into(),
            nav_timeout_ms: 30_000,
            settle_ms: 2_000,
            download_timeout_ms: 30_000,
        }
    }

    fn item_url(&self, item: &ItemRef) -> Result<String> {
        let base = Url::parse(&self.base_url)
            .with_context(|| format!("invalid base url {}", self.base_url))?;
        let joined = base
            .join(item.path())
            .with_context(|| format!("cannot join {} onto {}", item.path(), self.base_url))?;
        Ok(joined.into())
    }
}

/// Download the archive for every reference, recording a per-item outcome.
///
/// After this stage, for every `Success` there is exactly one
/// `<out_dir>/<name>.zip`; skipped and failed items leave no file.
pub async fn acquire(
    page: &mut dyn PageDriver,
    items: &[ItemRef],
    config: &AcquireConfig,
    progress: Option<&ProgressBar>,
) -> Result<AcquireReport> {
    std::fs::create_dir_all(&config.out_dir).with_context(|| {
        format!("failed to create output dir {}", config.out_dir.display())
    })?;

    let mut report = AcquireReport::default();

    for item in items {
        let outcome = acquire_one(page, item, config).await?;
        match outcome {
            FetchOutcome::Success => tracing::info!("downloaded {}", item.name()),
            FetchOutcome::Skipped => {
                tracing::info!("no download control for {}; skipping", item.name())
            }
            FetchOutcome::Failed => {
                tracing::warn!("download for {} did not complete; skipping", item.name())
            }
        }
        report.record(item.clone(), outcome);
        if let Some(bar) = progress {
            bar.inc(1);
        }
    }

    Ok(report)
}

/// Process a single item. `Err` is reserved for fatal conditions (browser
/// unusable); everything item-local comes back as an outcome.
async fn acquire_one(
    page: &mut dyn PageDriver,
    item: &ItemRef,
    config: &AcquireConfig,
) -> Result<FetchOutcome> {
    let url = config.item_url(item)?;
    page.navigate(&url, config.nav_timeout_ms).await?;
    page.settle(config.settle_ms).await;

    if !page.click_text(DOWNLOAD_CONTROL_TEXT).await? {
        return Ok(FetchOutcome::Skipped);
    }

    // The control reveals the real trigger; a missing trigger behaves like
    // a download that never arrives.
    let triggered = page.click_selector(DOWNLOAD_TRIGGER_SELECTOR).await?;
    if !triggered {
        return Ok(FetchOutcome::Failed);
    }

    let dest = archive_path(&config.out_dir, item);
    match page.wait_for_download(config.download_timeout_ms).await {
        Ok(handle) => match handle.save(&dest).await {
            Ok(()) => Ok(FetchOutcome::Success),
            Err(e) => {
                tracing::warn!("failed to persist archive for {}: {e:#}", item.name());
                let _ = std::fs::remove_file(&dest);
                Ok(FetchOutcome::Failed)
            }
        },
        Err(e) => {
            tracing::warn!("waiting for {} download failed: {e:#}", item.name());
            Ok(FetchOutcome::Failed)
        }
    }
}

/// Where an item's archive is persisted.
pub fn archive_path(out_dir: &Path, item: &ItemRef) -> PathBuf {
    out_dir.join(format!("{}.zip", item.name()))
}
