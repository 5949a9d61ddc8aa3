//! `fontgrab grab` — run the full pipeline: discover, download, normalize.

use crate::browser::chromium::ChromiumBrowser;
use crate::browser::BrowserEngine;
use crate::cli::output;
use crate::pipeline::acquire::{acquire, AcquireConfig};
use crate::pipeline::discover::{discover, DiscoverConfig};
use crate::pipeline::normalize::normalize;
use crate::pipeline::{
    AcquireReport, ItemRef, NormalizeReport, BASE_URL, LISTING_URL, STAGING_DIR_NAME,
};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

/// Wait after the initial listing load before the first scroll step.
const INITIAL_SETTLE_MS: u64 = 3_000;

/// Navigation timeout for the listing page.
const LISTING_NAV_TIMEOUT_MS: u64 = 30_000;

/// Run the grab command.
pub async fn run(max_fonts: Option<usize>, out_dir: &Path, skip_normalize: bool) -> Result<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create output dir {}", out_dir.display()))?;

    let browser = ChromiumBrowser::launch().await?;
    info!("Chromium launched");

    // The browser session spans discovery and acquisition only; it is
    // released before normalization whether the stages succeeded or not.
    let staging = out_dir.join(STAGING_DIR_NAME);
    let session = run_browser_stages(&browser, &staging, max_fonts, out_dir).await;
    let _ = browser.shutdown().await;
    let _ = std::fs::remove_dir_all(&staging);
    let (items, fetch_report) = session?;

    let normalize_report = if skip_normalize {
        None
    } else {
        let bar = (!output::is_quiet()).then(|| output::bar(0, "normalizing"));
        let report = normalize(out_dir, bar.as_ref())?;
        if let Some(bar) = bar {
            bar.finish_and_clear();
        }
        Some(report)
    };

    if !output::is_quiet() {
        print_summary(&items, &fetch_report, normalize_report.as_ref(), out_dir);
    }
    Ok(())
}

async fn run_browser_stages(
    browser: &ChromiumBrowser,
    staging: &Path,
    max_fonts: Option<usize>,
    out_dir: &Path,
) -> Result<(Vec<ItemRef>, AcquireReport)> {
    let mut page = browser.new_page(staging).await?;

    let stages = async {
        page.navigate(LISTING_URL, LISTING_NAV_TIMEOUT_MS).await?;
        page.settle(INITIAL_SETTLE_MS).await;

        let discover_config = DiscoverConfig {
            cap: max_fonts,
            ..DiscoverConfig::default()
        };
        let bar = (!output::is_quiet()).then(|| output::spinner("collecting families"));
        let items = discover(page.as_mut(), &discover_config, bar.as_ref()).await?;
        if let Some(bar) = &bar {
            bar.finish_and_clear();
        }
        info!("discovered {} font families", items.len());

        let acquire_config = AcquireConfig::new(BASE_URL, out_dir);
        let bar = (!output::is_quiet()).then(|| output::bar(items.len() as u64, "downloading"));
        let report = acquire(page.as_mut(), &items, &acquire_config, bar.as_ref()).await?;
        if let Some(bar) = &bar {
            bar.finish_and_clear();
        }

        Ok::<_, anyhow::Error>((items, report))
    }
    .await;

    let _ = page.close().await;
    stages
}

fn print_summary(
    items: &[ItemRef],
    fetch: &AcquireReport,
    normalized: Option<&NormalizeReport>,
    out_dir: &Path,
) {
    println!();
    println!("  discovered: {}", items.len());
    println!("  downloaded: {}", fetch.succeeded);
    println!("  skipped:    {}", fetch.skipped);
    println!("  failed:     {}", fetch.failed);
    if let Some(n) = normalized {
        println!(
            "  normalized: {} archive(s), {} failed to open",
            n.archives_processed, n.archives_failed
        );
        println!(
            "  merged:     {} file(s), {} duplicate(s) skipped",
            n.files_merged, n.duplicates_skipped
        );
    }
    println!();
    println!("  output: {}", out_dir.display());
}
