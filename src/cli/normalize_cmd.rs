//! `fontgrab normalize` — re-run the normalization stage over an existing
//! output directory, without touching the network.

use crate::cli::output;
use crate::pipeline::normalize::normalize;
use crate::pipeline::MERGED_DIR_NAME;
use anyhow::{bail, Result};
use std::path::Path;

/// Run the normalize command.
pub async fn run(out_dir: &Path) -> Result<()> {
    if !out_dir.is_dir() {
        bail!("output dir {} does not exist", out_dir.display());
    }

    let bar = (!output::is_quiet()).then(|| output::bar(0, "normalizing"));
    let report = normalize(out_dir, bar.as_ref())?;
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    if !output::is_quiet() {
        println!(
            "  normalized {} archive(s), {} failed to open",
            report.archives_processed, report.archives_failed
        );
        println!(
            "  merged {} file(s) into {}, {} duplicate(s) skipped",
            report.files_merged,
            out_dir.join(MERGED_DIR_NAME).display(),
            report.duplicates_skipped
        );
    }
    Ok(())
}
