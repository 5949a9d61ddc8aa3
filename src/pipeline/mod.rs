// Copyright 2026 Fontgrab Contributors
// SPDX-License-Identifier: Apache-2.0

//! The three-stage pipeline: discover listing items, acquire their archives,
//! normalize the archives into one flat directory of font files.
//!
//! Control flows strictly downstream. Acquisition consumes the references
//! produced by discovery; normalization consumes whatever archives are on
//! disk and is independently re-runnable.

pub mod acquire;
pub mod discover;
pub mod normalize;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The infinite-scroll listing page.
pub const LISTING_URL: &str = "https://www.fontshare.com/";

/// Base URL that item hrefs are relative to.
pub const BASE_URL: &str = "https://www.fontshare.com";

/// Selector matching one listing tile link per font family.
pub const ITEM_LINK_SELECTOR: &str = "a[href^=\"/fonts/\"]";

/// Visible text of the per-family download control.
pub const DOWNLOAD_CONTROL_TEXT: &str = "Download Family";

/// Selector for the actual download trigger revealed by the control.
pub const DOWNLOAD_TRIGGER_SELECTOR: &str = "a[href*=\"download\"]";

/// File extensions treated as payload (font outline) files.
pub const PAYLOAD_EXTENSIONS: &[&str] = &["ttf", "otf"];

/// Name of the merged output directory inside the output dir.
pub const MERGED_DIR_NAME: &str = "all_payloads";

/// Name of the download staging directory inside the output dir.
pub const STAGING_DIR_NAME: &str = ".partial";

/// Errors that abort the whole run. Per-item failures never surface here;
/// they are recorded in the stage reports instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The scroll loop ran for its full defensive budget without converging,
    /// which means the pagination mechanism upstream is broken.
    #[error("scroll loop exceeded {0} iterations without converging; listing pagination appears broken")]
    ScrollGuardExceeded(usize),
}

/// A unique reference to one item on the listing: the tile's href,
/// e.g. `/fonts/satoshi`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemRef(String);

impl ItemRef {
    pub fn new(href: impl Into<String>) -> Self {
        Self(href.into())
    }

    /// The raw href, relative to the site base.
    pub fn path(&self) -> &str {
        &self.0
    }

    /// The final path segment, used to name the item's archive.
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl std::fmt::Display for ItemRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of acquiring one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchOutcome {
    /// Archive downloaded and persisted.
    Success,
    /// No download control on the detail page; nothing persisted.
    Skipped,
    /// Download did not complete in time; nothing persisted.
    Failed,
}

/// Per-item record kept by the acquisition stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRecord {
    pub item: ItemRef,
    pub outcome: FetchOutcome,
}

/// Summary of the acquisition stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AcquireReport {
    pub succeeded: u32,
    pub skipped: u32,
    pub failed: u32,
    pub records: Vec<FetchRecord>,
}

impl AcquireReport {
    pub fn record(&mut self, item: ItemRef, outcome: FetchOutcome) {
        match outcome {
            FetchOutcome::Success => self.succeeded += 1,
            FetchOutcome::Skipped => self.skipped += 1,
            FetchOutcome::Failed => self.failed += 1,
        }
        self.records.push(FetchRecord { item, outcome });
    }
}

/// Summary of the normalization stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizeReport {
    /// Archives extracted, flattened, merged and deleted.
    pub archives_processed: u32,
    /// Archives that failed to open; left in place for retry.
    pub archives_failed: u32,
    /// Payload files copied into the merged directory.
    pub files_merged: u32,
    /// Payload files skipped because their name was already present.
    pub duplicates_skipped: u32,
}
