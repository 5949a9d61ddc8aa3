//! Discovery loop — walk the infinite-scroll listing until it runs dry.
//!
//! Each iteration reads every currently rendered tile link, keeps the ones
//! not seen before, and either stops (cap reached, or nothing new appeared)
//! or scrolls the newest tile into view to trigger the next batch. The set
//! keeps first-seen order so which items survive a cap is deterministic.

use crate::browser::PageDriver;
use crate::pipeline::{ItemRef, PipelineError, ITEM_LINK_SELECTOR};
use anyhow::Result;
use indicatif::ProgressBar;
use std::collections::HashSet;

/// Defensive ceiling on scroll iterations. The loop terminates on its own
/// (every step either adds a reference or stops); hitting this means the
/// listing keeps rendering "new" references forever and discovery is broken.
pub const MAX_SCROLL_ITERATIONS: usize = 500;

/// Discovery loop configuration.
#[derive(Debug, Clone)]
pub struct DiscoverConfig {
    /// Stop once this many references have been collected. `None` = no limit.
    pub cap: Option<usize>,
    /// How long to wait after a scroll for new tiles to render.
    pub settle_ms: u64,
    /// Defensive iteration ceiling.
    pub max_iterations: usize,
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            cap: None,
            settle_ms: 500,
            max_iterations: MAX_SCROLL_ITERATIONS,
        }
    }
}

/// The discovered references, unique and in first-seen order.
#[derive(Debug, Default)]
pub struct DiscoveredSet {
    seen: HashSet<String>,
    order: Vec<ItemRef>,
}

impl DiscoveredSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a reference, ignoring hrefs already present.
    /// Returns true when the reference was new.
    pub fn insert(&mut self, href: String) -> bool {
        if !self.seen.insert(href.clone()) {
            return false;
        }
        self.order.push(ItemRef::new(href));
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn into_items(self) -> Vec<ItemRef> {
        self.order
    }
}

/// Run the discovery loop against an already-loaded listing page.
///
/// Fatal errors: the page driver failing (browser gone), or the defensive
/// iteration guard tripping. Everything else terminates normally.
pub async fn discover(
    page: &mut dyn PageDriver,
    config: &DiscoverConfig,
    progress: Option<&ProgressBar>,
) -> Result<Vec<ItemRef>> {
    let mut set = DiscoveredSet::new();

    for iteration in 0..config.max_iterations {
        let hrefs = page.collect_attr(ITEM_LINK_SELECTOR, "href").await?;

        let mut fresh = 0usize;
        for href in hrefs {
            if set.insert(href) {
                fresh += 1;
                if let Some(bar) = progress {
                    bar.inc(1);
                }
                if let Some(cap) = config.cap {
                    if set.len() >= cap {
                        tracing::info!(
                            "discovery reached cap of {cap} after {} scroll step(s)",
                            iteration + 1
                        );
                        return Ok(set.into_items());
                    }
                }
            }
        }

        tracing::debug!(
            "scroll step {}: {fresh} new reference(s), {} total",
            iteration + 1,
            set.len()
        );

        if fresh == 0 {
            tracing::info!("no new references rendered; discovery complete with {}", set.len());
            return Ok(set.into_items());
        }

        page.scroll_last_into_view(ITEM_LINK_SELECTOR).await?;
        page.settle(config.settle_ms).await;
    }

    Err(PipelineError::ScrollGuardExceeded(config.max_iterations).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{DownloadHandle, PageDriver};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// A scripted listing. `collect_attr` returns every batch revealed so
    /// far (on a real page earlier tiles stay rendered); `settle` reveals
    /// the next batch, standing in for lazy rendering after a scroll.
    struct FakeListing {
        state: Mutex<ListingState>,
    }

    struct ListingState {
        batches: Vec<Vec<String>>,
        revealed: usize,
        scrolls: usize,
    }

    impl FakeListing {
        fn new(batches: Vec<Vec<&str>>) -> Self {
            Self {
                state: Mutex::new(ListingState {
                    batches: batches
                        .into_iter()
                        .map(|b| b.into_iter().map(String::from).collect())
                        .collect(),
                    revealed: 1,
                    scrolls: 0,
                }),
            }
        }

        fn scrolls(&self) -> usize {
            self.state.lock().unwrap().scrolls
        }
    }

    #[async_trait]
    impl PageDriver for FakeListing {
        async fn navigate(&mut self, _url: &str, _timeout_ms: u64) -> anyhow::Result<()> {
            Ok(())
        }

        async fn settle(&self, _ms: u64) {
            let mut state = self.state.lock().unwrap();
            if state.revealed < state.batches.len() {
                state.revealed += 1;
            }
        }

        async fn collect_attr(&self, _selector: &str, _attr: &str) -> anyhow::Result<Vec<String>> {
            let state = self.state.lock().unwrap();
            let upto = state.revealed.min(state.batches.len());
            Ok(state.batches[..upto].concat())
        }

        async fn scroll_last_into_view(&self, _selector: &str) -> anyhow::Result<bool> {
            self.state.lock().unwrap().scrolls += 1;
            Ok(true)
        }

        async fn click_text(&self, _text: &str) -> anyhow::Result<bool> {
            Ok(false)
        }

        async fn click_selector(&self, _selector: &str) -> anyhow::Result<bool> {
            Ok(false)
        }

        async fn wait_for_download(
            &self,
            _timeout_ms: u64,
        ) -> anyhow::Result<Box<dyn DownloadHandle>> {
            anyhow::bail!("no downloads on the listing page")
        }

        async fn close(self: Box<Self>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn listing(batches: Vec<Vec<&str>>) -> FakeListing {
        FakeListing::new(batches)
    }

    fn cfg(cap: Option<usize>) -> DiscoverConfig {
        DiscoverConfig {
            cap,
            settle_ms: 0,
            max_iterations: MAX_SCROLL_ITERATIONS,
        }
    }

    #[tokio::test]
    async fn collects_until_listing_runs_dry() {
        let mut page = listing(vec![
            vec!["/fonts/a", "/fonts/b"],
            vec!["/fonts/c"],
            vec![], // nothing new -> stop
        ]);
        let items = discover(&mut page, &cfg(None), None).await.unwrap();
        let paths: Vec<&str> = items.iter().map(|i| i.path()).collect();
        assert_eq!(paths, vec!["/fonts/a", "/fonts/b", "/fonts/c"]);
    }

    #[tokio::test]
    async fn cap_truncates_in_first_seen_order_and_stops_early() {
        // cap = 3, listing renders 2 then 4 then 1 new references.
        let mut page = listing(vec![
            vec!["/fonts/a", "/fonts/b"],
            vec!["/fonts/c", "/fonts/d", "/fonts/e", "/fonts/f"],
            vec!["/fonts/g"],
        ]);
        let items = discover(&mut page, &cfg(Some(3)), None).await.unwrap();
        let paths: Vec<&str> = items.iter().map(|i| i.path()).collect();
        assert_eq!(paths, vec!["/fonts/a", "/fonts/b", "/fonts/c"]);
        // Stopped during the second step: exactly one scroll happened.
        assert_eq!(page.scrolls(), 1);
    }

    #[tokio::test]
    async fn duplicates_across_steps_are_not_recounted() {
        let mut page = listing(vec![
            vec!["/fonts/a", "/fonts/b"],
            vec!["/fonts/b", "/fonts/c"],
            vec![],
        ]);
        let items = discover(&mut page, &cfg(None), None).await.unwrap();
        assert_eq!(items.len(), 3);
    }

    #[tokio::test]
    async fn set_size_never_exceeds_cap() {
        for cap in 1..=4usize {
            let mut page = listing(vec![
                vec!["/fonts/a", "/fonts/b", "/fonts/c"],
                vec!["/fonts/d", "/fonts/e"],
                vec![],
            ]);
            let items = discover(&mut page, &cfg(Some(cap)), None).await.unwrap();
            assert!(items.len() <= cap);
            assert_eq!(items.len(), cap.min(5));
        }
    }

    /// A pathological listing that renders a never-before-seen reference on
    /// every read, so the loop can only stop via the guard.
    struct EndlessListing(std::sync::atomic::AtomicUsize);

    #[async_trait]
    impl PageDriver for EndlessListing {
        async fn navigate(&mut self, _url: &str, _timeout_ms: u64) -> anyhow::Result<()> {
            Ok(())
        }

        async fn settle(&self, _ms: u64) {}

        async fn collect_attr(&self, _selector: &str, _attr: &str) -> anyhow::Result<Vec<String>> {
            let n = self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(vec![format!("/fonts/generated-{n}")])
        }

        async fn scroll_last_into_view(&self, _selector: &str) -> anyhow::Result<bool> {
            Ok(true)
        }

        async fn click_text(&self, _text: &str) -> anyhow::Result<bool> {
            Ok(false)
        }

        async fn click_selector(&self, _selector: &str) -> anyhow::Result<bool> {
            Ok(false)
        }

        async fn wait_for_download(
            &self,
            _timeout_ms: u64,
        ) -> anyhow::Result<Box<dyn DownloadHandle>> {
            anyhow::bail!("no downloads on the listing page")
        }

        async fn close(self: Box<Self>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn broken_pagination_trips_the_guard() {
        let mut page = EndlessListing(std::sync::atomic::AtomicUsize::new(0));
        let config = DiscoverConfig {
            cap: None,
            settle_ms: 0,
            max_iterations: 10,
        };
        let err = discover(&mut page, &config, None).await.unwrap_err();
        let fatal = err.downcast_ref::<PipelineError>();
        assert!(matches!(fatal, Some(PipelineError::ScrollGuardExceeded(10))));
    }

    #[test]
    fn item_ref_name_is_final_segment() {
        assert_eq!(ItemRef::new("/fonts/satoshi").name(), "satoshi");
        assert_eq!(ItemRef::new("satoshi").name(), "satoshi");
    }
}
