//! Scroll-driven content loading
//!
//! Drives a live page until its content stops growing. After an initial
//! settle wait the driver scrolls one viewport at a time, screenshotting
//! after each step. Reaching the bottom starts a single long grace wait:
//! unchanged document height means the content is exhausted, growth earns
//! exactly one more screenshot/scroll cycle before re-evaluating. A hard
//! cycle ceiling bounds pathological feeds.

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::domain::session::ScrollState;
use crate::infrastructure::config::ScrollProfile;

/// Live page control surface. Only transports that keep a scriptable page
/// open implement this; the HTTP proxy transport does not.
#[async_trait]
pub trait PageHandle: Send {
    async fn viewport_height(&mut self) -> Result<u32>;
    async fn scroll_position(&mut self) -> Result<u32>;
    async fn document_height(&mut self) -> Result<u32>;
    async fn scroll_to(&mut self, y: u32) -> Result<()>;
    async fn screenshot(&mut self) -> Result<Vec<u8>>;
    async fn content(&mut self) -> Result<String>;
    async fn title(&mut self) -> Result<String>;
}

/// Everything the driver materialized from one page.
#[derive(Debug)]
pub struct LoadedContent {
    pub html: String,
    pub title: String,
    pub screenshots: Vec<Vec<u8>>,
    pub state: ScrollState,
}

/// Runs the scroll loop over a `PageHandle` with the timing of one
/// `ScrollProfile`.
pub struct ContentLoader {
    profile: ScrollProfile,
    cancellation: CancellationToken,
}

impl ContentLoader {
    pub fn new(profile: ScrollProfile, cancellation: CancellationToken) -> Self {
        Self { profile, cancellation }
    }

    async fn wait(&self, ms: u64) -> Result<()> {
        tokio::select! {
            _ = self.cancellation.cancelled() => bail!("content loading cancelled"),
            _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(()),
        }
    }

    /// Drive the page to content exhaustion and return its final state.
    pub async fn load(&self, page: &mut dyn PageHandle) -> Result<LoadedContent> {
        let mut state = ScrollState::default();
        let mut screenshots = Vec::new();

        self.wait(self.profile.initial_settle_ms).await?;
        screenshots.push(page.screenshot().await?);
        state.screenshots_taken += 1;

        loop {
            if state.scroll_count >= self.profile.max_cycles {
                info!("scroll ceiling of {} cycles reached", self.profile.max_cycles);
                break;
            }

            let viewport = page.viewport_height().await?;
            let position = page.scroll_position().await?;
            let height = page.document_height().await?;
            state.last_document_height = height;

            if position.saturating_add(viewport) >= height {
                // Bottom of the page. One long grace wait decides whether
                // more content is still arriving.
                debug!("at document bottom (height {height}), grace wait");
                self.wait(self.profile.bottom_grace_ms).await?;
                let regrown = page.document_height().await?;
                if regrown <= height {
                    state.stable_poll_count += 1;
                    info!(
                        "content exhausted after {} scroll cycles (height {height})",
                        state.scroll_count
                    );
                    break;
                }
                debug!("height grew {height} -> {regrown}, one more cycle");
                state.last_document_height = regrown;
            }

            page.scroll_to(position.saturating_add(viewport)).await?;
            state.scroll_count += 1;
            self.wait(self.profile.settle_ms).await?;
            screenshots.push(page.screenshot().await?);
            state.screenshots_taken += 1;
        }

        Ok(LoadedContent {
            html: page.content().await?,
            title: page.title().await?,
            screenshots,
            state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Simulated page: a scripted sequence of document heights, advanced
    /// once per bottom-grace re-measurement.
    struct FakePage {
        viewport: u32,
        position: u32,
        heights: Vec<u32>,
        height_reads: usize,
        scroll_targets: Vec<u32>,
        screenshots: u32,
    }

    impl FakePage {
        fn new(viewport: u32, heights: Vec<u32>) -> Self {
            Self {
                viewport,
                position: 0,
                heights,
                height_reads: 0,
                scroll_targets: Vec::new(),
                screenshots: 0,
            }
        }

        fn current_height(&self) -> u32 {
            let i = self.height_reads.min(self.heights.len() - 1);
            self.heights[i]
        }
    }

    #[async_trait]
    impl PageHandle for FakePage {
        async fn viewport_height(&mut self) -> Result<u32> {
            Ok(self.viewport)
        }
        async fn scroll_position(&mut self) -> Result<u32> {
            Ok(self.position)
        }
        async fn document_height(&mut self) -> Result<u32> {
            let h = self.current_height();
            self.height_reads += 1;
            Ok(h)
        }
        async fn scroll_to(&mut self, y: u32) -> Result<()> {
            self.position = y.min(self.current_height());
            self.scroll_targets.push(y);
            Ok(())
        }
        async fn screenshot(&mut self) -> Result<Vec<u8>> {
            self.screenshots += 1;
            Ok(vec![0u8; 4])
        }
        async fn content(&mut self) -> Result<String> {
            Ok("<html></html>".to_string())
        }
        async fn title(&mut self) -> Result<String> {
            Ok("feed".to_string())
        }
    }

    fn fast_profile(max_cycles: u32) -> ScrollProfile {
        ScrollProfile {
            initial_settle_ms: 1,
            settle_ms: 1,
            bottom_grace_ms: 1,
            max_cycles,
        }
    }

    #[tokio::test]
    async fn static_page_terminates_with_at_most_one_extra_scroll() {
        // Height never changes; the driver must stop after reaching the
        // bottom once.
        let mut page = FakePage::new(800, vec![1000, 1000, 1000, 1000]);
        let loader = ContentLoader::new(fast_profile(50), CancellationToken::new());
        let loaded = loader.load(&mut page).await.unwrap();
        assert!(loaded.state.scroll_count <= 1, "scrolled {} times", loaded.state.scroll_count);
        assert_eq!(loaded.state.stable_poll_count, 1);
        assert_eq!(loaded.state.last_document_height, 1000);
    }

    #[tokio::test]
    async fn growth_after_grace_earns_exactly_one_more_cycle() {
        // Reads: cycle 1 height=1000 (not at bottom), scroll to 800;
        // cycle 2 reaches the bottom, grace re-read sees 2000 -> exactly one
        // extra scroll; the re-evaluation sees 2000 stable -> terminate.
        let mut page = FakePage::new(800, vec![1000, 1000, 2000, 2000, 2000]);
        let loader = ContentLoader::new(fast_profile(50), CancellationToken::new());
        let loaded = loader.load(&mut page).await.unwrap();
        assert_eq!(loaded.state.scroll_count, 2);
        assert_eq!(page.scroll_targets, vec![800, 1600]);
        assert_eq!(loaded.state.last_document_height, 2000);
        // Initial screenshot plus one per scroll cycle.
        assert_eq!(loaded.state.screenshots_taken, 3);
        assert_eq!(loaded.screenshots.len(), 3);
    }

    #[tokio::test]
    async fn cycle_ceiling_bounds_endless_feeds() {
        // Height always one viewport ahead of the scroll position.
        struct EndlessPage {
            position: u32,
        }
        #[async_trait]
        impl PageHandle for EndlessPage {
            async fn viewport_height(&mut self) -> Result<u32> {
                Ok(500)
            }
            async fn scroll_position(&mut self) -> Result<u32> {
                Ok(self.position)
            }
            async fn document_height(&mut self) -> Result<u32> {
                Ok(self.position + 1000)
            }
            async fn scroll_to(&mut self, y: u32) -> Result<()> {
                self.position = y;
                Ok(())
            }
            async fn screenshot(&mut self) -> Result<Vec<u8>> {
                Ok(Vec::new())
            }
            async fn content(&mut self) -> Result<String> {
                Ok(String::new())
            }
            async fn title(&mut self) -> Result<String> {
                Ok(String::new())
            }
        }

        let mut page = EndlessPage { position: 0 };
        let loader = ContentLoader::new(fast_profile(7), CancellationToken::new());
        let loaded = loader.load(&mut page).await.unwrap();
        assert_eq!(loaded.state.scroll_count, 7);
    }

    #[tokio::test]
    async fn cancellation_aborts_the_loop() {
        let mut page = FakePage::new(800, vec![1000; 8]);
        let token = CancellationToken::new();
        token.cancel();
        let loader = ContentLoader::new(fast_profile(50), CancellationToken::clone(&token));
        assert!(loader.load(&mut page).await.is_err());
    }
}
