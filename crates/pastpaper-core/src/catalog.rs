//! Past paper catalog: fetch + extract for the two scrape stages.

use crate::config::ScraperSettings;
use crate::extract::{FileCandidate, PageExtractor, SearchResult};
use crate::fetcher::{FetchError, PageFetcher};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Combines a fetcher and an extractor against one search site.
#[derive(Clone)]
pub struct PastPaperCatalog {
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn PageExtractor>,
    search_base_url: String,
}

impl PastPaperCatalog {
    /// Create a catalog searching `settings.search_base_url`.
    #[must_use]
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<dyn PageExtractor>,
        settings: &ScraperSettings,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            search_base_url: settings.search_base_url.clone(),
        }
    }

    /// Search URL for `query`, percent-encoded like `encodeURIComponent`.
    #[must_use]
    pub fn search_url(&self, query: &str) -> String {
        format!("{}?s={}", self.search_base_url, urlencoding::encode(query))
    }

    /// Search the site for `query`.
    ///
    /// # Errors
    ///
    /// Returns the `FetchError` if the search page cannot be retrieved.
    /// A page without matches is `Ok` with an empty list.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, FetchError> {
        let url = self.search_url(query);
        let html = self.fetcher.fetch(&url).await?;
        let results = self.extractor.search_results(&html);
        if results.is_empty() {
            warn!(%url, "Search page matched no result thumbnails");
        } else {
            debug!(count = results.len(), "Search completed");
        }
        Ok(results)
    }

    /// List downloadable files on a result page.
    ///
    /// # Errors
    ///
    /// Returns the `FetchError` if the page cannot be retrieved.
    #[instrument(skip(self))]
    pub async fn files(&self, page_url: &str) -> Result<Vec<FileCandidate>, FetchError> {
        let html = self.fetcher.fetch(page_url).await?;
        let files = self.extractor.files(&html);
        if files.is_empty() {
            warn!("Result page matched no file links");
        } else {
            debug!(count = files.len(), "File listing completed");
        }
        Ok(files)
    }
}
