//! HTML candidate extraction
//!
//! Turns a search-results page into `SearchResult`s and a result page into
//! `FileCandidate`s. Extraction never fails at call time: a document that
//! matches nothing yields an empty list.

use crate::config::ScraperSettings;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Structural selector for thumbnail links on the search page.
pub const THUMBNAIL_SELECTOR: &str = ".td-module-thumb a";

/// One entry of the search-results list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Result title, taken from the anchor's `title` attribute
    pub title: String,
    /// Result page URL, taken from the anchor's `href` attribute
    pub url: String,
}

/// One downloadable file found on a result page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCandidate {
    /// Anchor text with whitespace runs collapsed
    pub name: String,
    /// Link to the file host, not validated
    pub link: String,
}

/// Errors raised while building an extractor
#[derive(Debug, Error)]
pub enum ExtractError {
    /// A CSS selector failed to parse
    #[error("Invalid selector `{selector}`: {reason}")]
    InvalidSelector {
        /// Selector source text
        selector: String,
        /// Parser message
        reason: String,
    },
}

/// Parsing strategy from raw HTML to candidate lists.
pub trait PageExtractor: Send + Sync {
    /// Extract search results in document order.
    fn search_results(&self, html: &str) -> Vec<SearchResult>;

    /// Extract file links in document order.
    fn files(&self, html: &str) -> Vec<FileCandidate>;
}

/// CSS-selector based extractor.
#[derive(Debug, Clone)]
pub struct SelectorExtractor {
    thumbnail: Selector,
    file_anchor: Selector,
}

impl SelectorExtractor {
    /// Build an extractor matching thumbnails and links to `file_host_domain`.
    ///
    /// # Errors
    ///
    /// Returns `ExtractError::InvalidSelector` if the domain produces an
    /// unparsable attribute selector.
    pub fn new(file_host_domain: &str) -> Result<Self, ExtractError> {
        let file_anchor = format!("a[href*=\"{file_host_domain}\"]");
        Ok(Self {
            thumbnail: parse_selector(THUMBNAIL_SELECTOR)?,
            file_anchor: parse_selector(&file_anchor)?,
        })
    }

    /// Build an extractor from settings.
    ///
    /// # Errors
    ///
    /// See [`SelectorExtractor::new`].
    pub fn from_settings(settings: &ScraperSettings) -> Result<Self, ExtractError> {
        Self::new(&settings.file_host_domain)
    }
}

fn parse_selector(source: &str) -> Result<Selector, ExtractError> {
    Selector::parse(source).map_err(|e| ExtractError::InvalidSelector {
        selector: source.to_string(),
        reason: e.to_string(),
    })
}

impl PageExtractor for SelectorExtractor {
    fn search_results(&self, html: &str) -> Vec<SearchResult> {
        let document = Html::parse_document(html);
        let results: Vec<SearchResult> = document
            .select(&self.thumbnail)
            .filter_map(|anchor| {
                let title = non_empty_attr(anchor, "title")?;
                let url = non_empty_attr(anchor, "href")?;
                Some(SearchResult {
                    title: title.to_string(),
                    url: url.to_string(),
                })
            })
            .collect();

        debug!(count = results.len(), "Extracted search results");
        results
    }

    fn files(&self, html: &str) -> Vec<FileCandidate> {
        let document = Html::parse_document(html);
        let files: Vec<FileCandidate> = document
            .select(&self.file_anchor)
            .filter_map(|anchor| {
                let link = anchor.value().attr("href")?;
                Some(FileCandidate {
                    name: normalize_whitespace(anchor.text()),
                    link: link.to_string(),
                })
            })
            .collect();

        debug!(count = files.len(), "Extracted file links");
        files
    }
}

fn non_empty_attr<'a>(element: ElementRef<'a>, name: &str) -> Option<&'a str> {
    element.value().attr(name).filter(|v| !v.is_empty())
}

/// Collapse whitespace runs to single spaces and trim the ends.
pub fn normalize_whitespace<'a, I>(parts: I) -> String
where
    I: Iterator<Item = &'a str>,
{
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
