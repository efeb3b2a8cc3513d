#![deny(missing_docs)]
//! Past paper search core library.
//!
//! Scrapes a past paper site, walks the user through two numbered choices
//! over an abstract chat channel and delivers the chosen file.

/// Fetch + extract composition for the search site.
pub mod catalog;
/// Delivery channel capability and chat identifiers.
pub mod channel;
/// Configuration management.
pub mod config;
/// Multi-turn selection state machine.
pub mod controller;
/// HTML candidate extraction.
pub mod extract;
/// Outbound HTTP fetching.
pub mod fetcher;
/// User-facing texts and prompt rendering.
pub mod prompts;
/// Correlated one-shot reply routing.
pub mod replies;

pub use catalog::PastPaperCatalog;
pub use controller::{Invocation, SelectionController, SelectionState, SessionOutcome};
pub use replies::ReplyRouter;
