//! Page acquisition and visible-text extraction.
//!
//! - [`fetch::Extractor`]: one GET with a browser-like identity, then
//!   extraction; implements [`fetch::PageScraper`]
//! - [`extract`]: pure HTML → normalized plain-text functions
//!
//! The text normalisation splits lines on runs of two spaces to pull apart
//! headlines that markup collapsed onto one line. That is a heuristic and
//! results are best-effort.

pub mod extract;
pub mod fetch;

pub use fetch::{Extractor, PageScraper};
