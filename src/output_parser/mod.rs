//! # Structured output extraction
//!
//! Turns free-form model replies into JSON values. Models wrap their answers
//! in prose, reasoning blocks, and markdown fences; the extractor peels those
//! layers off in a fixed priority order and parses what is left.
//!
//! | Item | Purpose |
//! |------|---------|
//! | [`extract`] | Reply text → `serde_json::Value` |
//! | [`extract_as`] | Reply text → typed struct |
//! | [`Shape`] | Post-extraction shape normalization |
//! | [`strip_think_tags`] | Remove `<think>` blocks from text |
//! | [`ExtractionFailure`] | Failure value carrying the raw reply |

pub mod error;
pub mod extract;
pub mod json;
pub mod shape;

pub use error::ExtractionFailure;
pub use extract::{preprocess, strip_think_tags};
pub use json::{extract, extract_as, extract_with_source, Source};
pub use shape::Shape;
