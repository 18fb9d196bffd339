//! Extraction layer: the LLM oracle that turns chat text and receipt photos
//! into raw structured guesses, plus the force-guess escalation around it.

mod escalate;
mod extractor;
pub mod json;
pub mod prompt;

pub use escalate::{Extraction, extract_entry};
pub use extractor::{ExtractError, Extractor, ImageRef, RawExtraction};

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{HttpExtractor, HttpExtractorConfig};
