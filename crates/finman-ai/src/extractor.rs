use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value};
use thiserror::Error;

/// Raw key-value guess as returned by the model, before normalization.
pub type RawExtraction = Map<String, Value>;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("model output is not a JSON object: {0}")]
    Unparseable(String),
    #[error("extractor backend failed: {0}")]
    Backend(String),
    #[error("extractor misconfigured: {0}")]
    Config(String),
}

impl ExtractError {
    /// The model answered, but not with anything usable.
    pub fn is_unparseable(&self) -> bool {
        matches!(self, Self::Unparseable(_))
    }
}

/// A receipt photo carried through a conversation unchanged.
///
/// Cloning shares the underlying bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub media_type: String,
    pub bytes: Arc<[u8]>,
}

impl ImageRef {
    pub fn new(media_type: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }

    /// `data:` URL suitable for an image content part.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, STANDARD.encode(&self.bytes))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageRef")
            .field("media_type", &self.media_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Opaque oracle turning free text and/or an image into a raw field guess.
///
/// Implementations may be slow and may fail. `force_guess` asks the model to
/// commit to a value for every field instead of leaving gaps.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(
        &self,
        text: &str,
        image: Option<&ImageRef>,
        force_guess: bool,
    ) -> Result<RawExtraction, ExtractError>;
}
