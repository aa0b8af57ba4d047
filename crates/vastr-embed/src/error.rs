use thiserror::Error;

/// Why an image could not be turned into an embedding.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("empty image payload")]
    EmptyInput,
    #[error("invalid base64 payload: {0}")]
    InvalidBase64(String),
    #[error("could not decode image: {0}")]
    Decode(String),
    #[error("unsupported image url: {0}")]
    InvalidUrl(String),
    #[error("fetching {url} failed: {reason}")]
    Fetch { url: String, reason: String },
    #[error("fetching {url} returned status {status}")]
    HttpStatus { url: String, status: u16 },
    #[error("{url} is not an image (content-type {content_type:?})")]
    NotAnImage { url: String, content_type: String },
    #[error("encoder failed: {0}")]
    Encoder(String),
}

impl From<candle_core::Error> for ExtractionError {
    fn from(e: candle_core::Error) -> Self { ExtractionError::Encoder(e.to_string()) }
}

impl From<anyhow::Error> for ExtractionError {
    fn from(e: anyhow::Error) -> Self { ExtractionError::Encoder(format!("{e:#}")) }
}
