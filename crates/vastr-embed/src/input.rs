use std::time::Duration;

use base64::Engine;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;

use crate::error::ExtractionError;

/// Where an image comes from.
#[derive(Debug, Clone)]
pub enum ImageInput {
    Bytes(Vec<u8>),
    /// Plain base64, or a `data:` URL.
    Base64(String),
    Url(String),
}

pub fn decode_base64(payload: &str) -> Result<Vec<u8>, ExtractionError> {
    let trimmed = payload.trim();
    let data = match trimmed.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map(|(_, d)| d).ok_or_else(|| ExtractionError::InvalidBase64("data url without payload".into()))?,
        None => trimmed,
    };
    if data.is_empty() { return Err(ExtractionError::EmptyInput); }
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| ExtractionError::InvalidBase64(e.to_string()))
}

/// Downloads a product image. One attempt, no retries.
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    timeout: Duration,
}

impl ImageFetcher {
    pub fn new(timeout: Duration) -> Self { Self { timeout } }

    pub fn fetch(&self, url: &str) -> Result<Vec<u8>, ExtractionError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ExtractionError::InvalidUrl(url.to_string()));
        }
        let fail = |e: reqwest::Error| ExtractionError::Fetch { url: url.to_string(), reason: e.to_string() };
        let client = Client::builder().timeout(self.timeout).build().map_err(fail)?;
        let response = client.get(url).send().map_err(fail)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExtractionError::HttpStatus { url: url.to_string(), status: status.as_u16() });
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.to_ascii_lowercase().starts_with("image/") {
            return Err(ExtractionError::NotAnImage { url: url.to_string(), content_type });
        }
        let bytes = response.bytes().map_err(fail)?;
        tracing::debug!(url, bytes = bytes.len(), "image fetched");
        Ok(bytes.to_vec())
    }

    pub fn resolve(&self, input: &ImageInput) -> Result<Vec<u8>, ExtractionError> {
        match input {
            ImageInput::Bytes(b) if b.is_empty() => Err(ExtractionError::EmptyInput),
            ImageInput::Bytes(b) => Ok(b.clone()),
            ImageInput::Base64(s) => decode_base64(s),
            ImageInput::Url(u) => self.fetch(u),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_accepts_data_urls() {
        assert_eq!(decode_base64("aGVsbG8=").unwrap(), b"hello");
        assert_eq!(decode_base64("data:image/png;base64,aGVsbG8=").unwrap(), b"hello");
        assert!(matches!(decode_base64("data:image/png;base64"), Err(ExtractionError::InvalidBase64(_))));
        assert!(matches!(decode_base64("%%%"), Err(ExtractionError::InvalidBase64(_))));
        assert!(matches!(decode_base64("  "), Err(ExtractionError::EmptyInput)));
    }

    #[test]
    fn non_http_urls_are_rejected_before_fetching() {
        let fetcher = ImageFetcher::new(Duration::from_secs(1));
        assert!(matches!(fetcher.fetch("file:///etc/passwd"), Err(ExtractionError::InvalidUrl(_))));
        assert!(matches!(fetcher.resolve(&ImageInput::Url("ftp://x/y.jpg".into())), Err(ExtractionError::InvalidUrl(_))));
    }
}
