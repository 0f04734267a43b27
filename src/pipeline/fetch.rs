//! Template fetching: turn a [`TemplateSource`] into validated PDF bytes.
//!
//! Exactly one attempt is made per request. Retrying belongs to whoever
//! calls the service; the fetcher only bounds the attempt with the client's
//! connect and total timeouts. The body is buffered whole and must start
//! with the `%PDF` magic, so a login page or error document served with a
//! 200 status fails here rather than as a confusing converter error.

use crate::config::RenderConfig;
use crate::error::PdfItError;
use crate::request::TemplateSource;
use std::time::Duration;
use tracing::{debug, info};

const PDF_MAGIC: &[u8] = b"%PDF";

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Downloads templates. Holds a connection pool, no per-request state.
#[derive(Debug, Clone)]
pub struct TemplateFetcher {
    client: reqwest::Client,
    timeout_secs: u64,
    max_bytes: usize,
}

impl TemplateFetcher {
    pub fn new(config: &RenderConfig) -> Result<Self, PdfItError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()
            .map_err(|e| PdfItError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            timeout_secs: config.fetch_timeout_secs,
            max_bytes: config.max_template_bytes,
        })
    }

    /// Resolve `source` to template bytes.
    pub async fn fetch(&self, source: &TemplateSource) -> Result<Vec<u8>, PdfItError> {
        let bytes = match source {
            TemplateSource::Url(url) => self.download(url).await?,
            TemplateSource::Bytes(bytes) => {
                if bytes.len() > self.max_bytes {
                    return Err(PdfItError::InvalidRequest(format!(
                        "Template payload is {} bytes, limit is {}",
                        bytes.len(),
                        self.max_bytes
                    )));
                }
                bytes.clone()
            }
        };
        validate_pdf(&bytes, source)?;
        Ok(bytes)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, PdfItError> {
        if !is_url(url) {
            return Err(PdfItError::InvalidTemplateUrl {
                input: url.to_string(),
            });
        }
        info!("Downloading template from: {}", url);

        let transport_error = |e: reqwest::Error| {
            if e.is_timeout() {
                PdfItError::FetchTimeout {
                    url: url.to_string(),
                    secs: self.timeout_secs,
                }
            } else {
                PdfItError::FetchFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        };

        let response = self.client.get(url).send().await.map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(PdfItError::FetchFailed {
                url: url.to_string(),
                reason: format!("HTTP {}", status),
            });
        }

        if let Some(len) = response.content_length() {
            if len > self.max_bytes as u64 {
                return Err(self.too_large(url, len as usize));
            }
        }

        let bytes = response.bytes().await.map_err(transport_error)?;
        if bytes.len() > self.max_bytes {
            return Err(self.too_large(url, bytes.len()));
        }

        debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }

    fn too_large(&self, url: &str, len: usize) -> PdfItError {
        PdfItError::FetchFailed {
            url: url.to_string(),
            reason: format!("template is {} bytes, limit is {}", len, self.max_bytes),
        }
    }
}

fn validate_pdf(bytes: &[u8], source: &TemplateSource) -> Result<(), PdfItError> {
    if bytes.starts_with(PDF_MAGIC) {
        return Ok(());
    }
    Err(PdfItError::NotAPdf {
        origin: source.describe(),
        magic: bytes.iter().take(PDF_MAGIC.len()).copied().collect(),
    })
}
