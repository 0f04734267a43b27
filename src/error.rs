//! Error types for the pdfit library.
//!
//! Every failure in the render pipeline is fatal for its request, so there
//! is a single error type, [`PdfItError`]. Each variant knows which pipeline
//! [`FailureStage`] it belongs to; the HTTP layer uses that to pick a status
//! code and to tell the caller *where* the request broke (template host,
//! converter, templating or local disk).

use crate::pipeline::external::ConversionKind;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the pdfit library.
#[derive(Debug, Error)]
pub enum PdfItError {
    // ── Request errors ────────────────────────────────────────────────────
    /// The incoming request could not be turned into a render request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The template URL is not an HTTP/HTTPS URL.
    #[error("Invalid template URL '{input}': expected an http:// or https:// URL")]
    InvalidTemplateUrl { input: String },

    /// The whole request exceeded its deadline.
    #[error("Request timed out after {secs}s")]
    RequestTimeout { secs: u64 },

    // ── Fetch errors ──────────────────────────────────────────────────────
    /// The template host answered with a non-success status, or the
    /// transport failed.
    #[error("Failed to fetch template '{url}': {reason}")]
    FetchFailed { url: String, reason: String },

    /// The template download exceeded the configured timeout.
    #[error("Template download timed out after {secs}s for '{url}'")]
    FetchTimeout { url: String, secs: u64 },

    /// The template payload does not start with the PDF magic bytes.
    #[error("Template from {origin} is not a PDF\nFirst bytes: {magic:?}")]
    NotAPdf { origin: String, magic: Vec<u8> },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// The external converter exited non-zero, could not be launched, or
    /// did not produce its output file.
    #[error(
        "{stage} conversion failed (exit code: {})\n{stderr}",
        .exit_code.map(|c| c.to_string()).unwrap_or_else(|| "none".into())
    )]
    ConversionFailed {
        stage: ConversionKind,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The external converter ran longer than the configured timeout and
    /// was killed.
    #[error("{stage} conversion timed out after {secs}s")]
    ConversionTimeout { stage: ConversionKind, secs: u64 },

    // ── Templating errors ─────────────────────────────────────────────────
    /// A placeholder expression in the template is malformed.
    #[error(
        "Template syntax error{}: {detail}",
        .line.map(|l| format!(" on line {l}")).unwrap_or_default()
    )]
    TemplateSyntax { line: Option<usize>, detail: String },

    /// The template parsed but could not be rendered (unknown filter,
    /// missing property under the strict policy, ...).
    #[error("Template rendering failed: {detail}")]
    TemplateRender { detail: String },

    // ── Workspace errors ──────────────────────────────────────────────────
    /// Reading, writing or deleting a working file failed.
    #[error("Workspace I/O failed for '{path}': {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PdfItError {
    /// Shorthand for a [`PdfItError::Workspace`] error on `path`.
    pub fn workspace(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PdfItError::Workspace {
            path: path.into(),
            source,
        }
    }

    /// The pipeline stage this error belongs to.
    pub fn stage(&self) -> FailureStage {
        match self {
            PdfItError::InvalidRequest(_)
            | PdfItError::InvalidTemplateUrl { .. }
            | PdfItError::RequestTimeout { .. } => FailureStage::Request,
            PdfItError::FetchFailed { .. }
            | PdfItError::FetchTimeout { .. }
            | PdfItError::NotAPdf { .. } => FailureStage::Fetch,
            PdfItError::ConversionFailed { .. } | PdfItError::ConversionTimeout { .. } => {
                FailureStage::Conversion
            }
            PdfItError::TemplateSyntax { .. } | PdfItError::TemplateRender { .. } => {
                FailureStage::Templating
            }
            PdfItError::Workspace { .. } => FailureStage::Workspace,
            PdfItError::InvalidConfig(_) | PdfItError::Internal(_) => FailureStage::Internal,
        }
    }

    /// Stable machine-readable error code, used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            PdfItError::InvalidRequest(_) => "InvalidRequest",
            PdfItError::InvalidTemplateUrl { .. } => "InvalidTemplateUrl",
            PdfItError::RequestTimeout { .. } => "RequestTimeout",
            PdfItError::FetchFailed { .. } => "FetchFailed",
            PdfItError::FetchTimeout { .. } => "FetchTimeout",
            PdfItError::NotAPdf { .. } => "NotAPdf",
            PdfItError::ConversionFailed { .. } => "ConversionFailed",
            PdfItError::ConversionTimeout { .. } => "ConversionTimeout",
            PdfItError::TemplateSyntax { .. } => "TemplateSyntaxError",
            PdfItError::TemplateRender { .. } => "TemplateRenderError",
            PdfItError::Workspace { .. } => "WorkspaceError",
            PdfItError::InvalidConfig(_) => "InvalidConfig",
            PdfItError::Internal(_) => "Internal",
        }
    }
}

/// Coarse classification of where a request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Request,
    Fetch,
    Conversion,
    Templating,
    Workspace,
    Internal,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureStage::Request => "request",
            FailureStage::Fetch => "fetch",
            FailureStage::Conversion => "conversion",
            FailureStage::Templating => "templating",
            FailureStage::Workspace => "workspace",
            FailureStage::Internal => "internal",
        };
        f.write_str(s)
    }
}
