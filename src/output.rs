//! Render output types.

use serde::Serialize;

/// A filled PDF, read into memory before its working files were deleted.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    /// Final PDF bytes.
    pub bytes: Vec<u8>,
    pub stats: RenderStats,
}

/// Sizes and timings collected while rendering one request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RenderStats {
    /// Workspace identifier, also used as the request id in logs.
    pub request_id: String,
    pub template_bytes: usize,
    /// HTML produced by the PDF→HTML converter.
    pub converted_html_bytes: usize,
    /// HTML after sanitising and binding.
    pub bound_html_bytes: usize,
    pub output_bytes: usize,
    pub fetch_duration_ms: u64,
    pub pdf_to_html_duration_ms: u64,
    /// Sanitise plus bind.
    pub templating_duration_ms: u64,
    pub html_to_pdf_duration_ms: u64,
    pub total_duration_ms: u64,
    /// Placeholders referenced by the template with no matching property.
    pub unresolved_properties: Vec<String>,
}
