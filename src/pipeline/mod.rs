//! Pipeline stages for template rendering.
//!
//! Each submodule implements one step. The orchestrator in
//! [`crate::render`] runs them in order against one [`workspace::Workspace`].
//!
//! ## Data Flow
//!
//! ```text
//! fetch ──▶ external ──▶ sanitize ──▶ bind ──▶ external
//! (bytes)   (PDF→HTML)   (strip)     (fill)   (HTML→PDF)
//! ```
//!
//! 1. [`fetch`]:     download the template (or accept inline bytes) and
//!    check the PDF magic
//! 2. [`external`]:  run the PDF→HTML converter into the work directory
//! 3. [`sanitize`]:  strip spans, scripts and viewer chrome so placeholder
//!    text is contiguous and scripts cannot carry bound values
//! 4. [`bind`]:      substitute placeholders with request properties
//! 5. [`external`]:  print the bound HTML back to PDF
//!
//! [`workspace`] owns the three working files for the lifetime of a request.

pub mod bind;
pub mod external;
pub mod fetch;
pub mod sanitize;
pub mod workspace;
