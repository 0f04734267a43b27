//! # pdfit
//!
//! Fill PDF templates with request data.
//!
//! A template is an ordinary PDF whose text contains placeholders such as
//! `{{ klantnaam }}`. pdfit converts it to HTML, strips the markup that would
//! split or leak those placeholders, substitutes the request's properties and
//! prints the result back to PDF.
//!
//! ## Pipeline Overview
//!
//! ```text
//! template URL
//!  │
//!  ├─ 1. Fetch     download once, check the %PDF magic
//!  ├─ 2. Convert   pdf2htmlEX --zoom 1.4   (external process)
//!  ├─ 3. Sanitise  drop spans, scripts and viewer chrome
//!  ├─ 4. Bind      {{ name }} → property value
//!  ├─ 5. Convert   phantomjs rasterize.js  (external process)
//!  └─ 6. Output    PDF bytes + RenderStats, working files deleted
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfit::{PropertySet, RenderConfig, RenderRequest, Renderer, TemplateSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let renderer = Renderer::new(RenderConfig::default())?;
//!     let request = RenderRequest::new(
//!         TemplateSource::Url("https://example.org/Factuur_template.pdf".into()),
//!         PropertySet::new()
//!             .with("klantnaam", "Belfius")
//!             .with("gemeente", "Edegem"),
//!     );
//!     let document = renderer.render(request).await?;
//!     std::fs::write("factuur.pdf", &document.bytes)?;
//!     eprintln!("unresolved: {:?}", document.stats.unresolved_properties);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfit` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdfit = { version = "0.1", default-features = false }
//! ```
//!
//! ## External tools
//!
//! Both converters must be installed and on `PATH` (or configured with an
//! absolute path). `phantomjs` needs its `rasterize.js` script, passed as a
//! leading argument of [`RenderConfig::html_to_pdf`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod render;
pub mod request;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ConverterCommand, MissingPropertyPolicy, Orientation, PageOptions, RenderConfig,
    RenderConfigBuilder, ServerConfig,
};
pub use error::{FailureStage, PdfItError};
pub use output::{RenderStats, RenderedDocument};
pub use pipeline::sanitize::{SanitizeRule, Sanitizer};
pub use render::{render_sync, Renderer, Stage};
pub use request::{PropertySet, RenderRequest, TemplateSource};
pub use server::{router, serve, AppState};
