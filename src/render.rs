//! Render entry points.
//!
//! One call to [`Renderer::render`] walks a single request through every
//! pipeline stage:
//!
//! ```text
//! Start → TemplateFetched → PdfWritten → HtmlConverted → Sanitized
//!       → Bound → HtmlRewritten → PdfConverted → Done
//! ```
//!
//! Any stage may instead end in [`Stage::Failed`]. The request's
//! [`Workspace`] is released on every exit path: explicitly after success or
//! failure, and through its `Drop` impl when the render future is cancelled.

use crate::config::RenderConfig;
use crate::error::{FailureStage, PdfItError};
use crate::output::{RenderStats, RenderedDocument};
use crate::pipeline::bind::PropertyBinder;
use crate::pipeline::external::ConversionJob;
use crate::pipeline::fetch::TemplateFetcher;
use crate::pipeline::sanitize::Sanitizer;
use crate::pipeline::workspace::Workspace;
use crate::request::RenderRequest;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Position of a request in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    TemplateFetched,
    PdfWritten,
    HtmlConverted,
    Sanitized,
    Bound,
    HtmlRewritten,
    PdfConverted,
    Done,
    Failed(FailureStage),
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Failed(_))
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Start => f.write_str("start"),
            Stage::TemplateFetched => f.write_str("template-fetched"),
            Stage::PdfWritten => f.write_str("pdf-written"),
            Stage::HtmlConverted => f.write_str("html-converted"),
            Stage::Sanitized => f.write_str("sanitized"),
            Stage::Bound => f.write_str("bound"),
            Stage::HtmlRewritten => f.write_str("html-rewritten"),
            Stage::PdfConverted => f.write_str("pdf-converted"),
            Stage::Done => f.write_str("done"),
            Stage::Failed(reason) => write!(f, "failed({})", reason),
        }
    }
}

/// Logs every stage transition of one request with its elapsed time.
struct StageTracker<'a> {
    request_id: &'a str,
    stage: Stage,
    started: Instant,
    entered: Instant,
}

impl<'a> StageTracker<'a> {
    fn new(request_id: &'a str) -> Self {
        let now = Instant::now();
        Self {
            request_id,
            stage: Stage::Start,
            started: now,
            entered: now,
        }
    }

    fn advance(&mut self, next: Stage) {
        debug!(
            "[{}] {} → {} in {:?}",
            self.request_id,
            self.stage,
            next,
            self.entered.elapsed()
        );
        self.stage = next;
        self.entered = Instant::now();
    }

    fn fail(&mut self, err: &PdfItError) {
        warn!(
            "[{}] render failed after stage '{}' ({:?} elapsed): {}",
            self.request_id,
            self.stage,
            self.started.elapsed(),
            err
        );
        self.stage = Stage::Failed(err.stage());
    }
}

struct Shared {
    config: RenderConfig,
    fetcher: TemplateFetcher,
    sanitizer: Sanitizer,
    binder: PropertyBinder,
}

/// Renders templates into filled PDFs.
///
/// Cloning is cheap: all state sits behind one `Arc` and none of it is
/// mutated by a render, so a single `Renderer` serves every concurrent
/// request.
#[derive(Clone)]
pub struct Renderer {
    shared: Arc<Shared>,
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("config", &self.shared.config)
            .finish()
    }
}

impl Renderer {
    pub fn new(config: RenderConfig) -> Result<Self, PdfItError> {
        let fetcher = TemplateFetcher::new(&config)?;
        let sanitizer = Sanitizer::new(config.sanitize_rules.clone());
        let binder = PropertyBinder::from_config(&config);
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                fetcher,
                sanitizer,
                binder,
            }),
        })
    }

    pub fn config(&self) -> &RenderConfig {
        &self.shared.config
    }

    /// Fetch, convert, fill and re-print one template.
    ///
    /// # Errors
    /// Every stage failure is fatal and returned as-is. A failure to delete
    /// the working files afterwards is logged and never replaces the result.
    pub async fn render(&self, request: RenderRequest) -> Result<RenderedDocument, PdfItError> {
        let config = &self.shared.config;
        tokio::fs::create_dir_all(&config.work_dir)
            .await
            .map_err(|e| PdfItError::workspace(&config.work_dir, e))?;
        // Paths handed to converters must not depend on their working
        // directory.
        let root = tokio::fs::canonicalize(&config.work_dir)
            .await
            .map_err(|e| PdfItError::workspace(&config.work_dir, e))?;

        let mut workspace = Workspace::allocate(&root);
        let request_id = workspace.id().to_string();
        let mut tracker = StageTracker::new(&request_id);
        info!(
            "[{}] Rendering template {} with {} properties",
            request_id,
            request.source.describe(),
            request.properties.len()
        );

        let result = self.run_stages(&request, &workspace, &mut tracker).await;

        if let Err(e) = workspace.release().await {
            warn!("[{}] Failed to remove working files: {}", request_id, e);
        }

        match result {
            Ok(document) => {
                tracker.advance(Stage::Done);
                info!(
                    "[{}] Render complete: {} bytes in {}ms",
                    request_id, document.stats.output_bytes, document.stats.total_duration_ms
                );
                Ok(document)
            }
            Err(e) => {
                tracker.fail(&e);
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        request: &RenderRequest,
        workspace: &Workspace,
        tracker: &mut StageTracker<'_>,
    ) -> Result<RenderedDocument, PdfItError> {
        let shared = &*self.shared;
        let converter_timeout = Duration::from_secs(shared.config.converter_timeout_secs);
        let mut stats = RenderStats {
            request_id: workspace.id().to_string(),
            ..RenderStats::default()
        };

        // ── Step 1: Fetch template ───────────────────────────────────────
        let fetch_start = Instant::now();
        let template = shared.fetcher.fetch(&request.source).await?;
        stats.fetch_duration_ms = fetch_start.elapsed().as_millis() as u64;
        stats.template_bytes = template.len();
        tracker.advance(Stage::TemplateFetched);

        // ── Step 2: Write template to the workspace ──────────────────────
        write_file(workspace.template_pdf(), &template).await?;
        drop(template);
        tracker.advance(Stage::PdfWritten);

        // ── Step 3: PDF → HTML ───────────────────────────────────────────
        let outcome = ConversionJob::pdf_to_html(&shared.config, workspace)
            .run(converter_timeout)
            .await?;
        stats.pdf_to_html_duration_ms = outcome.duration.as_millis() as u64;
        let html = read_html(workspace.html()).await?;
        stats.converted_html_bytes = html.len();
        tracker.advance(Stage::HtmlConverted);

        // ── Step 4: Sanitise ─────────────────────────────────────────────
        let templating_start = Instant::now();
        let html = shared.sanitizer.sanitize(&html);
        tracker.advance(Stage::Sanitized);

        // ── Step 5: Bind properties ──────────────────────────────────────
        let (html, unresolved) = shared.binder.bind_with_report(&html, &request.properties)?;
        if !unresolved.is_empty() {
            warn!(
                "[{}] Template references properties with no value: {}",
                stats.request_id,
                unresolved.join(", ")
            );
        }
        stats.unresolved_properties = unresolved;
        stats.templating_duration_ms = templating_start.elapsed().as_millis() as u64;
        stats.bound_html_bytes = html.len();
        tracker.advance(Stage::Bound);

        // ── Step 6: Rewrite HTML in place ────────────────────────────────
        write_file(workspace.html(), html.as_bytes()).await?;
        tracker.advance(Stage::HtmlRewritten);

        // ── Step 7: HTML → PDF ───────────────────────────────────────────
        let outcome = ConversionJob::html_to_pdf(&shared.config, workspace)
            .run(converter_timeout)
            .await?;
        stats.html_to_pdf_duration_ms = outcome.duration.as_millis() as u64;
        tracker.advance(Stage::PdfConverted);

        // ── Step 8: Read result before the workspace is released ─────────
        let bytes = tokio::fs::read(workspace.output_pdf())
            .await
            .map_err(|e| PdfItError::workspace(workspace.output_pdf(), e))?;
        stats.output_bytes = bytes.len();
        stats.total_duration_ms = tracker.started.elapsed().as_millis() as u64;

        Ok(RenderedDocument { bytes, stats })
    }

    /// Render and write the PDF to `output_path`.
    ///
    /// Uses atomic write (temp file + rename) so a failed render never leaves
    /// a truncated PDF behind.
    pub async fn render_to_file(
        &self,
        request: RenderRequest,
        output_path: impl AsRef<Path>,
    ) -> Result<RenderStats, PdfItError> {
        let document = self.render(request).await?;
        let path = output_path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PdfItError::workspace(parent, e))?;
        }

        let tmp_path = path.with_extension("pdf.tmp");
        write_file(&tmp_path, &document.bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(PdfItError::workspace(path, e));
        }

        Ok(document.stats)
    }
}

/// Synchronous wrapper around [`Renderer::render`].
///
/// Creates a temporary tokio runtime internally; do not call from inside one.
pub fn render_sync(
    renderer: &Renderer,
    request: RenderRequest,
) -> Result<RenderedDocument, PdfItError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PdfItError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(renderer.render(request))
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), PdfItError> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| PdfItError::workspace(path, e))
}

/// pdf2htmlEX writes UTF-8; anything else is decoded lossily rather than
/// failing the request.
async fn read_html(path: &Path) -> Result<String, PdfItError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| PdfItError::workspace(path, e))?;
    Ok(match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            warn!("Converter HTML at {} is not valid UTF-8", path.display());
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    })
}
