//! Shared helpers for the integration tests: fake converters and a local
//! template host.
//!
//! The fake converters are `sh -c` scripts. The PDF→HTML fake drops the
//! first line of the "PDF" (the `%PDF-1.4` header) and keeps the rest as
//! HTML; the HTML→PDF fake prepends a PDF header to the HTML. That keeps the
//! bound text readable in the output bytes.

#![allow(dead_code)]

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use pdfit::{ConverterCommand, RenderConfig, RenderConfigBuilder};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Invoice template in the shape the fakes understand.
pub const INVOICE_TEMPLATE: &str = "%PDF-1.4\n\
<!DOCTYPE html>\n\
<html><head><style type=\"text/css\">.ff1{font-family:ff1;}@media print{#sidebar{display:none}}</style></head>\n\
<body><div id=\"page-container\">\n\
<div class=\"t m0 x1 h2 y1 ff1\">Bill to: <span class=\"_ _0\"></span>{{ klant<span class=\"ls1\">naam</span> }}</div>\n\
<div class=\"t m0 x1 h2 y2 ff1\">{{ straat }} {{ nr }}, {{ postcode }} {{ gemeente }}</div>\n\
<div class=\"t m0 x1 h2 y3 ff1\">BTW {{ btwnr }}</div>\n\
</div>\n\
<script>try{pdf2htmlEX.defaultViewer = new pdf2htmlEX.Viewer({});}catch(e){}</script>\n\
<div class=\"loading-indicator\"><img alt=\"\" src=\"data:image/png;base64,iVBOR\"/></div>\n\
</body></html>\n";

/// `sh -c SCRIPT converter --dest-dir <dir> --zoom <z> <input.pdf>`
pub fn fake_pdf_to_html() -> ConverterCommand {
    sh(r#"tail -n +2 "$5" > "$2/$(basename "$5" .pdf).html""#)
}

/// `sh -c SCRIPT html2pdf <page.html> <output.pdf> format=… …`
pub fn fake_html_to_pdf() -> ConverterCommand {
    sh(r#"{ printf '%%PDF-1.4\n'; cat "$1"; } > "$2""#)
}

/// An HTML→PDF converter that records its pid in `<work dir>/converter.pid`
/// and hangs.
pub fn hanging_converter() -> ConverterCommand {
    sh(r#"echo $$ > "$(dirname "$1")/converter.pid"; exec sleep 60"#)
}

/// A converter that fails the way a broken install does.
pub fn failing_converter(code: i32) -> ConverterCommand {
    sh(&format!("echo 'Error: unable to open display' >&2; exit {code}"))
}

fn sh(script: &str) -> ConverterCommand {
    ConverterCommand::new("sh").arg("-c").arg(script).arg("converter")
}

/// Builder preloaded with both fakes and `work_dir`.
pub fn fake_config(work_dir: &Path) -> RenderConfigBuilder {
    RenderConfig::builder()
        .pdf_to_html(fake_pdf_to_html())
        .html_to_pdf(fake_html_to_pdf())
        .work_dir(work_dir)
        .converter_timeout_secs(10)
}

/// Files left in `dir`, ignoring the pid files the hanging fake writes.
pub fn leftover_files(dir: &Path) -> Vec<String> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name != "converter.pid")
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// True once the process is gone or has become a zombie.
pub async fn process_gone(pid: &str) -> bool {
    for _ in 0..50 {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Err(_) => return true,
            Ok(stat) => {
                let state = stat
                    .rsplit(')')
                    .next()
                    .and_then(|s| s.split_whitespace().next());
                if matches!(state, Some("Z") | Some("X")) {
                    return true;
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    !Path::new("/proc/self").exists()
}

// ── Template host ────────────────────────────────────────────────────────

/// A local HTTP server standing in for the template storage.
pub struct TemplateHost {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl TemplateHost {
    /// Serve:
    /// - `/template.pdf` → [`INVOICE_TEMPLATE`]
    /// - `/login.html`   → an HTML page with status 200
    /// - `/missing.pdf`  → 404
    /// - `/slow.pdf`     → the template after 5 seconds, counted on arrival
    pub async fn start() -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/template.pdf", get(template))
            .route("/login.html", get(login))
            .route("/missing.pdf", get(|| async { StatusCode::NOT_FOUND }))
            .route("/slow.pdf", get(slow))
            .with_state(hits.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, hits }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Number of template downloads served.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn template(State(hits): State<Arc<AtomicUsize>>) -> impl IntoResponse {
    hits.fetch_add(1, Ordering::SeqCst);
    ([("content-type", "application/pdf")], INVOICE_TEMPLATE)
}

async fn login() -> impl IntoResponse {
    ([("content-type", "text/html")], "<html><body>Sign in</body></html>")
}

async fn slow(State(hits): State<Arc<AtomicUsize>>) -> impl IntoResponse {
    hits.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(5)).await;
    ([("content-type", "application/pdf")], INVOICE_TEMPLATE)
}
