//! End-to-end tests against the real converters.
//!
//! These need `pdf2htmlEX` and `phantomjs` on `PATH` plus phantomjs'
//! `rasterize.js` example script. They are gated behind the `E2E_ENABLED`
//! environment variable so they do not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIT_RASTERIZE_JS=/usr/share/phantomjs/examples/rasterize.js \
//!     cargo test --test e2e -- --nocapture

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use pdfit::{
    ConverterCommand, FailureStage, PropertySet, RenderConfig, RenderRequest, Renderer,
    TemplateSource,
};
use std::path::PathBuf;
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

macro_rules! e2e_skip_unless_enabled {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "pdfit=debug".into()),
            )
            .with_test_writer()
            .try_init();
    }};
}

fn rasterize_js() -> String {
    std::env::var("PDFIT_RASTERIZE_JS").unwrap_or_else(|_| "rasterize.js".into())
}

fn renderer(work: &TempDir) -> Renderer {
    let config = RenderConfig::builder()
        .html_to_pdf(ConverterCommand::new("phantomjs").arg(rasterize_js()))
        .work_dir(work.path())
        .build()
        .expect("valid config");
    Renderer::new(config).expect("renderer")
}

/// A one-page A4 PDF with one line of Helvetica text per entry.
fn template_pdf(lines: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 14.into()]),
        Operation::new("TL", vec![20.into()]),
        Operation::new("Td", vec![72.into(), 760.into()]),
    ];
    for line in lines {
        operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
        operations.push(Operation::new("T*", vec![]));
    }
    operations.push(Operation::new("ET", vec![]));

    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        content.encode().expect("encode content"),
    ));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("save template");
    bytes
}

fn extract_text(pdf: &[u8]) -> String {
    let doc = Document::load_mem(pdf).expect("output should parse as PDF");
    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    doc.extract_text(&pages).expect("extract text")
}

fn output_dir() -> PathBuf {
    let d = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/output");
    std::fs::create_dir_all(&d).ok();
    d
}

// ── Rendering ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_invoice_round_trip() {
    e2e_skip_unless_enabled!();
    let work = TempDir::new().unwrap();

    let template = template_pdf(&[
        "Bill to: {{ klantnaam }}",
        "{{ straat }} {{ nr }}",
        "{{ postcode }} {{ gemeente }}",
        "BTW {{ btwnr }}",
    ]);
    let props = PropertySet::new()
        .with("klantnaam", "Belfius")
        .with("straat", "Kandijstraat")
        .with("nr", "6")
        .with("postcode", "2650")
        .with("gemeente", "Edegem")
        .with("btwnr", "156.65.26.612");

    let document = renderer(&work)
        .render(RenderRequest::new(TemplateSource::Bytes(template), props))
        .await
        .expect("render should succeed");
    std::fs::write(output_dir().join("invoice.pdf"), &document.bytes).ok();

    let text = extract_text(&document.bytes);
    println!("Extracted text:\n{text}");
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    assert!(flat.contains("Bill to: Belfius"), "got: {flat}");
    assert!(flat.contains("Kandijstraat 6"), "got: {flat}");
    assert!(flat.contains("2650 Edegem"), "got: {flat}");
    assert!(!flat.contains("{{") && !flat.contains("}}"), "got: {flat}");
    assert!(document.stats.unresolved_properties.is_empty());

    let left: Vec<_> = std::fs::read_dir(work.path()).unwrap().collect();
    assert!(left.is_empty(), "working files left behind: {left:?}");
}

#[tokio::test]
async fn test_missing_property_renders_blank() {
    e2e_skip_unless_enabled!();
    let work = TempDir::new().unwrap();

    let template = template_pdf(&["Bill to: {{ klantnaam }}", "BTW {{ btwnr }}"]);
    let props = PropertySet::new().with("klantnaam", "Belfius");

    let document = renderer(&work)
        .render(RenderRequest::new(TemplateSource::Bytes(template), props))
        .await
        .expect("render should succeed");

    let text = extract_text(&document.bytes);
    assert!(text.contains("Belfius"), "got: {text}");
    assert!(!text.contains("btwnr"), "got: {text}");
    assert_eq!(document.stats.unresolved_properties, vec!["btwnr"]);
}

#[tokio::test]
async fn test_corrupt_template_fails_in_conversion() {
    e2e_skip_unless_enabled!();
    let work = TempDir::new().unwrap();

    let err = renderer(&work)
        .render(RenderRequest::new(
            TemplateSource::Bytes(b"%PDF-1.4\nthis is not really a pdf".to_vec()),
            PropertySet::new(),
        ))
        .await
        .expect_err("pdf2htmlEX should reject the template");
    assert_eq!(err.stage(), FailureStage::Conversion);

    let left: Vec<_> = std::fs::read_dir(work.path()).unwrap().collect();
    assert!(left.is_empty(), "working files left behind: {left:?}");
}
