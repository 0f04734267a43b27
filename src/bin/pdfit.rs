//! CLI binary for pdfit.
//!
//! A thin shim over the library crate: `serve` runs the HTTP trigger,
//! `render` fills one template from the command line.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pdfit::pipeline::fetch::is_url;
use pdfit::{
    ConverterCommand, MissingPropertyPolicy, Orientation, PageOptions, PropertySet, RenderConfig,
    RenderRequest, Renderer, SanitizeRule, ServerConfig, TemplateSource,
};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the HTTP trigger
  pdfit serve --bind 0.0.0.0:7071 \
      --default-template-url https://example.org/Factuur_template.pdf

  # Then fill the template over HTTP
  curl -o factuur.pdf 'http://localhost:7071/api/pdfit?klantnaam=Belfius&gemeente=Edegem'
  curl -o factuur.pdf -H 'content-type: application/json' \
      -d '{"templateUrl":"https://example.org/t.pdf","klantnaam":"Belfius","nr":6}' \
      http://localhost:7071/api/pdfit

  # Render once from a local template
  pdfit render Factuur_template.pdf -o factuur.pdf \
      --set klantnaam=Belfius --set straat=Kandijstraat --set nr=6

  # Fail on placeholders without a value, print stats as JSON
  pdfit render template.pdf -o out.pdf --strict-properties --json

  # Strip an extra site-specific fragment before binding
  pdfit render template.pdf -o out.pdf --strip-pattern 'comments=(?s)<!--.*?-->'

EXTERNAL TOOLS:
  pdf2htmlEX   PDF→HTML, invoked as: pdf2htmlEX [ARGS] --zoom 1.4 <id>.pdf
  phantomjs    HTML→PDF, invoked as: phantomjs rasterize.js <id>.html <id>.out.pdf
                                     format=A4 orientation=portrait margin=1cm

ENVIRONMENT VARIABLES:
  RUST_LOG     Override the log filter (e.g. pdfit=debug,tower_http=debug)
  PDFIT_*      Every long flag can also be set as PDFIT_<FLAG>, see --help
"#;

/// Fill PDF templates with request data.
#[derive(Parser, Debug)]
#[command(
    name = "pdfit",
    version,
    about = "Fill PDF templates with request data",
    long_about = "Fill PDF templates with request data. Templates are converted to HTML \
with pdf2htmlEX, their {{ placeholders }} replaced with property values, and the result \
printed back to PDF with phantomjs.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDFIT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDFIT_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve GET|POST /api/pdfit over HTTP.
    Serve(ServeArgs),
    /// Render one template to a file.
    Render(RenderArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Listen address.
    #[arg(long, env = "PDFIT_BIND", default_value = "127.0.0.1:7071")]
    bind: SocketAddr,

    /// Deadline for a whole request in seconds.
    #[arg(long, env = "PDFIT_REQUEST_TIMEOUT", default_value_t = 120)]
    request_timeout: u64,

    /// Renders allowed to run at the same time.
    #[arg(long, env = "PDFIT_MAX_CONCURRENT", default_value_t = 8,
          value_parser = clap::value_parser!(u64).range(1..=1024))]
    max_concurrent: u64,

    /// Template used when a request has no templateUrl.
    #[arg(long, env = "PDFIT_DEFAULT_TEMPLATE_URL")]
    default_template_url: Option<String>,

    #[command(flatten)]
    converter: ConverterArgs,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Local template path or HTTP/HTTPS URL.
    template: String,

    /// Write the filled PDF here.
    #[arg(short, long, env = "PDFIT_OUTPUT")]
    output: PathBuf,

    /// Property value, repeatable: --set klantnaam=Belfius
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_property)]
    properties: Vec<(String, String)>,

    /// Print RenderStats as JSON on stdout.
    #[arg(long, env = "PDFIT_JSON")]
    json: bool,

    #[command(flatten)]
    converter: ConverterArgs,
}

/// Flags shared by `serve` and `render` that map onto [`RenderConfig`].
#[derive(Args, Debug)]
struct ConverterArgs {
    /// PDF→HTML converter executable.
    #[arg(long, env = "PDFIT_PDF2HTML", default_value = "pdf2htmlEX")]
    pdf2html: String,

    /// Leading argument for the PDF→HTML converter (repeatable).
    #[arg(long = "pdf2html-arg", value_name = "ARG", allow_hyphen_values = true)]
    pdf2html_args: Vec<String>,

    /// HTML→PDF converter executable.
    #[arg(long, env = "PDFIT_HTML2PDF", default_value = "phantomjs")]
    html2pdf: String,

    /// Leading argument for the HTML→PDF converter (repeatable).
    /// Relative paths resolve against the current directory.
    #[arg(
        long = "html2pdf-arg",
        value_name = "ARG",
        allow_hyphen_values = true,
        default_value = "rasterize.js"
    )]
    html2pdf_args: Vec<String>,

    /// Zoom factor handed to pdf2htmlEX (0.1–10).
    #[arg(long, env = "PDFIT_ZOOM", default_value_t = 1.4)]
    zoom: f32,

    /// Paper format, e.g. A4 or Letter.
    #[arg(long, env = "PDFIT_PAGE_FORMAT", default_value = "A4")]
    page_format: String,

    /// Page orientation.
    #[arg(long, env = "PDFIT_ORIENTATION", value_enum, default_value = "portrait")]
    orientation: OrientationArg,

    /// Page margin as a CSS length.
    #[arg(long, env = "PDFIT_MARGIN", default_value = "1cm")]
    margin: String,

    /// Per-conversion timeout in seconds.
    #[arg(long, env = "PDFIT_CONVERTER_TIMEOUT", default_value_t = 60)]
    converter_timeout: u64,

    /// Template download timeout in seconds.
    #[arg(long, env = "PDFIT_FETCH_TIMEOUT", default_value_t = 30)]
    fetch_timeout: u64,

    /// Directory for working files. Default: $TMPDIR/pdfit
    #[arg(long, env = "PDFIT_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Extra sanitiser rule NAME=REGEX, applied after the built-in ones (repeatable).
    #[arg(long = "strip-pattern", value_name = "NAME=REGEX")]
    strip_patterns: Vec<String>,

    /// Fail when a placeholder has no property instead of rendering it empty.
    #[arg(long, env = "PDFIT_STRICT_PROPERTIES")]
    strict_properties: bool,

    /// Insert property values without HTML-escaping them.
    #[arg(long, env = "PDFIT_NO_ESCAPE")]
    no_escape: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OrientationArg {
    Portrait,
    Landscape,
}

impl From<OrientationArg> for Orientation {
    fn from(v: OrientationArg) -> Self {
        match v {
            OrientationArg::Portrait => Orientation::Portrait,
            OrientationArg::Landscape => Orientation::Landscape,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Render(args) => render(args, cli.quiet).await,
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let config = build_config(&args.converter)?;
    let renderer = Renderer::new(config).context("Failed to initialise renderer")?;
    let server = ServerConfig {
        bind: args.bind,
        request_timeout_secs: args.request_timeout.max(1),
        max_concurrent_renders: args.max_concurrent as usize,
        default_template_url: args.default_template_url,
    };
    pdfit::serve(server, renderer).await.context("Server failed")
}

async fn render(args: RenderArgs, quiet: bool) -> Result<()> {
    let config = build_config(&args.converter)?;
    let renderer = Renderer::new(config).context("Failed to initialise renderer")?;

    let source = if is_url(&args.template) {
        TemplateSource::Url(args.template.clone())
    } else {
        let bytes = tokio::fs::read(&args.template)
            .await
            .with_context(|| format!("Failed to read template {:?}", args.template))?;
        TemplateSource::Bytes(bytes)
    };
    let properties: PropertySet = args.properties.into_iter().collect();

    let stats = renderer
        .render_to_file(RenderRequest::new(source, properties), &args.output)
        .await
        .context("Render failed")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("Failed to serialise stats")?
        );
    }

    if !quiet {
        eprintln!(
            "{}  {} bytes  {}ms  →  {}",
            green("✔"),
            stats.output_bytes,
            stats.total_duration_ms,
            bold(&args.output.display().to_string()),
        );
        eprintln!(
            "   {}",
            dim(&format!(
                "fetch {}ms / pdf→html {}ms / templating {}ms / html→pdf {}ms",
                stats.fetch_duration_ms,
                stats.pdf_to_html_duration_ms,
                stats.templating_duration_ms,
                stats.html_to_pdf_duration_ms
            ))
        );
        if !stats.unresolved_properties.is_empty() {
            eprintln!(
                "{}  no value for: {}",
                yellow("⚠"),
                stats.unresolved_properties.join(", ")
            );
        }
    }

    Ok(())
}

/// Map CLI args to `RenderConfig`.
fn build_config(args: &ConverterArgs) -> Result<RenderConfig> {
    let mut builder = RenderConfig::builder()
        .pdf_to_html(ConverterCommand {
            program: args.pdf2html.clone(),
            args: args.pdf2html_args.clone(),
        })
        .html_to_pdf(ConverterCommand {
            program: args.html2pdf.clone(),
            args: args.html2pdf_args.clone(),
        })
        .zoom(args.zoom)
        .page(PageOptions {
            format: args.page_format.clone(),
            orientation: args.orientation.into(),
            margin: args.margin.clone(),
        })
        .converter_timeout_secs(args.converter_timeout)
        .fetch_timeout_secs(args.fetch_timeout)
        .missing_properties(if args.strict_properties {
            MissingPropertyPolicy::Strict
        } else {
            MissingPropertyPolicy::Empty
        })
        .escape_values(!args.no_escape);

    if let Some(ref dir) = args.work_dir {
        builder = builder.work_dir(dir);
    }
    for spec in &args.strip_patterns {
        let rule = SanitizeRule::parse(spec)
            .with_context(|| format!("Invalid --strip-pattern '{}'", spec))?;
        builder = builder.sanitize_rule(rule);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--set KEY=VALUE`. The value may itself contain `=`.
fn parse_property(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty property name in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}
