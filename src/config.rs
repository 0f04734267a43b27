//! Configuration types for template rendering.
//!
//! All pipeline behaviour is controlled through [`RenderConfig`], built via
//! its [`RenderConfigBuilder`]. Converter commands, page options, timeouts,
//! the sanitiser profile and the missing-property policy live in one place so
//! a single value can be shared by every concurrent request.
//!
//! The HTTP listener has its own, smaller [`ServerConfig`].

use crate::error::PdfItError;
use crate::pipeline::sanitize::SanitizeRule;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Configuration for rendering a template into a filled PDF.
///
/// Built via [`RenderConfig::builder()`] or using [`RenderConfig::default()`].
///
/// # Example
/// ```rust
/// use pdfit::RenderConfig;
///
/// let config = RenderConfig::builder()
///     .zoom(1.4)
///     .converter_timeout_secs(90)
///     .work_dir("/var/tmp/pdfit")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct RenderConfig {
    /// PDF→HTML converter. Default: `pdf2htmlEX` with no leading arguments.
    pub pdf_to_html: ConverterCommand,

    /// HTML→PDF converter. Default: `phantomjs rasterize.js`.
    pub html_to_pdf: ConverterCommand,

    /// Zoom factor handed to the PDF→HTML converter. Range: 0.1–10. Default: 1.4.
    ///
    /// pdf2htmlEX lays text out in absolutely positioned boxes sized for the
    /// zoom it was given; 1.4 keeps glyphs legible once the HTML is printed
    /// back onto an A4 page with a 1 cm margin.
    pub zoom: f32,

    /// Page options handed to the HTML→PDF converter.
    pub page: PageOptions,

    /// Per-conversion timeout in seconds. Default: 60.
    ///
    /// A converter that runs longer is killed and the request fails with
    /// [`PdfItError::ConversionTimeout`].
    pub converter_timeout_secs: u64,

    /// Template download timeout in seconds. Default: 30.
    pub fetch_timeout_secs: u64,

    /// TCP connect timeout for template downloads in seconds. Default: 10.
    pub connect_timeout_secs: u64,

    /// Largest accepted template payload in bytes. Default: 20 MiB.
    pub max_template_bytes: usize,

    /// Directory holding every request's working files.
    /// Default: `$TMPDIR/pdfit`. Created on demand.
    pub work_dir: PathBuf,

    /// Ordered sanitiser rules applied to the converter's HTML.
    /// Default: [`SanitizeRule::pdf2htmlex_profile`].
    pub sanitize_rules: Vec<SanitizeRule>,

    /// What a placeholder with no matching property renders as.
    /// Default: [`MissingPropertyPolicy::Empty`].
    pub missing_properties: MissingPropertyPolicy,

    /// HTML-escape property values before inserting them. Default: true.
    pub escape_values: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            pdf_to_html: ConverterCommand::new("pdf2htmlEX"),
            html_to_pdf: ConverterCommand::new("phantomjs").arg("rasterize.js"),
            zoom: 1.4,
            page: PageOptions::default(),
            converter_timeout_secs: 60,
            fetch_timeout_secs: 30,
            connect_timeout_secs: 10,
            max_template_bytes: 20 * 1024 * 1024,
            work_dir: std::env::temp_dir().join("pdfit"),
            sanitize_rules: SanitizeRule::pdf2htmlex_profile(),
            missing_properties: MissingPropertyPolicy::default(),
            escape_values: true,
        }
    }
}

impl fmt::Debug for RenderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderConfig")
            .field("pdf_to_html", &self.pdf_to_html)
            .field("html_to_pdf", &self.html_to_pdf)
            .field("zoom", &self.zoom)
            .field("page", &self.page)
            .field("converter_timeout_secs", &self.converter_timeout_secs)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("work_dir", &self.work_dir)
            .field(
                "sanitize_rules",
                &self.sanitize_rules.iter().map(|r| r.name()).collect::<Vec<_>>(),
            )
            .field("missing_properties", &self.missing_properties)
            .field("escape_values", &self.escape_values)
            .finish()
    }
}

impl RenderConfig {
    /// Create a new builder for `RenderConfig`.
    pub fn builder() -> RenderConfigBuilder {
        RenderConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`RenderConfig`].
#[derive(Debug)]
pub struct RenderConfigBuilder {
    config: RenderConfig,
}

impl RenderConfigBuilder {
    pub fn pdf_to_html(mut self, command: ConverterCommand) -> Self {
        self.config.pdf_to_html = command;
        self
    }

    pub fn html_to_pdf(mut self, command: ConverterCommand) -> Self {
        self.config.html_to_pdf = command;
        self
    }

    pub fn zoom(mut self, zoom: f32) -> Self {
        self.config.zoom = zoom.clamp(0.1, 10.0);
        self
    }

    pub fn page(mut self, page: PageOptions) -> Self {
        self.config.page = page;
        self
    }

    pub fn converter_timeout_secs(mut self, secs: u64) -> Self {
        self.config.converter_timeout_secs = secs.max(1);
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs.max(1);
        self
    }

    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.connect_timeout_secs = secs.max(1);
        self
    }

    pub fn max_template_bytes(mut self, bytes: usize) -> Self {
        self.config.max_template_bytes = bytes;
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = dir.into();
        self
    }

    /// Replace the whole sanitiser rule list.
    pub fn sanitize_rules(mut self, rules: Vec<SanitizeRule>) -> Self {
        self.config.sanitize_rules = rules;
        self
    }

    /// Append one rule after the current list.
    pub fn sanitize_rule(mut self, rule: SanitizeRule) -> Self {
        self.config.sanitize_rules.push(rule);
        self
    }

    pub fn missing_properties(mut self, policy: MissingPropertyPolicy) -> Self {
        self.config.missing_properties = policy;
        self
    }

    pub fn escape_values(mut self, v: bool) -> Self {
        self.config.escape_values = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RenderConfig, PdfItError> {
        let c = &self.config;
        if c.pdf_to_html.program.trim().is_empty() || c.html_to_pdf.program.trim().is_empty() {
            return Err(PdfItError::InvalidConfig(
                "Converter program must not be empty".into(),
            ));
        }
        if !(0.1..=10.0).contains(&c.zoom) {
            return Err(PdfItError::InvalidConfig(format!(
                "Zoom must be 0.1–10, got {}",
                c.zoom
            )));
        }
        if c.max_template_bytes < 4 {
            return Err(PdfItError::InvalidConfig(
                "max_template_bytes must allow at least the %PDF header".into(),
            ));
        }
        if c.work_dir.as_os_str().is_empty() {
            return Err(PdfItError::InvalidConfig("work_dir must not be empty".into()));
        }
        Ok(self.config)
    }
}

// ── Converter commands ───────────────────────────────────────────────────

/// An external converter executable plus the arguments that precede the
/// per-job arguments.
///
/// `phantomjs` needs its rasterising script as first argument, wrapper
/// scripts may need a sub-command; both go in `args`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConverterCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ConverterCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append a leading argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

// ── Page options ─────────────────────────────────────────────────────────

/// Page layout handed to the HTML→PDF converter as `key=value` arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageOptions {
    /// Paper format, e.g. `A4`, `Letter`. Default: `A4`.
    pub format: String,
    /// Default: portrait.
    pub orientation: Orientation,
    /// CSS length, e.g. `1cm`. Default: `1cm`.
    pub margin: String,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            format: "A4".into(),
            orientation: Orientation::Portrait,
            margin: "1cm".into(),
        }
    }
}

impl PageOptions {
    /// Render the options as converter arguments, in a fixed order.
    pub fn to_args(&self) -> Vec<String> {
        vec![
            format!("format={}", self.format),
            format!("orientation={}", self.orientation),
            format!("margin={}", self.margin),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Portrait => f.write_str("portrait"),
            Orientation::Landscape => f.write_str("landscape"),
        }
    }
}

// ── Property policy ──────────────────────────────────────────────────────

/// How a placeholder that names no property in the request is rendered.
///
/// The lenient default keeps a template usable when callers only fill some
/// fields, at the cost of silently blank output for a misspelt key. Callers
/// who would rather fail loudly pick [`MissingPropertyPolicy::Strict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingPropertyPolicy {
    /// Render as the empty string. (default)
    #[default]
    Empty,
    /// Fail the request with [`PdfItError::TemplateRender`].
    Strict,
}

// ── Server ───────────────────────────────────────────────────────────────

/// Settings for the HTTP trigger.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address. Default: `127.0.0.1:7071`.
    pub bind: SocketAddr,
    /// Deadline for a whole request in seconds. Default: 120.
    pub request_timeout_secs: u64,
    /// Renders allowed to run at the same time. Default: 8.
    pub max_concurrent_renders: usize,
    /// Template used when a request carries no `templateUrl`.
    pub default_template_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 7071)),
            request_timeout_secs: 120,
            max_concurrent_renders: 8,
            default_template_url: None,
        }
    }
}
