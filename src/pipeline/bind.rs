//! Property binding: render the sanitised HTML as a template.
//!
//! Placeholders use Jinja syntax via [`minijinja`]: `{{ klantnaam }}` for
//! plain interpolation, with filters (`{{ naam | upper }}`) and blocks
//! (`{% if btwnr %}…{% endif %}`) available when a template needs them.
//!
//! ## Missing properties
//!
//! Under [`MissingPropertyPolicy::Empty`] an unknown name renders as the
//! empty string, attribute access on it included. Under
//! [`MissingPropertyPolicy::Strict`] it fails the render. Either way the
//! names are reported by [`PropertyBinder::bind_with_report`] so the
//! orchestrator can log them.
//!
//! ## Escaping
//!
//! Values are HTML-escaped by default, so `Smith & Sons` is inserted as
//! `Smith &amp; Sons`. The printed PDF shows the exact value, but the bound
//! HTML differs from it byte-wise whenever a value contains `&`, `<`, `>`
//! or quotes. With `escape_values` off, values are inserted verbatim and
//! can carry markup.
//!
//! ## Style blocks
//!
//! Converter CSS is full of braces (`@media screen{#sidebar{…}}`) and `{#`
//! opens a Jinja comment. `<style>` bodies are therefore wrapped in
//! `{% raw %}` before parsing and come out byte-for-byte unchanged.

use crate::config::{MissingPropertyPolicy, RenderConfig};
use crate::error::PdfItError;
use crate::request::PropertySet;
use minijinja::{AutoEscape, Environment, ErrorKind, UndefinedBehavior};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static RE_STYLE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)(<style(?:\s[^>]*)?>)(.*?)(</style\s*>)").unwrap());

/// Renders placeholder syntax against a [`PropertySet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyBinder {
    policy: MissingPropertyPolicy,
    escape_values: bool,
}

impl Default for PropertyBinder {
    fn default() -> Self {
        Self::new(MissingPropertyPolicy::Empty, true)
    }
}

impl PropertyBinder {
    pub fn new(policy: MissingPropertyPolicy, escape_values: bool) -> Self {
        Self {
            policy,
            escape_values,
        }
    }

    pub fn from_config(config: &RenderConfig) -> Self {
        Self::new(config.missing_properties, config.escape_values)
    }

    /// Substitute every placeholder in `html`.
    pub fn bind(&self, html: &str, properties: &PropertySet) -> Result<String, PdfItError> {
        self.bind_with_report(html, properties).map(|(out, _)| out)
    }

    /// Like [`PropertyBinder::bind`], also returning the sorted names the
    /// template references that `properties` does not define.
    pub fn bind_with_report(
        &self,
        html: &str,
        properties: &PropertySet,
    ) -> Result<(String, Vec<String>), PdfItError> {
        let source = protect_style_blocks(html);
        let env = self.environment();
        let template = env.template_from_str(&source).map_err(template_error)?;

        let mut unresolved: Vec<String> = template
            .undeclared_variables(false)
            .into_iter()
            .filter(|name| !properties.contains_key(name))
            .collect();
        unresolved.sort();

        let rendered = template.render(properties).map_err(template_error)?;
        Ok((rendered, unresolved))
    }

    fn environment(&self) -> Environment<'static> {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        env.set_undefined_behavior(match self.policy {
            MissingPropertyPolicy::Empty => UndefinedBehavior::Chainable,
            MissingPropertyPolicy::Strict => UndefinedBehavior::Strict,
        });
        let escape = self.escape_values;
        env.set_auto_escape_callback(move |_| {
            if escape {
                AutoEscape::Html
            } else {
                AutoEscape::None
            }
        });
        env
    }
}

fn protect_style_blocks(html: &str) -> String {
    RE_STYLE_BLOCK
        .replace_all(html, |caps: &Captures<'_>| {
            format!(
                "{}{{% raw %}}{}{{% endraw %}}{}",
                &caps[1], &caps[2], &caps[3]
            )
        })
        .into_owned()
}

fn template_error(e: minijinja::Error) -> PdfItError {
    match e.kind() {
        ErrorKind::SyntaxError | ErrorKind::BadEscape => PdfItError::TemplateSyntax {
            line: e.line(),
            detail: e.detail().map(str::to_string).unwrap_or_else(|| e.to_string()),
        },
        _ => PdfItError::TemplateRender {
            detail: e.to_string(),
        },
    }
}
