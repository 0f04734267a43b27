//! Sanitising: strip converter artefacts from HTML before templating.
//!
//! pdf2htmlEX reproduces every glyph run of the source PDF as a positioned
//! `<span>`, which routinely splits a placeholder such as `{{ klantnaam }}`
//! into `{{ <span class="_ _0"></span>klantnaam }}`. It also injects its own
//! JavaScript, a loading indicator and an outline sidebar. None of that is
//! content, and the scripts must never reach the binder: a placeholder inside
//! a script block would otherwise be filled in with request data.
//!
//! Each rule is a regex anchored on a tag name, and every match is removed.
//! This is pattern surgery, not an HTML parse, so rules stay narrow: they name
//! the tag (`<span\s…>`, never a bare `span` substring) and the converter's
//! class or id where one exists.
//!
//! ## Rule Order
//!
//! Wrapper tags go first so that artefacts split by a span are whole again;
//! script blocks next; converter chrome last. The sequence is then repeated
//! until nothing changes, which catches markup a removal stitches together
//! (`<scr<span>ipt>` becomes `<script>`). Rules only ever delete text, so the
//! loop terminates and [`Sanitizer::sanitize`] is idempotent.

use crate::error::PdfItError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::debug;

/// A named removal pattern.
#[derive(Debug, Clone)]
pub struct SanitizeRule {
    name: String,
    pattern: Regex,
}

impl SanitizeRule {
    /// Compile a rule. Every match of `pattern` is deleted.
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, PdfItError> {
        let name = name.into();
        let pattern = Regex::new(pattern).map_err(|e| {
            PdfItError::InvalidConfig(format!("Sanitiser rule '{}' is not a valid regex: {}", name, e))
        })?;
        Ok(Self { name, pattern })
    }

    /// Parse the `NAME=REGEX` form used on the command line.
    pub fn parse(spec: &str) -> Result<Self, PdfItError> {
        match spec.split_once('=') {
            Some((name, pattern)) if !name.trim().is_empty() && !pattern.is_empty() => {
                Self::new(name.trim(), pattern)
            }
            _ => Err(PdfItError::InvalidConfig(format!(
                "Sanitiser rule must look like NAME=REGEX, got '{}'",
                spec
            ))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    fn apply<'a>(&self, input: &'a str) -> Cow<'a, str> {
        self.pattern.replace_all(input, "")
    }

    /// The rules for pdf2htmlEX output, in application order.
    pub fn pdf2htmlex_profile() -> Vec<SanitizeRule> {
        vec![
            Self::from_static("span-tags", &RE_SPAN_TAGS),
            Self::from_static("script-blocks", &RE_SCRIPT_BLOCKS),
            Self::from_static("loading-indicator", &RE_LOADING_INDICATOR),
            Self::from_static("outline-sidebar", &RE_OUTLINE_SIDEBAR),
        ]
    }

    fn from_static(name: &str, re: &Lazy<Regex>) -> Self {
        Self {
            name: name.to_string(),
            pattern: Regex::clone(re),
        }
    }
}

// ── Rule 1: Span wrapper tags ────────────────────────────────────────────────
//
// Opening, closing and self-closing `<span>` tags; the text between them is
// kept. `<spanner>` and other tags that merely start with "span" do not match.

static RE_SPAN_TAGS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</?span(?:\s[^>]*)?/?>").unwrap());

// ── Rule 2: Script blocks ────────────────────────────────────────────────────
//
// Self-closing `<script …/>` first, then a block up to its closing tag. An
// unterminated `<script>` swallows the rest of the document, as it would in a
// browser.

static RE_SCRIPT_BLOCKS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script(?:\s[^>]*?)?/>|<script(?:\s[^>]*)?>(?:.*?</script\s*>|.*\z)").unwrap()
});

// ── Rule 3: Loading indicator ────────────────────────────────────────────────

static RE_LOADING_INDICATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<div\s+class="loading-indicator"[^>]*>.*?</div\s*>"#).unwrap()
});

// ── Rule 4: Empty outline sidebar ────────────────────────────────────────────

static RE_OUTLINE_SIDEBAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)<div\s+id="sidebar"[^>]*>\s*<div\s+id="outline"[^>]*>\s*</div\s*>\s*</div\s*>"#,
    )
    .unwrap()
});

/// An ordered, immutable rule list. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    rules: Arc<[SanitizeRule]>,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::pdf2htmlex()
    }
}

impl Sanitizer {
    pub fn new(rules: Vec<SanitizeRule>) -> Self {
        Self {
            rules: rules.into(),
        }
    }

    /// Sanitiser with [`SanitizeRule::pdf2htmlex_profile`].
    pub fn pdf2htmlex() -> Self {
        Self::new(SanitizeRule::pdf2htmlex_profile())
    }

    pub fn rules(&self) -> &[SanitizeRule] {
        &self.rules
    }

    /// Apply every rule in order, repeating the sequence until the markup
    /// stops changing.
    pub fn sanitize(&self, html: &str) -> String {
        let mut current = html.to_string();
        let mut passes = 0usize;
        loop {
            passes += 1;
            let mut changed = false;
            for rule in self.rules.iter() {
                let replaced = match rule.apply(&current) {
                    Cow::Borrowed(_) => None,
                    Cow::Owned(next) => Some(next),
                };
                if let Some(next) = replaced {
                    if next != current {
                        debug!(
                            "Sanitiser rule '{}' removed {} bytes",
                            rule.name,
                            current.len() - next.len()
                        );
                        current = next;
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }
        debug!("Sanitised {} → {} bytes in {} passes", html.len(), current.len(), passes);
        current
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
