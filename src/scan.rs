use crate::config::RewriteConfig;
use anyhow::{Context, Result};
use regex::Regex;
use std::ops::Range;

/// The attribute a match was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeName {
    Src,
    Href,
}

impl AttributeName {
    pub fn as_str(self) -> &'static str {
        match self {
            AttributeName::Src => "src",
            AttributeName::Href => "href",
        }
    }
}

/// One `src="…"` or `href="…"` occurrence whose value ends in a configured
/// extension. `span` covers the whole `attribute="value"` slice of the
/// source text, so the rewritten output can be spliced back in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeMatch<'a> {
    pub attribute: AttributeName,
    pub value: &'a str,
    pub span: Range<usize>,
}

/// Locates candidate attributes in a document.
///
/// The pattern is compiled from the extensions configured at construction
/// time, so a scanner must be rebuilt after the extension table is mutated.
pub struct Scanner {
    pattern: Option<Regex>,
}

impl Scanner {
    pub fn from_config(config: &RewriteConfig) -> Result<Self> {
        let mut extensions: Vec<String> = config
            .extensions()
            .keys()
            .map(|extension| regex::escape(extension))
            .collect();

        if extensions.is_empty() {
            return Ok(Self { pattern: None });
        }

        // Sorted so the compiled pattern is deterministic across runs.
        extensions.sort();

        let pattern = format!(
            r#"(?i)(src|href)\s*=\s*"([^"]*\.(?:{}))""#,
            extensions.join("|")
        );
        let pattern = Regex::new(&pattern)
            .with_context(|| format!("invalid attribute scan pattern: {pattern}"))?;

        Ok(Self {
            pattern: Some(pattern),
        })
    }

    /// Iterate over matches in document order. Restartable: each call scans
    /// from the top.
    pub fn scan<'h>(&'h self, html: &'h str) -> impl Iterator<Item = AttributeMatch<'h>> + 'h {
        self.pattern.iter().flat_map(move |pattern| {
            pattern.captures_iter(html).map(|captures| {
                let whole = captures.get(0).unwrap();
                let attribute = if captures[1].eq_ignore_ascii_case("src") {
                    AttributeName::Src
                } else {
                    AttributeName::Href
                };

                AttributeMatch {
                    attribute,
                    value: captures.get(2).unwrap().as_str(),
                    span: whole.range(),
                }
            })
        })
    }
}
