use crate::base_path::{has_http_scheme, resolve_base_path, BasePath};
use crate::config::{normalize_extension, DomainAssignment, RewriteConfig};
use crate::normalize::normalize;
use crate::scan::{AttributeMatch, Scanner};
use anyhow::{bail, Result};
use regex::Regex;
use std::sync::OnceLock;

/// One rewrite pass's worth of mutable state: the round-robin cursor plus a
/// borrow of the shared configuration.
///
/// The cursor persists across [`rewrite_document`](Self::rewrite_document)
/// calls on the same session, so a batch of documents shares one fair
/// round-robin sequence. Create one session per document for per-document
/// fairness, and one session per worker when processing concurrently.
pub struct RewriteSession<'a> {
    config: &'a RewriteConfig,
    cursor: u32,
}

impl<'a> RewriteSession<'a> {
    pub fn new(config: &'a RewriteConfig) -> Result<Self> {
        if config.max_static_domains() == 0 {
            bail!("max_static_domains must be at least 1");
        }
        Ok(Self { config, cursor: 0 })
    }

    /// Rewrite every matching `src`/`href` attribute in one document.
    ///
    /// The base path is resolved once, then each match is rewritten in
    /// document order and spliced back over its source span. Text outside
    /// the matched attributes passes through unchanged. The scanner pattern
    /// is compiled from the configuration as it stands now, so extension
    /// table mutations between calls always take effect.
    pub fn rewrite_document(
        &mut self,
        html: &str,
        host: &str,
        request_path: &str,
    ) -> Result<String> {
        let scanner = Scanner::from_config(self.config)?;
        let base = resolve_base_path(host, request_path, html);

        let mut output = String::with_capacity(html.len() + 256);
        let mut last_end = 0;

        for matched in scanner.scan(html) {
            output.push_str(&html[last_end..matched.span.start]);
            output.push_str(&self.rewrite_attribute(&matched, &base));
            last_end = matched.span.end;
        }
        output.push_str(&html[last_end..]);

        Ok(output)
    }

    /// Rewrite a single matched attribute, returning the replacement
    /// `attribute="value"` text.
    pub fn rewrite_attribute(&mut self, matched: &AttributeMatch<'_>, base: &BasePath) -> String {
        let resolved = resolve_value(matched.value, base);
        let rewritten = self.substitute_domain(&resolved);
        format!("{}=\"{}\"", matched.attribute.as_str(), rewritten)
    }

    /// Insert the static domain label after the URL's scheme, keeping any
    /// existing `www.` label: `http://www.site.com/a.jpg` becomes
    /// `http://media.www.site.com/a.jpg`. Values without an `http(s)://`
    /// scheme pass through untouched and do not advance the cursor.
    fn substitute_domain(&mut self, url: &str) -> String {
        static AUTHORITY_RE: OnceLock<Regex> = OnceLock::new();
        let authority_re =
            AUTHORITY_RE.get_or_init(|| Regex::new(r"(?i)^(https?://)(www\.)?").unwrap());

        let Some(captures) = authority_re.captures(url) else {
            return url.to_string();
        };

        let label = self.static_domain_for(url);
        let scheme = &captures[1];
        let www = captures.get(2).map_or("", |m| m.as_str());

        format!("{scheme}{label}.{www}{}", &url[captures[0].len()..])
    }

    /// The static domain label for one resolved URL. Extensions with a fixed
    /// label always get it; everything else draws the next round-robin
    /// bucket. This is the pipeline's only mutation and runs exactly once
    /// per matched attribute.
    fn static_domain_for(&mut self, url: &str) -> String {
        if let Some(extension) = extension_of(url) {
            if let Some(DomainAssignment::Fixed(label)) = self.config.assignment_for(&extension) {
                if !label.is_empty() {
                    return label.clone();
                }
            }
        }

        self.cursor = if self.cursor >= self.config.max_static_domains() {
            1
        } else {
            self.cursor + 1
        };
        self.cursor.to_string()
    }
}

/// Classify and resolve one raw attribute value to an absolute URL.
///
/// Already-absolute URLs keep their path (and scheme) as-is. Rooted paths
/// are prefixed with the page domain. Relative paths are resolved against
/// the base path: the scheme is split off, the host-and-path remainder is
/// joined with the value and normalized, and the scheme is re-prefixed.
/// Protocol-relative values are left alone.
fn resolve_value(raw: &str, base: &BasePath) -> String {
    if has_url_scheme(raw) {
        return raw.to_string();
    }
    if raw.starts_with("//") {
        return raw.to_string();
    }
    if raw.starts_with('/') {
        return format!("{}{raw}", base.domain);
    }

    let (scheme, remainder) = split_scheme(&base.base_path);
    let joined = normalize(&format!("{remainder}/{raw}"));
    format!("{scheme}{}", joined.trim_matches('/'))
}

fn has_url_scheme(value: &str) -> bool {
    has_http_scheme(value)
        || value
            .get(..8)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("https://"))
}

fn split_scheme(url: &str) -> (&str, &str) {
    match url.find("://") {
        Some(pos) => url.split_at(pos + 3),
        None => ("", url),
    }
}

/// Lowercased, percent-decoded extension of the final path component, if the
/// URL has one.
fn extension_of(url: &str) -> Option<String> {
    let (_, extension) = url.rsplit_once('.')?;
    Some(normalize_extension(extension))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::AttributeName;

    fn base() -> BasePath {
        resolve_base_path("www.site.com", "/blog/post", "")
    }

    fn matched(attribute: AttributeName, value: &str) -> AttributeMatch<'_> {
        AttributeMatch {
            attribute,
            value,
            span: 0..0,
        }
    }

    #[test]
    fn test_relative_value_resolved_against_base() {
        let config = RewriteConfig::default();
        let mut session = RewriteSession::new(&config).unwrap();

        let rewritten =
            session.rewrite_attribute(&matched(AttributeName::Src, "../img/photo.jpg"), &base());
        assert_eq!(rewritten, r#"src="http://media.www.site.com/img/photo.jpg""#);
    }

    #[test]
    fn test_rooted_value_prefixed_with_page_domain() {
        let config = RewriteConfig::default();
        let mut session = RewriteSession::new(&config).unwrap();

        let rewritten =
            session.rewrite_attribute(&matched(AttributeName::Href, "/styles/site.css"), &base());
        assert_eq!(
            rewritten,
            r#"href="http://css.www.site.com/styles/site.css""#
        );
    }

    #[test]
    fn test_absolute_url_path_untouched_domain_substituted() {
        let config = RewriteConfig::default();
        let mut session = RewriteSession::new(&config).unwrap();

        let rewritten = session.rewrite_attribute(
            &matched(AttributeName::Src, "http://cdn.example.com/a/../img.jpg"),
            &base(),
        );
        // No path re-resolution: the `..` survives.
        assert_eq!(
            rewritten,
            r#"src="http://media.cdn.example.com/a/../img.jpg""#
        );
    }

    #[test]
    fn test_absolute_url_www_label_kept() {
        let config = RewriteConfig::default();
        let mut session = RewriteSession::new(&config).unwrap();

        let rewritten = session.rewrite_attribute(
            &matched(AttributeName::Src, "http://www.other.com/img.png"),
            &base(),
        );
        assert_eq!(rewritten, r#"src="http://media.www.other.com/img.png""#);
    }

    #[test]
    fn test_https_scheme_preserved() {
        let config = RewriteConfig::default();
        let mut session = RewriteSession::new(&config).unwrap();

        let rewritten = session.rewrite_attribute(
            &matched(AttributeName::Src, "https://cdn.example.com/img.jpg"),
            &base(),
        );
        assert_eq!(rewritten, r#"src="https://media.cdn.example.com/img.jpg""#);
    }

    #[test]
    fn test_protocol_relative_value_untouched() {
        let config = RewriteConfig::default();
        let mut session = RewriteSession::new(&config).unwrap();

        let rewritten = session.rewrite_attribute(
            &matched(AttributeName::Src, "//cdn.example.com/img.jpg"),
            &base(),
        );
        assert_eq!(rewritten, r#"src="//cdn.example.com/img.jpg""#);
    }

    #[test]
    fn test_fixed_extension_never_round_robins() {
        let config = RewriteConfig::default();
        let mut session = RewriteSession::new(&config).unwrap();

        for _ in 0..8 {
            let rewritten =
                session.rewrite_attribute(&matched(AttributeName::Src, "photo.jpg"), &base());
            assert!(rewritten.contains("http://media."), "got {rewritten}");
        }
    }

    #[test]
    fn test_round_robin_sequence_wraps() {
        let mut config = RewriteConfig::default();
        config.add_extension("woff", DomainAssignment::RoundRobin);
        let mut session = RewriteSession::new(&config).unwrap();

        let labels: Vec<String> = (0..6)
            .map(|_| {
                let rewritten =
                    session.rewrite_attribute(&matched(AttributeName::Src, "font.woff"), &base());
                rewritten
                    .split('.')
                    .next()
                    .unwrap()
                    .trim_start_matches(r#"src="http://"#)
                    .to_string()
            })
            .collect();

        assert_eq!(labels, ["1", "2", "3", "4", "1", "2"]);
    }

    #[test]
    fn test_fixed_assignments_do_not_advance_cursor() {
        let mut config = RewriteConfig::default();
        config.add_extension("woff", DomainAssignment::RoundRobin);
        let mut session = RewriteSession::new(&config).unwrap();

        let first = session.rewrite_attribute(&matched(AttributeName::Src, "a.woff"), &base());
        session.rewrite_attribute(&matched(AttributeName::Src, "b.jpg"), &base());
        session.rewrite_attribute(&matched(AttributeName::Src, "c.css"), &base());
        let second = session.rewrite_attribute(&matched(AttributeName::Src, "d.woff"), &base());

        assert!(first.contains("http://1."), "got {first}");
        assert!(second.contains("http://2."), "got {second}");
    }

    #[test]
    fn test_unmapped_extension_round_robins() {
        let config = RewriteConfig::default();
        let mut session = RewriteSession::new(&config).unwrap();

        let rewritten =
            session.rewrite_attribute(&matched(AttributeName::Src, "archive.zip"), &base());
        assert_eq!(rewritten, r#"src="http://1.www.site.com/blog/archive.zip""#);
    }

    #[test]
    fn test_empty_fixed_label_round_robins() {
        let mut config = RewriteConfig::empty();
        config.add_extension("jpg", DomainAssignment::Fixed(String::new()));
        let mut session = RewriteSession::new(&config).unwrap();

        let rewritten = session.rewrite_attribute(&matched(AttributeName::Src, "a.jpg"), &base());
        assert!(rewritten.contains("http://1."), "got {rewritten}");
    }

    #[test]
    fn test_session_rejects_zero_buckets() {
        let config: RewriteConfig =
            serde_json::from_str(r#"{ "max_static_domains": 0 }"#).unwrap();
        assert!(RewriteSession::new(&config).is_err());
    }

    #[test]
    fn test_rewrite_document_splices_matches_in_place() {
        let config = RewriteConfig::default();
        let mut session = RewriteSession::new(&config).unwrap();

        let html = r#"<p>text</p><img src="logo.png" alt="logo"><p>more</p>"#;
        let output = session
            .rewrite_document(html, "www.site.com", "/blog/post")
            .unwrap();
        assert_eq!(
            output,
            r#"<p>text</p><img src="http://media.www.site.com/blog/logo.png" alt="logo"><p>more</p>"#
        );
    }

    #[test]
    fn test_rewrite_document_without_matches_is_identity() {
        let config = RewriteConfig::default();
        let mut session = RewriteSession::new(&config).unwrap();

        let html = r#"<p>plain text with no assets</p>"#;
        let output = session
            .rewrite_document(html, "www.site.com", "/")
            .unwrap();
        assert_eq!(output, html);
    }

    #[test]
    fn test_cursor_persists_across_documents() {
        let mut config = RewriteConfig::empty();
        config.add_extension("woff", DomainAssignment::RoundRobin);
        let mut session = RewriteSession::new(&config).unwrap();

        let first = session
            .rewrite_document(r#"<a href="a.woff">"#, "www.site.com", "/")
            .unwrap();
        let second = session
            .rewrite_document(r#"<a href="b.woff">"#, "www.site.com", "/")
            .unwrap();

        assert!(first.contains("http://1."), "got {first}");
        assert!(second.contains("http://2."), "got {second}");
    }
}
