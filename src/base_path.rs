use crate::normalize::normalize;
use regex::Regex;
use std::sync::OnceLock;

/// The document's effective base, computed once per rewrite pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasePath {
    /// `scheme://host` of the page itself, e.g. `http://www.example.com`.
    pub domain: String,
    /// Absolute URL every relative asset path is resolved against.
    /// Always ends in `/`.
    pub base_path: String,
}

/// Compute the base path for one document from the request context and an
/// optional `<base href>` declaration in the document's `<head>`.
///
/// A missing or malformed `<base>` tag is not an error; the base falls back
/// to the directory of `request_path`. The synthesized domain is always
/// `http://` + host.
pub fn resolve_base_path(host: &str, request_path: &str, html: &str) -> BasePath {
    let domain = format!("http://{host}");
    let base_directory = directory_of(request_path);

    let base_path = match declared_base(html) {
        Some(declared) if has_http_scheme(&declared) => declared,
        Some(declared) if declared.starts_with('/') => format!("{domain}{declared}"),
        Some(declared) => {
            let joined = format!("{}/{}", base_directory.trim_end_matches('/'), declared);
            format!("{domain}{}", normalize(&joined))
        }
        None => format!("{domain}{base_directory}"),
    };

    BasePath {
        domain,
        base_path: format!("{}/", base_path.trim_end_matches(['/', '\\'])),
    }
}

/// Directory portion of the request path: everything up to and including the
/// last `/`, or `/` when there is none.
fn directory_of(request_path: &str) -> &str {
    if request_path.is_empty() {
        return "/";
    }
    if request_path.ends_with('/') {
        return request_path;
    }
    match request_path.rfind('/') {
        Some(pos) => &request_path[..=pos],
        None => "/",
    }
}

/// The `href` of the first `<base>` tag inside the first `<head>` block, if
/// any. Tolerates an optional `target="…"` attribute before the `href`.
fn declared_base(html: &str) -> Option<String> {
    static HEAD_RE: OnceLock<Regex> = OnceLock::new();
    static BASE_RE: OnceLock<Regex> = OnceLock::new();

    let head_re = HEAD_RE.get_or_init(|| Regex::new(r"(?is)<head[^>]*>(.*?)</head>").unwrap());
    let base_re = BASE_RE.get_or_init(|| {
        Regex::new(r#"(?is)<base\s+(?:target\s*=\s*"[^"]*"\s+)?href\s*=\s*"([^"]*)""#).unwrap()
    });

    let head = head_re.captures(html)?;
    let base = base_re.captures(head.get(1).unwrap().as_str())?;

    Some(base[1].to_string())
}

pub(crate) fn has_http_scheme(value: &str) -> bool {
    value
        .get(..7)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("http://"))
}
