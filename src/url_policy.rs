//! The one URL normalization contract, applied at exactly three boundaries:
//! seed ingestion, link extraction, and robots-policy key lookup. Everywhere
//! else a URL is assumed already normalized.
//!
//! Rejects any scheme but `http`/`https` and any non-default port, strips
//! query and fragment, lowercases the host, and rejects IP-literal hosts.
//! The trailing-slash rule is idempotent: normalizing an already-normalized
//! URL is always a no-op.

use crate::error::CrawlError;
use url::Url;

/// A URL in the crate's canonical shape: `http`/`https` scheme, lowercased
/// host without a default port, a path with no trailing slash beyond the
/// root, and no query, fragment, or userinfo.
///
/// Two `NormalizedUrl`s are equal iff their string forms are equal, which
/// holds automatically here since the string form is the only field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedUrl(String);

impl NormalizedUrl {
    /// The canonical string form, e.g. `"http://example.com/foo"`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse back into a `url::Url` for accessors. Infallible because we
    /// only ever construct `NormalizedUrl` from an already-valid `Url`.
    fn url(&self) -> Url {
        Url::parse(&self.0).expect("NormalizedUrl always holds a valid URL")
    }

    pub fn scheme(&self) -> String {
        self.url().scheme().to_string()
    }

    pub fn host(&self) -> String {
        self.url()
            .host_str()
            .expect("normalized URL always has a host")
            .to_string()
    }

    /// Host labels reversed for datastore locality, e.g. `"example.com"` →
    /// `"com.example"`.
    pub fn host_reversed(&self) -> String {
        reverse_host(&self.host())
    }

    pub fn path(&self) -> String {
        self.url().path().to_string()
    }
}

impl std::fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reverse a dot-separated hostname's label order. Its own inverse:
/// `reverse_host(reverse_host(h)) == h`.
pub fn reverse_host(host: &str) -> String {
    host.split('.').rev().collect::<Vec<_>>().join(".")
}

/// Normalize a raw URL string (absolute, already resolved against a base if
/// it came from a relative `href`) into the crate's canonical shape.
///
/// Rejects non-`http(s)` schemes, non-default/non-standard ports, and
/// IP-literal hosts. Strips userinfo, query, fragment, and a single
/// trailing `/` beyond the root path.
pub fn normalize(raw: &str) -> Result<NormalizedUrl, CrawlError> {
    let mut url = Url::parse(raw).map_err(|e| CrawlError::Normalization(e.to_string()))?;
    normalize_url(&mut url)
}

/// As [`normalize`], but resolves `href` against `base` first so that
/// relative anchors are handled (the caller is expected to pass the
/// *response* URL as `base`, per the absolutization rule in the design).
pub fn normalize_relative(base: &Url, href: &str) -> Result<NormalizedUrl, CrawlError> {
    let mut url = base
        .join(href)
        .map_err(|e| CrawlError::Normalization(e.to_string()))?;
    normalize_url(&mut url)
}

fn normalize_url(url: &mut Url) -> Result<NormalizedUrl, CrawlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(CrawlError::Normalization(format!(
            "unsupported scheme: {}",
            url.scheme()
        )));
    }

    if let Some(host) = url.host() {
        if matches!(host, url::Host::Ipv4(_) | url::Host::Ipv6(_)) {
            return Err(CrawlError::Normalization(
                "IP-literal hosts are not crawlable".into(),
            ));
        }
    } else {
        return Err(CrawlError::Normalization("url has no host".into()));
    }

    if let Some(port) = url.port() {
        let is_default = (url.scheme() == "http" && port == 80) || (url.scheme() == "https" && port == 443);
        if !is_default {
            return Err(CrawlError::Normalization(format!(
                "non-standard port: {port}"
            )));
        }
    }
    // Default ports are implicit once cleared; reject-and-clear either way.
    let _ = url.set_port(None);

    let _ = url.set_username("");
    let _ = url.set_password(None);
    url.set_query(None);
    url.set_fragment(None);

    let host = url
        .host_str()
        .expect("checked above")
        .to_ascii_lowercase();
    url.set_host(Some(&host))
        .map_err(|e| CrawlError::Normalization(e.to_string()))?;

    // Idempotent trailing-slash rule: collapse any trailing "/" beyond a
    // bare root so that "/foo/" and "/foo" converge, while "/" stays "/".
    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/');
        let trimmed = if trimmed.is_empty() { "/" } else { trimmed };
        url.set_path(trimmed);
    }

    Ok(NormalizedUrl(url.to_string()))
}
