use url::Url;

/// Lowercases a hostname and strips one leading literal `www.`
pub fn normalize_hostname(host: &str) -> String {
    let host = host.to_lowercase();
    match host.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => host,
    }
}

/// Returns the host a traversal started at `start` may visit
///
/// `www.example.com` and `example.com` map to the same allowed host, so a
/// crawl seeded on either one follows links to both.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use trawler::url::allowed_host;
///
/// let with_www = Url::parse("http://www.example.com").unwrap();
/// let without = Url::parse("http://example.com").unwrap();
/// assert_eq!(allowed_host(&with_www), allowed_host(&without));
/// ```
pub fn allowed_host(start: &Url) -> Option<String> {
    start.host_str().map(normalize_hostname)
}

/// Checks whether `url` belongs to the traversal's allowed host
pub fn is_in_scope(url: &Url, allowed: &str) -> bool {
    if url.scheme() != "http" && url.scheme() != "https" {
        return false;
    }

    url.host_str()
        .map(|host| normalize_hostname(host) == allowed)
        .unwrap_or(false)
}
