use crate::UrlError;
use url::Url;

/// Normalizes the seed URL of a traversal
///
/// # Normalization Steps
///
/// 1. Trim surrounding whitespace
/// 2. Prefix `https://` when no `http://` or `https://` scheme is present
/// 3. Parse the URL; reject if malformed
/// 4. Require a host
/// 5. Remove the fragment
///
/// # Examples
///
/// ```
/// use trawler::url::normalize_start_url;
///
/// let url = normalize_start_url("example.com").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/");
/// ```
pub fn normalize_start_url(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Parse("empty URL".to_string()));
    }

    let lowered = trimmed.to_ascii_lowercase();
    let with_scheme = if lowered.starts_with("http://") || lowered.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let mut url = Url::parse(&with_scheme).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(UrlError::MissingDomain),
    }

    url.set_fragment(None);
    Ok(url)
}

/// Normalizes a discovered page URL so that visited/queued checks compare equal
///
/// Only the fragment is dropped: `/page#a` and `/page#b` load the same document.
pub fn normalize_page_url(mut url: Url) -> Url {
    url.set_fragment(None);
    url
}
