//! Sub-resource policy for page loads
//!
//! A crawl only needs documents. Images, stylesheets and fonts are the
//! default blocked kinds; the set is configurable.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use url::Url;

/// Coarse classification of a fetched resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Document,
    Stylesheet,
    Image,
    Font,
    Script,
    Media,
    Other,
}

impl ResourceKind {
    /// Classifies a `Content-Type` header value
    pub fn from_content_type(content_type: &str) -> Self {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        match mime.as_str() {
            "" | "text/html" | "application/xhtml+xml" => Self::Document,
            "text/css" => Self::Stylesheet,
            "text/javascript" | "application/javascript" | "application/x-javascript" => {
                Self::Script
            }
            m if m.starts_with("image/") => Self::Image,
            m if m.starts_with("font/")
                || m.starts_with("application/font")
                || m.starts_with("application/x-font")
                || m == "application/vnd.ms-fontobject" =>
            {
                Self::Font
            }
            m if m.starts_with("audio/") || m.starts_with("video/") => Self::Media,
            _ => Self::Other,
        }
    }

    /// Classifies a URL by the extension of its last path segment
    ///
    /// Returns None when the extension says nothing (most pages).
    pub fn from_path(url: &Url) -> Option<Self> {
        let segment = url.path_segments()?.last()?;
        let (_, ext) = segment.rsplit_once('.')?;

        let kind = match ext.to_ascii_lowercase().as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "ico" | "bmp" | "avif" => Self::Image,
            "css" => Self::Stylesheet,
            "woff" | "woff2" | "ttf" | "otf" | "eot" => Self::Font,
            "js" | "mjs" => Self::Script,
            "mp3" | "mp4" | "webm" | "wav" | "ogg" | "mov" => Self::Media,
            "html" | "htm" | "xhtml" | "php" | "asp" | "aspx" | "jsp" => Self::Document,
            _ => return None,
        };
        Some(kind)
    }

    /// Returns the lowercase name used in config files
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Stylesheet => "stylesheet",
            Self::Image => "image",
            Self::Font => "font",
            Self::Script => "script",
            Self::Media => "media",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Decides which resources are skipped during a crawl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFilter {
    blocked: HashSet<ResourceKind>,
}

impl ResourceFilter {
    /// Creates a filter blocking the given kinds
    ///
    /// `Document` is never blocked, even if listed.
    pub fn new(blocked: impl IntoIterator<Item = ResourceKind>) -> Self {
        let blocked = blocked
            .into_iter()
            .filter(|kind| *kind != ResourceKind::Document)
            .collect();
        Self { blocked }
    }

    /// A filter that lets everything through
    pub fn allow_all() -> Self {
        Self {
            blocked: HashSet::new(),
        }
    }

    /// Returns true if resources of this kind are skipped
    pub fn should_skip(&self, kind: ResourceKind) -> bool {
        self.blocked.contains(&kind)
    }

    /// Returns the blocked kind a URL's extension points at, if any
    pub fn blocks_url(&self, url: &Url) -> Option<ResourceKind> {
        ResourceKind::from_path(url).filter(|kind| self.should_skip(*kind))
    }

    /// Returns the blocked kind a response's `Content-Type` points at, if any
    pub fn blocks_content_type(&self, content_type: &str) -> Option<ResourceKind> {
        Some(ResourceKind::from_content_type(content_type)).filter(|kind| self.should_skip(*kind))
    }
}

impl Default for ResourceFilter {
    fn default() -> Self {
        Self::new([ResourceKind::Image, ResourceKind::Stylesheet, ResourceKind::Font])
    }
}
