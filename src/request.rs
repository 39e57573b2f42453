//! Render request model.
//!
//! A [`RenderRequest`] carries the document (inline markup or a remote URL),
//! request-scoped browser settings, and the [`RenderOptions`] for printing.
//! Field names follow the camelCase JSON the HTTP layer accepts.
//!
//! # Example
//!
//! ```rust
//! use html2pdf_render::request::RenderRequest;
//!
//! let request = RenderRequest::from_html("<h1>Hi</h1>");
//! assert!(request.best_attempt);
//! assert!(request.javascript_enabled);
//!
//! let json = r#"{ "url": "https://example.com", "bestAttempt": false }"#;
//! let request: RenderRequest = serde_json::from_str(json).unwrap();
//! assert!(!request.best_attempt);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::RenderError;
use crate::options::RenderOptions;

fn default_true() -> bool {
    true
}

// ============================================================================
// Request
// ============================================================================

/// Everything needed to render one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    /// Inline markup. Takes precedence over `url` when both are set.
    #[serde(default)]
    pub html: Option<String>,

    /// Remote document locator.
    #[serde(default)]
    pub url: Option<String>,

    /// Scripts injected once the document is ready.
    #[serde(default)]
    pub add_script_tag: Vec<ScriptTag>,

    /// Styles injected once the document is ready.
    #[serde(default)]
    pub add_style_tag: Vec<StyleTag>,

    /// HTTP authentication credentials.
    #[serde(default)]
    pub authenticate: Option<Credentials>,

    /// Cookies installed in the browser before navigation.
    #[serde(default)]
    pub cookies: Vec<Cookie>,

    /// CSS media type to emulate.
    #[serde(default)]
    pub emulate_media_type: Option<MediaType>,

    /// Print options.
    #[serde(default)]
    pub options: RenderOptions,

    /// URL patterns whose requests are blocked (`*` wildcard).
    #[serde(default)]
    pub reject_request_pattern: Vec<String>,

    /// Resource types whose requests are blocked.
    #[serde(default)]
    pub reject_resource_types: Vec<ResourceType>,

    /// Extra headers sent with every request.
    #[serde(default, rename = "setExtraHTTPHeaders")]
    pub extra_http_headers: BTreeMap<String, String>,

    /// Whether page scripts run.
    #[serde(default = "default_true", rename = "setJavaScriptEnabled")]
    pub javascript_enabled: bool,

    /// User-agent override.
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Browser window geometry.
    #[serde(default)]
    pub viewport: Option<Viewport>,

    /// Extra wait after readiness, in milliseconds.
    #[serde(default)]
    pub wait_for_timeout: Option<u64>,

    /// Tolerate readiness timeouts instead of failing.
    ///
    /// When `false`, a document that never becomes ready fails the render
    /// with [`RenderError::LoadTimeout`]. Font failures are fatal either way.
    #[serde(default = "default_true")]
    pub best_attempt: bool,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self {
            html: None,
            url: None,
            add_script_tag: Vec::new(),
            add_style_tag: Vec::new(),
            authenticate: None,
            cookies: Vec::new(),
            emulate_media_type: None,
            options: RenderOptions::default(),
            reject_request_pattern: Vec::new(),
            reject_resource_types: Vec::new(),
            extra_http_headers: BTreeMap::new(),
            javascript_enabled: true,
            user_agent: None,
            viewport: None,
            wait_for_timeout: None,
            best_attempt: true,
        }
    }
}

impl RenderRequest {
    /// Request for inline markup with default options.
    pub fn from_html(html: impl Into<String>) -> Self {
        Self {
            html: Some(html.into()),
            ..Default::default()
        }
    }

    /// Request for a remote document with default options.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Post-load wait as a [`Duration`], if any.
    pub fn post_load_wait(&self) -> Option<Duration> {
        self.wait_for_timeout
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Work out which document to load.
    ///
    /// # Errors
    ///
    /// [`RenderError::InvalidRequest`] if neither `html` nor `url` is usable.
    pub fn source(&self) -> Result<DocumentSource, RenderError> {
        if let Some(html) = self.html.as_deref().filter(|h| !h.trim().is_empty()) {
            return Ok(DocumentSource::Inline(html.to_string()));
        }

        match self.url.as_deref() {
            Some(url) => validate_url(url).map(DocumentSource::Remote),
            None => Err(RenderError::InvalidRequest(
                "either html or url is required".to_string(),
            )),
        }
    }

    /// Cookies to install for a render of `document`.
    ///
    /// Scoped cookies are kept as given. Unscoped ones are bound to the
    /// document URL; inline documents have none, so those are skipped.
    pub fn page_cookies(&self, document: Option<&Url>) -> Vec<Cookie> {
        self.cookies
            .iter()
            .filter_map(|cookie| {
                if cookie.is_scoped() {
                    return Some(cookie.clone());
                }
                match document {
                    Some(url) => Some(Cookie {
                        url: Some(url.to_string()),
                        ..cookie.clone()
                    }),
                    None => {
                        log::warn!(
                            "Skipping cookie '{}': no url or domain and the document has no host",
                            cookie.name
                        );
                        None
                    }
                }
            })
            .collect()
    }
}

/// The document a render loads.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentSource {
    /// Markup written to the session directory and loaded from disk.
    Inline(String),
    /// A validated remote URL.
    Remote(Url),
}

fn validate_url(url: &str) -> Result<Url, RenderError> {
    if url.trim().is_empty() {
        log::debug!("URL validation failed: empty URL");
        return Err(RenderError::InvalidRequest("URL is required".to_string()));
    }

    Url::parse(url.trim()).map_err(|e| {
        log::debug!("URL validation failed for '{}': {}", url, e);
        RenderError::InvalidRequest(format!("invalid URL '{}': {}", url, e))
    })
}

// ============================================================================
// Request Parts
// ============================================================================

/// A script to inject. Exactly one of `url`, `path`, `content` is used, in
/// that order of preference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptTag {
    pub url: Option<String>,
    /// Host file whose content is inlined.
    pub path: Option<String>,
    pub content: Option<String>,
    /// Script `type` attribute, e.g. `module`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub id: Option<String>,
}

/// A stylesheet to inject. Exactly one of `url`, `path`, `content` is used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleTag {
    pub url: Option<String>,
    pub path: Option<String>,
    pub content: Option<String>,
}

/// HTTP authentication credential pair.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A cookie installed in the browser before navigation.
///
/// The browser scopes it like any cookie it received: a cookie is sent only
/// to hosts matching its `url` or `domain`, and is visible to
/// `document.cookie` unless `httpOnly` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// URL the cookie is set for. Unscoped cookies default to the document URL.
    pub url: Option<String>,
    /// Domain the cookie is set for, subdomains included.
    pub domain: Option<String>,
    pub path: Option<String>,
    pub secure: Option<bool>,
    pub http_only: Option<bool>,
    pub same_site: Option<SameSite>,
    /// Expiry in seconds since the Unix epoch. Session cookie when absent.
    pub expires: Option<f64>,
    pub priority: Option<CookiePriority>,
    pub same_party: Option<bool>,
    pub source_scheme: Option<CookieSourceScheme>,
    pub partition_key: Option<CookiePartitionKey>,
}

impl Cookie {
    /// Whether the cookie names its own scope.
    pub fn is_scoped(&self) -> bool {
        self.url.is_some() || self.domain.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CookiePriority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CookieSourceScheme {
    Unset,
    NonSecure,
    Secure,
}

/// Partition of a partitioned (CHIPS) cookie.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CookiePartitionKey {
    /// Top-level site the cookie is partitioned under.
    pub source_origin: Option<String>,
    pub has_cross_site_ancestor: Option<bool>,
}

/// Browser window geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_scale_factor")]
    pub device_scale_factor: f64,
    /// Emulate a mobile device (meta viewport, overlay scrollbars).
    #[serde(default)]
    pub is_mobile: bool,
    #[serde(default)]
    pub has_touch: bool,
}

fn default_scale_factor() -> f64 {
    1.0
}

impl Viewport {
    /// Viewport of the given size with scale factor 1.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            device_scale_factor: 1.0,
            is_mobile: false,
            has_touch: false,
        }
    }
}

/// CSS media type for emulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Screen,
    Print,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Screen => "screen",
            MediaType::Print => "print",
        }
    }
}

/// Network resource categories that can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Document,
    Stylesheet,
    Image,
    Media,
    Font,
    Script,
    #[serde(rename = "texttrack")]
    TextTrack,
    Xhr,
    Fetch,
    #[serde(rename = "eventsource")]
    EventSource,
    #[serde(rename = "websocket")]
    WebSocket,
    Manifest,
    #[serde(rename = "signedexchange")]
    SignedExchange,
    Ping,
    #[serde(rename = "cspviolationreport")]
    CspViolationReport,
    Other,
}

impl ResourceType {
    /// Lowercase name, matching the browser's resource type with case folded.
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Document => "document",
            ResourceType::Stylesheet => "stylesheet",
            ResourceType::Image => "image",
            ResourceType::Media => "media",
            ResourceType::Font => "font",
            ResourceType::Script => "script",
            ResourceType::TextTrack => "texttrack",
            ResourceType::Xhr => "xhr",
            ResourceType::Fetch => "fetch",
            ResourceType::EventSource => "eventsource",
            ResourceType::WebSocket => "websocket",
            ResourceType::Manifest => "manifest",
            ResourceType::SignedExchange => "signedexchange",
            ResourceType::Ping => "ping",
            ResourceType::CspViolationReport => "cspviolationreport",
            ResourceType::Other => "other",
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let request = RenderRequest::default();
        assert!(request.best_attempt);
        assert!(request.javascript_enabled);
        assert!(request.post_load_wait().is_none());
        assert!(request.cookies.is_empty());
    }

    #[test]
    fn test_source_prefers_inline_markup() {
        let request = RenderRequest {
            html: Some("<p>inline</p>".to_string()),
            url: Some("https://example.com".to_string()),
            ..Default::default()
        };
        assert_eq!(
            request.source().unwrap(),
            DocumentSource::Inline("<p>inline</p>".to_string())
        );
    }

    #[test]
    fn test_source_falls_back_to_url_when_html_blank() {
        let request = RenderRequest {
            html: Some("   ".to_string()),
            url: Some("https://example.com/report".to_string()),
            ..Default::default()
        };
        match request.source().unwrap() {
            DocumentSource::Remote(url) => assert_eq!(url.as_str(), "https://example.com/report"),
            other => panic!("expected remote source, got {other:?}"),
        }
    }

    #[test]
    fn test_source_requires_document() {
        let result = RenderRequest::default().source();
        assert!(matches!(result, Err(RenderError::InvalidRequest(_))));
    }

    #[test]
    fn test_source_rejects_relative_url() {
        let result = RenderRequest::from_url("/path/to/page").source();
        assert!(matches!(result, Err(RenderError::InvalidRequest(_))));
    }

    #[test]
    fn test_post_load_wait_ignores_zero() {
        let mut request = RenderRequest::from_html("<p/>");
        request.wait_for_timeout = Some(0);
        assert!(request.post_load_wait().is_none());
        request.wait_for_timeout = Some(250);
        assert_eq!(request.post_load_wait(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_page_cookies_keep_scope() {
        let document = Url::parse("https://example.com/report").unwrap();
        let session = Cookie {
            name: "session".to_string(),
            value: "secret".to_string(),
            ..Default::default()
        };
        let cdn = Cookie {
            name: "cdn".to_string(),
            value: "token".to_string(),
            domain: Some("cdn.other.net".to_string()),
            http_only: Some(true),
            ..Default::default()
        };
        let request = RenderRequest {
            cookies: vec![session, cdn.clone()],
            ..Default::default()
        };

        let cookies = request.page_cookies(Some(&document));
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].url.as_deref(), Some("https://example.com/report"));
        assert_eq!(cookies[0].domain, None);
        assert_eq!(cookies[1], cdn);

        // Inline documents keep only cookies that carry their own scope.
        assert_eq!(request.page_cookies(None), vec![cdn]);
    }

    #[test]
    fn test_deserialize_cookie_attributes() {
        let json = r#"{
            "name": "sid", "value": "1", "domain": ".example.com", "path": "/app",
            "secure": true, "httpOnly": true, "sameSite": "Lax", "expires": 1900000000,
            "priority": "High", "sourceScheme": "Secure",
            "partitionKey": { "sourceOrigin": "https://example.com" }
        }"#;
        let cookie: Cookie = serde_json::from_str(json).unwrap();
        assert!(cookie.is_scoped());
        assert_eq!(cookie.path.as_deref(), Some("/app"));
        assert_eq!(cookie.http_only, Some(true));
        assert_eq!(cookie.same_site, Some(SameSite::Lax));
        assert_eq!(cookie.expires, Some(1_900_000_000.0));
        assert_eq!(cookie.priority, Some(CookiePriority::High));
        assert_eq!(cookie.source_scheme, Some(CookieSourceScheme::Secure));
        assert_eq!(
            cookie.partition_key.and_then(|k| k.source_origin).as_deref(),
            Some("https://example.com")
        );
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let credentials = Credentials {
            username: "reporter".to_string(),
            password: "hunter2".to_string(),
        };
        let debug = format!("{credentials:?}");
        assert!(debug.contains("reporter"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_deserialize_full_request() {
        let json = r#"{
            "html": "<h1>Report</h1>",
            "addScriptTag": [{ "content": "window.x = 1", "type": "module" }],
            "addStyleTag": [{ "url": "https://cdn.example.com/print.css" }],
            "authenticate": { "username": "u", "password": "p" },
            "cookies": [{ "name": "session", "value": "abc", "domain": "example.com" }],
            "emulateMediaType": "screen",
            "options": { "landscape": true },
            "rejectRequestPattern": ["*.analytics.com*"],
            "rejectResourceTypes": ["image", "cspviolationreport"],
            "setExtraHTTPHeaders": { "X-Trace": "1" },
            "setJavaScriptEnabled": false,
            "userAgent": "ReportBot/1.0",
            "viewport": { "width": 1280, "height": 800, "hasTouch": true },
            "waitForTimeout": 500,
            "bestAttempt": false
        }"#;
        let request: RenderRequest = serde_json::from_str(json).unwrap();

        assert_eq!(request.add_script_tag[0].kind.as_deref(), Some("module"));
        assert_eq!(request.emulate_media_type, Some(MediaType::Screen));
        assert!(request.options.landscape);
        assert_eq!(
            request.reject_resource_types,
            vec![ResourceType::Image, ResourceType::CspViolationReport]
        );
        assert_eq!(request.extra_http_headers.get("X-Trace").map(String::as_str), Some("1"));
        assert!(!request.javascript_enabled);
        let viewport = request.viewport.unwrap();
        assert_eq!(viewport.device_scale_factor, 1.0);
        assert!(viewport.has_touch);
        assert!(!request.best_attempt);
    }

    #[test]
    fn test_resource_type_names_match_serde() {
        for kind in [
            ResourceType::TextTrack,
            ResourceType::EventSource,
            ResourceType::WebSocket,
            ResourceType::Xhr,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }
}
