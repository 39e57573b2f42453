//! Chrome/Chromium driver implementation.
//!
//! This module provides [`ChromeLauncher`], which spawns one headless Chrome
//! process per render, and [`ChromeDriver`], which drives the single tab of
//! that process over the DevTools protocol.
//!
//! # Example
//!
//! ```rust,ignore
//! use html2pdf_render::driver::ChromeLauncher;
//!
//! // Auto-detect Chrome installation
//! let launcher = ChromeLauncher::new();
//! ```

use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use headless_chrome::browser::tab::{RequestInterceptor, RequestPausedDecision};
use headless_chrome::browser::transport::{SessionId, Transport};
use headless_chrome::protocol::cdp::{Emulation, Network, Runtime};
use headless_chrome::protocol::cdp::Fetch::FailRequest;
use headless_chrome::protocol::cdp::Fetch::events::RequestPausedEvent;
use headless_chrome::protocol::cdp::Network::ErrorReason;
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;

use super::{BrowserDriver, BrowserLauncher, LaunchSpec, PageSetup};
use crate::error::DriverError;
use crate::print::CompiledPrintParameters;
use crate::request::{Cookie, CookiePriority, CookieSourceScheme, SameSite};

/// Grace period on top of the operation timeout before `headless_chrome`
/// considers an idle browser dead.
const IDLE_GRACE: Duration = Duration::from_secs(30);

/// Launches headless Chrome/Chromium.
///
/// Stateless: everything that varies per render arrives in the
/// [`LaunchSpec`], so one launcher serves any number of concurrent renders.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeLauncher;

impl ChromeLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl BrowserLauncher for ChromeLauncher {
    fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn BrowserDriver>, DriverError> {
        log::trace!(" ChromeLauncher::launch() called");

        let options = create_launch_options(spec)?;

        log::debug!(" Launching Chrome browser...");
        let browser = Browser::new(options).map_err(|e| {
            log::error!("❌ Chrome launch failed: {}", e);
            DriverError::Launch(e.to_string())
        })?;

        let tab = browser.new_tab().map_err(|e| {
            log::error!("❌ Failed to create tab: {}", e);
            DriverError::Launch(format!("failed to open tab: {}", e))
        })?;
        tab.set_default_timeout(spec.operation_timeout);

        Ok(Box::new(ChromeDriver { tab, browser }))
    }
}

/// Build Chrome launch options for one render.
///
/// The default `headless_chrome` flags are disabled so the flag list in the
/// spec is exactly what the process receives.
///
/// # Errors
///
/// Returns [`DriverError::Launch`] if the options builder rejects the
/// configuration (rare, usually a bug).
pub fn create_launch_options(spec: &LaunchSpec) -> Result<LaunchOptions<'_>, DriverError> {
    match spec.chrome_path.as_deref() {
        Some(path) => log::debug!(" Creating Chrome options with custom path: {}", path),
        None => log::debug!(" Creating Chrome options (auto-detect browser)"),
    }

    let mut builder = LaunchOptions::default_builder();

    if let Some(path) = spec.chrome_path.as_deref() {
        builder.path(Some(path.into()));
    }

    builder
        .headless(true)
        .sandbox(false)
        .disable_default_args(true)
        .window_size(spec.window_size)
        .user_data_dir(Some(spec.profile_dir.clone()))
        .idle_browser_timeout(spec.operation_timeout + IDLE_GRACE)
        .args(spec.args.iter().map(OsStr::new).collect())
        .build()
        .map_err(|e| {
            let path_msg = spec.chrome_path.as_deref().unwrap_or("auto-detect");
            log::error!(
                "❌ Failed to build Chrome launch options (path: {}): {}",
                path_msg,
                e
            );
            DriverError::Launch(e.to_string())
        })
}

/// Protocol form of a request cookie.
fn cookie_param(cookie: &Cookie) -> Network::CookieParam {
    Network::CookieParam {
        name: cookie.name.clone(),
        value: cookie.value.clone(),
        url: cookie.url.clone(),
        domain: cookie.domain.clone(),
        path: cookie.path.clone(),
        secure: cookie.secure,
        http_only: cookie.http_only,
        same_site: cookie.same_site.map(|same_site| match same_site {
            SameSite::Strict => Network::CookieSameSite::Strict,
            SameSite::Lax => Network::CookieSameSite::Lax,
            SameSite::None => Network::CookieSameSite::None,
        }),
        expires: cookie.expires,
        priority: cookie.priority.map(|priority| match priority {
            CookiePriority::Low => Network::CookiePriority::Low,
            CookiePriority::Medium => Network::CookiePriority::Medium,
            CookiePriority::High => Network::CookiePriority::High,
        }),
        same_party: cookie.same_party,
        source_scheme: cookie.source_scheme.map(|scheme| match scheme {
            CookieSourceScheme::Unset => Network::CookieSourceScheme::Unset,
            CookieSourceScheme::NonSecure => Network::CookieSourceScheme::NonSecure,
            CookieSourceScheme::Secure => Network::CookieSourceScheme::Secure,
        }),
        source_port: None,
        partition_key: cookie.partition_key.as_ref().and_then(|key| {
            key.source_origin.clone().map(|top_level_site| Network::CookiePartitionKey {
                top_level_site,
                has_cross_site_ancestor: key.has_cross_site_ancestor.unwrap_or(false),
            })
        }),
    }
}

// ============================================================================
// Driver
// ============================================================================

/// A live Chrome process with one tab.
///
/// Dropping the driver kills the process; [`close`](BrowserDriver::close)
/// closes the tab first so the page's unload handlers run.
pub struct ChromeDriver {
    tab: Arc<Tab>,
    browser: Browser,
}

impl ChromeDriver {
    fn setup_error(step: &str, e: impl std::fmt::Display) -> DriverError {
        log::warn!("Page setup step '{}' failed: {}", step, e);
        DriverError::Script(format!("{}: {}", step, e))
    }

    fn install_interception(&self, setup: &PageSetup) -> Result<(), DriverError> {
        let needs_fetch = setup.intercepts_requests() || setup.credentials.is_some();
        if !needs_fetch {
            return Ok(());
        }

        self.tab
            .enable_fetch(None, Some(setup.credentials.is_some()))
            .map_err(|e| Self::setup_error("enable fetch", e))?;

        if let Some(credentials) = &setup.credentials {
            self.tab
                .authenticate(
                    Some(credentials.username.clone()),
                    Some(credentials.password.clone()),
                )
                .map_err(|e| Self::setup_error("authenticate", e))?;
        }

        if setup.intercepts_requests() {
            let rules = setup.clone();
            let interceptor: Arc<dyn RequestInterceptor + Send + Sync> = Arc::new(
                move |_transport: Arc<Transport>,
                      _session_id: SessionId,
                      event: RequestPausedEvent| {
                    let resource_type =
                        format!("{:?}", event.params.resource_Type).to_ascii_lowercase();
                    if rules.blocks(&event.params.request.url, &resource_type) {
                        log::trace!("Blocking {} request: {}", resource_type, event.params.request.url);
                        RequestPausedDecision::Fail(FailRequest {
                            request_id: event.params.request_id,
                            error_reason: ErrorReason::BlockedByClient,
                        })
                    } else {
                        RequestPausedDecision::Continue(None)
                    }
                },
            );
            self.tab
                .enable_request_interception(interceptor)
                .map_err(|e| Self::setup_error("request interception", e))?;
        }

        Ok(())
    }
}

impl BrowserDriver for ChromeDriver {
    fn prepare(&mut self, setup: &PageSetup) -> Result<(), DriverError> {
        if let Some(user_agent) = setup.user_agent.as_deref() {
            self.tab
                .set_user_agent(user_agent, None, None)
                .map_err(|e| Self::setup_error("user agent", e))?;
        }

        if !setup.extra_headers.is_empty() {
            let headers: HashMap<&str, &str> = setup
                .extra_headers
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            self.tab
                .set_extra_http_headers(headers)
                .map_err(|e| Self::setup_error("extra headers", e))?;
        }

        if !setup.cookies.is_empty() {
            let cookies = setup.cookies.iter().map(cookie_param).collect();
            self.tab
                .call_method(Network::SetCookies { cookies })
                .map_err(|e| Self::setup_error("cookies", e))?;
        }

        if let Some(viewport) = &setup.mobile {
            self.tab
                .call_method(Emulation::SetDeviceMetricsOverride {
                    width: viewport.width,
                    height: viewport.height,
                    device_scale_factor: viewport.device_scale_factor,
                    mobile: true,
                    scale: None,
                    screen_width: None,
                    screen_height: None,
                    position_x: None,
                    position_y: None,
                    dont_set_visible_size: None,
                    screen_orientation: None,
                    viewport: None,
                    display_feature: None,
                    device_posture: None,
                })
                .map_err(|e| Self::setup_error("mobile emulation", e))?;
        }

        if let Some(media) = setup.media {
            self.tab
                .call_method(Emulation::SetEmulatedMedia {
                    media: Some(media.as_str().to_string()),
                    features: None,
                })
                .map_err(|e| Self::setup_error("emulate media", e))?;
        }

        if !setup.javascript_enabled {
            self.tab
                .call_method(Emulation::SetScriptExecutionDisabled { value: true })
                .map_err(|e| Self::setup_error("disable scripts", e))?;
        }

        if setup.touch {
            self.tab
                .call_method(Emulation::SetTouchEmulationEnabled {
                    enabled: true,
                    max_touch_points: None,
                })
                .map_err(|e| Self::setup_error("touch emulation", e))?;
        }

        self.install_interception(setup)
    }

    fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.tab
            .navigate_to(url)
            .map_err(|e| {
                log::error!("❌ Failed to navigate to URL: {}", e);
                DriverError::Navigation(e.to_string())
            })?
            .wait_until_navigated()
            .map_err(|e| {
                log::warn!("Navigation did not settle: {}", e);
                DriverError::Timeout(e.to_string())
            })?;
        Ok(())
    }

    /// `Tab::evaluate` drops `exceptionDetails`, so a thrown script or a
    /// rejected promise would look like a script returning nothing. The
    /// protocol call is made directly and exceptions become errors.
    fn evaluate(&self, script: &str, await_promise: bool) -> Result<Option<Value>, DriverError> {
        let returned = self
            .tab
            .call_method(Runtime::Evaluate {
                expression: script.to_string(),
                object_group: None,
                include_command_line_api: Some(false),
                silent: Some(false),
                context_id: None,
                return_by_value: Some(true),
                generate_preview: Some(false),
                user_gesture: Some(false),
                await_promise: Some(await_promise),
                throw_on_side_effect: None,
                timeout: None,
                disable_breaks: None,
                repl_mode: None,
                allow_unsafe_eval_blocked_by_csp: None,
                unique_context_id: None,
                serialization_options: None,
            })
            .map_err(|e| DriverError::Script(e.to_string()))?;

        if let Some(details) = returned.exception_details {
            let message = details
                .exception
                .and_then(|exception| exception.description)
                .unwrap_or(details.text);
            log::debug!("Page script threw: {}", message);
            return Err(DriverError::Script(message));
        }

        Ok(returned.result.value)
    }

    fn print_to_document(
        &self,
        params: &CompiledPrintParameters,
    ) -> Result<Option<String>, DriverError> {
        let options = PrintToPdfOptions {
            landscape: Some(params.landscape),
            display_header_footer: Some(params.displays_header_footer()),
            print_background: Some(params.print_background),
            scale: Some(params.scale),
            paper_width: Some(params.paper_width),
            paper_height: Some(params.paper_height),
            margin_top: Some(params.margin_top),
            margin_bottom: Some(params.margin_bottom),
            margin_left: Some(params.margin_left),
            margin_right: Some(params.margin_right),
            page_ranges: params.page_ranges.clone(),
            header_template: params.header_template.clone(),
            footer_template: params.footer_template.clone(),
            prefer_css_page_size: Some(params.prefer_css_page_size),
            ..Default::default()
        };

        let bytes = self.tab.print_to_pdf(Some(options)).map_err(|e| {
            log::error!("❌ Failed to generate PDF: {}", e);
            DriverError::Print(e.to_string())
        })?;

        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(BASE64_STANDARD.encode(bytes)))
    }

    fn close(self: Box<Self>) -> Result<(), DriverError> {
        log::trace!("Closing browser tab");
        let result = self
            .tab
            .close(true)
            .map(|_| ())
            .map_err(|e| DriverError::Close(e.to_string()));

        // Dropping the browser terminates the process.
        drop(self.browser);
        result
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
