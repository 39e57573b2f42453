//! Renderer and job-queue configuration.
//!
//! This module provides [`RenderConfig`] (browser launch flags, readiness
//! polling, the overall render deadline) and [`QueueConfig`] (background
//! worker count and queue depth), each with a validating builder.
//!
//! A [`RenderConfig`] is an immutable value. Each render clones the launch
//! flags into its own launch spec, so request-scoped flags (for example a
//! viewport's device scale factor) never leak into other renders.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use html2pdf_render::config::RenderConfigBuilder;
//!
//! let config = RenderConfigBuilder::new()
//!     .chrome_path("/usr/bin/chromium")
//!     .ready_poll_interval(Duration::from_millis(100))
//!     .render_deadline(Some(Duration::from_secs(60)))
//!     .build()
//!     .expect("Invalid configuration");
//!
//! assert_eq!(config.chrome_path.as_deref(), Some("/usr/bin/chromium"));
//! ```
//!
//! # Environment Configuration
//!
//! When the `env-config` feature is enabled, configuration can be loaded
//! from environment variables and an optional `app.env` file:
//!
//! ```rust,ignore
//! use html2pdf_render::config::env::from_env;
//!
//! let config = from_env()?;
//! ```
//!
//! See [`mod@env`] module for available environment variables.

use std::path::PathBuf;
use std::time::Duration;

/// Fixed capability flags passed to every browser launch.
///
/// ## Memory and Performance
/// - `--disable-dev-shm-usage` - Use /tmp instead of /dev/shm (container-friendly)
/// - `--disable-crash-reporter`
///
/// ## GPU and Rendering
/// - `--disable-gpu`, `--disable-gpu-compositing`, `--disable-software-rasterizer`
///
/// ## Disabled Features
/// - `--disable-extensions`, `--disable-plugins`, `--disable-sync`, `--disable-default-apps`
///
/// ## Stability
/// - `--disable-background-timer-throttling`, `--disable-renderer-backgrounding`,
///   `--disable-backgrounding-occluded-windows`, `--disable-hang-monitor`
///
/// ## Printing
/// - `--font-render-hinting=none` - Stable glyph metrics across hosts
pub const DEFAULT_LAUNCH_ARGS: &[&str] = &[
    "--disable-dev-shm-usage",
    "--disable-crash-reporter",
    "--disable-gpu",
    "--disable-gpu-compositing",
    "--disable-software-rasterizer",
    "--disable-extensions",
    "--disable-plugins",
    "--disable-sync",
    "--disable-default-apps",
    "--disable-background-timer-throttling",
    "--disable-renderer-backgrounding",
    "--disable-backgrounding-occluded-windows",
    "--disable-hang-monitor",
    "--font-render-hinting=none",
];

/// Configuration shared by every render of a [`Renderer`](crate::render::Renderer).
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Browser binary. `None` lets the launcher auto-detect.
    pub chrome_path: Option<String>,

    /// Launch flags applied to every browser process.
    ///
    /// Default: [`DEFAULT_LAUNCH_ARGS`]
    pub launch_args: Vec<String>,

    /// Interval between `document.readyState` polls.
    ///
    /// Default: 200ms
    pub ready_poll_interval: Duration,

    /// Wall-clock cap on a whole render when run through
    /// [`PdfService`](crate::service::PdfService). `None` disables it.
    ///
    /// The cap bounds the caller's wait. The render itself still runs to
    /// teardown in the background.
    ///
    /// Default: 120 seconds
    pub render_deadline: Option<Duration>,

    /// Parent directory for per-render working directories.
    /// `None` uses the system temp directory.
    pub temp_root: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            launch_args: DEFAULT_LAUNCH_ARGS.iter().map(|s| s.to_string()).collect(),
            ready_poll_interval: Duration::from_millis(200),
            render_deadline: Some(Duration::from_secs(120)),
            temp_root: None,
        }
    }
}

/// Builder for [`RenderConfig`] with validation.
pub struct RenderConfigBuilder {
    config: RenderConfig,
}

impl RenderConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self {
            config: RenderConfig::default(),
        }
    }

    /// Set a custom browser binary path.
    pub fn chrome_path(mut self, path: impl Into<String>) -> Self {
        self.config.chrome_path = Some(path.into());
        self
    }

    /// Replace the launch flags.
    pub fn launch_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.launch_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the readiness polling interval.
    pub fn ready_poll_interval(mut self, interval: Duration) -> Self {
        self.config.ready_poll_interval = interval;
        self
    }

    /// Set (or disable with `None`) the overall render deadline.
    pub fn render_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.config.render_deadline = deadline;
        self
    }

    /// Set the parent directory for session working directories.
    pub fn temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.temp_root = Some(root.into());
        self
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// - Returns error if `ready_poll_interval` is zero
    /// - Returns error if `render_deadline` is `Some(0)`
    pub fn build(self) -> std::result::Result<RenderConfig, String> {
        if self.config.ready_poll_interval.is_zero() {
            return Err("ready_poll_interval must be greater than 0".to_string());
        }

        if self.config.render_deadline.is_some_and(|d| d.is_zero()) {
            return Err("render_deadline must be greater than 0 when set".to_string());
        }

        Ok(self.config)
    }
}

impl Default for RenderConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Queue Configuration
// ============================================================================

/// Configuration for the background [`JobQueue`](crate::jobs::JobQueue).
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Number of jobs processed concurrently. Each worker runs one job at a
    /// time.
    ///
    /// Default: 2
    pub workers: usize,

    /// Maximum queued jobs before submissions are rejected.
    ///
    /// Default: 64
    pub capacity: usize,

    /// How long a finished job's result is kept if nobody collects it.
    ///
    /// Default: 1 hour
    pub result_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            capacity: 64,
            result_ttl: Duration::from_secs(3600),
        }
    }
}

/// Builder for [`QueueConfig`] with validation.
pub struct QueueConfigBuilder {
    config: QueueConfig,
}

impl QueueConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self {
            config: QueueConfig::default(),
        }
    }

    /// Set the worker count.
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// Set the queue capacity.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Set how long uncollected results are kept.
    pub fn result_ttl(mut self, ttl: Duration) -> Self {
        self.config.result_ttl = ttl;
        self
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns error if `workers`, `capacity` or `result_ttl` is zero.
    pub fn build(self) -> std::result::Result<QueueConfig, String> {
        if self.config.workers == 0 {
            return Err("workers must be greater than 0".to_string());
        }

        if self.config.capacity == 0 {
            return Err("capacity must be greater than 0".to_string());
        }

        if self.config.result_ttl.is_zero() {
            return Err("result_ttl must be greater than 0".to_string());
        }

        Ok(self.config)
    }
}

impl Default for QueueConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Environment Configuration (feature-gated)
// ============================================================================

/// Environment-based configuration loading.
///
/// | Variable | Type | Default | Description |
/// |----------|------|---------|-------------|
/// | `CHROME_PATH` | String | auto | Custom browser binary path |
/// | `RENDER_POLL_INTERVAL_MS` | u64 | 200 | Readiness polling interval |
/// | `RENDER_DEADLINE_SECONDS` | u64 | 120 | Overall render deadline, 0 disables |
/// | `RENDER_TEMP_DIR` | String | system | Parent of session directories |
/// | `RENDER_QUEUE_WORKERS` | usize | 2 | Background workers |
/// | `RENDER_QUEUE_CAPACITY` | usize | 64 | Background queue depth |
/// | `RENDER_QUEUE_RESULT_TTL_SECONDS` | u64 | 3600 | Lifetime of uncollected results |
#[cfg(feature = "env-config")]
pub mod env {
    use super::*;

    /// Default environment file name.
    pub const ENV_FILE_NAME: &str = "app.env";

    /// Load environment variables from `app.env` if present.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be parsed, or is missing.
    pub fn load_env_file() -> Result<std::path::PathBuf, dotenvy::Error> {
        dotenvy::from_filename(ENV_FILE_NAME)
    }

    fn var<T: std::str::FromStr>(name: &str) -> Option<T> {
        std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
    }

    fn load_env_file_logged() {
        match load_env_file() {
            Ok(path) => {
                log::info!("Loaded configuration from: {:?}", path);
            }
            Err(e) => {
                log::debug!(
                    "No {} file found or failed to load: {} (using environment variables and defaults)",
                    ENV_FILE_NAME,
                    e
                );
            }
        }
    }

    /// Load [`RenderConfig`] from the environment.
    ///
    /// # Errors
    ///
    /// Returns error if the resulting values fail validation.
    pub fn from_env() -> Result<RenderConfig, String> {
        load_env_file_logged();

        let poll_ms: u64 = var("RENDER_POLL_INTERVAL_MS").unwrap_or(200);
        let deadline_secs: u64 = var("RENDER_DEADLINE_SECONDS").unwrap_or(120);

        log::info!("Loading render configuration from environment:");
        log::info!("   - Poll interval: {}ms", poll_ms);
        if deadline_secs == 0 {
            log::info!("   - Render deadline: disabled");
        } else {
            log::info!("   - Render deadline: {}s", deadline_secs);
        }

        let mut builder = RenderConfigBuilder::new()
            .ready_poll_interval(Duration::from_millis(poll_ms))
            .render_deadline((deadline_secs > 0).then(|| Duration::from_secs(deadline_secs)));

        if let Some(path) = chrome_path_from_env() {
            log::info!("   - Chrome path: {}", path);
            builder = builder.chrome_path(path);
        }

        if let Ok(dir) = std::env::var("RENDER_TEMP_DIR") {
            log::info!("   - Temp root: {}", dir);
            builder = builder.temp_root(dir);
        }

        builder.build()
    }

    /// Load [`QueueConfig`] from the environment.
    ///
    /// # Errors
    ///
    /// Returns error if the resulting values fail validation.
    pub fn queue_from_env() -> Result<QueueConfig, String> {
        load_env_file_logged();

        let workers: usize = var("RENDER_QUEUE_WORKERS").unwrap_or(2);
        let capacity: usize = var("RENDER_QUEUE_CAPACITY").unwrap_or(64);
        let ttl_secs: u64 = var("RENDER_QUEUE_RESULT_TTL_SECONDS").unwrap_or(3600);

        log::info!("Loading queue configuration from environment:");
        log::info!("   - Workers: {}", workers);
        log::info!("   - Capacity: {}", capacity);
        log::info!("   - Result TTL: {}s", ttl_secs);

        QueueConfigBuilder::new()
            .workers(workers)
            .capacity(capacity)
            .result_ttl(Duration::from_secs(ttl_secs))
            .build()
    }

    /// Get the browser path from `CHROME_PATH`, if set.
    pub fn chrome_path_from_env() -> Option<String> {
        std::env::var("CHROME_PATH").ok().filter(|p| !p.trim().is_empty())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
