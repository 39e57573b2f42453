//! RAII ownership of one render's browser process and working directory.
//!
//! A [`RenderSession`] is created in the Acquire phase and dropped at
//! Teardown. Dropping it closes the browser and then removes the working
//! directory, on every exit path: success, error return, or panic unwind.
//! Teardown problems are logged and never replace the render's own result.
//!
//! # Layout
//!
//! ```text
//! <temp_root>/html2pdf-XXXXXX/
//! ├── profile/          browser user-data directory
//! └── document.html     inline markup, when the request carries some
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use url::Url;

use crate::config::RenderConfig;
use crate::driver::{BrowserDriver, BrowserLauncher, LaunchSpec};
use crate::error::RenderError;
use crate::request::Viewport;

/// Prefix of every session working directory.
pub const WORKDIR_PREFIX: &str = "html2pdf-";

/// File name inline markup is written to.
pub const DOCUMENT_FILE: &str = "document.html";

/// Exclusive owner of one browser process and its working directory.
///
/// `RenderSession` is `Send` but not `Sync`: a render moves between threads
/// but never shares its browser.
///
/// # Drop order
///
/// The browser is closed before the directory is removed, since a live
/// browser may still be writing into its profile.
pub struct RenderSession {
    /// Option allows taking the driver in Drop.
    driver: Option<Box<dyn BrowserDriver>>,
    workdir: Option<TempDir>,
}

impl RenderSession {
    /// Create the working directory and launch a browser into it.
    ///
    /// If the launch fails the directory is removed before returning.
    ///
    /// # Errors
    ///
    /// [`RenderError::AcquireFailure`] if the directory cannot be created or
    /// the browser cannot be started.
    pub fn open(
        launcher: &dyn BrowserLauncher,
        config: &RenderConfig,
        viewport: Option<&Viewport>,
        operation_timeout: Duration,
    ) -> Result<Self, RenderError> {
        let workdir = create_workdir(config.temp_root.as_deref())?;
        log::debug!(" Created session directory {:?}", workdir.path());

        let spec = launch_spec(config, viewport, workdir.path(), operation_timeout);

        let mut session = Self {
            driver: None,
            workdir: Some(workdir),
        };

        let driver = launcher.launch(&spec).map_err(|e| {
            log::error!("❌ Browser launch failed: {}", e);
            RenderError::AcquireFailure(e.to_string())
        })?;
        session.driver = Some(driver);

        Ok(session)
    }

    /// Path of the working directory.
    pub fn workdir(&self) -> Option<&Path> {
        self.workdir.as_ref().map(TempDir::path)
    }

    /// Write inline markup into the working directory and return its
    /// `file://` locator.
    pub fn write_document(&self, html: &str) -> Result<Url, RenderError> {
        let dir = self
            .workdir()
            .ok_or_else(|| RenderError::Io("session directory already removed".to_string()))?;
        let path = dir.join(DOCUMENT_FILE);

        std::fs::write(&path, html)?;
        log::trace!("Wrote {} bytes of markup to {:?}", html.len(), path);

        // file URLs need an absolute path; temp_root may be relative.
        let path = std::fs::canonicalize(&path)?;
        Url::from_file_path(&path)
            .map_err(|_| RenderError::Io(format!("cannot build file URL for {:?}", path)))
    }

    pub fn driver(&self) -> Result<&dyn BrowserDriver, RenderError> {
        self.driver.as_deref().ok_or_else(closed)
    }

    pub fn driver_mut(&mut self) -> Result<&mut (dyn BrowserDriver + 'static), RenderError> {
        self.driver.as_deref_mut().ok_or_else(closed)
    }
}

fn closed() -> RenderError {
    RenderError::AcquireFailure("browser session already closed".to_string())
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            log::debug!(" RenderSession being dropped, closing browser...");
            if let Err(e) = driver.close() {
                log::warn!("Failed to close browser (continuing teardown): {}", e);
            }
        }

        if let Some(workdir) = self.workdir.take() {
            let path = workdir.path().to_path_buf();
            match workdir.close() {
                Ok(()) => log::trace!("Removed session directory {:?}", path),
                Err(e) => log::warn!("Failed to remove session directory {:?}: {}", path, e),
            }
        }
    }
}

impl std::fmt::Debug for RenderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSession")
            .field("workdir", &self.workdir())
            .field("browser", &if self.driver.is_some() { "live" } else { "closed" })
            .finish()
    }
}

fn create_workdir(temp_root: Option<&Path>) -> Result<TempDir, RenderError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(WORKDIR_PREFIX);

    let result = match temp_root {
        Some(root) => builder.tempdir_in(root),
        None => builder.tempdir(),
    };

    result.map_err(|e| {
        log::error!("❌ Failed to create session directory: {}", e);
        RenderError::AcquireFailure(format!("cannot create working directory: {}", e))
    })
}

/// Build the launch spec for one render.
///
/// The configured flags are copied, never mutated, so the device scale
/// factor of one request cannot leak into the next.
pub fn launch_spec(
    config: &RenderConfig,
    viewport: Option<&Viewport>,
    workdir: &Path,
    operation_timeout: Duration,
) -> LaunchSpec {
    let mut args = config.launch_args.clone();

    if let Some(viewport) = viewport {
        if viewport.device_scale_factor > 0.0 && viewport.device_scale_factor != 1.0 {
            args.push(format!(
                "--force-device-scale-factor={}",
                viewport.device_scale_factor
            ));
        }
    }

    LaunchSpec {
        chrome_path: config.chrome_path.clone(),
        args,
        window_size: viewport.map(|v| (v.width, v.height)),
        profile_dir: profile_dir(workdir),
        operation_timeout,
    }
}

fn profile_dir(workdir: &Path) -> PathBuf {
    workdir.join("profile")
}

// ============================================================================
// Unit Tests
// ============================================================================
