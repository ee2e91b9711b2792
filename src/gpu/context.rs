// SPDX-License-Identifier: GPL-3.0-only

//! Headless display and GLES context

use super::ReleaseGuard;
use super::platform::Platform;
use crate::config::FeatureLevel;
use crate::errors::{ContextError, KernelError, NativeError};
use tracing::{debug, info, warn};

/// Client extension that provides displays without a window system
pub const SURFACELESS_PLATFORM: &str = "EGL_MESA_platform_surfaceless";

/// Display extensions the conversion can't run without
pub const REQUIRED_DISPLAY_EXTENSIONS: [&str; 3] = [
    "EGL_KHR_surfaceless_context",
    "EGL_KHR_no_config_context",
    "EGL_EXT_image_dma_buf_import",
];

fn has_extension(extensions: &str, name: &str) -> bool {
    extensions.split_whitespace().any(|ext| ext == name)
}

fn native(step: &'static str) -> impl FnOnce(NativeError) -> ContextError {
    move |source| ContextError::Native { step, source }
}

/// Initialized surfaceless display plus one context for one feature level
pub struct DisplayContext<'p, P: Platform> {
    platform: &'p P,
    display: P::Display,
    context: P::Context,
    level: FeatureLevel,
}

impl<'p, P: Platform> DisplayContext<'p, P> {
    /// Initialize the display and create a context for `level`.
    ///
    /// On failure everything acquired so far is released before returning.
    pub fn new(platform: &'p P, level: FeatureLevel) -> Result<Self, ContextError> {
        let client = platform
            .client_extensions()
            .map_err(native("Failed to query egl client extensions"))?;
        if !has_extension(&client, SURFACELESS_PLATFORM) {
            return Err(ContextError::UnsupportedPlatform(SURFACELESS_PLATFORM));
        }

        let display = platform
            .surfaceless_display()
            .map_err(native("Failed to get egl display"))?;
        platform
            .initialize(display)
            .map_err(native("Failed to initialize egl display"))?;
        let terminate = ReleaseGuard::new(move || {
            if let Err(err) = platform.terminate(display) {
                warn!(error = %err, "Failed to terminate egl display");
            }
        });

        let extensions = platform
            .display_extensions(display)
            .map_err(native("Failed to query egl display extensions"))?;
        for name in REQUIRED_DISPLAY_EXTENSIONS {
            if !has_extension(&extensions, name) {
                return Err(ContextError::MissingExtension(name));
            }
        }

        platform
            .bind_api()
            .map_err(native("Failed to bind the OpenGL ES api"))?;
        let version = level.api_version();
        let context = platform
            .create_context(display, version)
            .map_err(native("Failed to create egl context"))?;
        terminate.disarm();

        info!(
            level = level.name(),
            major = version.major,
            minor = version.minor,
            "Display context created"
        );
        Ok(Self {
            platform,
            display,
            context,
            level,
        })
    }

    pub fn platform(&self) -> &'p P {
        self.platform
    }

    pub fn display(&self) -> P::Display {
        self.display
    }

    pub fn level(&self) -> FeatureLevel {
        self.level
    }

    /// Make the context current on this thread
    pub fn make_current(&self) -> Result<(), ContextError> {
        self.platform
            .make_current(self.display, Some(self.context))
            .map_err(native("Failed to make egl context current"))
    }

    /// Unbind any context from this thread
    pub fn reset_current(&self) -> Result<(), ContextError> {
        self.platform
            .make_current(self.display, None)
            .map_err(native("Failed to release current egl context"))
    }

    /// Make the context current until the guard drops
    pub fn bind_current(&self) -> Result<CurrentGuard<'_, 'p, P>, ContextError> {
        self.make_current()?;
        Ok(CurrentGuard { context: self })
    }

    /// Block until all submitted GPU work has finished
    pub fn sync(&self) -> Result<(), KernelError> {
        self.platform
            .fence_sync(self.display)
            .map_err(|source| KernelError::Native {
                step: "Failed to wait for gpu fence",
                source,
            })?;
        debug!("GPU work finished");
        Ok(())
    }
}

impl<P: Platform> Drop for DisplayContext<'_, P> {
    fn drop(&mut self) {
        if let Err(err) = self.platform.destroy_context(self.display, self.context) {
            warn!(error = %err, "Failed to destroy egl context");
        }
        if let Err(err) = self.platform.terminate(self.display) {
            warn!(error = %err, "Failed to terminate egl display");
        }
        debug!("Display context destroyed");
    }
}

/// Current-context binding, reset on drop
pub struct CurrentGuard<'c, 'p, P: Platform> {
    context: &'c DisplayContext<'p, P>,
}

impl<P: Platform> Drop for CurrentGuard<'_, '_, P> {
    fn drop(&mut self) {
        if let Err(err) = self.context.reset_current() {
            warn!(error = %err, "Failed to reset current context");
        }
    }
}
