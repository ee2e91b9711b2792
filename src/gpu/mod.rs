// SPDX-License-Identifier: GPL-3.0-only

//! Zero-copy GPU plumbing
//!
//! Buffers are allocated on a DRM render node ([`alloc`], [`gbm`]), shared
//! with a headless EGL context ([`context`], [`egl`]) as dma-buf backed
//! textures ([`import`]). Every native object is owned by a RAII wrapper, so
//! release runs in reverse acquisition order on any exit path.

pub mod alloc;
pub mod context;
pub mod egl;
pub mod gbm;
pub mod import;
#[cfg(test)]
pub mod mock;
pub mod platform;

pub use alloc::{Access, Allocator, DeviceBuffer, MappedRegion, RenderDevice};
pub use context::{CurrentGuard, DisplayContext};
pub use egl::EglPlatform;
pub use gbm::GbmAllocator;
pub use import::ImportedTexture;
pub use platform::{DmaBufDescriptor, Platform};

/// Runs a release action on drop unless disarmed.
///
/// Multi-step constructors arm one guard per acquired resource and disarm
/// them all once the finished object takes ownership.
#[must_use]
pub struct ReleaseGuard<F: FnOnce()> {
    release: Option<F>,
}

impl<F: FnOnce()> ReleaseGuard<F> {
    pub fn new(release: F) -> Self {
        Self {
            release: Some(release),
        }
    }

    /// Ownership moved elsewhere, skip the release
    pub fn disarm(mut self) {
        self.release = None;
    }
}

impl<F: FnOnce()> Drop for ReleaseGuard<F> {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}
