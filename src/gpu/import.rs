// SPDX-License-Identifier: GPL-3.0-only

//! dma-buf import as GLES textures

use super::ReleaseGuard;
use super::alloc::{Allocator, DeviceBuffer};
use super::context::DisplayContext;
use super::platform::Platform;
use crate::errors::{ImportError, NativeError};
use drm_fourcc::DrmFourcc;
use tracing::{debug, warn};

/// EGLImage over a device buffer plus the texture bound to it
///
/// Borrows both the display context and the buffer, so it can't outlive
/// either of them.
pub struct ImportedTexture<'c, P: Platform> {
    platform: &'c P,
    display: P::Display,
    image: P::Image,
    texture: P::Texture,
    width: u32,
    height: u32,
    fourcc: DrmFourcc,
}

impl<P: Platform> ImportedTexture<'_, P> {
    pub fn texture(&self) -> P::Texture {
        self.texture
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn fourcc(&self) -> DrmFourcc {
        self.fourcc
    }
}

impl<P: Platform> Drop for ImportedTexture<'_, P> {
    fn drop(&mut self) {
        self.platform.delete_texture(self.texture);
        if let Err(err) = self.platform.destroy_image(self.display, self.image) {
            warn!(error = %err, "Failed to destroy egl image");
        }
    }
}

impl<'p, P: Platform> DisplayContext<'p, P> {
    /// Wrap `buffer` in a texture without copying.
    ///
    /// The context must be current. The buffer's memory is read as `fourcc`,
    /// so the same buffer can be viewed with different channel orders.
    ///
    /// The buffer stays borrowed while the texture lives:
    ///
    /// ```compile_fail
    /// use drm_fourcc::DrmFourcc;
    /// use framesconv::FeatureLevel;
    /// use framesconv::gpu::{DisplayContext, EglPlatform, GbmAllocator, RenderDevice};
    /// use std::path::Path;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let allocator = GbmAllocator;
    /// let platform = EglPlatform::load()?;
    /// let device = RenderDevice::open(&allocator, Path::new("/dev/dri/renderD128"))?;
    /// let buffer = device.create_buffer(8, 4)?;
    /// let context = DisplayContext::new(&platform, FeatureLevel::Compute)?;
    /// let texture = context.import(&buffer, DrmFourcc::Abgr8888)?;
    /// drop(buffer);
    /// let _ = texture.texture();
    /// # Ok(())
    /// # }
    /// ```
    pub fn import<'a, A: Allocator>(
        &'a self,
        buffer: &'a DeviceBuffer<'_, A>,
        fourcc: DrmFourcc,
    ) -> Result<ImportedTexture<'a, P>, ImportError> {
        let platform = self.platform();
        let display = self.display();
        let descriptor = buffer.descriptor(fourcc);

        let image = platform
            .create_image(display, &descriptor)
            .map_err(native("Failed to create egl image from dma-buf"))?;
        let destroy = ReleaseGuard::new(move || {
            if let Err(err) = platform.destroy_image(display, image) {
                warn!(error = %err, "Failed to destroy egl image");
            }
        });
        let texture = platform
            .create_texture(image)
            .map_err(native("Failed to bind egl image to texture"))?;
        destroy.disarm();

        debug!(
            width = descriptor.width,
            height = descriptor.height,
            fourcc = ?fourcc,
            pitch = descriptor.pitch,
            "Imported dma-buf"
        );
        Ok(ImportedTexture {
            platform,
            display,
            image,
            texture,
            width: descriptor.width,
            height: descriptor.height,
            fourcc,
        })
    }
}

fn native(step: &'static str) -> impl FnOnce(NativeError) -> ImportError {
    move |source| ImportError::Native { step, source }
}
