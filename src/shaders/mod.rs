// SPDX-License-Identifier: GPL-3.0-only
//! RGB to NV12 conversion kernels
//!
//! Two interchangeable programs share the colorspace math in [`yuv_common`]:
//!
//! - [`raster`]: GLES 2.0, a single draw into a framebuffer over the NV12 buffer
//! - [`compute`]: GLES 3.1, a single dispatch over image units
//!
//! Both read the source buffer as `DRM_FORMAT_ABGR8888` (bytes R, G, B, X)
//! and produce byte-identical NV12 layouts.

pub mod compute;
pub mod raster;
pub mod yuv_common;

use crate::config::FeatureLevel;
use crate::errors::KernelError;
use crate::gpu::context::DisplayContext;
use crate::gpu::import::ImportedTexture;
use crate::gpu::platform::Platform;
use drm_fourcc::DrmFourcc;

pub use compute::{ComputeKernel, compute_dispatch_size};
pub use raster::RasterKernel;

/// Fourcc the source buffer is imported as
pub fn source_format(level: FeatureLevel) -> DrmFourcc {
    match level {
        FeatureLevel::Baseline | FeatureLevel::Compute => DrmFourcc::Abgr8888,
    }
}

/// Fourcc the NV12 buffer is imported as.
///
/// The raster kernel renders into it, which needs a color-renderable
/// format; its red and blue channels are swapped on store.
pub fn destination_format(level: FeatureLevel) -> DrmFourcc {
    match level {
        FeatureLevel::Baseline => DrmFourcc::Argb8888,
        FeatureLevel::Compute => DrmFourcc::Abgr8888,
    }
}

/// Conversion program for one feature level
pub enum Kernel<'c, P: Platform> {
    Raster(RasterKernel<'c, P>),
    Compute(ComputeKernel<'c, P>),
}

impl<'c, P: Platform> Kernel<'c, P> {
    /// Build the kernel matching the context's feature level.
    ///
    /// The context must be current.
    pub fn new(context: &'c DisplayContext<'_, P>) -> Result<Self, KernelError> {
        let platform = context.platform();
        Ok(match context.level() {
            FeatureLevel::Baseline => Kernel::Raster(RasterKernel::new(platform)?),
            FeatureLevel::Compute => Kernel::Compute(ComputeKernel::new(platform)?),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Kernel::Raster(_) => FeatureLevel::Baseline.kernel_name(),
            Kernel::Compute(_) => FeatureLevel::Compute.kernel_name(),
        }
    }

    /// Convert `source` (`width` x `height` RGBX) into `destination`
    /// (`width/4` x `height*3/2` packed NV12)
    pub fn convert(
        &self,
        source: &ImportedTexture<'_, P>,
        width: u32,
        height: u32,
        destination: &ImportedTexture<'_, P>,
    ) -> Result<(), KernelError> {
        match self {
            Kernel::Raster(kernel) => kernel.convert(source, width, height, destination),
            Kernel::Compute(kernel) => kernel.convert(source, width, height, destination),
        }
    }
}
