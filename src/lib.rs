// SPDX-License-Identifier: GPL-3.0-only

//! framesconv - RGB to NV12 conversion on the GPU
//!
//! A packed RGBX frame is copied into a linear buffer object on a DRM render
//! node, imported into a headless GLES context as a texture and converted to
//! NV12 by a shader. The result lands in a second buffer object without any
//! intermediate copies.
//!
//! # Architecture
//!
//! - [`config`]: Conversion options and feature levels
//! - [`constants`]: Kernel geometry and colorspace coefficients
//! - [`errors`]: Error types and their classification
//! - [`gpu`]: Device buffers, display context and dma-buf import
//! - [`shaders`]: The raster and compute conversion kernels
//! - [`pipelines`]: The end-to-end conversion
//! - [`media`]: CPU reference converter
//!
//! # Example
//!
//! ```ignore
//! let options = Options::new(1920, 1080, FeatureLevel::Compute)?;
//! let platform = EglPlatform::load()?;
//! let report = convert(&GbmAllocator, &platform, &options, &mut input, &mut output)?;
//! ```

pub mod config;
pub mod constants;
pub mod errors;
pub mod gpu;
pub mod media;
pub mod pipelines;
pub mod shaders;

// Re-export commonly used types
pub use config::{FeatureLevel, Options};
pub use errors::{ConvertError, ConvertResult, ErrorKind};
pub use gpu::{EglPlatform, GbmAllocator};
pub use pipelines::{ConversionReport, convert};
