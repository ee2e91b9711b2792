// SPDX-License-Identifier: GPL-3.0-only

//! Host-side media utilities
//!
//! - [`nv12_converter`]: CPU reference RGBX to NV12 conversion and frame comparison

pub mod nv12_converter;

pub use nv12_converter::{Nv12Deviation, compare_nv12, convert_rgbx_to_nv12_cpu, nv12_size};
