// SPDX-License-Identifier: GPL-3.0-only

//! Conversion options and feature levels

use crate::constants::{self, BYTES_PER_PIXEL, DEFAULT_RENDER_NODE};
use crate::errors::InputError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Upper bound for either dimension, keeps all size math inside `i32`
pub const MAX_DIMENSION: u32 = 1 << 16;

/// GLES API version requested from EGL
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ApiVersion {
    pub major: i32,
    pub minor: i32,
}

/// Feature level a conversion kernel needs
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize, clap::ValueEnum,
)]
pub enum FeatureLevel {
    /// GLES 2.0, rasterization only
    #[value(name = "es20")]
    #[serde(rename = "es20")]
    Baseline,
    /// GLES 3.1, compute dispatch
    #[default]
    #[value(name = "es31")]
    #[serde(rename = "es31")]
    Compute,
}

impl FeatureLevel {
    pub const ALL: [FeatureLevel; 2] = [FeatureLevel::Baseline, FeatureLevel::Compute];

    pub fn api_version(&self) -> ApiVersion {
        match self {
            FeatureLevel::Baseline => ApiVersion { major: 2, minor: 0 },
            FeatureLevel::Compute => ApiVersion { major: 3, minor: 1 },
        }
    }

    /// Name used on the command line
    pub fn name(&self) -> &'static str {
        match self {
            FeatureLevel::Baseline => "es20",
            FeatureLevel::Compute => "es31",
        }
    }

    /// Name of the kernel variant that runs at this level
    pub fn kernel_name(&self) -> &'static str {
        match self {
            FeatureLevel::Baseline => "raster",
            FeatureLevel::Compute => "compute",
        }
    }

    pub fn width_alignment(&self) -> u32 {
        match self {
            FeatureLevel::Baseline => constants::raster::WIDTH_ALIGNMENT,
            FeatureLevel::Compute => constants::compute::WIDTH_ALIGNMENT,
        }
    }

    pub fn height_alignment(&self) -> u32 {
        match self {
            FeatureLevel::Baseline => constants::raster::HEIGHT_ALIGNMENT,
            FeatureLevel::Compute => constants::compute::HEIGHT_ALIGNMENT,
        }
    }
}

/// Validated conversion settings
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Options {
    /// Source width in pixels
    pub width: u32,
    /// Source height in pixels
    pub height: u32,
    /// Source file, stdin when absent
    pub input: Option<PathBuf>,
    /// Destination file, stdout when absent
    pub output: Option<PathBuf>,
    /// DRM render node to allocate buffers on
    pub render_node: PathBuf,
    /// Kernel feature level
    pub level: FeatureLevel,
    /// Compare GPU output against the CPU reference
    pub verify: bool,
}

impl Options {
    /// Build options from raw command line dimensions.
    ///
    /// Dimensions arrive signed so that negative values are reported as
    /// invalid input rather than as parse errors.
    pub fn new(width: i64, height: i64, level: FeatureLevel) -> Result<Self, InputError> {
        let width = check_dimension("width", width, level.width_alignment())?;
        let height = check_dimension("height", height, level.height_alignment())?;
        Ok(Self {
            width,
            height,
            input: None,
            output: None,
            render_node: PathBuf::from(DEFAULT_RENDER_NODE),
            level,
            verify: false,
        })
    }

    /// Re-check dimensions against the selected level.
    ///
    /// Fields are public, so the pipeline calls this before touching any
    /// device resource.
    pub fn validate(&self) -> Result<(), InputError> {
        check_dimension("width", self.width.into(), self.level.width_alignment())?;
        check_dimension("height", self.height.into(), self.level.height_alignment())?;
        Ok(())
    }

    /// Bytes of packed RGBX source data
    pub fn source_size(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL as usize
    }

    /// Bytes of NV12 destination data
    pub fn destination_size(&self) -> usize {
        self.width as usize * self.height as usize * 3 / 2
    }
}

/// Check one dimension: positive, bounded and aligned
pub fn check_dimension(name: &'static str, value: i64, alignment: u32) -> Result<u32, InputError> {
    if value <= 0 {
        return Err(InputError::NonPositive { name, value });
    }
    if value > i64::from(MAX_DIMENSION) {
        return Err(InputError::TooLarge { name, value });
    }
    let value = value as u32;
    if value % alignment != 0 {
        return Err(InputError::Misaligned {
            name,
            value,
            alignment,
        });
    }
    Ok(value)
}
