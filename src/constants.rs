// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

/// Render node used when none is given
pub const DEFAULT_RENDER_NODE: &str = "/dev/dri/renderD128";

/// Every device buffer is packed 32 bits per pixel
pub const BYTES_PER_PIXEL: u32 = 4;

/// BT.709 luma coefficients (full range)
pub mod bt709 {
    pub const KR: f32 = 0.2126;
    pub const KG: f32 = 0.7152;
    pub const KB: f32 = 0.0722;
}

/// Compute kernel geometry
///
/// One invocation covers a 4x2 texel footprint, a workgroup is 2x2
/// invocations. The dispatch grid and the input alignment both derive from
/// these numbers.
pub mod compute {
    pub const FOOTPRINT_X: u32 = 4;
    pub const FOOTPRINT_Y: u32 = 2;
    pub const WORKGROUP_X: u32 = 2;
    pub const WORKGROUP_Y: u32 = 2;
    pub const WIDTH_ALIGNMENT: u32 = FOOTPRINT_X * WORKGROUP_X;
    pub const HEIGHT_ALIGNMENT: u32 = FOOTPRINT_Y * WORKGROUP_Y;
}

/// Raster kernel geometry
///
/// Each destination texel packs four luma bytes of one row, or two chroma
/// pairs taken from a 4x2 source block.
pub mod raster {
    pub const WIDTH_ALIGNMENT: u32 = 4;
    pub const HEIGHT_ALIGNMENT: u32 = 2;

    /// Store order of a packed destination texel.
    ///
    /// The destination is imported as `DRM_FORMAT_ARGB8888`, whose bytes are
    /// laid out B,G,R,A. Writing the logical samples through this swizzle
    /// puts the first sample in the first byte.
    pub const STORE_SWIZZLE: &str = "bgra";

    /// Full-screen quad in [0, 1] space, drawn as a triangle fan
    pub const QUAD_VERTICES: [f32; 8] = [0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0];
}

/// Largest tolerated difference between GPU output and the CPU reference
pub const VERIFY_TOLERANCE: u8 = 1;
