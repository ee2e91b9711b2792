// SPDX-License-Identifier: GPL-3.0-only

//! CPU reference RGBX to NV12 conversion
//!
//! Implements the same BT.709 math and 2x2 box filter as the GPU kernels.
//! Used to verify GPU output (`--verify`) and as ground truth in tests.

use crate::errors::InputError;
use crate::shaders::yuv_common::{average_chroma, quantize, rgb_to_yuv, unpack_rgbx};
use serde::Serialize;
use tracing::debug;

/// Size in bytes of an NV12 frame
#[inline]
pub fn nv12_size(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3 / 2
}

/// Convert a packed RGBX frame to NV12
///
/// Both dimensions must be even (4:2:0 subsampling). The output holds the
/// full-resolution luma plane followed by the interleaved UV plane.
pub fn convert_rgbx_to_nv12_cpu(rgbx: &[u8], width: u32, height: u32) -> Result<Vec<u8>, InputError> {
    check_even("width", width)?;
    check_even("height", height)?;
    let expected = width as usize * height as usize * 4;
    if rgbx.len() != expected {
        return Err(InputError::DataLength {
            expected,
            actual: rgbx.len(),
        });
    }

    let width = width as usize;
    let height = height as usize;
    let mut nv12 = vec![0u8; nv12_size(width as u32, height as u32)];
    let (luma, chroma) = nv12.split_at_mut(width * height);

    // Two rows at a time, one chroma row per pair
    for row in (0..height).step_by(2) {
        let top = &rgbx[row * width * 4..(row + 1) * width * 4];
        let bottom = &rgbx[(row + 1) * width * 4..(row + 2) * width * 4];
        let chroma_row = &mut chroma[(row / 2) * width..(row / 2 + 1) * width];

        for col in (0..width).step_by(2) {
            let block = [
                rgb_to_yuv(unpack_rgbx(&top[col * 4..])),
                rgb_to_yuv(unpack_rgbx(&top[(col + 1) * 4..])),
                rgb_to_yuv(unpack_rgbx(&bottom[col * 4..])),
                rgb_to_yuv(unpack_rgbx(&bottom[(col + 1) * 4..])),
            ];
            luma[row * width + col] = quantize(block[0][0]);
            luma[row * width + col + 1] = quantize(block[1][0]);
            luma[(row + 1) * width + col] = quantize(block[2][0]);
            luma[(row + 1) * width + col + 1] = quantize(block[3][0]);

            let [u, v] = average_chroma(block);
            chroma_row[col] = quantize(u);
            chroma_row[col + 1] = quantize(v);
        }
    }

    debug!(width, height, "CPU reference conversion done");
    Ok(nv12)
}

/// Largest per-byte difference between two NV12 frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Nv12Deviation {
    /// Largest luma difference
    pub luma: u8,
    /// Largest chroma difference
    pub chroma: u8,
}

impl Nv12Deviation {
    pub fn within(&self, tolerance: u8) -> bool {
        self.luma <= tolerance && self.chroma <= tolerance
    }
}

/// Compare two NV12 frames plane by plane
pub fn compare_nv12(a: &[u8], b: &[u8], width: u32, height: u32) -> Result<Nv12Deviation, InputError> {
    let expected = nv12_size(width, height);
    for frame in [a, b] {
        if frame.len() != expected {
            return Err(InputError::DataLength {
                expected,
                actual: frame.len(),
            });
        }
    }

    let luma_size = width as usize * height as usize;
    let max_diff = |x: &[u8], y: &[u8]| {
        x.iter()
            .zip(y)
            .map(|(p, q)| p.abs_diff(*q))
            .max()
            .unwrap_or(0)
    };

    Ok(Nv12Deviation {
        luma: max_diff(&a[..luma_size], &b[..luma_size]),
        chroma: max_diff(&a[luma_size..], &b[luma_size..]),
    })
}

fn check_even(name: &'static str, value: u32) -> Result<(), InputError> {
    if value == 0 {
        return Err(InputError::NonPositive {
            name,
            value: value.into(),
        });
    }
    if value % 2 != 0 {
        return Err(InputError::Misaligned {
            name,
            value,
            alignment: 2,
        });
    }
    Ok(())
}
