// SPDX-License-Identifier: GPL-3.0-only
//! Shared RGB→YUV definitions
//!
//! Both kernels and the CPU reference take their colorspace math from here,
//! so the GLSL snippet and the Rust function can't drift apart.

use crate::constants::bt709::{KB, KG, KR};

/// Convert normalized RGB to normalized YUV (BT.709, full range)
#[inline]
pub fn rgb_to_yuv(rgb: [f32; 3]) -> [f32; 3] {
    let [r, g, b] = rgb;
    let y = r * KR + g * KG + b * KB;
    let u = (b - y) / (2.0 * (1.0 - KB));
    let v = (r - y) / (2.0 * (1.0 - KR));
    [y, u + 0.5, v + 0.5]
}

/// Normalized RGB of one packed pixel (R, G, B, X byte order)
#[inline]
pub fn unpack_rgbx(pixel: &[u8]) -> [f32; 3] {
    [
        f32::from(pixel[0]) / 255.0,
        f32::from(pixel[1]) / 255.0,
        f32::from(pixel[2]) / 255.0,
    ]
}

/// Float to unorm8 quantization, as the GPU does it on store
#[inline]
pub fn quantize(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Mean (u, v) of a 2x2 block
#[inline]
pub fn average_chroma(block: [[f32; 3]; 4]) -> [f32; 2] {
    let mut uv = [0.0f32; 2];
    for yuv in block {
        uv[0] += yuv[1];
        uv[1] += yuv[2];
    }
    [uv[0] / 4.0, uv[1] / 4.0]
}

/// GLSL source of `vec3 rgb2yuv(in vec3 rgb)`.
///
/// Literals carry no `f` suffix, so the snippet is valid in both
/// GLSL ES 1.00 and 3.10.
pub fn rgb2yuv_glsl() -> String {
    format!(
        r#"
vec3 rgb2yuv(in vec3 rgb) {{
  // BT.709 full range
  float y = rgb.r * {kr:?} + rgb.g * {kg:?} + rgb.b * {kb:?};
  float u = (rgb.b - y) / (2.0 * (1.0 - {kb:?}));
  float v = (rgb.r - y) / (2.0 * (1.0 - {kr:?}));
  return vec3(y, u + 0.5, v + 0.5);
}}
"#,
        kr = KR,
        kg = KG,
        kb = KB,
    )
}
