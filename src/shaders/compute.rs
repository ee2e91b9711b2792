// SPDX-License-Identifier: GPL-3.0-only

//! GLES 3.1 conversion: one compute dispatch over image units
//!
//! Each invocation loads a 4x2 block of source pixels and writes two luma
//! texels plus one chroma texel.

use super::yuv_common::rgb2yuv_glsl;
use crate::constants::compute::{FOOTPRINT_X, FOOTPRINT_Y, WORKGROUP_X, WORKGROUP_Y};
use crate::errors::{KernelError, NativeError};
use crate::gpu::import::ImportedTexture;
use crate::gpu::platform::{DispatchCall, Platform, ShaderSource, ShaderStage};
use tracing::debug;

const COMPUTE_SHADER: &str = r#"#version 310 es
precision highp float;

layout(local_size_x = @WORKGROUP_X@, local_size_y = @WORKGROUP_Y@, local_size_z = 1) in;
layout(binding = 0, rgba8) readonly uniform highp image2D img_input;
layout(binding = 1, rgba8) writeonly uniform highp image2D img_output;
@RGB2YUV@
void main() {
  ivec2 gid = ivec2(gl_GlobalInvocationID.xy);
  int input_height = imageSize(img_input).y;
  ivec2 base = ivec2(gid.x * 4, gid.y * 2);

  vec3 top[4];
  vec3 bottom[4];
  for (int i = 0; i < 4; i++) {
    top[i] = rgb2yuv(imageLoad(img_input, base + ivec2(i, 0)).rgb);
    bottom[i] = rgb2yuv(imageLoad(img_input, base + ivec2(i, 1)).rgb);
  }

  imageStore(img_output, ivec2(gid.x, base.y),
             vec4(top[0].x, top[1].x, top[2].x, top[3].x));
  imageStore(img_output, ivec2(gid.x, base.y + 1),
             vec4(bottom[0].x, bottom[1].x, bottom[2].x, bottom[3].x));

  vec2 uv0 = (top[0].yz + top[1].yz + bottom[0].yz + bottom[1].yz) * 0.25;
  vec2 uv1 = (top[2].yz + top[3].yz + bottom[2].yz + bottom[3].yz) * 0.25;
  imageStore(img_output, ivec2(gid.x, input_height + gid.y), vec4(uv0, uv1));
}
"#;

pub fn shader_source() -> String {
    COMPUTE_SHADER
        .replace("@WORKGROUP_X@", &WORKGROUP_X.to_string())
        .replace("@WORKGROUP_Y@", &WORKGROUP_Y.to_string())
        .replace("@RGB2YUV@", &rgb2yuv_glsl())
}

/// Number of workgroups needed to cover `dimension` pixels
#[inline]
pub fn compute_dispatch_size(dimension: u32, pixels_per_group: u32) -> u32 {
    dimension.div_ceil(pixels_per_group)
}

/// Workgroup grid for a `width` x `height` source
pub fn dispatch_groups(width: u32, height: u32) -> [u32; 3] {
    [
        compute_dispatch_size(width, FOOTPRINT_X * WORKGROUP_X),
        compute_dispatch_size(height, FOOTPRINT_Y * WORKGROUP_Y),
        1,
    ]
}

/// Linked compute program
pub struct ComputeKernel<'c, P: Platform> {
    platform: &'c P,
    program: P::Program,
}

impl<'c, P: Platform> ComputeKernel<'c, P> {
    pub fn new(platform: &'c P) -> Result<Self, KernelError> {
        let source = shader_source();
        let program = platform
            .create_program(
                &[ShaderSource {
                    stage: ShaderStage::Compute,
                    source: &source,
                }],
                &[],
            )
            .map_err(|source| KernelError::Build {
                kernel: "compute",
                source,
            })?;
        debug!("Compute kernel built");
        Ok(Self { platform, program })
    }

    pub fn convert(
        &self,
        source: &ImportedTexture<'_, P>,
        width: u32,
        height: u32,
        destination: &ImportedTexture<'_, P>,
    ) -> Result<(), KernelError> {
        let groups = dispatch_groups(width, height);
        debug!(groups = ?groups, "Dispatching");
        self.platform
            .dispatch(&DispatchCall {
                program: self.program,
                source: source.texture(),
                destination: destination.texture(),
                groups,
            })
            .map_err(|source: NativeError| KernelError::Native {
                step: "Failed to dispatch compute",
                source,
            })
    }
}

impl<P: Platform> Drop for ComputeKernel<'_, P> {
    fn drop(&mut self) {
        self.platform.delete_program(self.program);
    }
}
