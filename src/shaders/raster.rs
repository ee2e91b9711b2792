// SPDX-License-Identifier: GPL-3.0-only

//! GLES 2.0 conversion: one full-target draw into the NV12 buffer
//!
//! The destination is viewed as `width/4` x `height*3/2` RGBA texels. Rows
//! below `height` pack four luma samples each; the rows after that pack two
//! box-filtered (u, v) pairs each.

use super::yuv_common::rgb2yuv_glsl;
use crate::constants::raster::{QUAD_VERTICES, STORE_SWIZZLE};
use crate::errors::{KernelError, NativeError};
use crate::gpu::ReleaseGuard;
use crate::gpu::import::ImportedTexture;
use crate::gpu::platform::{DrawCall, Platform, ShaderSource, ShaderStage, Uniform};
use tracing::debug;

const VERTEX_SHADER: &str = r#"#version 100
attribute vec2 position;

void main() {
  gl_Position = vec4(position * 2.0 - 1.0, 0.0, 1.0);
}
"#;

// highp only: mediump can't address texels exactly past ~2048 px
const FRAGMENT_SHADER: &str = r#"#version 100
precision highp float;

uniform sampler2D img_input;
uniform vec2 src_size;
@RGB2YUV@
vec3 fetch(float x, float y) {
  return rgb2yuv(texture2D(img_input, (vec2(x, y) + 0.5) / src_size).rgb);
}

void main() {
  float dx = floor(gl_FragCoord.x);
  float dy = floor(gl_FragCoord.y);
  float x = dx * 4.0;
  vec4 result;

  if (dy < src_size.y) {
    result = vec4(fetch(x, dy).x, fetch(x + 1.0, dy).x,
                  fetch(x + 2.0, dy).x, fetch(x + 3.0, dy).x);
  } else {
    float y = (dy - src_size.y) * 2.0;
    vec2 uv0 = (fetch(x, y).yz + fetch(x + 1.0, y).yz +
                fetch(x, y + 1.0).yz + fetch(x + 1.0, y + 1.0).yz) * 0.25;
    vec2 uv1 = (fetch(x + 2.0, y).yz + fetch(x + 3.0, y).yz +
                fetch(x + 2.0, y + 1.0).yz + fetch(x + 3.0, y + 1.0).yz) * 0.25;
    result = vec4(uv0, uv1);
  }

  gl_FragColor = result.@SWIZZLE@;
}
"#;

/// Fragment shader source with the colorspace snippet and store order filled in
pub fn fragment_source() -> String {
    FRAGMENT_SHADER
        .replace("@RGB2YUV@", &rgb2yuv_glsl())
        .replace("@SWIZZLE@", STORE_SWIZZLE)
}

/// Linked raster program plus its quad
pub struct RasterKernel<'c, P: Platform> {
    platform: &'c P,
    program: P::Program,
    quad: P::Buffer,
}

impl<'c, P: Platform> RasterKernel<'c, P> {
    pub fn new(platform: &'c P) -> Result<Self, KernelError> {
        let fragment = fragment_source();
        let program = platform
            .create_program(
                &[
                    ShaderSource {
                        stage: ShaderStage::Vertex,
                        source: VERTEX_SHADER,
                    },
                    ShaderSource {
                        stage: ShaderStage::Fragment,
                        source: &fragment,
                    },
                ],
                &[(0, "position")],
            )
            .map_err(|source| KernelError::Build {
                kernel: "raster",
                source,
            })?;
        let delete = ReleaseGuard::new(|| platform.delete_program(program));

        platform
            .set_uniform(program, "img_input", Uniform::Int(0))
            .map_err(native("Failed to set sampler uniform"))?;
        let quad = platform
            .create_vertex_buffer(&QUAD_VERTICES)
            .map_err(native("Failed to upload quad"))?;
        delete.disarm();

        debug!("Raster kernel built");
        Ok(Self {
            platform,
            program,
            quad,
        })
    }

    pub fn convert(
        &self,
        source: &ImportedTexture<'_, P>,
        width: u32,
        height: u32,
        destination: &ImportedTexture<'_, P>,
    ) -> Result<(), KernelError> {
        let platform = self.platform;
        platform
            .set_uniform(
                self.program,
                "src_size",
                Uniform::Vec2(width as f32, height as f32),
            )
            .map_err(native("Failed to set source size"))?;

        let framebuffer = platform
            .create_framebuffer(destination.texture())
            .map_err(native("Failed to create framebuffer"))?;
        let _framebuffer = ReleaseGuard::new(|| platform.delete_framebuffer(framebuffer));

        let viewport = (width / 4, height * 3 / 2);
        debug!(viewport_w = viewport.0, viewport_h = viewport.1, "Drawing");
        platform
            .draw(&DrawCall {
                program: self.program,
                framebuffer,
                source: source.texture(),
                vertices: self.quad,
                vertex_count: (QUAD_VERTICES.len() / 2) as i32,
                viewport,
            })
            .map_err(native("Failed to draw"))
    }
}

impl<P: Platform> Drop for RasterKernel<'_, P> {
    fn drop(&mut self) {
        self.platform.delete_vertex_buffer(self.quad);
        self.platform.delete_program(self.program);
    }
}

fn native(step: &'static str) -> impl FnOnce(NativeError) -> KernelError {
    move |source| KernelError::Native { step, source }
}
