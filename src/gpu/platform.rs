// SPDX-License-Identifier: GPL-3.0-only

//! Native display and GLES seam
//!
//! [`Platform`] is the narrow set of EGL and GLES calls the conversion needs.
//! Handles are plain `Copy` values; ownership lives in the RAII wrappers of
//! [`super::context`] and [`super::import`], which pair every create with its
//! release.

use crate::config::ApiVersion;
use crate::errors::NativeError;
use drm_fourcc::DrmFourcc;
use std::fmt::Debug;
use std::os::fd::BorrowedFd;

/// Geometry of a single-plane dma-buf, as handed to EGL
#[derive(Debug, Clone, Copy)]
pub struct DmaBufDescriptor<'a> {
    pub width: u32,
    pub height: u32,
    pub fourcc: DrmFourcc,
    pub fd: BorrowedFd<'a>,
    pub offset: u32,
    pub pitch: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

/// One shader stage of a program
#[derive(Debug, Clone, Copy)]
pub struct ShaderSource<'a> {
    pub stage: ShaderStage,
    pub source: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Uniform {
    Int(i32),
    Vec2(f32, f32),
}

/// Full-target draw of a triangle fan
pub struct DrawCall<P: Platform + ?Sized> {
    pub program: P::Program,
    pub framebuffer: P::Framebuffer,
    /// Sampled on texture unit 0
    pub source: P::Texture,
    /// Two floats per vertex, bound to attribute location 0
    pub vertices: P::Buffer,
    pub vertex_count: i32,
    pub viewport: (u32, u32),
}

/// Compute dispatch over two image units
pub struct DispatchCall<P: Platform + ?Sized> {
    pub program: P::Program,
    /// Bound read-only on image unit 0
    pub source: P::Texture,
    /// Bound write-only on image unit 1
    pub destination: P::Texture,
    pub groups: [u32; 3],
}

/// EGL display management plus the GLES calls of both kernels
///
/// GLES calls act on the context current on the calling thread.
pub trait Platform {
    type Display: Copy + Debug;
    type Context: Copy + Debug;
    type Image: Copy + Debug;
    type Texture: Copy + Debug;
    type Program: Copy + Debug;
    type Framebuffer: Copy + Debug;
    type Buffer: Copy + Debug;

    fn client_extensions(&self) -> Result<String, NativeError>;
    fn surfaceless_display(&self) -> Result<Self::Display, NativeError>;
    fn initialize(&self, display: Self::Display) -> Result<(), NativeError>;
    fn display_extensions(&self, display: Self::Display) -> Result<String, NativeError>;
    fn terminate(&self, display: Self::Display) -> Result<(), NativeError>;
    fn bind_api(&self) -> Result<(), NativeError>;
    /// Config-less context for the requested GLES version
    fn create_context(
        &self,
        display: Self::Display,
        version: ApiVersion,
    ) -> Result<Self::Context, NativeError>;
    fn destroy_context(
        &self,
        display: Self::Display,
        context: Self::Context,
    ) -> Result<(), NativeError>;
    /// Bind `context` without surfaces, or unbind when `None`
    fn make_current(
        &self,
        display: Self::Display,
        context: Option<Self::Context>,
    ) -> Result<(), NativeError>;
    /// Insert a fence and block until the GPU has passed it
    fn fence_sync(&self, display: Self::Display) -> Result<(), NativeError>;
    fn create_image(
        &self,
        display: Self::Display,
        descriptor: &DmaBufDescriptor<'_>,
    ) -> Result<Self::Image, NativeError>;
    fn destroy_image(&self, display: Self::Display, image: Self::Image)
    -> Result<(), NativeError>;

    /// 2D texture whose storage is `image`
    fn create_texture(&self, image: Self::Image) -> Result<Self::Texture, NativeError>;
    fn delete_texture(&self, texture: Self::Texture);
    /// Compile and link, binding attribute names to locations before linking
    fn create_program(
        &self,
        stages: &[ShaderSource<'_>],
        attributes: &[(u32, &str)],
    ) -> Result<Self::Program, NativeError>;
    fn delete_program(&self, program: Self::Program);
    fn set_uniform(
        &self,
        program: Self::Program,
        name: &str,
        value: Uniform,
    ) -> Result<(), NativeError>;
    /// Framebuffer with `color` as attachment 0, checked for completeness
    fn create_framebuffer(&self, color: Self::Texture) -> Result<Self::Framebuffer, NativeError>;
    fn delete_framebuffer(&self, framebuffer: Self::Framebuffer);
    fn create_vertex_buffer(&self, vertices: &[f32]) -> Result<Self::Buffer, NativeError>;
    fn delete_vertex_buffer(&self, buffer: Self::Buffer);
    fn draw(&self, call: &DrawCall<Self>) -> Result<(), NativeError>;
    fn dispatch(&self, call: &DispatchCall<Self>) -> Result<(), NativeError>;
}
