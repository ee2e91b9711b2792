// SPDX-License-Identifier: GPL-3.0-only

//! Surfaceless EGL + GLES implementation of [`Platform`]
//!
//! libEGL is loaded at runtime. GLES entry points come from
//! `eglGetProcAddress` once a context is current.

use super::platform::{
    DispatchCall, DmaBufDescriptor, DrawCall, Platform, ShaderSource, ShaderStage, Uniform,
};
use crate::config::ApiVersion;
use crate::errors::{ContextError, EglCode, GlCode, NativeError};
use glow::HasContext;
use khronos_egl as egl;
use std::cell::OnceCell;
use std::ffi::c_void;
use std::os::fd::AsRawFd;
use std::sync::OnceLock;
use tracing::{debug, info};

const PLATFORM_SURFACELESS_MESA: egl::Enum = 0x31DD;
const LINUX_DMA_BUF_EXT: egl::Enum = 0x3270;
const LINUX_DRM_FOURCC_EXT: egl::Attrib = 0x3271;
const DMA_BUF_PLANE0_FD_EXT: egl::Attrib = 0x3272;
const DMA_BUF_PLANE0_OFFSET_EXT: egl::Attrib = 0x3273;
const DMA_BUF_PLANE0_PITCH_EXT: egl::Attrib = 0x3274;

type ImageTargetTexture2dOes = unsafe extern "system" fn(target: u32, image: *mut c_void);

/// `glEGLImageTargetTexture2DOES`, resolved on first import
static IMAGE_TARGET_TEXTURE_2D: OnceLock<Option<ImageTargetTexture2dOes>> = OnceLock::new();

fn egl_error(err: egl::Error) -> NativeError {
    NativeError::Egl(EglCode(err.native()))
}

/// EGL 1.5 instance plus the GLES function table of the current context
pub struct EglPlatform {
    egl: egl::DynamicInstance<egl::EGL1_5>,
    gl: OnceCell<glow::Context>,
}

impl EglPlatform {
    /// Load libEGL
    pub fn load() -> Result<Self, ContextError> {
        let egl = unsafe { egl::DynamicInstance::<egl::EGL1_5>::load_required() }
            .map_err(|err| ContextError::Load(err.to_string()))?;
        debug!("libEGL loaded");
        Ok(Self {
            egl,
            gl: OnceCell::new(),
        })
    }

    fn gl(&self) -> Result<&glow::Context, NativeError> {
        self.gl
            .get()
            .ok_or(NativeError::Unavailable("current GLES context"))
    }

    /// Build the GLES function table; needs a current context
    fn load_gl(&self) {
        if self.gl.get().is_some() {
            return;
        }
        let gl = unsafe {
            glow::Context::from_loader_function(|name| {
                self.egl
                    .get_proc_address(name)
                    .map_or(std::ptr::null(), |f| f as *const c_void)
            })
        };
        info!(version = ?gl.version(), "GLES functions loaded");
        let _ = self.gl.set(gl);
    }

    fn image_target_texture_2d(&self) -> Result<ImageTargetTexture2dOes, NativeError> {
        let gl = self.gl()?;
        if !gl.supported_extensions().contains("GL_OES_EGL_image") {
            return Err(NativeError::MissingExtension("GL_OES_EGL_image"));
        }
        IMAGE_TARGET_TEXTURE_2D
            .get_or_init(|| {
                self.egl
                    .get_proc_address("glEGLImageTargetTexture2DOES")
                    .map(|f| unsafe {
                        std::mem::transmute::<extern "system" fn(), ImageTargetTexture2dOes>(f)
                    })
            })
            .ok_or(NativeError::Unavailable("glEGLImageTargetTexture2DOES"))
    }
}

fn check_gl(gl: &glow::Context) -> Result<(), NativeError> {
    match unsafe { gl.get_error() } {
        glow::NO_ERROR => Ok(()),
        code => Err(NativeError::Gl(GlCode(code))),
    }
}

fn shader_kind(stage: ShaderStage) -> u32 {
    match stage {
        ShaderStage::Vertex => glow::VERTEX_SHADER,
        ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        ShaderStage::Compute => glow::COMPUTE_SHADER,
    }
}

impl Platform for EglPlatform {
    type Display = egl::Display;
    type Context = egl::Context;
    type Image = egl::Image;
    type Texture = glow::Texture;
    type Program = glow::Program;
    type Framebuffer = glow::Framebuffer;
    type Buffer = glow::Buffer;

    fn client_extensions(&self) -> Result<String, NativeError> {
        self.egl
            .query_string(None, egl::EXTENSIONS)
            .map(|s| s.to_string_lossy().into_owned())
            .map_err(egl_error)
    }

    fn surfaceless_display(&self) -> Result<Self::Display, NativeError> {
        unsafe {
            self.egl.get_platform_display(
                PLATFORM_SURFACELESS_MESA,
                std::ptr::null_mut(),
                &[egl::ATTRIB_NONE],
            )
        }
        .map_err(egl_error)
    }

    fn initialize(&self, display: Self::Display) -> Result<(), NativeError> {
        let (major, minor) = self.egl.initialize(display).map_err(egl_error)?;
        info!(major, minor, "EGL display initialized");
        Ok(())
    }

    fn display_extensions(&self, display: Self::Display) -> Result<String, NativeError> {
        self.egl
            .query_string(Some(display), egl::EXTENSIONS)
            .map(|s| s.to_string_lossy().into_owned())
            .map_err(egl_error)
    }

    fn terminate(&self, display: Self::Display) -> Result<(), NativeError> {
        self.egl.terminate(display).map_err(egl_error)
    }

    fn bind_api(&self) -> Result<(), NativeError> {
        self.egl.bind_api(egl::OPENGL_ES_API).map_err(egl_error)
    }

    fn create_context(
        &self,
        display: Self::Display,
        version: ApiVersion,
    ) -> Result<Self::Context, NativeError> {
        let attribs = [
            egl::CONTEXT_MAJOR_VERSION,
            version.major,
            egl::CONTEXT_MINOR_VERSION,
            version.minor,
            egl::NONE,
        ];
        // EGL_NO_CONFIG_KHR
        let config = unsafe { egl::Config::from_ptr(std::ptr::null_mut()) };
        self.egl
            .create_context(display, config, None, &attribs)
            .map_err(egl_error)
    }

    fn destroy_context(
        &self,
        display: Self::Display,
        context: Self::Context,
    ) -> Result<(), NativeError> {
        self.egl.destroy_context(display, context).map_err(egl_error)
    }

    fn make_current(
        &self,
        display: Self::Display,
        context: Option<Self::Context>,
    ) -> Result<(), NativeError> {
        self.egl
            .make_current(display, None, None, context)
            .map_err(egl_error)?;
        if context.is_some() {
            self.load_gl();
        }
        Ok(())
    }

    fn fence_sync(&self, display: Self::Display) -> Result<(), NativeError> {
        let sync = unsafe { self.egl.create_sync(display, egl::SYNC_FENCE as egl::Enum, &[egl::ATTRIB_NONE]) }
            .map_err(egl_error)?;
        let waited = unsafe {
            self.egl
                .client_wait_sync(display, sync, egl::SYNC_FLUSH_COMMANDS_BIT, egl::FOREVER)
        }
        .map_err(egl_error);
        let destroyed = unsafe { self.egl.destroy_sync(display, sync) }.map_err(egl_error);
        waited?;
        destroyed
    }

    fn create_image(
        &self,
        display: Self::Display,
        descriptor: &DmaBufDescriptor<'_>,
    ) -> Result<Self::Image, NativeError> {
        let attribs = [
            egl::WIDTH as egl::Attrib,
            descriptor.width as egl::Attrib,
            egl::HEIGHT as egl::Attrib,
            descriptor.height as egl::Attrib,
            LINUX_DRM_FOURCC_EXT,
            descriptor.fourcc as u32 as egl::Attrib,
            DMA_BUF_PLANE0_FD_EXT,
            descriptor.fd.as_raw_fd() as egl::Attrib,
            DMA_BUF_PLANE0_OFFSET_EXT,
            descriptor.offset as egl::Attrib,
            DMA_BUF_PLANE0_PITCH_EXT,
            descriptor.pitch as egl::Attrib,
            egl::ATTRIB_NONE,
        ];
        unsafe {
            self.egl.create_image(
                display,
                egl::Context::from_ptr(egl::NO_CONTEXT),
                LINUX_DMA_BUF_EXT,
                egl::ClientBuffer::from_ptr(std::ptr::null_mut()),
                &attribs,
            )
        }
        .map_err(egl_error)
    }

    fn destroy_image(
        &self,
        display: Self::Display,
        image: Self::Image,
    ) -> Result<(), NativeError> {
        self.egl.destroy_image(display, image).map_err(egl_error)
    }

    fn create_texture(&self, image: Self::Image) -> Result<Self::Texture, NativeError> {
        let image_target = self.image_target_texture_2d()?;
        let gl = self.gl()?;
        unsafe {
            let texture = gl.create_texture().map_err(NativeError::Log)?;
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::NEAREST as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::NEAREST as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
            image_target(glow::TEXTURE_2D, image.as_ptr());
            let result = check_gl(gl);
            gl.bind_texture(glow::TEXTURE_2D, None);
            if let Err(err) = result {
                gl.delete_texture(texture);
                return Err(err);
            }
            Ok(texture)
        }
    }

    fn delete_texture(&self, texture: Self::Texture) {
        if let Ok(gl) = self.gl() {
            unsafe { gl.delete_texture(texture) };
        }
    }

    fn create_program(
        &self,
        stages: &[ShaderSource<'_>],
        attributes: &[(u32, &str)],
    ) -> Result<Self::Program, NativeError> {
        let gl = self.gl()?;
        unsafe {
            let program = gl.create_program().map_err(NativeError::Log)?;
            let mut shaders = Vec::with_capacity(stages.len());
            let release = |shaders: &[glow::Shader]| {
                for &shader in shaders {
                    gl.detach_shader(program, shader);
                    gl.delete_shader(shader);
                }
            };

            for stage in stages {
                let shader = match gl.create_shader(shader_kind(stage.stage)) {
                    Ok(shader) => shader,
                    Err(err) => {
                        release(&shaders);
                        gl.delete_program(program);
                        return Err(NativeError::Log(err));
                    }
                };
                gl.shader_source(shader, stage.source);
                gl.compile_shader(shader);
                gl.attach_shader(program, shader);
                shaders.push(shader);
                if !gl.get_shader_compile_status(shader) {
                    let log = gl.get_shader_info_log(shader);
                    release(&shaders);
                    gl.delete_program(program);
                    return Err(NativeError::Log(format!("{:?} shader: {}", stage.stage, log)));
                }
            }

            for &(location, name) in attributes {
                gl.bind_attrib_location(program, location, name);
            }
            gl.link_program(program);
            let linked = gl.get_program_link_status(program);
            release(&shaders);
            if !linked {
                let log = gl.get_program_info_log(program);
                gl.delete_program(program);
                return Err(NativeError::Log(format!("link: {}", log)));
            }
            Ok(program)
        }
    }

    fn delete_program(&self, program: Self::Program) {
        if let Ok(gl) = self.gl() {
            unsafe { gl.delete_program(program) };
        }
    }

    fn set_uniform(
        &self,
        program: Self::Program,
        name: &str,
        value: Uniform,
    ) -> Result<(), NativeError> {
        let gl = self.gl()?;
        unsafe {
            gl.use_program(Some(program));
            let location = gl.get_uniform_location(program, name);
            if location.is_none() {
                debug!(name, "Uniform is inactive");
            }
            match value {
                Uniform::Int(v) => gl.uniform_1_i32(location.as_ref(), v),
                Uniform::Vec2(x, y) => gl.uniform_2_f32(location.as_ref(), x, y),
            }
            let result = check_gl(gl);
            gl.use_program(None);
            result
        }
    }

    fn create_framebuffer(&self, color: Self::Texture) -> Result<Self::Framebuffer, NativeError> {
        let gl = self.gl()?;
        unsafe {
            let framebuffer = gl.create_framebuffer().map_err(NativeError::Log)?;
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer));
            gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(color),
                0,
            );
            let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            if status != glow::FRAMEBUFFER_COMPLETE {
                gl.delete_framebuffer(framebuffer);
                return Err(NativeError::IncompleteFramebuffer(status));
            }
            Ok(framebuffer)
        }
    }

    fn delete_framebuffer(&self, framebuffer: Self::Framebuffer) {
        if let Ok(gl) = self.gl() {
            unsafe { gl.delete_framebuffer(framebuffer) };
        }
    }

    fn create_vertex_buffer(&self, vertices: &[f32]) -> Result<Self::Buffer, NativeError> {
        let gl = self.gl()?;
        unsafe {
            let buffer = gl.create_buffer().map_err(NativeError::Log)?;
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(buffer));
            gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(vertices),
                glow::STATIC_DRAW,
            );
            let result = check_gl(gl);
            gl.bind_buffer(glow::ARRAY_BUFFER, None);
            if let Err(err) = result {
                gl.delete_buffer(buffer);
                return Err(err);
            }
            Ok(buffer)
        }
    }

    fn delete_vertex_buffer(&self, buffer: Self::Buffer) {
        if let Ok(gl) = self.gl() {
            unsafe { gl.delete_buffer(buffer) };
        }
    }

    fn draw(&self, call: &DrawCall<Self>) -> Result<(), NativeError> {
        let gl = self.gl()?;
        unsafe {
            gl.use_program(Some(call.program));
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(call.framebuffer));
            gl.viewport(0, 0, call.viewport.0 as i32, call.viewport.1 as i32);
            gl.active_texture(glow::TEXTURE0);
            gl.bind_texture(glow::TEXTURE_2D, Some(call.source));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(call.vertices));
            gl.enable_vertex_attrib_array(0);
            gl.vertex_attrib_pointer_f32(0, 2, glow::FLOAT, false, 0, 0);
            gl.draw_arrays(glow::TRIANGLE_FAN, 0, call.vertex_count);
            let result = check_gl(gl);

            gl.disable_vertex_attrib_array(0);
            gl.bind_buffer(glow::ARRAY_BUFFER, None);
            gl.bind_texture(glow::TEXTURE_2D, None);
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            gl.use_program(None);
            result
        }
    }

    fn dispatch(&self, call: &DispatchCall<Self>) -> Result<(), NativeError> {
        let gl = self.gl()?;
        let [x, y, z] = call.groups;
        unsafe {
            gl.use_program(Some(call.program));
            gl.bind_image_texture(0, Some(call.source), 0, false, 0, glow::READ_ONLY, glow::RGBA8);
            gl.bind_image_texture(1, Some(call.destination), 0, false, 0, glow::WRITE_ONLY, glow::RGBA8);
            gl.dispatch_compute(x, y, z);
            gl.memory_barrier(glow::SHADER_IMAGE_ACCESS_BARRIER_BIT);
            let result = check_gl(gl);
            gl.use_program(None);
            result
        }
    }
}
