// SPDX-License-Identifier: GPL-3.0-only

//! In-process stand-ins for GBM and EGL/GLES
//!
//! Buffers are memfds. Every acquire and release lands in a shared
//! [`Ledger`], which can also be told to fail the nth acquisition of a
//! resource kind. Draws and dispatches are executed on the CPU with the
//! same texel addressing as the GLSL kernels, so packing and geometry can
//! be checked without a GPU.

use super::alloc::Allocator;
use super::platform::{
    DispatchCall, DmaBufDescriptor, DrawCall, Platform, ShaderSource, ShaderStage, Uniform,
};
use crate::config::ApiVersion;
use crate::constants::{compute, raster};
use crate::errors::{BufferError, EglCode, GlCode, NativeError};
use crate::shaders::yuv_common::{average_chroma, quantize, rgb_to_yuv};
use drm_fourcc::DrmFourcc;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::os::fd::{FromRawFd, OwnedFd};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    RenderNode,
    BufferObject,
    Display,
    Context,
    Current,
    Image,
    Texture,
    Program,
    Framebuffer,
    VertexBuffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Acquire(Resource),
    Release(Resource),
}

#[derive(Default)]
struct LedgerState {
    events: Vec<(Event, u32)>,
    next_id: u32,
    attempts: HashMap<Resource, u32>,
    failures: Vec<(Resource, u32)>,
}

/// Shared record of native acquisitions and releases
#[derive(Clone, Default)]
pub struct Ledger(Rc<RefCell<LedgerState>>);

impl Ledger {
    /// Fail the `nth` (1-based) acquisition attempt of `resource`
    pub fn fail_on(&self, resource: Resource, nth: u32) {
        self.0.borrow_mut().failures.push((resource, nth));
    }

    fn acquire(&self, resource: Resource) -> Option<u32> {
        let mut state = self.0.borrow_mut();
        let attempt = {
            let count = state.attempts.entry(resource).or_default();
            *count += 1;
            *count
        };
        if state.failures.contains(&(resource, attempt)) {
            return None;
        }
        state.next_id += 1;
        let id = state.next_id;
        state.events.push((Event::Acquire(resource), id));
        Some(id)
    }

    fn release(&self, resource: Resource, id: u32) {
        self.0.borrow_mut().events.push((Event::Release(resource), id));
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.borrow().events.iter().map(|(event, _)| *event).collect()
    }

    /// Successful acquisitions of `resource`
    pub fn acquired(&self, resource: Resource) -> usize {
        self.events()
            .iter()
            .filter(|event| **event == Event::Acquire(resource))
            .count()
    }

    /// Every acquired handle was released exactly once, in reverse order
    pub fn assert_balanced(&self) {
        let state = self.0.borrow();
        let mut stack: Vec<(Resource, u32)> = Vec::new();
        for &(event, id) in &state.events {
            match event {
                Event::Acquire(resource) => stack.push((resource, id)),
                Event::Release(resource) => {
                    assert_eq!(
                        stack.pop(),
                        Some((resource, id)),
                        "{:?} #{} released out of order in {:?}",
                        resource,
                        id,
                        state.events
                    );
                }
            }
        }
        assert!(stack.is_empty(), "Leaked resources: {:?}", stack);
    }
}

fn memfd(len: u64) -> OwnedFd {
    let fd = unsafe { libc::memfd_create(c"framesconv-mock".as_ptr(), libc::MFD_CLOEXEC) };
    assert!(fd >= 0, "memfd_create failed: {}", io::Error::last_os_error());
    let file = unsafe { File::from_raw_fd(fd) };
    file.set_len(len).expect("Failed to size memfd");
    OwnedFd::from(file)
}

/// [`Allocator`] handing out memfd-backed buffer objects
pub struct MockAllocator {
    ledger: Ledger,
    row_padding: u32,
    unmappable: bool,
}

impl MockAllocator {
    pub fn new(ledger: &Ledger) -> Self {
        Self {
            ledger: ledger.clone(),
            row_padding: 0,
            unmappable: false,
        }
    }

    /// Report strides padded by `bytes`
    pub fn with_row_padding(mut self, bytes: u32) -> Self {
        self.row_padding = bytes;
        self
    }

    /// Export fds that refuse mmap
    pub fn unmappable(mut self) -> Self {
        self.unmappable = true;
        self
    }
}

pub struct MockDevice {
    ledger: Ledger,
    id: u32,
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.ledger.release(Resource::RenderNode, self.id);
    }
}

pub struct MockBo {
    ledger: Ledger,
    id: u32,
    memory: OwnedFd,
    stride: u32,
}

impl Drop for MockBo {
    fn drop(&mut self) {
        self.ledger.release(Resource::BufferObject, self.id);
    }
}

impl Allocator for MockAllocator {
    type Device = MockDevice;
    type Bo = MockBo;

    fn open(&self, path: &Path) -> Result<Self::Device, BufferError> {
        let id = self
            .ledger
            .acquire(Resource::RenderNode)
            .ok_or_else(|| BufferError::OpenDevice {
                path: path.to_path_buf(),
                source: io::ErrorKind::NotFound.into(),
            })?;
        Ok(MockDevice {
            ledger: self.ledger.clone(),
            id,
        })
    }

    fn create_bo(
        &self,
        _device: &Self::Device,
        width: u32,
        height: u32,
    ) -> Result<Self::Bo, BufferError> {
        let stride = width * 4 + self.row_padding;
        let memory = memfd(u64::from(stride) * u64::from(height));
        let id = self
            .ledger
            .acquire(Resource::BufferObject)
            .ok_or_else(|| BufferError::Allocate {
                width,
                height,
                source: io::Error::from_raw_os_error(libc::ENOMEM),
            })?;
        Ok(MockBo {
            ledger: self.ledger.clone(),
            id,
            memory,
            stride,
        })
    }

    fn stride(&self, bo: &Self::Bo) -> u32 {
        bo.stride
    }

    fn export_fd(&self, bo: &Self::Bo) -> Result<OwnedFd, BufferError> {
        if self.unmappable {
            // /dev/null has no mmap, the kernel answers ENODEV
            return File::open("/dev/null")
                .map(OwnedFd::from)
                .map_err(BufferError::ExportFd);
        }
        bo.memory.try_clone().map_err(BufferError::ExportFd)
    }
}

/// Byte position of the r, g, b, a channels within one texel.
///
/// Only formats Mesa's dri image table accepts for dma-buf import.
fn channel_offsets(fourcc: DrmFourcc) -> Option<[usize; 4]> {
    match fourcc {
        DrmFourcc::Abgr8888 | DrmFourcc::Xbgr8888 => Some([0, 1, 2, 3]),
        DrmFourcc::Argb8888 | DrmFourcc::Xrgb8888 => Some([2, 1, 0, 3]),
        _ => None,
    }
}

fn swizzle(value: [f32; 4], pattern: &str) -> [f32; 4] {
    let mut out = [0.0; 4];
    for (slot, component) in out.iter_mut().zip(pattern.chars()) {
        *slot = match component {
            'r' | 'x' => value[0],
            'g' | 'y' => value[1],
            'b' | 'z' => value[2],
            _ => value[3],
        };
    }
    out
}

struct MockImage {
    memory: File,
    width: u32,
    height: u32,
    pitch: u32,
    offsets: [usize; 4],
}

impl MockImage {
    fn load(&self) -> Vec<u8> {
        let mut data = vec![0u8; self.pitch as usize * self.height as usize];
        self.memory
            .read_exact_at(&mut data, 0)
            .expect("Failed to read mock image");
        data
    }

    fn store(&self, data: &[u8]) {
        self.memory
            .write_all_at(data, 0)
            .expect("Failed to write mock image");
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.pitch as usize + x as usize * 4
    }

    /// Normalized rgb of one texel
    fn texel(&self, data: &[u8], x: u32, y: u32) -> [f32; 3] {
        let base = self.index(x, y);
        [0, 1, 2].map(|c| f32::from(data[base + self.offsets[c]]) / 255.0)
    }

    /// Texture fetch with edge clamping
    fn sample(&self, data: &[u8], x: u32, y: u32) -> [f32; 3] {
        self.texel(data, x.min(self.width - 1), y.min(self.height - 1))
    }

    /// Image load, zero outside the image
    fn load_texel(&self, data: &[u8], x: u32, y: u32) -> [f32; 3] {
        if x < self.width && y < self.height {
            self.texel(data, x, y)
        } else {
            [0.0; 3]
        }
    }

    /// Store with unorm8 quantization, writes outside the image are dropped
    fn put(&self, data: &mut [u8], x: u32, y: u32, rgba: [f32; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let base = self.index(x, y);
        for (channel, value) in rgba.into_iter().enumerate() {
            data[base + self.offsets[channel]] = quantize(value);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProgramKind {
    Raster,
    Compute,
}

#[derive(Default)]
struct PlatformState {
    display: Option<u32>,
    current: Option<u32>,
    context_version: Option<(i32, i32)>,
    images: HashMap<u32, MockImage>,
    textures: HashMap<u32, u32>,
    programs: HashMap<u32, ProgramKind>,
    uniforms: HashMap<(u32, String), Uniform>,
    attributes: Vec<(u32, String)>,
    framebuffers: HashMap<u32, u32>,
    buffers: HashMap<u32, Vec<f32>>,
    fences: u32,
    draws: u32,
    dispatches: Vec<[u32; 3]>,
}

/// [`Platform`] executing kernels on the CPU
pub struct MockPlatform {
    ledger: Ledger,
    missing: Vec<&'static str>,
    state: RefCell<PlatformState>,
}

const CLIENT_EXTENSIONS: [&str; 3] = [
    "EGL_EXT_client_extensions",
    "EGL_EXT_platform_base",
    "EGL_MESA_platform_surfaceless",
];

const DISPLAY_EXTENSIONS: [&str; 4] = [
    "EGL_KHR_fence_sync",
    "EGL_KHR_surfaceless_context",
    "EGL_KHR_no_config_context",
    "EGL_EXT_image_dma_buf_import",
];

impl MockPlatform {
    pub fn new(ledger: &Ledger) -> Self {
        Self {
            ledger: ledger.clone(),
            missing: Vec::new(),
            state: RefCell::default(),
        }
    }

    /// Hide one client or display extension
    pub fn without_extension(mut self, name: &'static str) -> Self {
        self.missing.push(name);
        self
    }

    pub fn context_version(&self) -> Option<(i32, i32)> {
        self.state.borrow().context_version
    }

    pub fn fence_count(&self) -> u32 {
        self.state.borrow().fences
    }

    pub fn draw_count(&self) -> u32 {
        self.state.borrow().draws
    }

    pub fn dispatches(&self) -> Vec<[u32; 3]> {
        self.state.borrow().dispatches.clone()
    }

    pub fn attribute_bindings(&self) -> Vec<(u32, String)> {
        self.state.borrow().attributes.clone()
    }

    fn extension_string(&self, names: &[&str]) -> String {
        names
            .iter()
            .filter(|name| !self.missing.contains(name))
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn require_current(&self) -> Result<(), NativeError> {
        match self.state.borrow().current {
            Some(_) => Ok(()),
            None => Err(NativeError::Unavailable("current GLES context")),
        }
    }

    fn acquire(&self, resource: Resource, err: NativeError) -> Result<u32, NativeError> {
        self.ledger.acquire(resource).ok_or(err)
    }

    fn vec2_uniform(&self, program: u32, name: &str) -> Result<(f32, f32), NativeError> {
        match self.state.borrow().uniforms.get(&(program, name.to_string())) {
            Some(Uniform::Vec2(x, y)) => Ok((*x, *y)),
            _ => Err(NativeError::Gl(GlCode(0x0502))),
        }
    }
}

impl Platform for MockPlatform {
    type Display = u32;
    type Context = u32;
    type Image = u32;
    type Texture = u32;
    type Program = u32;
    type Framebuffer = u32;
    type Buffer = u32;

    fn client_extensions(&self) -> Result<String, NativeError> {
        Ok(self.extension_string(&CLIENT_EXTENSIONS))
    }

    fn surfaceless_display(&self) -> Result<Self::Display, NativeError> {
        Ok(1)
    }

    fn initialize(&self, _display: Self::Display) -> Result<(), NativeError> {
        let id = self.acquire(Resource::Display, NativeError::Egl(EglCode(0x3001)))?;
        self.state.borrow_mut().display = Some(id);
        Ok(())
    }

    fn display_extensions(&self, _display: Self::Display) -> Result<String, NativeError> {
        Ok(self.extension_string(&DISPLAY_EXTENSIONS))
    }

    fn terminate(&self, _display: Self::Display) -> Result<(), NativeError> {
        let id = self.state.borrow_mut().display.take();
        if let Some(id) = id {
            self.ledger.release(Resource::Display, id);
        }
        Ok(())
    }

    fn bind_api(&self) -> Result<(), NativeError> {
        Ok(())
    }

    fn create_context(
        &self,
        _display: Self::Display,
        version: ApiVersion,
    ) -> Result<Self::Context, NativeError> {
        let id = self.acquire(Resource::Context, NativeError::Egl(EglCode(0x3009)))?;
        self.state.borrow_mut().context_version = Some((version.major, version.minor));
        Ok(id)
    }

    fn destroy_context(
        &self,
        _display: Self::Display,
        context: Self::Context,
    ) -> Result<(), NativeError> {
        self.ledger.release(Resource::Context, context);
        Ok(())
    }

    fn make_current(
        &self,
        _display: Self::Display,
        context: Option<Self::Context>,
    ) -> Result<(), NativeError> {
        let previous = self.state.borrow_mut().current.take();
        if let Some(id) = previous {
            self.ledger.release(Resource::Current, id);
        }
        if context.is_some() {
            let id = self.acquire(Resource::Current, NativeError::Egl(EglCode(0x3006)))?;
            self.state.borrow_mut().current = Some(id);
        }
        Ok(())
    }

    fn fence_sync(&self, _display: Self::Display) -> Result<(), NativeError> {
        self.require_current()?;
        self.state.borrow_mut().fences += 1;
        Ok(())
    }

    fn create_image(
        &self,
        _display: Self::Display,
        descriptor: &DmaBufDescriptor<'_>,
    ) -> Result<Self::Image, NativeError> {
        let bad_match = NativeError::Egl(EglCode(0x3009));
        let offsets = channel_offsets(descriptor.fourcc).ok_or(bad_match.clone())?;
        let memory = File::from(
            descriptor
                .fd
                .try_clone_to_owned()
                .map_err(|_| NativeError::Egl(EglCode(0x300C)))?,
        );
        let size = memory.metadata().map(|m| m.len()).unwrap_or(0);
        let extent = u64::from(descriptor.pitch) * u64::from(descriptor.height);
        if descriptor.offset != 0 || descriptor.pitch < descriptor.width * 4 || size < extent {
            return Err(bad_match);
        }

        let id = self.acquire(Resource::Image, NativeError::Egl(EglCode(0x300C)))?;
        self.state.borrow_mut().images.insert(
            id,
            MockImage {
                memory,
                width: descriptor.width,
                height: descriptor.height,
                pitch: descriptor.pitch,
                offsets,
            },
        );
        Ok(id)
    }

    fn destroy_image(
        &self,
        _display: Self::Display,
        image: Self::Image,
    ) -> Result<(), NativeError> {
        self.state.borrow_mut().images.remove(&image);
        self.ledger.release(Resource::Image, image);
        Ok(())
    }

    fn create_texture(&self, image: Self::Image) -> Result<Self::Texture, NativeError> {
        self.require_current()?;
        let id = self.acquire(Resource::Texture, NativeError::Gl(GlCode(0x0502)))?;
        self.state.borrow_mut().textures.insert(id, image);
        Ok(id)
    }

    fn delete_texture(&self, texture: Self::Texture) {
        self.state.borrow_mut().textures.remove(&texture);
        self.ledger.release(Resource::Texture, texture);
    }

    fn create_program(
        &self,
        stages: &[ShaderSource<'_>],
        attributes: &[(u32, &str)],
    ) -> Result<Self::Program, NativeError> {
        self.require_current()?;
        let kind = if stages.iter().any(|s| s.stage == ShaderStage::Compute) {
            ProgramKind::Compute
        } else {
            ProgramKind::Raster
        };
        if kind == ProgramKind::Compute && self.context_version() < Some((3, 1)) {
            return Err(NativeError::Log(
                "0:1(10): error: GLSL ES 3.10 is not supported".into(),
            ));
        }
        let id = self.acquire(
            Resource::Program,
            NativeError::Log("0:1(1): error: syntax error, unexpected end of file".into()),
        )?;
        let mut state = self.state.borrow_mut();
        state.programs.insert(id, kind);
        state
            .attributes
            .extend(attributes.iter().map(|(loc, name)| (*loc, name.to_string())));
        Ok(id)
    }

    fn delete_program(&self, program: Self::Program) {
        self.state.borrow_mut().programs.remove(&program);
        self.ledger.release(Resource::Program, program);
    }

    fn set_uniform(
        &self,
        program: Self::Program,
        name: &str,
        value: Uniform,
    ) -> Result<(), NativeError> {
        self.require_current()?;
        self.state
            .borrow_mut()
            .uniforms
            .insert((program, name.to_string()), value);
        Ok(())
    }

    fn create_framebuffer(&self, color: Self::Texture) -> Result<Self::Framebuffer, NativeError> {
        self.require_current()?;
        // GL_FRAMEBUFFER_INCOMPLETE_ATTACHMENT
        let id = self.acquire(Resource::Framebuffer, NativeError::IncompleteFramebuffer(0x8CD6))?;
        self.state.borrow_mut().framebuffers.insert(id, color);
        Ok(id)
    }

    fn delete_framebuffer(&self, framebuffer: Self::Framebuffer) {
        self.state.borrow_mut().framebuffers.remove(&framebuffer);
        self.ledger.release(Resource::Framebuffer, framebuffer);
    }

    fn create_vertex_buffer(&self, vertices: &[f32]) -> Result<Self::Buffer, NativeError> {
        self.require_current()?;
        let id = self.acquire(Resource::VertexBuffer, NativeError::Gl(GlCode(0x0505)))?;
        self.state.borrow_mut().buffers.insert(id, vertices.to_vec());
        Ok(id)
    }

    fn delete_vertex_buffer(&self, buffer: Self::Buffer) {
        self.state.borrow_mut().buffers.remove(&buffer);
        self.ledger.release(Resource::VertexBuffer, buffer);
    }

    fn draw(&self, call: &DrawCall<Self>) -> Result<(), NativeError> {
        self.require_current()?;
        let invalid = NativeError::Gl(GlCode(0x0502));
        let (_, height) = self.vec2_uniform(call.program, "src_size")?;
        let height = height as u32;

        let mut state = self.state.borrow_mut();
        if state.programs.get(&call.program) != Some(&ProgramKind::Raster)
            || state.buffers.get(&call.vertices).map(Vec::as_slice)
                != Some(&raster::QUAD_VERTICES[..])
        {
            return Err(invalid);
        }
        let color = state.framebuffers.get(&call.framebuffer).ok_or(invalid.clone())?;
        let src = state.textures.get(&call.source).ok_or(invalid.clone())?;
        let dst = state.textures.get(color).ok_or(invalid.clone())?;
        let src = state.images.get(src).ok_or(invalid.clone())?;
        let dst = state.images.get(dst).ok_or(invalid)?;

        let input = src.load();
        let mut output = dst.load();
        let yuv = |x: u32, y: u32| rgb_to_yuv(src.sample(&input, x, y));
        for dy in 0..call.viewport.1 {
            for dx in 0..call.viewport.0 {
                let x = dx * 4;
                let logical = if dy < height {
                    [0, 1, 2, 3].map(|i| yuv(x + i, dy)[0])
                } else {
                    let y = (dy - height) * 2;
                    let [u0, v0] =
                        average_chroma([yuv(x, y), yuv(x + 1, y), yuv(x, y + 1), yuv(x + 1, y + 1)]);
                    let [u1, v1] = average_chroma([
                        yuv(x + 2, y),
                        yuv(x + 3, y),
                        yuv(x + 2, y + 1),
                        yuv(x + 3, y + 1),
                    ]);
                    [u0, v0, u1, v1]
                };
                dst.put(&mut output, dx, dy, swizzle(logical, raster::STORE_SWIZZLE));
            }
        }
        dst.store(&output);
        state.draws += 1;
        Ok(())
    }

    fn dispatch(&self, call: &DispatchCall<Self>) -> Result<(), NativeError> {
        self.require_current()?;
        let invalid = NativeError::Gl(GlCode(0x0502));
        let mut state = self.state.borrow_mut();
        if state.programs.get(&call.program) != Some(&ProgramKind::Compute) {
            return Err(invalid);
        }
        let src = state.textures.get(&call.source).ok_or(invalid.clone())?;
        let dst = state.textures.get(&call.destination).ok_or(invalid.clone())?;
        let src = state.images.get(src).ok_or(invalid.clone())?;
        let dst = state.images.get(dst).ok_or(invalid)?;

        let input = src.load();
        let mut output = dst.load();
        let yuv = |x: u32, y: u32| rgb_to_yuv(src.load_texel(&input, x, y));
        let [groups_x, groups_y, _] = call.groups;
        for gy in 0..groups_y * compute::WORKGROUP_Y {
            for gx in 0..groups_x * compute::WORKGROUP_X {
                let x = gx * compute::FOOTPRINT_X;
                let y = gy * compute::FOOTPRINT_Y;
                let top = [0, 1, 2, 3].map(|i| yuv(x + i, y));
                let bottom = [0, 1, 2, 3].map(|i| yuv(x + i, y + 1));
                dst.put(&mut output, gx, y, top.map(|p| p[0]));
                dst.put(&mut output, gx, y + 1, bottom.map(|p| p[0]));
                let [u0, v0] = average_chroma([top[0], top[1], bottom[0], bottom[1]]);
                let [u1, v1] = average_chroma([top[2], top[3], bottom[2], bottom[3]]);
                dst.put(&mut output, gx, src.height + gy, [u0, v0, u1, v1]);
            }
        }
        dst.store(&output);
        state.dispatches.push(call.groups);
        Ok(())
    }
}
