// SPDX-License-Identifier: GPL-3.0-only

//! Device buffers
//!
//! A [`RenderDevice`] is an open render node. It hands out [`DeviceBuffer`]s:
//! linear 32 bpp buffer objects exported as dma-buf fds, which the host fills
//! and drains through a scoped [`MappedRegion`].

use super::platform::DmaBufDescriptor;
use crate::constants::BYTES_PER_PIXEL;
use crate::errors::{BufferError, ConvertResult, StreamError};
use drm_fourcc::DrmFourcc;
use std::io::{self, Read, Write};
use std::marker::PhantomData;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use std::path::Path;
use std::ptr::NonNull;
use tracing::{debug, warn};

/// Buffer object allocation backend
///
/// Devices and buffer objects release themselves on drop.
pub trait Allocator {
    type Device;
    type Bo;

    fn open(&self, path: &Path) -> Result<Self::Device, BufferError>;
    /// Linear, GPU-renderable 32 bpp buffer object
    fn create_bo(
        &self,
        device: &Self::Device,
        width: u32,
        height: u32,
    ) -> Result<Self::Bo, BufferError>;
    /// Row pitch in bytes
    fn stride(&self, bo: &Self::Bo) -> u32;
    fn export_fd(&self, bo: &Self::Bo) -> Result<OwnedFd, BufferError>;
}

/// Open render node, owner of every buffer created from it
pub struct RenderDevice<'a, A: Allocator> {
    allocator: &'a A,
    device: A::Device,
}

impl<'a, A: Allocator> RenderDevice<'a, A> {
    pub fn open(allocator: &'a A, path: &Path) -> Result<Self, BufferError> {
        let device = allocator.open(path)?;
        debug!(path = %path.display(), "Render node opened");
        Ok(Self { allocator, device })
    }

    /// Allocate a packed `width` x `height` buffer.
    ///
    /// Buffers whose driver stride differs from `width * 4` are rejected,
    /// since imports describe the pitch as exactly that.
    pub fn create_buffer(&self, width: u32, height: u32) -> Result<DeviceBuffer<'_, A>, BufferError> {
        let bo = self.allocator.create_bo(&self.device, width, height)?;
        let expected = width * BYTES_PER_PIXEL;
        let stride = self.allocator.stride(&bo);
        if stride != expected {
            return Err(BufferError::UnexpectedStride {
                expected,
                actual: stride,
            });
        }
        let fd = self.allocator.export_fd(&bo)?;
        debug!(width, height, fd = fd.as_raw_fd(), "Device buffer allocated");

        // fd is declared first so it closes before the bo is destroyed
        Ok(DeviceBuffer {
            fd,
            bo,
            width,
            height,
            _device: PhantomData,
        })
    }
}

/// Linear buffer object plus its exported dma-buf fd
pub struct DeviceBuffer<'d, A: Allocator> {
    fd: OwnedFd,
    #[allow(dead_code)]
    bo: A::Bo,
    width: u32,
    height: u32,
    _device: PhantomData<&'d A::Device>,
}

impl<'d, A: Allocator> DeviceBuffer<'d, A> {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pitch(&self) -> u32 {
        self.width * BYTES_PER_PIXEL
    }

    /// Size of the full extent in bytes
    pub fn len(&self) -> usize {
        self.pitch() as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }

    /// Import description of this buffer, interpreted as `fourcc`
    pub fn descriptor(&self, fourcc: DrmFourcc) -> DmaBufDescriptor<'_> {
        DmaBufDescriptor {
            width: self.width,
            height: self.height,
            fourcc,
            fd: self.fd(),
            offset: 0,
            pitch: self.pitch(),
        }
    }

    /// Map the full extent for CPU access
    pub fn map(&self, access: Access) -> Result<MappedRegion<'_>, BufferError> {
        MappedRegion::new(self.fd(), self.len(), access)
    }

    /// Fill the whole buffer from `reader`.
    ///
    /// A short read is a stream error; a failed mapping is a buffer error.
    pub fn fill_from(&self, reader: &mut impl Read) -> ConvertResult<()> {
        let expected = self.len();
        let mut region = self.map(Access::Write)?;
        reader
            .read_exact(region.as_mut_slice())
            .map_err(|source| StreamError::Read { expected, source })?;
        debug!(bytes = expected, "Device buffer filled");
        Ok(())
    }

    /// Copy the whole buffer to `writer`
    pub fn drain_to(&self, writer: &mut impl Write) -> ConvertResult<()> {
        let expected = self.len();
        let region = self.map(Access::Read)?;
        writer
            .write_all(region.as_slice())
            .and_then(|()| writer.flush())
            .map_err(|source| StreamError::Write { expected, source })?;
        debug!(bytes = expected, "Device buffer drained");
        Ok(())
    }
}

/// Direction of CPU access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

// DMA_BUF_IOCTL_SYNC = _IOW('b', 0, struct dma_buf_sync)
const DMA_BUF_IOCTL_SYNC: libc::c_ulong = 0x4008_6200;
const DMA_BUF_SYNC_READ: u64 = 1 << 0;
const DMA_BUF_SYNC_WRITE: u64 = 1 << 1;
const DMA_BUF_SYNC_START: u64 = 0;
const DMA_BUF_SYNC_END: u64 = 1 << 2;

#[repr(C)]
struct DmaBufSync {
    flags: u64,
}

impl Access {
    fn prot(self) -> libc::c_int {
        match self {
            Access::Read => libc::PROT_READ,
            Access::Write => libc::PROT_READ | libc::PROT_WRITE,
        }
    }

    fn sync_flags(self) -> u64 {
        match self {
            Access::Read => DMA_BUF_SYNC_READ,
            Access::Write => DMA_BUF_SYNC_WRITE,
        }
    }
}

/// Bracket CPU access with a dma-buf sync.
///
/// Exporters without the ioctl (memfd, older drivers) report ENOTTY, which
/// is not an error: their memory is coherent.
fn dma_buf_sync(fd: BorrowedFd<'_>, flags: u64) -> io::Result<()> {
    let sync = DmaBufSync { flags };
    loop {
        let ret = unsafe { libc::ioctl(fd.as_raw_fd(), DMA_BUF_IOCTL_SYNC as _, &sync as *const DmaBufSync) };
        if ret == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) | Some(libc::EAGAIN) => continue,
            Some(libc::ENOTTY) => return Ok(()),
            _ => return Err(err),
        }
    }
}

/// Shared mapping of a dma-buf, unmapped on drop
pub struct MappedRegion<'a> {
    fd: BorrowedFd<'a>,
    ptr: NonNull<u8>,
    len: usize,
    access: Access,
}

impl<'a> MappedRegion<'a> {
    fn new(fd: BorrowedFd<'a>, len: usize, access: Access) -> Result<Self, BufferError> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                access.prot(),
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(BufferError::Map(io::Error::last_os_error()));
        }
        let Some(ptr) = NonNull::new(ptr.cast::<u8>()) else {
            return Err(BufferError::Map(io::Error::other("mmap returned null")));
        };

        let region = Self {
            fd,
            ptr,
            len,
            access,
        };
        // On failure the region drops here and unmaps
        dma_buf_sync(fd, DMA_BUF_SYNC_START | access.sync_flags()).map_err(BufferError::Sync)?;
        Ok(region)
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        debug_assert_eq!(self.access, Access::Write);
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for MappedRegion<'_> {
    fn drop(&mut self) {
        if let Err(err) = dma_buf_sync(self.fd, DMA_BUF_SYNC_END | self.access.sync_flags()) {
            warn!(error = %err, "Failed to end dma-buf cpu access");
        }
        let ret = unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.len) };
        if ret != 0 {
            warn!(error = %io::Error::last_os_error(), "Failed to unmap device buffer");
        }
    }
}
