// SPDX-License-Identifier: GPL-3.0-only

//! GBM allocation on a DRM render node

use super::alloc::Allocator;
use crate::errors::BufferError;
use gbm::{BufferObject, BufferObjectFlags, Device, Format};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::OwnedFd;
use std::path::Path;

/// [`Allocator`] backed by libgbm
#[derive(Debug, Default, Clone, Copy)]
pub struct GbmAllocator;

impl Allocator for GbmAllocator {
    type Device = Device<File>;
    type Bo = BufferObject<()>;

    fn open(&self, path: &Path) -> Result<Self::Device, BufferError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| BufferError::OpenDevice {
                path: path.to_path_buf(),
                source,
            })?;
        Device::new(file).map_err(BufferError::CreateDevice)
    }

    fn create_bo(
        &self,
        device: &Self::Device,
        width: u32,
        height: u32,
    ) -> Result<Self::Bo, BufferError> {
        // Byte order of the format is irrelevant here, imports pick their own fourcc
        device
            .create_buffer_object::<()>(
                width,
                height,
                Format::Argb8888,
                BufferObjectFlags::LINEAR | BufferObjectFlags::RENDERING,
            )
            .map_err(|source| BufferError::Allocate {
                width,
                height,
                source,
            })
    }

    fn stride(&self, bo: &Self::Bo) -> u32 {
        bo.stride()
    }

    fn export_fd(&self, bo: &Self::Bo) -> Result<OwnedFd, BufferError> {
        bo.fd()
            .map_err(|err| BufferError::ExportFd(io::Error::other(err.to_string())))
    }
}
