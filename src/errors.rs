// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the conversion pipeline
//!
//! Every failure in this tool is fatal: there is no retry policy, errors
//! propagate to the single boundary in `main` which prints them and exits.
//! Component errors are wrapped by [`ConvertError`], and
//! [`ConvertError::kind`] classifies them into the four error classes.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using ConvertError
pub type ConvertResult<T> = Result<T, ConvertError>;

/// Error class, independent of the component that raised it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any device resource was touched
    InvalidInput,
    /// Allocation, context or program creation failed
    Acquisition,
    /// A draw, dispatch or import was rejected by the driver
    Native,
    /// Short read or write against a host stream
    Io,
}

/// Main error type
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Options validation errors
    #[error("Invalid input: {0}")]
    Input(#[from] InputError),
    /// Render node and buffer object errors
    #[error("Device buffer error: {0}")]
    Buffer(#[from] BufferError),
    /// EGL display and context errors
    #[error("Display context error: {0}")]
    Context(#[from] ContextError),
    /// dma-buf import errors
    #[error("Import error: {0}")]
    Import(#[from] ImportError),
    /// Conversion program errors
    #[error("Kernel error: {0}")]
    Kernel(#[from] KernelError),
    /// Host stream errors
    #[error("I/O error: {0}")]
    Stream(#[from] StreamError),
}

impl ConvertError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::Input(_) => ErrorKind::InvalidInput,
            ConvertError::Buffer(_) | ConvertError::Context(_) => ErrorKind::Acquisition,
            ConvertError::Import(_) => ErrorKind::Native,
            ConvertError::Kernel(KernelError::Build { .. }) => ErrorKind::Acquisition,
            ConvertError::Kernel(_) => ErrorKind::Native,
            ConvertError::Stream(_) => ErrorKind::Io,
        }
    }
}

/// Options validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    /// Dimension is zero or negative
    #[error("{name} must be positive (got {value})")]
    NonPositive { name: &'static str, value: i64 },
    /// Dimension does not match the kernel footprint
    #[error("{name} must be a multiple of {alignment} (got {value})")]
    Misaligned {
        name: &'static str,
        value: u32,
        alignment: u32,
    },
    /// Dimension does not fit the native size types
    #[error("{name} is too large (got {value})")]
    TooLarge { name: &'static str, value: i64 },
    /// Host-side frame has the wrong number of bytes
    #[error("Expected {expected} bytes of frame data, got {actual}")]
    DataLength { expected: usize, actual: usize },
}

/// Render node and buffer object errors
#[derive(Debug, Error)]
pub enum BufferError {
    #[error("Failed to open render node {}: {source}", path.display())]
    OpenDevice { path: PathBuf, source: io::Error },
    #[error("Failed to create gbm device: {0}")]
    CreateDevice(io::Error),
    #[error("Failed to create {width}x{height} gbm buffer object: {source}")]
    Allocate {
        width: u32,
        height: u32,
        source: io::Error,
    },
    #[error("Failed to get gbm buffer object fd: {0}")]
    ExportFd(io::Error),
    /// The driver padded rows, so the buffer can't be described as packed
    #[error("Buffer object stride is {actual} bytes, expected {expected}")]
    UnexpectedStride { expected: u32, actual: u32 },
    #[error("Failed to mmap gbm buffer object fd: {0}")]
    Map(io::Error),
    #[error("Failed to sync dma-buf for cpu access: {0}")]
    Sync(io::Error),
}

/// EGL display and context errors
#[derive(Debug, Error)]
pub enum ContextError {
    /// libEGL could not be loaded
    #[error("Failed to load libEGL: {0}")]
    Load(String),
    #[error("Unsupported platform: {0} is not available")]
    UnsupportedPlatform(&'static str),
    #[error("Required extension {0} is not supported")]
    MissingExtension(&'static str),
    #[error("{step}: {source}")]
    Native {
        step: &'static str,
        source: NativeError,
    },
}

/// dma-buf import errors
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("{step}: {source}")]
    Native {
        step: &'static str,
        source: NativeError,
    },
}

/// Conversion program errors
#[derive(Debug, Error)]
pub enum KernelError {
    /// Compile or link failure, carries the driver's info log
    #[error("Failed to build {kernel} program: {source}")]
    Build {
        kernel: &'static str,
        source: NativeError,
    },
    #[error("{step}: {source}")]
    Native {
        step: &'static str,
        source: NativeError,
    },
    /// GPU output deviates from the CPU reference
    #[error("Verification failed: luma off by {luma}, chroma off by {chroma}")]
    Verify { luma: u8, chroma: u8 },
}

/// Host stream errors
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Failed to open {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error("Failed to create {}: {source}", path.display())]
    Create { path: PathBuf, source: io::Error },
    /// Short read or read error; the device buffer needs the full extent
    #[error("Failed to read source ({expected} bytes): {source}")]
    Read { expected: usize, source: io::Error },
    #[error("Failed to write target ({expected} bytes): {source}")]
    Write { expected: usize, source: io::Error },
}

/// Failure reported by the native EGL/GLES layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NativeError {
    #[error("{0}")]
    Egl(EglCode),
    #[error("{0}")]
    Gl(GlCode),
    /// Shader compiler or linker info log
    #[error("{0}")]
    Log(String),
    #[error("framebuffer is incomplete (0x{0:04x})")]
    IncompleteFramebuffer(u32),
    #[error("required extension {0} is not supported")]
    MissingExtension(&'static str),
    #[error("{0} is not available")]
    Unavailable(&'static str),
}

/// Raw EGL error code, displayed by its symbolic name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EglCode(pub i32);

/// Raw GL error code, displayed by its symbolic name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlCode(pub u32);

const EGL_ERRORS: &[(i32, &str)] = &[
    (0x3000, "EGL_SUCCESS"),
    (0x3001, "EGL_NOT_INITIALIZED"),
    (0x3002, "EGL_BAD_ACCESS"),
    (0x3003, "EGL_BAD_ALLOC"),
    (0x3004, "EGL_BAD_ATTRIBUTE"),
    (0x3005, "EGL_BAD_CONFIG"),
    (0x3006, "EGL_BAD_CONTEXT"),
    (0x3007, "EGL_BAD_CURRENT_SURFACE"),
    (0x3008, "EGL_BAD_DISPLAY"),
    (0x3009, "EGL_BAD_MATCH"),
    (0x300A, "EGL_BAD_NATIVE_PIXMAP"),
    (0x300B, "EGL_BAD_NATIVE_WINDOW"),
    (0x300C, "EGL_BAD_PARAMETER"),
    (0x300D, "EGL_BAD_SURFACE"),
    (0x300E, "EGL_CONTEXT_LOST"),
];

const GL_ERRORS: &[(u32, &str)] = &[
    (0x0000, "GL_NO_ERROR"),
    (0x0500, "GL_INVALID_ENUM"),
    (0x0501, "GL_INVALID_VALUE"),
    (0x0502, "GL_INVALID_OPERATION"),
    (0x0505, "GL_OUT_OF_MEMORY"),
    (0x0506, "GL_INVALID_FRAMEBUFFER_OPERATION"),
];

fn lookup<K: PartialEq + Copy>(table: &[(K, &'static str)], key: K) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, name)| *name)
}

impl EglCode {
    /// Symbolic name of the code, if it is a known EGL error
    pub fn name(&self) -> Option<&'static str> {
        lookup(EGL_ERRORS, self.0)
    }
}

impl GlCode {
    /// Symbolic name of the code, if it is a known GL error
    pub fn name(&self) -> Option<&'static str> {
        lookup(GL_ERRORS, self.0)
    }
}

impl fmt::Display for EglCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "unknown EGL error 0x{:04x}", self.0),
        }
    }
}

impl fmt::Display for GlCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "unknown GL error 0x{:04x}", self.0),
        }
    }
}
