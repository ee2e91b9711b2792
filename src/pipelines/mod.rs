// SPDX-License-Identifier: GPL-3.0-only

//! Processing pipelines
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ RGBX frame   │ ──▶ │  Conversion       │ ──▶ │  NV12 frame  │
//! │ (host bytes) │     │  - device buffers │     │ (host bytes) │
//! │              │     │  - dma-buf import │     │              │
//! │              │     │  - GLES kernel    │     │              │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//! ```
//!
//! - [`conversion`]: single-frame RGBX to NV12 conversion on the GPU

pub mod conversion;

pub use conversion::{ConversionReport, convert};
