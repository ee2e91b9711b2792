// SPDX-License-Identifier: GPL-3.0-only

//! Single-frame RGBX to NV12 conversion
//!
//! ```text
//! reader ─▶ source buffer ─▶ texture ─▶ kernel ─▶ texture ─▶ NV12 buffer ─▶ writer
//! ```
//!
//! Resources are acquired in the order buffers, display context, imports,
//! kernel. They are held in locals declared in that order, so they are
//! released in exactly the reverse order whether the conversion succeeds
//! or fails half way.

use crate::config::{FeatureLevel, Options};
use crate::constants::VERIFY_TOLERANCE;
use crate::errors::{ConvertResult, KernelError, StreamError};
use crate::gpu::alloc::{Access, Allocator, RenderDevice};
use crate::gpu::context::DisplayContext;
use crate::gpu::platform::Platform;
use crate::media::nv12_converter::{Nv12Deviation, compare_nv12, convert_rgbx_to_nv12_cpu};
use crate::shaders::{Kernel, destination_format, source_format};
use serde::Serialize;
use std::io::{Read, Write};
use std::time::Instant;
use tracing::{debug, info};

/// Outcome of one conversion
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    pub width: u32,
    pub height: u32,
    pub level: FeatureLevel,
    pub kernel: &'static str,
    pub bytes_in: usize,
    pub bytes_out: usize,
    /// Kernel execution time including the fence wait
    pub elapsed_ms: f64,
    /// Set when the output was checked against the CPU reference
    pub deviation: Option<Nv12Deviation>,
}

/// Convert one frame read from `reader` and write the NV12 result to `writer`.
///
/// Options are validated before any device resource is touched. Nothing is
/// written unless the whole conversion succeeded.
pub fn convert<A: Allocator, P: Platform>(
    allocator: &A,
    platform: &P,
    options: &Options,
    reader: &mut impl Read,
    writer: &mut impl Write,
) -> ConvertResult<ConversionReport> {
    options.validate()?;
    let (width, height) = (options.width, options.height);
    let level = options.level;

    let device = RenderDevice::open(allocator, &options.render_node)?;
    let source = device.create_buffer(width, height)?;
    source.fill_from(reader)?;

    let reference = if options.verify {
        let region = source.map(Access::Read)?;
        Some(convert_rgbx_to_nv12_cpu(region.as_slice(), width, height)?)
    } else {
        None
    };

    // Four luma bytes per texel, chroma rows appended below the luma rows
    let destination = device.create_buffer(width / 4, height * 3 / 2)?;

    let context = DisplayContext::new(platform, level)?;
    let _current = context.bind_current()?;
    let source_texture = context.import(&source, source_format(level))?;
    let destination_texture = context.import(&destination, destination_format(level))?;
    let kernel = Kernel::new(&context)?;

    let start = Instant::now();
    kernel.convert(&source_texture, width, height, &destination_texture)?;
    context.sync()?;
    let elapsed = start.elapsed();
    info!(
        kernel = kernel.name(),
        width,
        height,
        elapsed_us = elapsed.as_micros() as u64,
        "Conversion finished"
    );

    let deviation = match reference {
        Some(reference) => {
            let mut nv12 = Vec::with_capacity(destination.len());
            destination.drain_to(&mut nv12)?;
            let deviation = compare_nv12(&nv12, &reference, width, height)?;
            debug!(luma = deviation.luma, chroma = deviation.chroma, "Verified against CPU reference");
            if !deviation.within(VERIFY_TOLERANCE) {
                return Err(KernelError::Verify {
                    luma: deviation.luma,
                    chroma: deviation.chroma,
                }
                .into());
            }
            writer
                .write_all(&nv12)
                .and_then(|()| writer.flush())
                .map_err(|source| StreamError::Write {
                    expected: nv12.len(),
                    source,
                })?;
            Some(deviation)
        }
        None => {
            destination.drain_to(writer)?;
            None
        }
    };

    Ok(ConversionReport {
        width,
        height,
        level,
        kernel: kernel.name(),
        bytes_in: source.len(),
        bytes_out: destination.len(),
        elapsed_ms: elapsed.as_secs_f64() * 1000.0,
        deviation,
    })
}
