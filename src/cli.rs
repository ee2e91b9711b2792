// SPDX-License-Identifier: GPL-3.0-only

//! Command-line conversion
//!
//! Wires files or stdio to the conversion pipeline and reports the result.

use framesconv::errors::{ConvertResult, StreamError};
use framesconv::{ConversionReport, EglPlatform, GbmAllocator, Options, convert};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// `-` means the standard stream
pub fn stream_path(path: Option<PathBuf>) -> Option<PathBuf> {
    path.filter(|path| path.as_path() != Path::new("-"))
}

fn open_input(path: Option<&Path>) -> ConvertResult<Box<dyn Read>> {
    Ok(match path {
        Some(path) => {
            let file = File::open(path).map_err(|source| StreamError::Open {
                path: path.to_path_buf(),
                source,
            })?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(io::stdin().lock()),
    })
}

fn create_output(path: Option<&Path>) -> ConvertResult<Box<dyn Write>> {
    Ok(match path {
        Some(path) => {
            let file = File::create(path).map_err(|source| StreamError::Create {
                path: path.to_path_buf(),
                source,
            })?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}

/// Convert one frame as described by `options`
pub fn convert_frame(options: &Options, json: bool) -> ConvertResult<()> {
    let mut reader = open_input(options.input.as_deref())?;
    let mut writer = create_output(options.output.as_deref())?;
    let platform = EglPlatform::load()?;

    let report = convert(&GbmAllocator, &platform, options, &mut reader, &mut writer)?;
    if json {
        print_report(&report);
    } else {
        info!(
            width = report.width,
            height = report.height,
            level = report.level.name(),
            bytes_out = report.bytes_out,
            elapsed_ms = report.elapsed_ms,
            "Frame converted"
        );
    }
    Ok(())
}

fn print_report(report: &ConversionReport) {
    let mut stderr = io::stderr().lock();
    let result = serde_json::to_writer_pretty(&mut stderr, report)
        .map_err(io::Error::from)
        .and_then(|()| writeln!(stderr));
    if let Err(err) = result {
        warn!(error = %err, "Failed to print conversion report");
    }
}
