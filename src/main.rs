// SPDX-License-Identifier: GPL-3.0-only

use clap::{ArgAction, Parser};
use framesconv::constants::DEFAULT_RENDER_NODE;
use framesconv::{ConvertError, FeatureLevel, Options};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

mod cli;

#[derive(Parser)]
#[command(name = "framesconv")]
#[command(about = "Convert a packed RGBX frame to NV12 on the GPU")]
#[command(version = env!("GIT_VERSION"))]
// -h is the frame height
#[command(disable_help_flag = true)]
struct Cli {
    /// Source file with packed RGBX pixels, stdin when absent or "-"
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Destination file for NV12 data, stdout when absent or "-"
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Frame width in pixels
    #[arg(short, long, allow_negative_numbers = true)]
    width: i64,

    /// Frame height in pixels
    #[arg(short = 'h', long, allow_negative_numbers = true)]
    height: i64,

    /// DRM render node to allocate buffers on
    #[arg(short, long, env = "FRAMESCONV_RENDER_NODE", default_value = DEFAULT_RENDER_NODE)]
    render_node: PathBuf,

    /// Kernel feature level: es20 (raster) or es31 (compute)
    #[arg(short, long, value_enum, default_value_t = FeatureLevel::Compute)]
    level: FeatureLevel,

    /// Check the GPU output against the CPU reference converter
    #[arg(long)]
    verify: bool,

    /// Print a JSON conversion report to stderr
    #[arg(long)]
    json: bool,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

fn main() -> ExitCode {
    // Logs go to stderr, stdout may carry the NV12 frame.
    // Set RUST_LOG to control the level, e.g. RUST_LOG=framesconv=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("framesconv=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let result = Options::new(cli.width, cli.height, cli.level)
        .map_err(Into::into)
        .and_then(|mut options| {
            options.input = cli::stream_path(cli.input);
            options.output = cli::stream_path(cli.output);
            options.render_node = cli.render_node;
            options.verify = cli.verify;
            cli::convert_frame(&options, cli.json)
        });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            debug!(kind = ?err.kind(), "Conversion failed");
            // Shown regardless of the log filter
            eprintln!("{}", failure_message(&err));
            ExitCode::FAILURE
        }
    }
}

fn failure_message(err: &ConvertError) -> String {
    format!("framesconv: {}", err)
}
