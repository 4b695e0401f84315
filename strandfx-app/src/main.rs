//! strandfx
//!
//! Headless driver for the hair and skin renderer. Builds a head with hair,
//! renders a number of frames through the recording or wgpu backend and
//! releases everything again.

mod app;
mod errors;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, ValueEnum};
use strandfx_gpu::{Config, RecordingBackend, WgpuBackend, init_logging};
use tracing::{error, info};

use crate::app::RunOptions;
use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    /// Record GPU calls without touching a device
    Recording,
    /// Render offscreen through wgpu
    Wgpu,
}

/// `WIDTHxHEIGHT`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Size {
    width: u32,
    height: u32,
}

impl FromStr for Size {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (width, height) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .ok()
                .filter(|v| *v > 0)
                .ok_or_else(|| format!("invalid dimension '{v}'"))
        };
        Ok(Self {
            width: parse(width)?,
            height: parse(height)?,
        })
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// strandfx - real-time hair and skin rendering
#[derive(Parser, Debug)]
#[command(name = "strandfx")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON renderer configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// GPU backend
    #[arg(short, long, value_enum, default_value_t = BackendKind::Recording)]
    backend: BackendKind,

    /// Number of frames to render
    #[arg(short, long, default_value_t = 3)]
    frames: u32,

    /// Drawable width in pixels
    #[arg(long, default_value_t = 1280, value_parser = clap::value_parser!(u32).range(1..))]
    width: u32,

    /// Drawable height in pixels
    #[arg(long, default_value_t = 720, value_parser = clap::value_parser!(u32).range(1..))]
    height: u32,

    /// Resize to WIDTHxHEIGHT halfway through the run
    #[arg(long)]
    resize_to: Option<Size>,

    /// TressFX hair file; a procedural scalp is used when omitted
    #[arg(long)]
    hair: Option<PathBuf>,

    /// Directory with WGSL files overriding the embedded shaders
    #[arg(long)]
    shader_dir: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn run_options(&self) -> Result<RunOptions, AppError> {
        let config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        Ok(RunOptions {
            config,
            frames: self.frames,
            width: self.width,
            height: self.height,
            resize_to: self.resize_to.map(|size| (size.width, size.height)),
            hair: self.hair.clone(),
            shader_dir: self.shader_dir.clone(),
        })
    }
}

fn run(args: &Args) -> Result<(), AppError> {
    let options = args.run_options()?;
    info!(backend = ?args.backend, width = args.width, height = args.height, frames = args.frames, "Starting strandfx");

    let summary = match args.backend {
        BackendKind::Recording => app::run(
            RecordingBackend::new().with_backbuffer(args.width, args.height),
            &options,
        )?,
        BackendKind::Wgpu => app::run(WgpuBackend::headless(args.width, args.height)?, &options)?,
    };
    info!(frames = summary.frames, strands = summary.strands, "Done");
    Ok(())
}

fn main() {
    let args = Args::parse();
    init_logging(&args.log_level);

    if let Err(e) = run(&args) {
        error!("{e}");
        eprintln!("Application error: {}", e);
        std::process::exit(1);
    }
}
