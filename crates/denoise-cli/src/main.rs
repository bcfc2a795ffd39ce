//! denoise - UNet denoiser for PFM images
//!
//! Denoises a color image, optionally guided by albedo and normal images,
//! with the built-in reference network or user-supplied weights.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use denoise_compute::{memory, reference_library, CpuNetworkBuilder, Weights};
use denoise_core::Image;
use denoise_filter::{Device, DeviceConfig, Filter};

mod pfm;

#[derive(Parser, Debug)]
#[command(name = "denoise")]
#[command(author, version, about = "UNet denoiser for PFM images")]
#[command(long_about = "
Denoises ray-traced images and lightmaps stored as PFM files.

Examples:
  denoise --hdr -c beauty.pfm -o out.pfm
  denoise --hdr -c beauty.pfm --albedo albedo.pfm --normal normal.pfm -o out.pfm
  denoise --srgb -c ldr.pfm -o out.pfm --max-mem 256
  denoise -f RTLightmap --directional -c dir.pfm -o out.pfm
  denoise --hdr -c beauty.pfm --inplace -o out.pfm
")]
struct Cli {
    /// Filter type: RT or RTLightmap
    #[arg(short, long, default_value = "RT")]
    filter: String,

    /// Noisy color image
    #[arg(short, long)]
    color: PathBuf,

    /// Albedo image
    #[arg(long)]
    albedo: Option<PathBuf>,

    /// Normal image (requires --albedo)
    #[arg(long)]
    normal: Option<PathBuf>,

    /// Output image
    #[arg(short, long)]
    output: PathBuf,

    /// Color is linear HDR
    #[arg(long)]
    hdr: bool,

    /// Color is LDR and already sRGB encoded
    #[arg(long)]
    srgb: bool,

    /// Lightmap holds directional coefficients
    #[arg(long)]
    directional: bool,

    /// Auxiliary images are noise free
    #[arg(long = "clean-aux")]
    clean_aux: bool,

    /// Weight file overriding the built-in weights
    #[arg(short, long)]
    weights: Option<PathBuf>,

    /// Input scale (default: automatic for HDR)
    #[arg(long = "input-scale", alias = "is")]
    input_scale: Option<f32>,

    /// Memory budget in MB
    #[arg(long = "max-mem")]
    max_memory_mb: Option<i32>,

    /// Denoise in place, reusing the color buffer as output
    #[arg(long)]
    inplace: bool,

    /// Number of threads (0 = auto)
    #[arg(short = 'j', long, default_value = "0")]
    threads: usize,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn load(path: &Path, what: &str) -> Result<Image> {
    let start = Instant::now();
    let image = pfm::read(path).with_context(|| format!("loading {what}"))?;
    debug!(what, path = %path.display(), size = ?image.dimensions(), elapsed_ms = start.elapsed().as_millis() as u64, "loaded");
    Ok(image)
}

fn configure(filter: &mut Filter, cli: &Cli, color: &Image) -> Result<Image> {
    filter.set_color(color.clone())?;
    if let Some(path) = &cli.albedo {
        filter.set_albedo(load(path, "albedo")?)?;
    }
    if let Some(path) = &cli.normal {
        filter.set_normal(load(path, "normal")?)?;
    }

    let (width, height) = color.dimensions();
    let output = if cli.inplace {
        color.clone()
    } else {
        Image::alloc(color.format(), width, height)?
    };
    filter.set_output(output.clone())?;

    if cli.hdr {
        filter.set_hdr(true)?;
    }
    if cli.srgb {
        filter.set_srgb(true)?;
    }
    if cli.directional {
        filter.set_directional(true)?;
    }
    if cli.clean_aux {
        filter.set_clean_aux(true)?;
    }
    if let Some(path) = &cli.weights {
        let weights = Weights::from_file(path).with_context(|| format!("loading weights {}", path.display()))?;
        filter.set_weights(Some(weights))?;
    }
    filter.set_input_scale(cli.input_scale)?;
    if let Some(mb) = cli.max_memory_mb {
        filter.set_max_memory_mb(mb)?;
    }
    Ok(output)
}

fn run(cli: &Cli) -> Result<()> {
    let defaults = DeviceConfig::default();
    let config = DeviceConfig {
        num_threads: if cli.threads > 0 { cli.threads } else { defaults.num_threads },
        verbose: u32::from(cli.verbose).max(defaults.verbose),
        ..defaults
    };
    let device = Device::with_config(
        std::sync::Arc::new(CpuNetworkBuilder::default()),
        reference_library()?,
        config,
    )?;
    info!(backend = device.backend_name(), threads = device.num_threads(), "device ready");

    let color = load(&cli.color, "color")?;
    let mut filter = device.new_filter(&cli.filter)?;
    let output = configure(&mut filter, cli, &color)?;

    let start = Instant::now();
    filter.commit().context("invalid filter configuration")?;
    let commit_ms = start.elapsed().as_secs_f64() * 1000.0;

    if let Some(layout) = filter.tile_layout() {
        let (h, w) = layout.image_size();
        let budget = memory::mb_to_bytes(filter.get_int("maxMemoryMB")?.max(0) as usize);
        info!(
            image = %format!("{w}x{h}"),
            tile = %format!("{}x{}", layout.tile_w, layout.tile_h),
            grid = %format!("{}x{}", layout.count_w, layout.count_h),
            overlap = layout.overlap(),
            budget = %memory::format_bytes(budget),
            inplace = filter.is_inplace().unwrap_or(false),
            commit_ms,
            "filter committed"
        );
    }

    let start = Instant::now();
    filter.execute()?;
    info!(elapsed_ms = start.elapsed().as_secs_f64() * 1000.0, "denoised");

    pfm::write(&cli.output, &output)?;
    info!(path = %cli.output.display(), "saved");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    run(&cli)
}
