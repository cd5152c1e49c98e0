//! Native entry point

use clap::Parser;
use std::path::PathBuf;
use stellar_tracer::gpu::shaders::ShaderSource;
use stellar_tracer::TracerConfig;

/// Progressive GPU path tracer of a small solar system.
#[derive(Parser, Debug)]
#[command(
    name = "stellar-tracer",
    about = "Progressive GPU path tracer",
    long_about = "Renders a solar-system scene with a compute-shader path tracer and \
        averages successive frames while the camera is still.\n\n\
        CONTROLS:\n\
          click to lock the pointer, Esc to release\n\
          W/A/S/D/Q/E move, mouse looks\n\
          [ ] bounces, - = samples, , . light, 9 0 fov\n\
          ; ' aperture, K L focus, Z X move speed\n\
          1 space sky, 2 day sky, H high quality\n\
          P pause, B benchmark, F12 export PNG",
    version
)]
struct Args {
    /// Initial window width in pixels.
    #[arg(long, default_value = "1280")]
    width: u32,

    /// Initial window height in pixels.
    #[arg(long, default_value = "720")]
    height: u32,

    /// Disable vertical sync.
    #[arg(long)]
    no_vsync: bool,

    /// Load raytracer.wgsl and present.wgsl from this directory instead of
    /// the embedded copies.
    #[arg(long)]
    shader_dir: Option<PathBuf>,

    /// Directory exported PNGs are written to.
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Frames rendered by a benchmark run.
    #[arg(long, default_value_t = stellar_tracer::benchmark::DEFAULT_BENCHMARK_FRAMES)]
    benchmark_frames: u32,

    /// Number of background stars scattered around the scene.
    #[arg(long, default_value_t = stellar_tracer::scene::DEFAULT_STAR_COUNT)]
    stars: usize,

    /// Fix the random seed for reproducible scenes and sample sequences.
    #[arg(long)]
    seed: Option<u64>,

    /// Run a single benchmark right after startup, print the report and exit.
    #[arg(long)]
    benchmark: bool,
}

impl From<Args> for TracerConfig {
    fn from(args: Args) -> Self {
        Self {
            width: args.width,
            height: args.height,
            vsync: !args.no_vsync,
            shader_source: args
                .shader_dir
                .map_or(ShaderSource::Embedded, ShaderSource::Directory),
            output_dir: args.output_dir,
            benchmark_frames: args.benchmark_frames,
            star_count: args.stars,
            seed: args.seed,
            benchmark_on_start: args.benchmark,
            ..Default::default()
        }
    }
}

fn main() {
    env_logger::init();

    let config = TracerConfig::from(Args::parse());
    if let Err(e) = stellar_tracer::app::run(config) {
        log::error!("{}", e);
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
