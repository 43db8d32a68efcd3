use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use knn_image_styler::server::{
    self, ServerConfig, DEFAULT_BIND, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_OUTPUT_DIR,
    DEFAULT_RETAINED_REQUESTS,
};
use knn_image_styler::styler::{DEFAULT_RUNS, DEFAULT_SEED};
use knn_image_styler::{style_bytes, ClusterRange, ColorSpace, OutputFormat, Styler, CLUSTER_CEILING};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Stylize images by quantizing their colors into K clusters.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write one stylized file per cluster count for each input image
    Style(StyleArgs),
    /// Run the upload web service
    Serve(ServeArgs),
}

/// Options shared by both subcommands.
#[derive(Args, Debug)]
struct QuantizeArgs {
    /// Color space used for clustering (rgb or lab)
    #[arg(long, env = "KNN_STYLER_COLOR_SPACE", default_value = "rgb")]
    color_space: ColorSpace,

    /// Seed for k-means initialisation
    #[arg(long, env = "KNN_STYLER_SEED", default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// Independent k-means fits per cluster count; the best one is kept
    #[arg(long, env = "KNN_STYLER_RUNS", default_value_t = DEFAULT_RUNS)]
    runs: usize,

    /// Output encoding (jpeg or png)
    #[arg(short, long, env = "KNN_STYLER_FORMAT", default_value = "jpeg")]
    format: OutputFormat,

    /// JPEG quality (1-100)
    #[arg(long, env = "KNN_STYLER_QUALITY", default_value_t = knn_image_styler::codec::DEFAULT_JPEG_QUALITY)]
    quality: u8,
}

impl QuantizeArgs {
    fn output_format(&self) -> OutputFormat {
        self.format.with_quality(self.quality)
    }
}

#[derive(Args, Debug)]
struct StyleArgs {
    /// One or more input image paths
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Smallest cluster count
    #[arg(long = "min", default_value_t = 2)]
    cluster_min: i64,

    /// Largest cluster count (clamped to the ceiling)
    #[arg(long = "max", default_value_t = 8)]
    cluster_max: i64,

    /// Output directory; each input gets its own sub-directory
    #[arg(short = 'd', long, default_value = DEFAULT_OUTPUT_DIR)]
    out_dir: PathBuf,

    /// Print a JSON manifest of the written files
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    quantize: QuantizeArgs,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on
    #[arg(short, long, env = "KNN_STYLER_BIND", default_value = DEFAULT_BIND)]
    bind: SocketAddr,

    /// Directory that receives generated images
    #[arg(short = 'd', long, env = "KNN_STYLER_OUTPUT_DIR", default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Upper bound applied to the requested maximum cluster count
    #[arg(long, env = "KNN_STYLER_CLUSTER_CEILING", default_value_t = CLUSTER_CEILING)]
    cluster_ceiling: usize,

    /// Style jobs allowed to run at once (defaults to available cores)
    #[arg(long, env = "KNN_STYLER_MAX_JOBS")]
    max_jobs: Option<usize>,

    /// Largest accepted upload in bytes
    #[arg(long, env = "KNN_STYLER_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: usize,

    /// Request output directories kept on disk
    #[arg(long, env = "KNN_STYLER_RETAIN", default_value_t = DEFAULT_RETAINED_REQUESTS)]
    retain: usize,

    #[command(flatten)]
    quantize: QuantizeArgs,
}

impl ServeArgs {
    fn into_config(self) -> ServerConfig {
        let defaults = ServerConfig::default();
        ServerConfig {
            bind: self.bind,
            output_dir: self.output_dir,
            cluster_ceiling: self.cluster_ceiling,
            max_concurrent_jobs: self.max_jobs.unwrap_or(defaults.max_concurrent_jobs),
            max_upload_bytes: self.max_upload_bytes,
            retained_requests: self.retain,
            output_format: self.quantize.output_format(),
            color_space: self.quantize.color_space,
            seed: self.quantize.seed,
            runs: self.quantize.runs,
            ..defaults
        }
    }
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt().with_env_filter(filter).with_target(false).init();
}

fn run_style(args: StyleArgs) -> Result<()> {
    let range = ClusterRange::normalize(args.cluster_min, args.cluster_max, CLUSTER_CEILING)
        .context("invalid cluster range")?;
    let format = args.quantize.output_format();
    let styler = Styler::new()
        .with_color_space(args.quantize.color_space)
        .with_seed(args.quantize.seed)
        .with_runs(args.quantize.runs);

    let mut manifest = Vec::new();
    for input in &args.inputs {
        let bytes = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
        let variants = style_bytes(&bytes, range, &styler, format)
            .with_context(|| format!("styling {} failed", input.display()))?;

        let stem = input.file_stem().unwrap_or_default().to_string_lossy();
        let dir = args.out_dir.join(&*stem);
        fs::create_dir_all(&dir)?;

        for variant in variants {
            let out_path = dir.join(format!("styled_{}.{}", variant.clusters, format.extension()));
            fs::write(&out_path, &variant.bytes)?;
            info!(clusters = variant.clusters, "Saved → {}", out_path.display());
            manifest.push(json!({
                "input": input.display().to_string(),
                "clusters": variant.clusters,
                "path": out_path.display().to_string(),
                "palette": variant.palette,
            }));
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Style(args) => run_style(args),
        Command::Serve(args) => {
            let config = args.into_config();
            let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
            runtime
                .block_on(server::serve(config))
                .context("styler server failed")
        }
    }
}
