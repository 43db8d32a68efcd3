use std::net::SocketAddr;
use std::path::PathBuf;

use crate::codec::OutputFormat;
use crate::range::{CLUSTER_CEILING, DEFAULT_CLUSTER_MAX, DEFAULT_CLUSTER_MIN};
use crate::styler::{ColorSpace, Styler, DEFAULT_RUNS, DEFAULT_SEED};

pub const DEFAULT_BIND: &str = "127.0.0.1:8000";
pub const DEFAULT_OUTPUT_DIR: &str = "outputs";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
pub const DEFAULT_RETAINED_REQUESTS: usize = 32;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub output_dir: PathBuf,
    pub cluster_ceiling: usize,
    pub default_cluster_min: usize,
    pub default_cluster_max: usize,
    /// Style jobs allowed to run at the same time.
    pub max_concurrent_jobs: usize,
    pub max_upload_bytes: usize,
    /// Request directories kept on disk; older ones are pruned.
    pub retained_requests: usize,
    pub output_format: OutputFormat,
    pub color_space: ColorSpace,
    pub seed: u64,
    pub runs: usize,
}

impl ServerConfig {
    pub fn styler(&self) -> Styler {
        Styler::new()
            .with_color_space(self.color_space)
            .with_seed(self.seed)
            .with_runs(self.runs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            cluster_ceiling: CLUSTER_CEILING,
            default_cluster_min: DEFAULT_CLUSTER_MIN,
            default_cluster_max: DEFAULT_CLUSTER_MAX,
            max_concurrent_jobs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            retained_requests: DEFAULT_RETAINED_REQUESTS,
            output_format: OutputFormat::default(),
            color_space: ColorSpace::default(),
            seed: DEFAULT_SEED,
            runs: DEFAULT_RUNS,
        }
    }
}
