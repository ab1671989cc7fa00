use clap::Parser;
use std::path::PathBuf;

// Build version with backend info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Backend: in-memory simulation\n",
    "Target:  ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Scrolling video feed simulator
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Coordinator config (JSON); CLI flags below override it
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Number of video rows in the feed
    #[arg(short = 'n', long = "items", value_name = "N", default_value_t = 12)]
    pub items: usize,

    /// Row height (points)
    #[arg(long = "row-height", value_name = "PT", default_value_t = 420.0)]
    pub row_height: f64,

    /// Viewport size (points)
    #[arg(long = "viewport", value_names = ["WIDTH", "HEIGHT"], num_args = 2)]
    pub viewport: Option<Vec<f64>>,

    /// Scroll distance per step (points)
    #[arg(short = 's', long = "scroll-step", value_name = "PT", default_value_t = 180.0)]
    pub scroll_step: f64,

    /// Playback time simulated between scroll steps (ms)
    #[arg(short = 't', long = "tick", value_name = "MS", default_value_t = 1500)]
    pub tick_ms: u64,

    /// Simulated network latency per probe (ms)
    #[arg(long = "probe-delay", value_name = "MS", default_value_t = 40)]
    pub probe_delay_ms: u64,

    /// Cache capacity override
    #[arg(long = "cache", value_name = "N")]
    pub cache_capacity: Option<usize>,

    /// Start muted
    #[arg(short = 'm', long = "mute")]
    pub mute: bool,

    /// Do not loop clips that reach their end
    #[arg(long = "no-loop")]
    pub no_loop: bool,

    /// Trim start (seconds)
    #[arg(long = "start", value_name = "SEC")]
    pub segment_start: Option<f64>,

    /// Trim end (seconds)
    #[arg(long = "end", value_name = "SEC")]
    pub segment_end: Option<f64>,

    /// Enable debug logging to file (default: feedplay.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,
}

impl Args {
    /// Viewport as (width, height), phone portrait by default
    pub fn viewport_size(&self) -> (f64, f64) {
        match self.viewport.as_deref() {
            Some([w, h]) => (*w, *h),
            _ => (390.0, 844.0),
        }
    }
}
