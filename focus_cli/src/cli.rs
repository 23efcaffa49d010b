//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();
/// Effective limits used for the current run (for JSON details).
pub static LAST_LIMITS: OnceLock<CliLimits> = OnceLock::new();

#[derive(Copy, Clone, Debug)]
pub struct CliLimits {
    pub max_run_ms: u64,
    pub frame_timeout_ms: u64,
    pub range: (i32, i32),
}

#[derive(Parser, Debug)]
#[command(name = "focus", version, about = "Contrast autofocus CLI")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/focus_config.toml")]
    pub config: PathBuf,

    /// Optional zoom → focus range table CSV (strict header `zoom,start,end`)
    #[arg(long, value_name = "FILE")]
    pub ranges: Option<PathBuf>,

    /// Emit results and errors as JSON lines
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); overrides `[logging].level`
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one autofocus session and leave the lens at the sharpest position
    Autofocus {
        /// Current zoom step; picks the coarse window from the --ranges table
        #[arg(long, value_name = "STEP")]
        zoom: Option<u32>,
        /// Start of the coarse window (overrides --zoom)
        #[arg(long, value_name = "POS", requires = "end", allow_negative_numbers = true)]
        start: Option<i32>,
        /// End of the coarse window (overrides --zoom)
        #[arg(long, value_name = "POS", requires = "start", allow_negative_numbers = true)]
        end: Option<i32>,
        /// Pull frames inside the control loop instead of from the frame pump thread
        #[arg(long, action = ArgAction::SetTrue)]
        direct: bool,
        /// Override safety: max session time in ms (takes precedence over config)
        #[arg(long, value_name = "MS")]
        max_run_ms: Option<u64>,
        /// Print per-frame step timing
        #[arg(long, action = ArgAction::SetTrue)]
        stats: bool,
    },
    /// Move the lens to a fixed position outside a focus session
    Park {
        /// Target focus position
        #[arg(long, value_name = "POS", allow_negative_numbers = true)]
        position: i32,
    },
    /// Validate config and range table, then probe the focuser
    SelfCheck,
    /// Health check for operational monitoring
    Health,
}
