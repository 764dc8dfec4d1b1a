use std::path::PathBuf;

use clap::Parser;

/// cilhook - splice event hooks into a prepared module image
#[derive(Debug, Parser)]
#[command(name = "cilhook", version, about, long_about = None)]
pub struct Cli {
    /// Path to the prepared target module image (.json).
    #[arg(value_name = "TARGET")]
    pub target: PathBuf,

    /// XML patch script applied after the built-in patchers.
    #[arg(short, long, value_name = "FILE")]
    pub script: Option<PathBuf>,

    /// JSON patch profile for the built-in patchers (defaults to the SurvivalKit profile).
    #[arg(short, long, value_name = "FILE")]
    pub profile: Option<PathBuf>,

    /// Directory holding mscorlib.json and UnityEngine.json (defaults to the target's directory).
    #[arg(long, value_name = "DIR")]
    pub runtime_dir: Option<PathBuf>,

    /// Module image declaring the event dispatcher (defaults to SurvivalKit.json next to this
    /// executable).
    #[arg(long, value_name = "FILE")]
    pub dispatcher: Option<PathBuf>,

    /// Emit the run report as JSON on stdout.
    #[arg(long)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long)]
    pub verbose: bool,
}
