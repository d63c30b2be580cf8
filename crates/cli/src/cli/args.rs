pub use clap::Parser;

use std::path::PathBuf;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "threads")]
#[command(about = "Client for the Threads network API")]
pub struct Args {
    /// Network API endpoint (defaults to the configured host)
    #[arg(long, global = true)]
    pub remote: Option<Url>,

    /// Path to the threads config directory (defaults to ~/.threads)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    /// Log level (defaults to the configured level)
    #[arg(long, global = true)]
    pub log_level: Option<tracing::Level>,

    #[command(subcommand)]
    pub command: crate::Command,
}
