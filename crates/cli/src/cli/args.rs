pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cloudblob")]
#[command(about = "Store, read and sweep media blobs in object storage")]
#[command(version)]
pub struct Args {
    /// Path to the cloudblob config directory (defaults to ~/.cloudblob)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
