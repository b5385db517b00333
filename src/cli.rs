use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "relayforge")]
#[command(author, version, about = "On-demand transcoding gateway for remote media")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Start {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config and PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check that ffmpeg and ffprobe are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses --config if not specified)
        config: Option<PathBuf>,
    },

    /// Print the ffmpeg command line the server would run for a request
    BuildArgs {
        /// Source URL, not encoded
        #[arg(long)]
        url: String,

        /// Output quality: 1080p, 720p, 480p, 360p, original, audio
        #[arg(short, long, default_value = "original")]
        quality: String,

        /// Seek offset in seconds
        #[arg(short, long)]
        start: Option<String>,

        /// Use VAAPI hardware encoding regardless of config
        #[arg(long)]
        hw_accel: bool,
    },

    /// Display version information
    Version,
}
