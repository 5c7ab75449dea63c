use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "clipforge")]
#[command(author, version, about = "Keyframe-accurate MP4 cutter without re-encoding")]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the box tree of an MP4 file
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Copy a time range into a new MP4 without re-encoding
    Cut {
        /// Input MP4 file
        input: PathBuf,

        /// Window start in seconds
        start_sec: f64,

        /// Window end in seconds
        end_sec: f64,

        /// Output MP4 file
        output: PathBuf,

        /// Copy source edit lists into the output instead of dropping them
        #[arg(long)]
        keep_edit_list: bool,
    },

    /// Display version information
    Version,
}
