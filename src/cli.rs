use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "framesink")]
#[command(about = "Record raw frames to video and watch live previews", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Print progress and results as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check that the ffmpeg executable is available
    CheckFfmpeg,

    /// Encode a synthetic test clip (moving gradient frames)
    Record {
        /// Output file (container chosen by extension)
        output: PathBuf,

        #[arg(long, default_value_t = 640)]
        width: u32,

        #[arg(long, default_value_t = 480)]
        height: u32,

        #[arg(long, default_value_t = 30)]
        fps: u32,

        /// Number of frames to generate
        #[arg(long, default_value_t = 90)]
        frames: u32,

        /// Encoder: h264, hevc, or vp9
        #[arg(long, default_value = "h264")]
        encoder: String,

        /// Also publish frames to a preview channel with this name
        #[arg(long)]
        preview: Option<String>,
    },

    /// Attach to a preview channel and poll frames until it closes
    Watch {
        /// Channel name (as printed by `record --preview`)
        name: String,

        #[arg(long, default_value_t = 320)]
        max_width: u32,

        #[arg(long, default_value_t = 240)]
        max_height: u32,

        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 33)]
        interval_ms: u64,
    },
}
