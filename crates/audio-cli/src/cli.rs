use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "audio-cli", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Use a specific output device by substring match
    #[arg(long, global = true)]
    pub device: Option<String>,

    /// Resampler input chunk size in frames (higher => more latency, lower => more overhead)
    #[arg(long, global = true, default_value_t = 1024)]
    pub chunk_frames: usize,

    /// Frames requested per device callback
    #[arg(long, global = true, default_value_t = 1024)]
    pub callback_frames: u32,

    /// Initial volume in percent (0-100)
    #[arg(long, global = true, default_value_t = 100, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub volume: u8,

    /// What to do when a track ends
    #[arg(long, global = true, value_enum, default_value_t = ModeArg::Sequential)]
    pub mode: ModeArg,

    /// Start muted
    #[arg(long, global = true)]
    pub mute: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play local files as a playlist
    Play {
        /// Audio files (plain paths or file:// URIs)
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// List output devices and exit
    Devices,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Sequential,
    LoopAll,
    LoopSingle,
    Shuffle,
}
