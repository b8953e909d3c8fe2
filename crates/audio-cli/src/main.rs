//! audio-cli: plays local audio files as a playlist through the default cpal host.
//!
//! Each entry is opened, decoded with Symphonia and, when the device cannot take the
//! stream as-is, converted (format, channels, rate via Rubato) before it reaches the
//! device callback. The process exits when the playlist ends, on a playback fault or on
//! Ctrl-C.

mod cli;
mod config;
mod runtime;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,audio_core=info,audio_cli=info")
        }))
        .init();

    match &args.cmd {
        cli::Command::Devices => runtime::list_devices(),
        cli::Command::Play { paths } => runtime::run_play(config::play_config(&args, paths)),
    }
}
