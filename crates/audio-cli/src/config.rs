use std::path::PathBuf;

pub use audio_core::config::PlaybackConfig;
use audio_core::controller::{PlaybackMode, TrackDescriptor};

use crate::cli::{Args, ModeArg};

#[derive(Clone, Debug)]
pub struct PlayConfig {
    pub tracks: Vec<TrackDescriptor>,
    pub device: Option<String>,
    pub playback: PlaybackConfig,
}

impl From<ModeArg> for PlaybackMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Sequential => PlaybackMode::Sequential,
            ModeArg::LoopAll => PlaybackMode::LoopAll,
            ModeArg::LoopSingle => PlaybackMode::LoopSingle,
            ModeArg::Shuffle => PlaybackMode::Shuffle,
        }
    }
}

pub fn playback_config(args: &Args) -> PlaybackConfig {
    PlaybackConfig {
        chunk_frames: args.chunk_frames.max(1),
        callback_frames: args.callback_frames.max(1),
        volume_percent: args.volume,
        muted: args.mute,
        mode: args.mode.into(),
    }
}

pub fn play_config(args: &Args, paths: &[PathBuf]) -> PlayConfig {
    let tracks = paths
        .iter()
        .map(|p| {
            let uri = p.to_string_lossy().into_owned();
            match p.file_stem() {
                Some(stem) => TrackDescriptor::new(uri).with_title(stem.to_string_lossy()),
                None => TrackDescriptor::new(uri),
            }
        })
        .collect();
    PlayConfig {
        tracks,
        device: args.device.clone(),
        playback: playback_config(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn maps_args_onto_playback_config() {
        let args = Args::try_parse_from([
            "audio-cli",
            "--chunk-frames",
            "0",
            "--callback-frames",
            "512",
            "--mode",
            "shuffle",
            "play",
            "/music/one.flac",
        ])
        .unwrap();
        let cfg = playback_config(&args);
        assert_eq!(cfg.chunk_frames, 1);
        assert_eq!(cfg.callback_frames, 512);
        assert_eq!(cfg.volume_percent, 100);
        assert_eq!(cfg.mode, PlaybackMode::Shuffle);

        let play = play_config(&args, &[PathBuf::from("/music/one.flac")]);
        assert_eq!(play.tracks.len(), 1);
        assert_eq!(play.tracks[0].title.as_deref(), Some("one"));
        assert_eq!(play.tracks[0].primary_source(), Some("/music/one.flac"));
    }
}
