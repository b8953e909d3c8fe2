use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::controller::PlaybackMode;
use crate::format::AudioStreamDescriptor;
use crate::output::DeviceSpec;

/// Transport state of the controller and its output engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PlaybackState {
    Stopped = 0,
    Paused = 1,
    Playing = 2,
    /// A pipeline is being (re)built; the device is not pulling data yet.
    Buffering = 3,
}

impl PlaybackState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => PlaybackState::Paused,
            2 => PlaybackState::Playing,
            3 => PlaybackState::Buffering,
            _ => PlaybackState::Stopped,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PlaybackState::Stopped => "stopped",
            PlaybackState::Paused => "paused",
            PlaybackState::Playing => "playing",
            PlaybackState::Buffering => "buffering",
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Counters updated by the render callback.
#[derive(Debug, Default)]
pub struct PlaybackCounters {
    /// Bytes handed to the device from decoded data.
    pub played_bytes: AtomicU64,
    /// Number of callbacks that had to pad with silence.
    pub underrun_events: AtomicU64,
    /// Total bytes emitted as silence due to underruns.
    pub underrun_bytes: AtomicU64,
}

impl PlaybackCounters {
    pub fn reset(&self) {
        self.played_bytes.store(0, Ordering::Relaxed);
        self.underrun_events.store(0, Ordering::Relaxed);
        self.underrun_bytes.store(0, Ordering::Relaxed);
    }
}

/// Read-only snapshot of the controller.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerStatus {
    pub state: PlaybackState,
    pub mode: PlaybackMode,
    pub playlist_index: Option<usize>,
    pub playlist_len: usize,
    /// Source URI of the current entry.
    pub now_playing: Option<String>,
    /// Source codec name (for example, FLAC/MP3).
    pub source_codec: Option<String>,
    pub position_ms: u64,
    pub duration_ms: Option<u64>,
    pub source: Option<AudioStreamDescriptor>,
    pub output: Option<DeviceSpec>,
    /// Whether a resampler sits between the decoder and the device.
    pub resampling: bool,
    pub volume_percent: u8,
    pub muted: bool,
    pub played_bytes: u64,
    pub underrun_events: u64,
    pub underrun_bytes: u64,
}

impl PlayerStatus {
    /// Playback time derived from bytes handed to the device since the pipeline opened.
    pub fn elapsed_ms(&self) -> Option<u64> {
        let spec = self.output?;
        let bytes_per_second = spec.bytes_per_frame() as u64 * spec.sample_rate as u64;
        if bytes_per_second == 0 {
            return None;
        }
        Some(self.played_bytes.saturating_mul(1000) / bytes_per_second)
    }

    /// Underrun padding converted to device frames.
    pub fn underrun_frames(&self) -> Option<u64> {
        let spec = self.output?;
        let frame = spec.bytes_per_frame() as u64;
        (frame > 0).then(|| self.underrun_bytes / frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SampleFormat;

    fn status(output: Option<DeviceSpec>) -> PlayerStatus {
        PlayerStatus {
            state: PlaybackState::Playing,
            mode: PlaybackMode::Sequential,
            playlist_index: Some(0),
            playlist_len: 1,
            now_playing: Some("track".to_string()),
            source_codec: None,
            position_ms: 0,
            duration_ms: None,
            source: None,
            output,
            resampling: false,
            volume_percent: 100,
            muted: false,
            played_bytes: 0,
            underrun_events: 0,
            underrun_bytes: 0,
        }
    }

    #[test]
    fn state_roundtrips_through_u8() {
        for s in [
            PlaybackState::Stopped,
            PlaybackState::Paused,
            PlaybackState::Playing,
            PlaybackState::Buffering,
        ] {
            assert_eq!(PlaybackState::from_u8(s as u8), s);
        }
        assert_eq!(PlaybackState::from_u8(200), PlaybackState::Stopped);
        assert_eq!(PlaybackState::Buffering.to_string(), "buffering");
    }

    #[test]
    fn snapshot_reports_elapsed_and_underrun_frames() {
        let spec = DeviceSpec {
            sample_rate: 48_000,
            format: SampleFormat::Signed16,
            channels: 2,
            buffer_frames: 1024,
        };
        let mut snap = status(Some(spec));
        snap.played_bytes = 48_000 * 4 * 2;
        snap.underrun_bytes = 400;
        assert_eq!(snap.elapsed_ms(), Some(2000));
        assert_eq!(snap.underrun_frames(), Some(100));
    }

    #[test]
    fn elapsed_needs_an_output() {
        let snap = status(None);
        assert_eq!(snap.elapsed_ms(), None);
        assert_eq!(snap.underrun_frames(), None);
    }

    #[test]
    fn counters_reset() {
        let counters = PlaybackCounters::default();
        counters.played_bytes.store(10, Ordering::Relaxed);
        counters.underrun_events.store(3, Ordering::Relaxed);
        counters.reset();
        assert_eq!(counters.played_bytes.load(Ordering::Relaxed), 0);
        assert_eq!(counters.underrun_events.load(Ordering::Relaxed), 0);
    }
}
