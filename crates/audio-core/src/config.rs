use crate::controller::PlaybackMode;

/// Playback tuning parameters shared by the pipeline, the output engine and the controller.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackConfig {
    /// Rate-converter input chunk size in frames.
    pub chunk_frames: usize,
    /// Frames requested per device callback.
    pub callback_frames: u32,
    /// Initial volume, `0..=100`.
    pub volume_percent: u8,
    /// Start muted.
    pub muted: bool,
    /// End-of-stream behavior.
    pub mode: PlaybackMode,
}

impl Default for PlaybackConfig {
    /// Defaults tuned for low-risk playback across common devices.
    fn default() -> Self {
        Self {
            chunk_frames: 1024,
            callback_frames: 1024,
            volume_percent: 100,
            muted: false,
            mode: PlaybackMode::Sequential,
        }
    }
}
