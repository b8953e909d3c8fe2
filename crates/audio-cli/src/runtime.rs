//! Binary runtime: device listing and playlist playback.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use audio_core::controller::PlaybackController;
use audio_core::device::{self, CpalBackend};
use audio_core::status::PlaybackState;

use crate::config::PlayConfig;

const SUPERVISE_INTERVAL: Duration = Duration::from_millis(100);
const STATUS_INTERVAL: Duration = Duration::from_secs(10);

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    device::list_devices(&host).context("list output devices")
}

/// Play the playlist until it ends, a fault occurs or Ctrl-C is pressed.
pub fn run_play(config: PlayConfig) -> Result<()> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("install Ctrl-C handler")?;

    let count = config.tracks.len();
    let backend = CpalBackend::new(config.device);
    let controller = PlaybackController::new(backend, config.tracks, config.playback);
    controller.play_or_resume().context("start playback")?;
    tracing::info!(tracks = count, mode = %controller.mode(), "playback started");

    let mut last_status = Instant::now();
    loop {
        if interrupted.load(Ordering::SeqCst) {
            tracing::info!("interrupted");
            controller.stop();
            return Ok(());
        }
        if let Some(fault) = controller.poll_fault() {
            return Err(anyhow::Error::new(fault).context("playback failed"));
        }
        if controller.state() == PlaybackState::Stopped {
            tracing::info!("playlist finished");
            return Ok(());
        }
        if last_status.elapsed() >= STATUS_INTERVAL {
            let status = controller.status();
            tracing::info!(
                state = %status.state,
                index = ?status.playlist_index,
                now_playing = status.now_playing.as_deref().unwrap_or(""),
                position_ms = status.position_ms,
                duration_ms = ?status.duration_ms,
                underruns = status.underrun_events,
                "status"
            );
            last_status = Instant::now();
        }
        std::thread::sleep(SUPERVISE_INTERVAL);
    }
}
