//! Playback controller: transport state machine over one pipeline at a time.
//!
//! The controller owns the output engine and at most one [`Pipeline`]. Every transport call
//! that changes the active playlist entry goes through the same rebuild: stop the device,
//! close the old source, open and prime the new one, negotiate the device spec and open the
//! device with the new chain.
//!
//! End of stream arrives on a notifier thread spawned by the source. The handler carries the
//! id of the pipeline it was bound to and consults the current [`PlaybackMode`] once per
//! notification; notifications for a pipeline that is no longer current are ignored.

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;

use crate::config::PlaybackConfig;
use crate::error::{PlayerError, Result};
use crate::output::{AudioBackend, AudioOutputEngine};
use crate::pipeline::Pipeline;
use crate::source::EofHandler;
use crate::status::{PlaybackState, PlayerStatus};

/// What happens when the current entry reaches its end.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PlaybackMode {
    /// Advance to the next entry; stop after the last one.
    #[default]
    Sequential,
    /// Advance to the next entry, wrapping to the first.
    LoopAll,
    /// Rewind the current entry and keep playing.
    LoopSingle,
    /// Jump to a uniformly random entry.
    Shuffle,
}

impl PlaybackMode {
    pub fn label(self) -> &'static str {
        match self {
            PlaybackMode::Sequential => "sequential",
            PlaybackMode::LoopAll => "loop-all",
            PlaybackMode::LoopSingle => "loop-single",
            PlaybackMode::Shuffle => "shuffle",
        }
    }
}

impl fmt::Display for PlaybackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One playlist entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackDescriptor {
    pub title: Option<String>,
    /// Candidate URIs, tried in order.
    pub sources: Vec<String>,
}

impl TrackDescriptor {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            title: None,
            sources: vec![uri.into()],
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn primary_source(&self) -> Option<&str> {
        self.sources.first().map(String::as_str)
    }

    /// Title, or the primary source when untitled.
    pub fn display_name(&self) -> &str {
        self.title
            .as_deref()
            .or(self.primary_source())
            .unwrap_or("<untitled>")
    }
}

/// Ordered, index-addressable track list owned outside the controller.
pub trait Playlist: Send + Sync {
    fn len(&self) -> usize;

    fn track(&self, index: usize) -> Option<TrackDescriptor>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Playlist for Vec<TrackDescriptor> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn track(&self, index: usize) -> Option<TrackDescriptor> {
        self.get(index).cloned()
    }
}

/// Index into the playlist, wrapping in both directions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct PlaylistCursor {
    index: usize,
}

impl PlaylistCursor {
    fn next(&mut self, len: usize) {
        if len > 0 {
            self.index = (self.index + 1) % len;
        }
    }

    fn prev(&mut self, len: usize) {
        if len > 0 {
            self.index = (self.index + len - 1) % len;
        }
    }
}

struct ControllerInner<B: AudioBackend> {
    engine: AudioOutputEngine<B>,
    playlist: Box<dyn Playlist>,
    cursor: PlaylistCursor,
    mode: PlaybackMode,
    cfg: PlaybackConfig,
    pipeline: Option<Pipeline>,
    next_pipeline_id: u64,
    /// Failure raised while handling an end-of-stream notification.
    pending_fault: Option<PlayerError>,
    this: Weak<Mutex<ControllerInner<B>>>,
}

impl<B: AudioBackend> ControllerInner<B> {
    fn play_or_resume(&mut self) -> Result<()> {
        if self.playlist.is_empty() {
            return Ok(());
        }
        match self.engine.state() {
            PlaybackState::Playing | PlaybackState::Buffering => Ok(()),
            PlaybackState::Paused if self.pipeline.is_some() && self.engine.is_open() => {
                self.engine.resume()
            }
            _ => self.rebuild_and_play(),
        }
    }

    fn pause(&mut self) -> Result<()> {
        self.engine.pause()
    }

    fn stop(&mut self) {
        self.engine.stop();
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.close();
            tracing::debug!(pipeline = pipeline.id(), "pipeline released");
        }
    }

    fn play_next(&mut self) -> Result<()> {
        let len = self.playlist.len();
        if len == 0 {
            return Ok(());
        }
        self.cursor.next(len);
        self.rebuild_and_play()
    }

    fn play_prev(&mut self) -> Result<()> {
        let len = self.playlist.len();
        if len == 0 {
            return Ok(());
        }
        self.cursor.prev(len);
        self.rebuild_and_play()
    }

    fn jump_to(&mut self, index: usize) -> Result<()> {
        if index >= self.playlist.len() {
            return Err(PlayerError::Unsupported(format!(
                "playlist index {index} out of range (len {})",
                self.playlist.len()
            )));
        }
        self.cursor.index = index;
        self.rebuild_and_play()
    }

    fn set_mode(&mut self, mode: PlaybackMode) {
        self.mode = mode;
        if let Some(pipeline) = self.pipeline.as_ref() {
            let handler = self.eof_handler(pipeline.id());
            pipeline.source().set_end_of_stream_handler(handler);
        }
        tracing::info!(mode = %mode, "playback mode set");
    }

    fn rebuild_and_play(&mut self) -> Result<()> {
        match self.rebuild() {
            Ok(()) => self.engine.play(),
            Err(e) => {
                self.stop();
                Err(e)
            }
        }
    }

    fn rebuild(&mut self) -> Result<()> {
        self.stop();
        self.engine.set_buffering();

        let track = self.playlist.track(self.cursor.index).ok_or_else(|| {
            PlayerError::Unsupported(format!("playlist index {} out of range", self.cursor.index))
        })?;
        if track.sources.is_empty() {
            return Err(PlayerError::open(track.display_name(), "track has no source"));
        }

        let mut last_err = None;
        for uri in &track.sources {
            self.next_pipeline_id += 1;
            let id = self.next_pipeline_id;
            let handler = self.eof_handler(id);
            match Pipeline::open(id, uri, &self.engine, &self.cfg, Some(handler)) {
                Ok((pipeline, chain)) => {
                    if let Err(e) = self.engine.open(pipeline.device_spec(), chain) {
                        pipeline.close();
                        return Err(e);
                    }
                    tracing::info!(
                        index = self.cursor.index,
                        uri = %uri,
                        pipeline = id,
                        resampling = pipeline.is_resampling(),
                        "pipeline ready"
                    );
                    self.pipeline = Some(pipeline);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(uri = %uri, error = %e, "source failed to open");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| PlayerError::open(track.display_name(), "no playable source")))
    }

    fn eof_handler(&self, pipeline_id: u64) -> EofHandler {
        let this = self.this.clone();
        Arc::new(move || {
            if let Some(inner) = this.upgrade() {
                inner.lock().on_end_of_stream(pipeline_id);
            }
        })
    }

    /// Mode dispatch for one end-of-stream notification.
    fn on_end_of_stream(&mut self, pipeline_id: u64) {
        let current = self.pipeline.as_ref().map(Pipeline::id);
        if current != Some(pipeline_id) {
            tracing::debug!(pipeline = pipeline_id, ?current, "stale end of stream ignored");
            return;
        }
        let len = self.playlist.len();
        tracing::info!(mode = %self.mode, index = self.cursor.index, "end of stream");

        let res = match self.mode {
            PlaybackMode::Sequential => {
                if self.cursor.index + 1 < len {
                    self.cursor.next(len);
                    self.rebuild_and_play()
                } else {
                    self.stop();
                    Ok(())
                }
            }
            PlaybackMode::LoopAll => self.play_next(),
            PlaybackMode::Shuffle => {
                if len == 0 {
                    Ok(())
                } else {
                    self.cursor.index = rand::thread_rng().gen_range(0..len);
                    self.rebuild_and_play()
                }
            }
            PlaybackMode::LoopSingle => match self.pipeline.as_ref() {
                Some(pipeline) => pipeline
                    .source()
                    .reset()
                    .and_then(|()| self.engine.resume()),
                None => Ok(()),
            },
        };

        if let Err(e) = res {
            tracing::error!(error = %e, "end-of-stream handling failed");
            self.stop();
            self.pending_fault = Some(e);
        }
    }

    fn status(&self) -> PlayerStatus {
        let counters = self.engine.counters();
        let pipeline = self.pipeline.as_ref();
        PlayerStatus {
            state: self.engine.state(),
            mode: self.mode,
            playlist_index: (!self.playlist.is_empty()).then_some(self.cursor.index),
            playlist_len: self.playlist.len(),
            now_playing: pipeline.map(|p| p.uri().to_string()),
            source_codec: pipeline.and_then(|p| p.codec().map(str::to_string)),
            position_ms: pipeline.map_or(0, |p| p.source().position().as_millis() as u64),
            duration_ms: pipeline
                .and_then(|p| p.descriptor().duration)
                .map(|d| d.as_millis() as u64),
            source: pipeline.map(|p| p.descriptor().clone()),
            output: self.engine.spec(),
            resampling: pipeline.is_some_and(Pipeline::is_resampling),
            volume_percent: self.engine.volume_percent(),
            muted: self.engine.is_muted(),
            played_bytes: counters.played_bytes.load(Ordering::Relaxed),
            underrun_events: counters
                .underrun_events
                .load(Ordering::Relaxed),
            underrun_bytes: counters
                .underrun_bytes
                .load(Ordering::Relaxed),
        }
    }
}

/// Transport controls over a playlist.
///
/// Cheap to clone; clones drive the same controller.
pub struct PlaybackController<B: AudioBackend> {
    inner: Arc<Mutex<ControllerInner<B>>>,
}

impl<B: AudioBackend> Clone for PlaybackController<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B: AudioBackend> PlaybackController<B> {
    pub fn new(backend: B, playlist: impl Playlist + 'static, cfg: PlaybackConfig) -> Self {
        let engine = AudioOutputEngine::new(backend);
        engine.set_volume_percent(cfg.volume_percent);
        engine.set_muted(cfg.muted);
        let mode = cfg.mode;
        let inner = Arc::new_cyclic(|this| {
            Mutex::new(ControllerInner {
                engine,
                playlist: Box::new(playlist),
                cursor: PlaylistCursor::default(),
                mode,
                cfg,
                pipeline: None,
                next_pipeline_id: 0,
                pending_fault: None,
                this: this.clone(),
            })
        });
        Self { inner }
    }

    /// Resume when paused; otherwise open the current entry and start it.
    /// No-op on an empty playlist.
    pub fn play_or_resume(&self) -> Result<()> {
        self.inner.lock().play_or_resume()
    }

    pub fn pause(&self) -> Result<()> {
        self.inner.lock().pause()
    }

    /// Stop playback and release the device and the pipeline.
    pub fn stop(&self) {
        self.inner.lock().stop();
    }

    /// Advance to the next entry, wrapping to the first. No-op on an empty playlist.
    pub fn play_next(&self) -> Result<()> {
        self.inner.lock().play_next()
    }

    /// Go back one entry, wrapping to the last. No-op on an empty playlist.
    pub fn play_prev(&self) -> Result<()> {
        self.inner.lock().play_prev()
    }

    pub fn jump_to(&self, index: usize) -> Result<()> {
        self.inner.lock().jump_to(index)
    }

    pub fn mode(&self) -> PlaybackMode {
        self.inner.lock().mode
    }

    pub fn set_mode(&self, mode: PlaybackMode) {
        self.inner.lock().set_mode(mode);
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.lock().engine.state()
    }

    /// Current playlist index; `None` when the playlist is empty.
    pub fn playlist_index(&self) -> Option<usize> {
        let inner = self.inner.lock();
        (!inner.playlist.is_empty()).then_some(inner.cursor.index)
    }

    /// Entry the open pipeline was built from.
    pub fn now_playing(&self) -> Option<TrackDescriptor> {
        let inner = self.inner.lock();
        inner.pipeline.as_ref()?;
        inner.playlist.track(inner.cursor.index)
    }

    pub fn position(&self) -> Duration {
        let inner = self.inner.lock();
        inner
            .pipeline
            .as_ref()
            .map_or(Duration::ZERO, |p| p.source().position())
    }

    /// Seek within the current entry. No-op when nothing is open.
    pub fn set_position(&self, position: Duration) -> Result<()> {
        let inner = self.inner.lock();
        match inner.pipeline.as_ref() {
            Some(pipeline) => pipeline.source().seek(position),
            None => Ok(()),
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        let inner = self.inner.lock();
        inner.pipeline.as_ref()?.descriptor().duration
    }

    /// Raw volume in `[0, 128]`.
    pub fn volume(&self) -> u32 {
        self.inner.lock().engine.volume()
    }

    pub fn set_volume(&self, volume: u32) {
        self.inner.lock().engine.set_volume(volume);
    }

    pub fn volume_percent(&self) -> u8 {
        self.inner.lock().engine.volume_percent()
    }

    pub fn set_volume_percent(&self, percent: u8) {
        self.inner.lock().engine.set_volume_percent(percent);
    }

    pub fn is_muted(&self) -> bool {
        self.inner.lock().engine.is_muted()
    }

    pub fn set_muted(&self, muted: bool) {
        self.inner.lock().engine.set_muted(muted);
    }

    /// Flip mute and return the new value.
    pub fn toggle_mute(&self) -> bool {
        let inner = self.inner.lock();
        let muted = !inner.engine.is_muted();
        inner.engine.set_muted(muted);
        muted
    }

    pub fn status(&self) -> PlayerStatus {
        self.inner.lock().status()
    }

    /// Take the next mid-stream failure. Playback is stopped before the error is returned.
    pub fn poll_fault(&self) -> Option<PlayerError> {
        let mut inner = self.inner.lock();
        let fault = match inner.pending_fault.take() {
            Some(fault) => fault,
            None => inner.engine.poll_fault()?,
        };
        tracing::error!(error = %fault, "playback fault");
        inner.stop();
        Some(fault)
    }
}
