//! Callback-driven output engine.
//!
//! [`AudioOutputEngine`] binds a [`PcmSource`] to a device opened through an
//! [`AudioBackend`]. The device invokes the render callback on its own real-time thread; the
//! callback owns the source outright, so nothing it touches is shared with the controller
//! except atomics and a non-blocking fault channel.
//!
//! The render callback:
//! - emits silence unless the engine is `Playing`
//! - copies bytes from the source's current buffer, pulling the next buffer when drained
//! - on end of stream pads with silence, pauses and then reports the end to the source
//! - on a read/decode error pads with silence, pauses and reports the error
//! - applies mute (silence) or volume scaling; full volume is a plain copy

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::convert::apply_volume;
use crate::error::{PlayerError, Result};
use crate::format::{AudioTriple, ChannelLayout, SampleFormat};
use crate::status::{PlaybackCounters, PlaybackState};

pub const MIN_VOLUME: u32 = 0;
pub const MAX_VOLUME: u32 = 128;

const FAULT_QUEUE: usize = 8;

/// What an output device is opened with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceSpec {
    pub sample_rate: u32,
    /// Packed, device-native sample format.
    pub format: SampleFormat,
    pub channels: u16,
    /// Frames per render callback.
    pub buffer_frames: u32,
}

impl DeviceSpec {
    /// The spec to ask a device for when playing a stream of `triple`.
    pub fn wanted_for(triple: AudioTriple, buffer_frames: u32) -> Self {
        Self {
            sample_rate: triple.sample_rate,
            format: triple.format.device_fallback(),
            channels: triple.channels() as u16,
            buffer_frames,
        }
    }

    pub fn triple(&self) -> AudioTriple {
        AudioTriple::new(self.format, self.sample_rate, ChannelLayout::new(self.channels))
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.format.bytes_per_sample() * self.channels as usize
    }
}

/// Render callback handed to a backend. Fills the whole slice every call.
pub type RenderCallback = Box<dyn FnMut(&mut [u8]) + Send + 'static>;

/// Audio subsystem boundary.
pub trait AudioBackend: Send + Sync + 'static {
    type Handle: DeviceHandle;

    /// Closest spec the device supports to `wanted`.
    fn negotiate(&self, wanted: &DeviceSpec) -> Result<DeviceSpec>;

    /// Open a device that pulls from `callback`. Devices start paused.
    fn open(&self, spec: &DeviceSpec, callback: RenderCallback) -> Result<Self::Handle>;
}

/// An open device. Dropping the handle closes the device; once drop returns the callback is
/// never invoked again.
pub trait DeviceHandle: Send + 'static {
    fn pause(&self) -> Result<()>;
    fn resume(&self) -> Result<()>;
}

/// Producer of device-ready bytes, pulled from the render callback.
pub trait PcmSource: Send + 'static {
    /// Replace [`PcmSource::buffer`] with the next chunk. `Ok(false)` at end of stream.
    fn next_buffer(&mut self) -> Result<bool>;

    /// Current chunk.
    fn buffer(&self) -> &[u8];

    /// Format/rate/layout of the bytes in [`PcmSource::buffer`].
    fn output_triple(&self) -> AudioTriple;

    /// Changes whenever the underlying stream is repositioned.
    fn generation(&self) -> u64;

    /// Called once the last byte of `generation` has been handed to the device and the
    /// engine has paused.
    fn end_of_stream(&mut self, _generation: u64) {}
}

/// State shared between the engine and its render callback.
pub(crate) struct EngineShared {
    state: AtomicU8,
    volume: AtomicU32,
    muted: AtomicBool,
    counters: PlaybackCounters,
    faults: Sender<PlayerError>,
}

impl EngineShared {
    fn state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: PlaybackState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// `true` if this call moved the state from `Playing` to `Paused`.
    fn pause_if_playing(&self) -> bool {
        self.state
            .compare_exchange(
                PlaybackState::Playing as u8,
                PlaybackState::Paused as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn resume_if_paused(&self) {
        let _ = self.state.compare_exchange(
            PlaybackState::Paused as u8,
            PlaybackState::Playing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

/// Callback-side state: the source, its read index and the shared atomics.
struct Feeder<S: PcmSource> {
    source: S,
    read_index: usize,
    format: SampleFormat,
    silence: u8,
    shared: Arc<EngineShared>,
}

impl<S: PcmSource> Feeder<S> {
    fn fill(&mut self, out: &mut [u8]) {
        let state = self.shared.state();
        if state != PlaybackState::Playing {
            out.fill(self.silence);
            if state == PlaybackState::Buffering {
                self.count_underrun(out.len());
            }
            return;
        }

        let mut written = 0;
        while written < out.len() {
            let available = self.source.buffer().len().saturating_sub(self.read_index);
            if available == 0 {
                let generation = self.source.generation();
                match self.source.next_buffer() {
                    Ok(true) => {
                        self.read_index = 0;
                        continue;
                    }
                    Ok(false) => {
                        self.read_index = 0;
                        out[written..].fill(self.silence);
                        self.count_underrun(out.len() - written);
                        self.finish_stream(generation);
                        break;
                    }
                    Err(e) => {
                        self.read_index = 0;
                        out[written..].fill(self.silence);
                        self.count_underrun(out.len() - written);
                        self.shared.pause_if_playing();
                        let _ = self.shared.faults.try_send(e);
                        break;
                    }
                }
            }
            let n = available.min(out.len() - written);
            let start = self.read_index;
            out[written..written + n].copy_from_slice(&self.source.buffer()[start..start + n]);
            self.read_index += n;
            written += n;
        }

        if self.shared.muted.load(Ordering::Relaxed) {
            out.fill(self.silence);
        } else {
            let volume = self.shared.volume.load(Ordering::Relaxed);
            if volume < MAX_VOLUME {
                apply_volume(self.format, &mut out[..written], volume, MAX_VOLUME);
            }
        }

        self.shared
            .counters
            .played_bytes
            .fetch_add(written as u64, Ordering::Relaxed);
    }

    /// Pause at the end of `generation` and report it, unless a seek got in first.
    fn finish_stream(&mut self, generation: u64) {
        if self.source.generation() != generation || !self.shared.pause_if_playing() {
            return;
        }
        if self.source.generation() == generation {
            self.source.end_of_stream(generation);
        } else {
            // Repositioned while pausing; the new position still has data.
            self.shared.resume_if_paused();
        }
    }

    fn count_underrun(&self, bytes: usize) {
        if bytes == 0 {
            return;
        }
        let counters = &self.shared.counters;
        counters.underrun_events.fetch_add(1, Ordering::Relaxed);
        counters
            .underrun_bytes
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }
}

/// Byte value of digital silence: unsigned 8-bit is centered on 128, the rest on zero.
pub fn silence_byte(format: SampleFormat) -> u8 {
    if format.packed() == SampleFormat::Unsigned8 {
        0x80
    } else {
        0
    }
}

struct OpenDevice<H> {
    handle: H,
    spec: DeviceSpec,
}

/// Owns at most one device binding at a time.
pub struct AudioOutputEngine<B: AudioBackend> {
    backend: B,
    shared: Arc<EngineShared>,
    faults: Receiver<PlayerError>,
    device: Option<OpenDevice<B::Handle>>,
}

impl<B: AudioBackend> AudioOutputEngine<B> {
    pub fn new(backend: B) -> Self {
        let (tx, rx) = bounded(FAULT_QUEUE);
        Self {
            backend,
            shared: Arc::new(EngineShared {
                state: AtomicU8::new(PlaybackState::Stopped as u8),
                volume: AtomicU32::new(MAX_VOLUME),
                muted: AtomicBool::new(false),
                counters: PlaybackCounters::default(),
                faults: tx,
            }),
            faults: rx,
            device: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Ask the backend what it can open for `wanted`.
    pub fn negotiate(&self, wanted: &DeviceSpec) -> Result<DeviceSpec> {
        self.backend.negotiate(wanted)
    }

    /// Bind a device for `spec`, fed by `source`. Any previous device is released first.
    ///
    /// The source must produce exactly the device's triple. The engine starts `Paused`.
    pub fn open<S: PcmSource>(&mut self, spec: DeviceSpec, source: S) -> Result<()> {
        let produced = source.output_triple();
        if !produced.matches(&spec.triple()) {
            return Err(PlayerError::SpecMismatch {
                expected: spec.triple().to_string(),
                actual: produced.to_string(),
            });
        }
        if !spec.format.is_device_native() {
            return Err(PlayerError::Unsupported(format!(
                "device sample format {}",
                spec.format
            )));
        }

        self.stop();
        self.shared.counters.reset();
        // Drop faults left over from the previous device.
        while self.faults.try_recv().is_ok() {}

        let mut feeder = Feeder {
            source,
            read_index: 0,
            format: spec.format,
            silence: silence_byte(spec.format),
            shared: self.shared.clone(),
        };
        let callback: RenderCallback = Box::new(move |out: &mut [u8]| feeder.fill(out));
        let handle = self.backend.open(&spec, callback)?;

        tracing::info!(
            rate_hz = spec.sample_rate,
            format = %spec.format,
            channels = spec.channels,
            buffer_frames = spec.buffer_frames,
            "output device opened"
        );

        self.shared.set_state(PlaybackState::Paused);
        self.device = Some(OpenDevice { handle, spec });
        Ok(())
    }

    /// Start (or restart) pulling data.
    pub fn play(&self) -> Result<()> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| PlayerError::device("no device open"))?;
        self.shared.set_state(PlaybackState::Playing);
        device.handle.resume()
    }

    pub fn resume(&self) -> Result<()> {
        self.play()
    }

    pub fn pause(&self) -> Result<()> {
        let Some(device) = self.device.as_ref() else {
            return Ok(());
        };
        self.shared.set_state(PlaybackState::Paused);
        device.handle.pause()
    }

    /// Release the device. Idempotent.
    pub fn stop(&mut self) {
        if let Some(device) = self.device.take() {
            drop(device.handle);
            tracing::debug!("output device closed");
        }
        self.shared.set_state(PlaybackState::Stopped);
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    pub fn spec(&self) -> Option<DeviceSpec> {
        self.device.as_ref().map(|d| d.spec)
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.state()
    }

    /// Mark a pipeline rebuild in progress.
    pub fn set_buffering(&self) {
        self.shared.set_state(PlaybackState::Buffering);
    }

    /// Raw volume in `[MIN_VOLUME, MAX_VOLUME]`.
    pub fn volume(&self) -> u32 {
        self.shared.volume.load(Ordering::Relaxed)
    }

    pub fn set_volume(&self, volume: u32) {
        self.shared
            .volume
            .store(volume.clamp(MIN_VOLUME, MAX_VOLUME), Ordering::Relaxed);
    }

    pub fn volume_percent(&self) -> u8 {
        (self.volume() * 100 / MAX_VOLUME) as u8
    }

    pub fn set_volume_percent(&self, percent: u8) {
        self.set_volume(percent.min(100) as u32 * MAX_VOLUME / 100);
    }

    pub fn is_muted(&self) -> bool {
        self.shared.muted.load(Ordering::Relaxed)
    }

    pub fn set_muted(&self, muted: bool) {
        self.shared.muted.store(muted, Ordering::Relaxed);
    }

    pub fn counters(&self) -> &PlaybackCounters {
        &self.shared.counters
    }

    /// Next error raised inside the render callback, if any.
    pub fn poll_fault(&self) -> Option<PlayerError> {
        self.faults.try_recv().ok()
    }
}

impl<B: AudioBackend> Drop for AudioOutputEngine<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeBackend;
    use std::sync::atomic::{AtomicU64, AtomicUsize};
    use symphonia::core::errors::Error as SymphoniaError;

    struct ChunkSource {
        triple: AudioTriple,
        chunks: Vec<Vec<u8>>,
        current: Vec<u8>,
        fail_at_end: bool,
        rewind_at_end: bool,
        generation: Arc<AtomicU64>,
        /// The generation moves forward on this call to `generation()`.
        bump_on_call: Option<usize>,
        generation_calls: AtomicUsize,
        ended: Arc<AtomicUsize>,
    }

    impl ChunkSource {
        fn s16(chunks: Vec<Vec<i16>>) -> Self {
            let chunks = chunks
                .into_iter()
                .rev()
                .map(|c| c.iter().flat_map(|v| v.to_ne_bytes()).collect())
                .collect();
            Self {
                triple: AudioTriple::new(SampleFormat::Signed16, 48_000, ChannelLayout::stereo()),
                chunks,
                current: Vec::new(),
                fail_at_end: false,
                rewind_at_end: false,
                generation: Arc::new(AtomicU64::new(0)),
                bump_on_call: None,
                generation_calls: AtomicUsize::new(0),
                ended: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl PcmSource for ChunkSource {
        fn next_buffer(&mut self) -> Result<bool> {
            match self.chunks.pop() {
                Some(c) => {
                    self.current = c;
                    Ok(true)
                }
                None if self.fail_at_end => {
                    Err(PlayerError::Decode(SymphoniaError::DecodeError("corrupt frame")))
                }
                None if self.rewind_at_end => {
                    self.generation.fetch_add(1, Ordering::Relaxed);
                    Ok(false)
                }
                None => Ok(false),
            }
        }

        fn buffer(&self) -> &[u8] {
            &self.current
        }

        fn output_triple(&self) -> AudioTriple {
            self.triple
        }

        fn generation(&self) -> u64 {
            let call = self.generation_calls.fetch_add(1, Ordering::Relaxed) + 1;
            if self.bump_on_call == Some(call) {
                self.generation.fetch_add(1, Ordering::Relaxed);
            }
            self.generation.load(Ordering::Relaxed)
        }

        fn end_of_stream(&mut self, generation: u64) {
            assert_eq!(generation, self.generation.load(Ordering::Relaxed));
            self.ended.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn spec() -> DeviceSpec {
        DeviceSpec {
            sample_rate: 48_000,
            format: SampleFormat::Signed16,
            channels: 2,
            buffer_frames: 1024,
        }
    }

    fn as_i16(bytes: &[u8]) -> Vec<i16> {
        bytes
            .chunks_exact(2)
            .map(|c| i16::from_ne_bytes([c[0], c[1]]))
            .collect()
    }

    #[test]
    fn open_rejects_mismatched_source() {
        let mut engine = AudioOutputEngine::new(FakeBackend::new());
        let mut wrong = spec();
        wrong.sample_rate = 44_100;
        let res = engine.open(wrong, ChunkSource::s16(vec![]));
        assert!(matches!(res, Err(PlayerError::SpecMismatch { .. })));
        assert!(!engine.is_open());
    }

    #[test]
    fn silence_until_played() {
        let backend = FakeBackend::new();
        let mut engine = AudioOutputEngine::new(backend.clone());
        engine.open(spec(), ChunkSource::s16(vec![vec![1000; 8]])).unwrap();
        assert_eq!(engine.state(), PlaybackState::Paused);
        assert_eq!(backend.render(16).unwrap(), vec![0u8; 16]);

        engine.play().unwrap();
        assert!(!backend.is_paused());
        assert_eq!(as_i16(&backend.render(16).unwrap()), vec![1000; 8]);
    }

    #[test]
    fn callback_spans_buffers_and_pauses_at_end() {
        let backend = FakeBackend::new();
        let mut engine = AudioOutputEngine::new(backend.clone());
        let source = ChunkSource::s16(vec![vec![1, 2, 3], vec![4, 5]]);
        let ended = source.ended.clone();
        engine.open(spec(), source).unwrap();
        engine.play().unwrap();

        assert_eq!(as_i16(&backend.render(8).unwrap()), vec![1, 2, 3, 4]);
        assert_eq!(ended.load(Ordering::Relaxed), 0);
        assert_eq!(as_i16(&backend.render(8).unwrap()), vec![5, 0, 0, 0]);
        assert_eq!(engine.state(), PlaybackState::Paused);
        assert_eq!(ended.load(Ordering::Relaxed), 1);
        assert_eq!(backend.render(8).unwrap(), vec![0u8; 8]);
        assert_eq!(ended.load(Ordering::Relaxed), 1);
        assert_eq!(engine.counters().underrun_events.load(Ordering::Relaxed), 1);
        assert_eq!(engine.counters().underrun_bytes.load(Ordering::Relaxed), 6);
        assert_eq!(engine.counters().played_bytes.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn end_of_stream_after_rewind_keeps_playing() {
        let backend = FakeBackend::new();
        let mut engine = AudioOutputEngine::new(backend.clone());
        let mut source = ChunkSource::s16(vec![vec![7, 7]]);
        source.rewind_at_end = true;
        let ended = source.ended.clone();
        engine.open(spec(), source).unwrap();
        engine.play().unwrap();
        assert_eq!(as_i16(&backend.render(8).unwrap()), vec![7, 7, 0, 0]);
        assert_eq!(engine.state(), PlaybackState::Playing);
        assert_eq!(ended.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn seek_while_pausing_at_end_resumes() {
        let backend = FakeBackend::new();
        let mut engine = AudioOutputEngine::new(backend.clone());
        let mut source = ChunkSource::s16(vec![vec![7, 7]]);
        // Calls: before each of the two pulls, the check before pausing, the recheck after.
        source.bump_on_call = Some(4);
        let ended = source.ended.clone();
        engine.open(spec(), source).unwrap();
        engine.play().unwrap();
        assert_eq!(as_i16(&backend.render(8).unwrap()), vec![7, 7, 0, 0]);
        assert_eq!(engine.state(), PlaybackState::Playing);
        assert_eq!(ended.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn volume_percent_maps_to_raw_volume() {
        let engine = AudioOutputEngine::new(FakeBackend::new());
        assert_eq!(engine.volume(), MAX_VOLUME);
        engine.set_volume_percent(50);
        assert_eq!(engine.volume(), 64);
        assert_eq!(engine.volume_percent(), 50);
        engine.set_volume(500);
        assert_eq!(engine.volume(), MAX_VOLUME);
        engine.set_volume_percent(250);
        assert_eq!(engine.volume_percent(), 100);
    }

    #[test]
    fn half_volume_scales_samples() {
        let backend = FakeBackend::new();
        let mut engine = AudioOutputEngine::new(backend.clone());
        engine
            .open(spec(), ChunkSource::s16(vec![vec![1000, -1000, 300, -300]]))
            .unwrap();
        engine.set_volume_percent(50);
        engine.play().unwrap();
        assert_eq!(as_i16(&backend.render(8).unwrap()), vec![500, -500, 150, -150]);
    }

    #[test]
    fn mute_zero_fills_regardless_of_volume() {
        let backend = FakeBackend::new();
        let mut engine = AudioOutputEngine::new(backend.clone());
        engine
            .open(spec(), ChunkSource::s16(vec![vec![1000; 16]]))
            .unwrap();
        engine.set_volume(MAX_VOLUME);
        engine.set_muted(true);
        engine.play().unwrap();
        assert_eq!(backend.render(32).unwrap(), vec![0u8; 32]);
        assert!(engine.is_muted());
    }

    #[test]
    fn callback_error_pauses_and_reports_fault() {
        let backend = FakeBackend::new();
        let mut engine = AudioOutputEngine::new(backend.clone());
        let mut source = ChunkSource::s16(vec![vec![9, 9]]);
        source.fail_at_end = true;
        engine.open(spec(), source).unwrap();
        engine.play().unwrap();

        assert_eq!(as_i16(&backend.render(8).unwrap()), vec![9, 9, 0, 0]);
        assert_eq!(engine.state(), PlaybackState::Paused);
        let fault = engine.poll_fault().unwrap();
        assert!(fault.is_mid_stream());
        assert!(engine.poll_fault().is_none());
    }

    #[test]
    fn stop_releases_device_and_is_idempotent() {
        let backend = FakeBackend::new();
        let mut engine = AudioOutputEngine::new(backend.clone());
        engine.open(spec(), ChunkSource::s16(vec![])).unwrap();
        assert!(backend.is_open());
        engine.stop();
        engine.stop();
        assert!(!backend.is_open());
        assert_eq!(backend.closed(), 1);
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert!(engine.play().is_err());
        assert!(engine.pause().is_ok());
    }

    #[test]
    fn reopen_releases_previous_device_first() {
        let backend = FakeBackend::new();
        let mut engine = AudioOutputEngine::new(backend.clone());
        engine.open(spec(), ChunkSource::s16(vec![])).unwrap();
        engine.open(spec(), ChunkSource::s16(vec![])).unwrap();
        assert_eq!(backend.opened(), 2);
        assert_eq!(backend.closed(), 1);
        assert!(backend.is_open());
    }

    #[test]
    fn open_failure_leaves_engine_stopped() {
        let mut engine = AudioOutputEngine::new(FakeBackend::failing());
        let res = engine.open(spec(), ChunkSource::s16(vec![]));
        assert!(matches!(res, Err(PlayerError::Device(_))));
        assert_eq!(engine.state(), PlaybackState::Stopped);
    }

    #[test]
    fn wanted_spec_falls_back_to_device_formats() {
        let triple = AudioTriple::new(SampleFormat::DoublePlanar, 96_000, ChannelLayout::new(6));
        let wanted = DeviceSpec::wanted_for(triple, 512);
        assert_eq!(wanted.format, SampleFormat::Float32);
        assert_eq!(wanted.channels, 6);
        assert_eq!(wanted.bytes_per_frame(), 24);
        assert_eq!(silence_byte(SampleFormat::Unsigned8), 0x80);
        assert_eq!(silence_byte(SampleFormat::Float32), 0);
    }
}
