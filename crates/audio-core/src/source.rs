//! Packet source: the demuxer front end.
//!
//! A [`PacketSource`] opens a media resource with Symphonia, binds its first audio track and
//! yields encoded packets in stream order. The read cursor lives behind one mutex so a seek
//! from the controller thread can race safely with packet reads driven by the audio thread.
//!
//! End of stream is reported through a single handler slot. The handler always runs on a
//! freshly spawned thread, never on the thread that observed the end of the stream.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use symphonia::core::codecs::{CODEC_TYPE_NULL, CodecParameters};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet, SeekMode, SeekTo, Track};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};

use crate::error::{PlayerError, Result};
use crate::format::{
    AudioMetaInfo, AudioStreamDescriptor, ChannelLayout, SampleFormat, approximate_bit_rate,
};

/// Callback fired once per end of stream.
pub type EofHandler = Arc<dyn Fn() + Send + Sync>;

/// The most recently read packet.
///
/// Overwritten by every advance; copy the payload out if it must outlive the next read.
#[derive(Default)]
pub struct EncodedPacket {
    packet: Option<Packet>,
    stream_index: usize,
    time_base: Option<TimeBase>,
    /// Leading time-base units that lie before the last seek target.
    trim: u64,
}

impl EncodedPacket {
    pub fn is_empty(&self) -> bool {
        self.packet.is_none()
    }

    pub fn payload(&self) -> &[u8] {
        self.packet.as_ref().map(|p| p.buf()).unwrap_or(&[])
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    /// Decode timestamp in time-base units.
    pub fn timestamp(&self) -> Option<u64> {
        self.packet.as_ref().map(|p| p.ts())
    }

    pub fn time_base(&self) -> Option<TimeBase> {
        self.time_base
    }

    /// Time-base units at the start of this packet that precede the last seek target.
    ///
    /// Non-zero only for the first packet read after a seek.
    pub fn trim(&self) -> u64 {
        self.trim
    }

    /// Wall-clock time of the first sample to be played from this packet.
    pub fn time(&self) -> Option<Duration> {
        let ts = self.timestamp()?.saturating_add(self.trim);
        let tb = self.time_base?;
        Some(time_to_duration(tb.calc_time(ts)))
    }

    pub(crate) fn raw(&self) -> Option<&Packet> {
        self.packet.as_ref()
    }

    fn clear(&mut self) {
        self.packet = None;
        self.trim = 0;
    }
}

struct ReadCursor {
    reader: Option<Box<dyn FormatReader>>,
    packet: EncodedPacket,
    track_ids: Vec<u32>,
    /// Timestamp the last seek asked for; packets ending before it are dropped.
    seek_floor: Option<u64>,
}

struct SourceShared {
    uri: String,
    descriptor: AudioStreamDescriptor,
    codec_params: CodecParameters,
    stream_index: usize,
    track_id: u32,
    cursor: Mutex<ReadCursor>,
    closed: AtomicBool,
    generation: AtomicU64,
    eof_fired: AtomicBool,
    /// End of stream is reported by the consumer, not at demuxer exhaustion.
    defer_eof: AtomicBool,
    on_eof: Mutex<Option<EofHandler>>,
}

/// Shared handle to an opened media resource.
///
/// Clones refer to the same read cursor; the decoder and the controller each hold one.
#[derive(Clone)]
pub struct PacketSource {
    shared: Arc<SourceShared>,
}

impl PacketSource {
    /// Open `uri` (a plain path or a `file://` URI) and bind its first audio stream.
    pub fn open(uri: &str) -> Result<Self> {
        let path = path_from_uri(uri);
        let file = File::open(&path).map_err(|e| PlayerError::open(uri, e))?;
        let byte_len = file.metadata().ok().map(|m| m.len());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| PlayerError::open(uri, e))?;
        let reader = probed.format;

        let track_ids: Vec<u32> = reader.tracks().iter().map(|t| t.id).collect();
        let (stream_index, track) = reader
            .tracks()
            .iter()
            .enumerate()
            .find(|(_, t)| is_audio_track(t))
            .ok_or_else(|| PlayerError::StreamNotFound {
                uri: uri.to_string(),
            })?;

        let codec_params = track.codec_params.clone();
        let track_id = track.id;
        let descriptor = describe(&codec_params, byte_len)
            .ok_or_else(|| PlayerError::open(uri, "audio stream has no channel layout"))?;

        tracing::info!(
            uri,
            stream_index,
            format = %descriptor.format,
            rate_hz = descriptor.sample_rate,
            channels = descriptor.layout.count(),
            duration_ms = descriptor.duration.map(|d| d.as_millis() as u64),
            "opened audio stream"
        );

        let time_base = codec_params
            .time_base
            .or_else(|| Some(TimeBase::new(1, descriptor.sample_rate)));

        Ok(Self {
            shared: Arc::new(SourceShared {
                uri: uri.to_string(),
                descriptor,
                codec_params,
                stream_index,
                track_id,
                cursor: Mutex::new(ReadCursor {
                    reader: Some(reader),
                    packet: EncodedPacket {
                        packet: None,
                        stream_index,
                        time_base,
                        trim: 0,
                    },
                    track_ids,
                    seek_floor: None,
                }),
                closed: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                eof_fired: AtomicBool::new(false),
                defer_eof: AtomicBool::new(false),
                on_eof: Mutex::new(None),
            }),
        })
    }

    /// Read only the stream descriptor of `uri`, releasing the resource afterwards.
    pub fn probe(uri: &str) -> Result<AudioStreamDescriptor> {
        let source = Self::open(uri)?;
        let descriptor = source.descriptor().clone();
        source.close();
        Ok(descriptor)
    }

    pub fn uri(&self) -> &str {
        &self.shared.uri
    }

    pub fn descriptor(&self) -> &AudioStreamDescriptor {
        &self.shared.descriptor
    }

    /// Index of the bound audio stream among the container's streams.
    pub fn stream_index(&self) -> usize {
        self.shared.stream_index
    }

    pub(crate) fn codec_params(&self) -> &CodecParameters {
        &self.shared.codec_params
    }

    /// Read the next packet of the bound audio stream.
    ///
    /// Returns `Ok(false)` at end of stream (or once closed) and fires the end-of-stream
    /// handler on another thread, unless reporting was deferred to the consumer with
    /// [`PacketSource::defer_end_of_stream`].
    pub fn advance(&self) -> Result<bool> {
        self.advance_stream(self.shared.stream_index)
    }

    /// Read the next packet belonging to stream `index`, skipping all others.
    ///
    /// An index that never appears reads to the end of the resource and reports end of
    /// stream.
    pub fn advance_stream(&self, index: usize) -> Result<bool> {
        if self.is_closed() {
            return Ok(false);
        }
        let mut guard = self.shared.cursor.lock();
        let cursor = &mut *guard;
        let Some(reader) = cursor.reader.as_mut() else {
            return Ok(false);
        };

        loop {
            match reader.next_packet() {
                Ok(packet) => {
                    let packet_index = cursor
                        .track_ids
                        .iter()
                        .position(|id| *id == packet.track_id());
                    if packet_index != Some(index) {
                        continue;
                    }
                    let mut trim = 0;
                    if let Some(floor) = cursor.seek_floor {
                        if packet.dur() > 0 && packet.ts().saturating_add(packet.dur()) <= floor {
                            continue;
                        }
                        trim = floor.saturating_sub(packet.ts());
                        cursor.seek_floor = None;
                    }
                    cursor.packet.packet = Some(packet);
                    cursor.packet.stream_index = index;
                    cursor.packet.trim = trim;
                    return Ok(true);
                }
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    cursor.seek_floor = None;
                    drop(guard);
                    if !self.shared.defer_eof.load(Ordering::Acquire) {
                        self.notify_end_of_stream();
                    }
                    return Ok(false);
                }
                Err(e) => return Err(PlayerError::Read(e)),
            }
        }
    }

    /// Borrow the current packet. Holding the guard blocks reads and seeks.
    pub fn packet(&self) -> MappedMutexGuard<'_, EncodedPacket> {
        MutexGuard::map(self.shared.cursor.lock(), |c| &mut c.packet)
    }

    /// Wall-clock time of the last packet read.
    ///
    /// Zero before the first read and when the duration is unknown. A seek clears it until
    /// the next read.
    pub fn position(&self) -> Duration {
        if self.shared.descriptor.duration.is_none() {
            return Duration::ZERO;
        }
        self.shared.cursor.lock().packet.time().unwrap_or(Duration::ZERO)
    }

    /// Same as [`PacketSource::seek`].
    pub fn set_position(&self, position: Duration) -> Result<()> {
        self.seek(position)
    }

    /// Move the read cursor to `target`, clamped to the stream duration.
    ///
    /// The next [`PacketSource::advance`] returns the packet holding `target`; its
    /// [`EncodedPacket::trim`] covers the samples before it.
    pub fn seek(&self, target: Duration) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        let target = match self.shared.descriptor.duration {
            Some(d) => target.min(d),
            None => target,
        };
        let mut guard = self.shared.cursor.lock();
        let cursor = &mut *guard;
        let Some(reader) = cursor.reader.as_mut() else {
            return Ok(());
        };
        let seeked = reader
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time::new(target.as_secs(), target.subsec_nanos() as f64 / 1e9),
                    track_id: Some(self.shared.track_id),
                },
            )
            .map_err(PlayerError::Read)?;
        cursor.packet.clear();
        cursor.seek_floor = (seeked.required_ts > seeked.actual_ts).then_some(seeked.required_ts);
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
        self.shared.eof_fired.store(false, Ordering::Release);
        tracing::debug!(uri = %self.shared.uri, target_ms = target.as_millis() as u64, "seek");
        Ok(())
    }

    /// Rewind to the start of the stream.
    pub fn reset(&self) -> Result<()> {
        self.seek(Duration::ZERO)
    }

    /// Bumped on every seek; decoders use it to flush codec state.
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }

    /// Replace the end-of-stream handler.
    pub fn set_end_of_stream_handler(&self, handler: EofHandler) {
        *self.shared.on_eof.lock() = Some(handler);
    }

    pub fn clear_end_of_stream_handler(&self) {
        *self.shared.on_eof.lock() = None;
    }

    /// Leave end-of-stream reporting to whoever drains the stream, through
    /// [`PacketSource::notify_end_of_stream_if_current`].
    pub(crate) fn defer_end_of_stream(&self) {
        self.shared.defer_eof.store(true, Ordering::Release);
    }

    /// Fire the end-of-stream handler if no seek happened since `generation`.
    pub(crate) fn notify_end_of_stream_if_current(&self, generation: u64) {
        // The cursor lock orders this against a seek clearing the latch.
        let _cursor = self.shared.cursor.lock();
        if self.generation() == generation {
            self.notify_end_of_stream();
        }
    }

    /// Stop reading and release the demuxer. Idempotent.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.clear_end_of_stream_handler();
        let mut cursor = self.shared.cursor.lock();
        cursor.packet.clear();
        cursor.reader = None;
        tracing::debug!(uri = %self.shared.uri, "closed audio stream");
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    fn notify_end_of_stream(&self) {
        if self.shared.eof_fired.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(handler) = self.shared.on_eof.lock().clone() else {
            return;
        };
        let spawned = thread::Builder::new()
            .name("end-of-stream".to_string())
            .spawn(move || handler());
        if let Err(e) = spawned {
            tracing::warn!("end-of-stream dispatch failed: {e}");
        }
    }
}

impl AudioMetaInfo for PacketSource {
    fn duration(&self) -> Option<Duration> {
        self.shared.descriptor.duration
    }

    fn bit_rate(&self) -> u64 {
        self.shared.descriptor.bit_rate
    }

    fn bit_depth(&self) -> u32 {
        self.shared.descriptor.bit_depth
    }

    fn channels(&self) -> usize {
        self.shared.descriptor.layout.count()
    }

    fn sample_rate(&self) -> u32 {
        self.shared.descriptor.sample_rate
    }

    fn sample_format(&self) -> SampleFormat {
        self.shared.descriptor.format
    }
}

/// Strip a `file://` scheme; anything else is taken as a path.
pub fn path_from_uri(uri: &str) -> PathBuf {
    Path::new(uri.strip_prefix("file://").unwrap_or(uri)).to_path_buf()
}

fn is_audio_track(track: &Track) -> bool {
    track.codec_params.codec != CODEC_TYPE_NULL
        && track.codec_params.sample_rate.is_some_and(|r| r > 0)
}

/// Packed format the decoder emits for this stream.
fn native_format(params: &CodecParameters) -> SampleFormat {
    match (params.sample_format, params.bits_per_sample) {
        (Some(format), _) => SampleFormat::from_decoded(Some(format)),
        (None, Some(bits)) if bits <= 8 => SampleFormat::Unsigned8,
        (None, Some(bits)) if bits <= 16 => SampleFormat::Signed16,
        (None, Some(_)) => SampleFormat::Signed32,
        (None, None) => SampleFormat::Float32,
    }
}

fn describe(params: &CodecParameters, byte_len: Option<u64>) -> Option<AudioStreamDescriptor> {
    let sample_rate = params.sample_rate.filter(|r| *r > 0)?;
    let channels = params.channels?;
    let layout = ChannelLayout::with_mask(channels.count() as u16, channels.bits() as u64);
    let format = native_format(params);
    let duration = duration_from_params(params);
    let bit_depth = params
        .bits_per_sample
        .or(params.bits_per_coded_sample)
        .unwrap_or(format.bytes_per_sample() as u32 * 8);

    Some(AudioStreamDescriptor {
        format,
        sample_rate,
        layout,
        bit_depth,
        bit_rate: approximate_bit_rate(byte_len, duration),
        duration,
    })
}

fn duration_from_params(params: &CodecParameters) -> Option<Duration> {
    let frames = params.n_frames?;
    if let Some(tb) = params.time_base {
        return Some(time_to_duration(tb.calc_time(frames)));
    }
    let rate = params.sample_rate? as u64;
    if rate == 0 {
        return None;
    }
    Some(Duration::from_millis(frames.saturating_mul(1000) / rate))
}

fn time_to_duration(time: Time) -> Duration {
    Duration::from_secs(time.seconds) + Duration::from_secs_f64(time.frac.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_wav;
    use crossbeam_channel::bounded;
    use std::time::Instant;

    #[test]
    fn path_from_uri_strips_file_scheme() {
        assert_eq!(path_from_uri("file:///tmp/a.wav"), PathBuf::from("/tmp/a.wav"));
        assert_eq!(path_from_uri("/tmp/b.wav"), PathBuf::from("/tmp/b.wav"));
    }

    #[test]
    fn open_missing_file_is_open_error() {
        let err = PacketSource::open("/definitely/not/here.wav").err().unwrap();
        assert!(matches!(err, PlayerError::Open { .. }));
    }

    #[test]
    fn open_garbage_is_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.bin");
        std::fs::write(&path, vec![0x5au8; 4096]).unwrap();
        let err = PacketSource::open(path.to_str().unwrap()).err().unwrap();
        assert!(matches!(err, PlayerError::Open { .. }));
    }

    #[test]
    fn probe_reports_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "tone.wav", 8_000, 2, 8_000);
        let uri = format!("file://{}", path.display());
        let desc = PacketSource::probe(&uri).unwrap();
        assert_eq!(desc.format, SampleFormat::Signed16);
        assert_eq!(desc.sample_rate, 8_000);
        assert_eq!(desc.layout.count(), 2);
        assert_eq!(desc.bit_depth, 16);
        assert_eq!(desc.duration, Some(Duration::from_secs(1)));
        assert!(desc.bit_rate > 200_000 && desc.bit_rate < 300_000);
    }

    #[test]
    fn position_is_zero_before_first_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "a.wav", 8_000, 1, 4_000);
        let source = PacketSource::open(path.to_str().unwrap()).unwrap();
        assert_eq!(source.position(), Duration::ZERO);
        assert!(source.packet().is_empty());
        assert!(source.advance().unwrap());
        assert_eq!(source.position(), Duration::ZERO);
        source.seek(Duration::from_millis(250)).unwrap();
        assert!(source.packet().is_empty());
        assert_eq!(source.position(), Duration::ZERO);
    }

    #[test]
    fn position_advances_with_packets() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "a.wav", 8_000, 1, 16_000);
        let source = PacketSource::open(path.to_str().unwrap()).unwrap();
        let mut last = Duration::ZERO;
        while source.advance().unwrap() {
            let pos = source.position();
            assert!(pos >= last);
            last = pos;
        }
        assert!(last > Duration::from_millis(1500));
    }

    #[test]
    fn seek_to_zero_matches_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "a.wav", 8_000, 2, 16_000);
        let source = PacketSource::open(path.to_str().unwrap()).unwrap();

        assert!(source.advance().unwrap());
        let first_ts = source.packet().timestamp();
        let first_payload = source.packet().payload().to_vec();
        for _ in 0..3 {
            source.advance().unwrap();
        }

        source.set_position(Duration::ZERO).unwrap();
        assert!(source.advance().unwrap());
        assert_eq!(source.packet().timestamp(), first_ts);
        assert_eq!(source.packet().payload(), first_payload.as_slice());

        for _ in 0..3 {
            source.advance().unwrap();
        }
        source.reset().unwrap();
        assert!(source.advance().unwrap());
        assert_eq!(source.packet().timestamp(), first_ts);
        assert_eq!(source.packet().payload(), first_payload.as_slice());
    }

    #[test]
    fn seek_bumps_generation() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "a.wav", 8_000, 1, 8_000);
        let source = PacketSource::open(path.to_str().unwrap()).unwrap();
        let g0 = source.generation();
        source.seek(Duration::from_millis(500)).unwrap();
        assert_eq!(source.generation(), g0 + 1);
        assert!(source.advance().unwrap());
        assert_eq!(source.position(), Duration::from_millis(500));
    }

    #[test]
    fn seek_lands_on_exact_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "a.wav", 8_000, 1, 8_000);
        let source = PacketSource::open(path.to_str().unwrap()).unwrap();
        source.seek(Duration::from_millis(125)).unwrap();
        assert!(source.advance().unwrap());
        {
            let packet = source.packet();
            let ts = packet.timestamp().unwrap();
            assert!(ts <= 1_000);
            assert_eq!(ts + packet.trim(), 1_000);
        }
        assert_eq!(source.position(), Duration::from_millis(125));

        assert!(source.advance().unwrap());
        assert_eq!(source.packet().trim(), 0);
    }

    #[test]
    fn deferred_end_of_stream_waits_for_consumer() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "a.wav", 8_000, 1, 1_000);
        let source = PacketSource::open(path.to_str().unwrap()).unwrap();
        source.defer_end_of_stream();
        let (tx, rx) = bounded(8);
        source.set_end_of_stream_handler(Arc::new(move || {
            let _ = tx.send(());
        }));

        while source.advance().unwrap() {}
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

        let stale = source.generation();
        source.reset().unwrap();
        source.notify_end_of_stream_if_current(stale);
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

        while source.advance().unwrap() {}
        source.notify_end_of_stream_if_current(source.generation());
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        source.notify_end_of_stream_if_current(source.generation());
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn end_of_stream_fires_on_another_thread_without_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "a.wav", 8_000, 1, 2_000);
        let source = PacketSource::open(path.to_str().unwrap()).unwrap();

        let (started_tx, started_rx) = bounded(1);
        let (release_tx, release_rx) = bounded::<()>(0);
        source.set_end_of_stream_handler(Arc::new(move || {
            let _ = started_tx.send(thread::current().id());
            // Hold the handler open until the test lets go.
            let _ = release_rx.recv();
        }));

        let began = Instant::now();
        while source.advance().unwrap() {}
        assert!(began.elapsed() < Duration::from_secs(2));

        let handler_thread = started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(handler_thread, thread::current().id());
        release_tx.send(()).unwrap();
    }

    #[test]
    fn end_of_stream_fires_once_until_seek() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "a.wav", 8_000, 1, 1_000);
        let source = PacketSource::open(path.to_str().unwrap()).unwrap();
        let (tx, rx) = bounded(8);
        source.set_end_of_stream_handler(Arc::new(move || {
            let _ = tx.send(());
        }));

        while source.advance().unwrap() {}
        assert!(!source.advance().unwrap());
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

        source.reset().unwrap();
        while source.advance().unwrap() {}
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn unknown_stream_index_reads_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "a.wav", 8_000, 1, 1_000);
        let source = PacketSource::open(path.to_str().unwrap()).unwrap();
        assert!(!source.advance_stream(7).unwrap());
        assert!(!source.advance().unwrap());
    }

    #[test]
    fn closed_source_stops_reading() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "a.wav", 8_000, 1, 1_000);
        let source = PacketSource::open(path.to_str().unwrap()).unwrap();
        let other = source.clone();
        source.close();
        source.close();
        assert!(other.is_closed());
        assert!(!other.advance().unwrap());
        assert!(other.seek(Duration::ZERO).is_ok());
    }

    #[test]
    fn meta_info_delegates_to_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "a.wav", 22_050, 2, 22_050);
        let source = PacketSource::open(path.to_str().unwrap()).unwrap();
        let meta: &dyn AudioMetaInfo = &source;
        assert_eq!(meta.sample_rate(), 22_050);
        assert_eq!(meta.channels(), 2);
        assert_eq!(meta.sample_format(), SampleFormat::Signed16);
        assert_eq!(meta.duration(), Some(Duration::from_secs(1)));
    }
}
