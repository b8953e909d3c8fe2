//! Decode stage.
//!
//! Uses Symphonia to turn the packets of a [`PacketSource`] into packed sample frames in the
//! stream's native format. The decoder is pulled synchronously by whoever needs the next
//! frame: the real-time callback during playback, the controller thread while priming.

use symphonia::core::audio::{AudioBufferRef, RawSample, RawSampleBuffer, SignalSpec};
use symphonia::core::codecs::{CodecParameters, Decoder as CodecDecoder, DecoderOptions};
use symphonia::core::conv::ConvertibleSample;
use symphonia::core::sample::Sample;
use symphonia::core::units::TimeBase;

use crate::error::{PlayerError, Result};
use crate::format::{AudioTriple, SampleFormat};
use crate::frame::{AudioFrame, DecodedFrame};
use crate::source::PacketSource;

const DEFAULT_FRAME_CAPACITY: usize = 4096;

/// Interleaving scratch for one output sample type.
struct RawScratch<S: Sample + RawSample> {
    spec: SignalSpec,
    buf: RawSampleBuffer<S>,
}

fn copy_raw<S>(
    slot: &mut Option<RawScratch<S>>,
    decoded: AudioBufferRef<'_>,
    frame: &mut AudioFrame,
) -> Result<()>
where
    S: Sample + RawSample + ConvertibleSample,
{
    let spec = *decoded.spec();
    let frames = decoded.capacity();
    let reuse = slot
        .as_ref()
        .is_some_and(|s| s.spec == spec && s.buf.capacity() >= frames * spec.channels.count());
    if !reuse {
        *slot = Some(RawScratch {
            spec,
            buf: RawSampleBuffer::<S>::new(frames as u64, spec),
        });
    }
    let Some(scratch) = slot.as_mut() else {
        return Ok(());
    };
    scratch.buf.copy_interleaved_ref(decoded);
    frame.copy_packed_from(scratch.buf.as_bytes())
}

enum Scratch {
    U8(Option<RawScratch<u8>>),
    S16(Option<RawScratch<i16>>),
    S32(Option<RawScratch<i32>>),
    F32(Option<RawScratch<f32>>),
    F64(Option<RawScratch<f64>>),
}

impl Scratch {
    fn for_format(format: SampleFormat) -> Result<Self> {
        Ok(match format.packed() {
            SampleFormat::Unsigned8 => Scratch::U8(None),
            SampleFormat::Signed16 => Scratch::S16(None),
            SampleFormat::Signed32 => Scratch::S32(None),
            SampleFormat::Float32 => Scratch::F32(None),
            SampleFormat::Double => Scratch::F64(None),
            other => return Err(PlayerError::Unsupported(format!("decode to {other}"))),
        })
    }

    fn copy(&mut self, decoded: AudioBufferRef<'_>, frame: &mut AudioFrame) -> Result<()> {
        match self {
            Scratch::U8(slot) => copy_raw(slot, decoded, frame),
            Scratch::S16(slot) => copy_raw(slot, decoded, frame),
            Scratch::S32(slot) => copy_raw(slot, decoded, frame),
            Scratch::F32(slot) => copy_raw(slot, decoded, frame),
            Scratch::F64(slot) => copy_raw(slot, decoded, frame),
        }
    }
}

/// Codec bound to one [`PacketSource`] stream.
pub struct Decoder {
    source: PacketSource,
    codec: Box<dyn CodecDecoder>,
    frame: DecodedFrame,
    scratch: Scratch,
    stream_index: usize,
    generation: u64,
    /// The source's current packet has been read but not decoded yet.
    pending: bool,
}

impl Decoder {
    /// Build a decoder for the source's audio stream.
    ///
    /// If the source was already advanced to its first packet, that packet is decoded first.
    pub fn new(source: PacketSource) -> Result<Self> {
        let params = source.codec_params();
        let codec = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| PlayerError::open(source.uri(), e))?;

        let triple = source.descriptor().triple();
        let capacity = params
            .max_frames_per_packet
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_FRAME_CAPACITY);

        tracing::debug!(
            codec = codec_name_from_params(params).as_deref().unwrap_or("unknown"),
            output = %triple,
            "decoder ready"
        );

        let pending = !source.packet().is_empty();
        Ok(Self {
            scratch: Scratch::for_format(triple.format)?,
            frame: AudioFrame::with_capacity(triple, capacity),
            stream_index: source.stream_index(),
            generation: source.generation(),
            pending,
            codec,
            source,
        })
    }

    /// Decode the next frame.
    ///
    /// Pulls packets until the codec produces samples. Returns `Ok(false)` once the source is
    /// exhausted or closed; codec failures are returned as [`PlayerError::Decode`].
    pub fn advance(&mut self) -> Result<bool> {
        if self.source.is_closed() {
            self.frame.set_samples(0);
            return Ok(false);
        }
        self.sync_generation();

        loop {
            if !self.pending && !self.source.advance_stream(self.stream_index)? {
                self.frame.set_samples(0);
                return Ok(false);
            }
            self.pending = false;

            let packet = self.source.packet();
            // A seek between the read and this lock replaced the packet.
            if self.source.generation() != self.generation {
                drop(packet);
                self.sync_generation();
                continue;
            }
            let Some(raw) = packet.raw() else {
                continue;
            };
            let skip = self.trim_frames(packet.trim(), packet.time_base());
            let decoded = self.codec.decode(raw).map_err(PlayerError::Decode)?;
            if decoded.frames() <= skip {
                continue;
            }
            if decoded.spec().channels.count() != self.frame.channels() {
                return Err(PlayerError::SpecMismatch {
                    expected: format!("{} channels", self.frame.channels()),
                    actual: format!("{} channels", decoded.spec().channels.count()),
                });
            }
            self.scratch.copy(decoded, &mut self.frame)?;
            self.frame.discard_front(skip);
            return Ok(true);
        }
    }

    /// The last decoded frame; valid until the next [`Decoder::advance`].
    pub fn frame(&self) -> &DecodedFrame {
        &self.frame
    }

    pub fn output_triple(&self) -> AudioTriple {
        self.frame.triple()
    }

    pub fn source(&self) -> &PacketSource {
        &self.source
    }

    /// Seek generation of the last decoded frame.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn codec_name(&self) -> Option<String> {
        codec_name_from_params(self.source.codec_params())
    }

    /// Sample frames covered by `trim` time-base units.
    fn trim_frames(&self, trim: u64, time_base: Option<TimeBase>) -> usize {
        if trim == 0 {
            return 0;
        }
        let rate = self.frame.triple().sample_rate as u128;
        let frames = match time_base {
            Some(tb) if tb.denom > 0 => trim as u128 * rate * tb.numer as u128 / tb.denom as u128,
            _ => trim as u128,
        };
        usize::try_from(frames).unwrap_or(usize::MAX)
    }

    fn sync_generation(&mut self) {
        let current = self.source.generation();
        if current != self.generation {
            self.codec.reset();
            self.generation = current;
            self.pending = !self.source.packet().is_empty();
        }
    }
}

/// Best-effort codec label used for status payloads.
fn codec_name_from_params(params: &CodecParameters) -> Option<String> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_ALAC => "ALAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_OPUS => "OPUS",
        CODEC_TYPE_PCM_U8 => "PCM_U8",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM_S32",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        CODEC_TYPE_PCM_F64LE | CODEC_TYPE_PCM_F64BE => "PCM_F64",
        _ => return None,
    };
    Some(name.to_string())
}
