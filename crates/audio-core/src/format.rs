//! Sample formats, channel layouts and stream descriptors.
//!
//! These are the value types shared by every stage: the source reports an
//! [`AudioStreamDescriptor`], the resampler converts between two [`AudioTriple`]s and the
//! output engine binds a device whose spec must match the last triple in the chain.

use std::fmt;
use std::time::Duration;

use symphonia::core::sample::SampleFormat as DecodedSampleFormat;

/// Layout of one audio sample.
///
/// Packed formats interleave channels in a single plane; planar formats keep one plane
/// per channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    Unsigned8,
    Signed16,
    Signed32,
    Float32,
    Double,
    Signed64,
    Unsigned8Planar,
    Signed16Planar,
    Signed32Planar,
    Float32Planar,
    DoublePlanar,
    Signed64Planar,
    Other,
}

impl SampleFormat {
    /// Width of one sample of one channel, in bytes. `0` for [`SampleFormat::Other`].
    pub fn bytes_per_sample(self) -> usize {
        match self.packed() {
            SampleFormat::Unsigned8 => 1,
            SampleFormat::Signed16 => 2,
            SampleFormat::Signed32 | SampleFormat::Float32 => 4,
            SampleFormat::Double | SampleFormat::Signed64 => 8,
            _ => 0,
        }
    }

    pub fn is_planar(self) -> bool {
        matches!(
            self,
            SampleFormat::Unsigned8Planar
                | SampleFormat::Signed16Planar
                | SampleFormat::Signed32Planar
                | SampleFormat::Float32Planar
                | SampleFormat::DoublePlanar
                | SampleFormat::Signed64Planar
        )
    }

    /// The interleaved variant of this format.
    pub fn packed(self) -> SampleFormat {
        match self {
            SampleFormat::Unsigned8Planar => SampleFormat::Unsigned8,
            SampleFormat::Signed16Planar => SampleFormat::Signed16,
            SampleFormat::Signed32Planar => SampleFormat::Signed32,
            SampleFormat::Float32Planar => SampleFormat::Float32,
            SampleFormat::DoublePlanar => SampleFormat::Double,
            SampleFormat::Signed64Planar => SampleFormat::Signed64,
            other => other,
        }
    }

    /// The planar variant of this format.
    pub fn planar(self) -> SampleFormat {
        match self {
            SampleFormat::Unsigned8 => SampleFormat::Unsigned8Planar,
            SampleFormat::Signed16 => SampleFormat::Signed16Planar,
            SampleFormat::Signed32 => SampleFormat::Signed32Planar,
            SampleFormat::Float32 => SampleFormat::Float32Planar,
            SampleFormat::Double => SampleFormat::DoublePlanar,
            SampleFormat::Signed64 => SampleFormat::Signed64Planar,
            other => other,
        }
    }

    /// Whether an output device accepts this format without conversion.
    pub fn is_device_native(self) -> bool {
        matches!(
            self,
            SampleFormat::Unsigned8
                | SampleFormat::Signed16
                | SampleFormat::Signed32
                | SampleFormat::Float32
        )
    }

    /// The device format to ask for when playing a stream of this format.
    ///
    /// Planar variants fall back to their packed form. 64-bit formats narrow to the
    /// 32-bit format of the same kind; anything else falls back to signed 16-bit.
    pub fn device_fallback(self) -> SampleFormat {
        match self.packed() {
            packed if packed.is_device_native() => packed,
            SampleFormat::Double => SampleFormat::Float32,
            SampleFormat::Signed64 => SampleFormat::Signed32,
            _ => SampleFormat::Signed16,
        }
    }

    /// Packed format the decoder emits for a codec's native sample format.
    ///
    /// Widths the device layer has no name for are widened to the next signed format.
    pub fn from_decoded(format: Option<DecodedSampleFormat>) -> SampleFormat {
        match format {
            Some(DecodedSampleFormat::U8) => SampleFormat::Unsigned8,
            Some(DecodedSampleFormat::S8 | DecodedSampleFormat::U16 | DecodedSampleFormat::S16) => {
                SampleFormat::Signed16
            }
            Some(
                DecodedSampleFormat::U24
                | DecodedSampleFormat::S24
                | DecodedSampleFormat::U32
                | DecodedSampleFormat::S32,
            ) => SampleFormat::Signed32,
            Some(DecodedSampleFormat::F64) => SampleFormat::Double,
            Some(DecodedSampleFormat::F32) | None => SampleFormat::Float32,
        }
    }

    /// Short label used in logs and status payloads.
    pub fn label(self) -> &'static str {
        match self {
            SampleFormat::Unsigned8 => "u8",
            SampleFormat::Signed16 => "s16",
            SampleFormat::Signed32 => "s32",
            SampleFormat::Float32 => "f32",
            SampleFormat::Double => "f64",
            SampleFormat::Signed64 => "s64",
            SampleFormat::Unsigned8Planar => "u8p",
            SampleFormat::Signed16Planar => "s16p",
            SampleFormat::Signed32Planar => "s32p",
            SampleFormat::Float32Planar => "f32p",
            SampleFormat::DoublePlanar => "f64p",
            SampleFormat::Signed64Planar => "s64p",
            SampleFormat::Other => "other",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Ordered channel count plus an optional speaker mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelLayout {
    count: u16,
    mask: Option<u64>,
}

impl ChannelLayout {
    pub fn new(count: u16) -> Self {
        Self { count, mask: None }
    }

    pub fn with_mask(count: u16, mask: u64) -> Self {
        Self {
            count,
            mask: Some(mask),
        }
    }

    pub fn mono() -> Self {
        Self::new(1)
    }

    pub fn stereo() -> Self {
        Self::new(2)
    }

    pub fn count(&self) -> usize {
        self.count as usize
    }

    pub fn mask(&self) -> Option<u64> {
        self.mask
    }

    /// Two layouts are compatible when they carry the same number of channels.
    ///
    /// Masks are informational; the conversion stages only look at counts.
    pub fn same_channels(&self, other: &ChannelLayout) -> bool {
        self.count == other.count
    }
}

/// The (format, rate, layout) triple a conversion stage reads or writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioTriple {
    pub format: SampleFormat,
    pub sample_rate: u32,
    pub layout: ChannelLayout,
}

impl AudioTriple {
    pub fn new(format: SampleFormat, sample_rate: u32, layout: ChannelLayout) -> Self {
        Self {
            format,
            sample_rate,
            layout,
        }
    }

    pub fn channels(&self) -> usize {
        self.layout.count()
    }

    /// Equality that ignores the speaker mask.
    pub fn matches(&self, other: &AudioTriple) -> bool {
        self.format == other.format
            && self.sample_rate == other.sample_rate
            && self.layout.same_channels(&other.layout)
    }
}

impl fmt::Display for AudioTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}Hz/{}ch",
            self.format,
            self.sample_rate,
            self.layout.count()
        )
    }
}

/// Read-only audio metadata surface, used for display and for sizing the pipeline.
pub trait AudioMetaInfo {
    fn duration(&self) -> Option<Duration>;
    fn bit_rate(&self) -> u64;
    fn bit_depth(&self) -> u32;
    fn channels(&self) -> usize;
    fn sample_rate(&self) -> u32;
    fn sample_format(&self) -> SampleFormat;
}

/// Immutable description of an opened audio stream.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioStreamDescriptor {
    pub format: SampleFormat,
    pub sample_rate: u32,
    pub layout: ChannelLayout,
    pub bit_depth: u32,
    /// Approximate bits per second.
    pub bit_rate: u64,
    pub duration: Option<Duration>,
}

impl AudioStreamDescriptor {
    pub fn triple(&self) -> AudioTriple {
        AudioTriple::new(self.format, self.sample_rate, self.layout)
    }
}

impl AudioMetaInfo for AudioStreamDescriptor {
    fn duration(&self) -> Option<Duration> {
        self.duration
    }

    fn bit_rate(&self) -> u64 {
        self.bit_rate
    }

    fn bit_depth(&self) -> u32 {
        self.bit_depth
    }

    fn channels(&self) -> usize {
        self.layout.count()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn sample_format(&self) -> SampleFormat {
        self.format
    }
}

/// Best-effort bit rate from a byte length and a duration.
pub(crate) fn approximate_bit_rate(byte_len: Option<u64>, duration: Option<Duration>) -> u64 {
    match (byte_len, duration) {
        (Some(bytes), Some(d)) if d.as_millis() > 0 => {
            bytes.saturating_mul(8).saturating_mul(1000) / d.as_millis() as u64
        }
        _ => 0,
    }
}
