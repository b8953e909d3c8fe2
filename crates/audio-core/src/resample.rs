//! Format, rate and channel-layout conversion.
//!
//! A [`Resampler`] converts between a source and a target [`AudioTriple`] in one of two
//! directions:
//!
//! - [`Direction::Extract`]: one decoded frame in, one linear byte buffer out, for playback.
//! - [`Direction::Accumulate`]: arbitrary-length sample blocks in, fixed-capacity frames out.
//!   A write cursor into the target frame persists across calls and converted samples that
//!   do not fit are held back as buffered delay.
//!
//! Samples travel as interleaved `f64`. Channel mapping runs before rate conversion so the
//! rate stage only ever sees the target channel count. Rate conversion uses Rubato's
//! asynchronous sinc resampler with a fixed input chunk; input that does not fill a chunk is
//! staged until more arrives or the stream is flushed.

use audioadapter_buffers::direct::InterleavedSlice;
use rubato::Resampler as RubatoResampler;
use rubato::{
    Async, FixedAsync, Indexing, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

use crate::convert::{encode_interleaved, map_channels, read_interleaved, write_into_frame};
use crate::error::{PlayerError, Result};
use crate::format::AudioTriple;
use crate::frame::AudioFrame;

/// Which way a [`Resampler`] was built to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Extract,
    Accumulate,
}

/// Result of one [`Resampler::write_frame`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteOutcome {
    /// The target frame reached capacity during this call.
    pub is_full: bool,
    /// Remaining capacity minus buffered delay.
    ///
    /// Positive: the frame needs that many more samples. Negative: enough samples are
    /// already buffered to complete the frame on the next call, even with an empty block.
    pub net_remaining: i64,
}

/// Write offset into the current accumulate target frame.
#[derive(Clone, Copy, Debug, Default)]
struct ResampleCursor {
    offset: usize,
}

/// Bytes produced by one [`Resampler::extract`] call.
///
/// Borrowed from the resampler; valid until its next call.
#[derive(Clone, Copy, Debug)]
pub struct Extracted<'a> {
    bytes: &'a [u8],
    planes: usize,
}

impl<'a> Extracted<'a> {
    fn empty() -> Self {
        Self {
            bytes: &[],
            planes: 1,
        }
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn plane_count(&self) -> usize {
        self.planes
    }

    /// Bytes in each plane: `samples * bytes_per_sample`, times the channel count when packed.
    pub fn plane_len(&self) -> usize {
        self.bytes.len() / self.planes
    }

    pub fn plane(&self, index: usize) -> &'a [u8] {
        let len = self.plane_len();
        &self.bytes[index * len..(index + 1) * len]
    }

    pub fn planes(&self) -> impl Iterator<Item = &'a [u8]> {
        let this = *self;
        (0..this.planes).map(move |i| this.plane(i))
    }
}

/// Upper bound on output samples for `input` new samples with `delay` samples already held
/// by the rate stage: `ceil((delay + input) * target_rate / source_rate)`.
pub fn max_output_samples(delay: usize, input: usize, source_rate: u32, target_rate: u32) -> usize {
    if source_rate == 0 {
        return 0;
    }
    let total = (delay + input) as u128 * target_rate as u128;
    total.div_ceil(source_rate as u128) as usize
}

/// Rubato sinc resampler with input staging.
struct RateStage {
    inner: Async<f64>,
    channels: usize,
    chunk_frames: usize,
    staged: Vec<f64>,
    scratch: Vec<f64>,
}

impl RateStage {
    fn new(source_rate: u32, target_rate: u32, channels: usize, chunk_frames: usize) -> Result<Self> {
        let f_ratio = target_rate as f64 / source_rate as f64;

        let sinc_len = 128;
        let oversampling_factor = 256;
        let interpolation = SincInterpolationType::Cubic;
        let window = WindowFunction::BlackmanHarris2;
        let f_cutoff = calculate_cutoff(sinc_len, window);

        let params = SincInterpolationParameters {
            sinc_len,
            f_cutoff,
            interpolation,
            oversampling_factor,
            window,
        };

        let chunk_frames = chunk_frames.max(1);
        let inner = Async::<f64>::new_sinc(
            f_ratio,
            1.1,
            &params,
            chunk_frames,
            channels,
            FixedAsync::Input,
        )
        .map_err(|e| PlayerError::Resampler(e.to_string()))?;

        let mut scratch = Vec::new();
        let len = inner.output_frames_max() * channels;
        scratch.try_reserve_exact(len)?;
        scratch.resize(len, 0.0);

        Ok(Self {
            inner,
            channels,
            chunk_frames,
            staged: Vec::new(),
            scratch,
        })
    }

    /// Input frames waiting for a full chunk.
    fn staged_frames(&self) -> usize {
        self.staged.len() / self.channels
    }

    /// Stage `input` and run every complete chunk, appending output to `out`.
    fn process(&mut self, input: &[f64], out: &mut Vec<f64>) -> Result<()> {
        self.staged.try_reserve(input.len())?;
        self.staged.extend_from_slice(input);

        let chunk_len = self.chunk_frames * self.channels;
        let mut consumed = 0;
        while self.staged.len() - consumed >= chunk_len {
            let chunk = &self.staged[consumed..consumed + chunk_len];
            run_chunk(
                &mut self.inner,
                chunk,
                self.channels,
                self.chunk_frames,
                None,
                &mut self.scratch,
                out,
            )?;
            consumed += chunk_len;
        }
        self.staged.drain(..consumed);
        Ok(())
    }

    /// Push staged input through as a partial chunk.
    fn flush(&mut self, out: &mut Vec<f64>) -> Result<()> {
        let tail_frames = self.staged_frames();
        if tail_frames == 0 {
            return Ok(());
        }
        run_chunk(
            &mut self.inner,
            &self.staged,
            self.channels,
            tail_frames,
            Some(tail_frames),
            &mut self.scratch,
            out,
        )?;
        self.staged.clear();
        Ok(())
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.staged.clear();
    }
}

fn run_chunk(
    resampler: &mut Async<f64>,
    input: &[f64],
    channels: usize,
    frames: usize,
    partial_len: Option<usize>,
    scratch: &mut [f64],
    out: &mut Vec<f64>,
) -> Result<()> {
    let nbr_out = {
        let input_adapter = InterleavedSlice::new(input, channels, frames)
            .map_err(|e| PlayerError::Resampler(format!("input buffer: {e}")))?;

        let out_capacity_frames = scratch.len() / channels;
        let mut output_adapter = InterleavedSlice::new_mut(&mut *scratch, channels, out_capacity_frames)
            .map_err(|e| PlayerError::Resampler(format!("output buffer: {e}")))?;

        let indexing = Indexing {
            input_offset: 0,
            output_offset: 0,
            active_channels_mask: None,
            partial_len,
        };

        let (_nbr_in, nbr_out) = resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing))
            .map_err(|e| PlayerError::Resampler(e.to_string()))?;
        nbr_out
    };

    let produced = nbr_out * channels;
    out.try_reserve(produced)?;
    out.extend_from_slice(&scratch[..produced]);
    Ok(())
}

/// Converter between two sample triples.
pub struct Resampler {
    source: AudioTriple,
    target: AudioTriple,
    direction: Direction,
    closed: bool,
    rate: Option<RateStage>,
    decoded: Vec<f64>,
    mapped: Vec<f64>,
    converted: Vec<f64>,
    out: Vec<u8>,
    /// Converted target-rate samples not yet written to a target frame.
    pending: Vec<f64>,
    cursor: ResampleCursor,
}

impl Resampler {
    /// Build a converter from `source` to `target`.
    ///
    /// `chunk_frames` is the rate stage's fixed input chunk; it is unused when both rates
    /// are equal.
    pub fn new(
        source: AudioTriple,
        target: AudioTriple,
        direction: Direction,
        chunk_frames: usize,
    ) -> Result<Self> {
        for triple in [&source, &target] {
            if triple.format.bytes_per_sample() == 0 {
                return Err(PlayerError::Unsupported(format!("sample format {}", triple.format)));
            }
            if triple.channels() == 0 || triple.sample_rate == 0 {
                return Err(PlayerError::Unsupported(format!("stream {triple}")));
            }
        }

        let rate = if source.sample_rate != target.sample_rate {
            Some(RateStage::new(
                source.sample_rate,
                target.sample_rate,
                target.channels(),
                chunk_frames,
            )?)
        } else {
            None
        };

        tracing::debug!(
            from = %source,
            to = %target,
            direction = ?direction,
            rate_conversion = rate.is_some(),
            "resampler ready"
        );

        Ok(Self {
            source,
            target,
            direction,
            closed: false,
            rate,
            decoded: Vec::new(),
            mapped: Vec::new(),
            converted: Vec::new(),
            out: Vec::new(),
            pending: Vec::new(),
            cursor: ResampleCursor::default(),
        })
    }

    pub fn source(&self) -> AudioTriple {
        self.source
    }

    pub fn target(&self) -> AudioTriple {
        self.target
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Samples per channel held inside the rate stage, in source-rate units.
    pub fn rate_delay(&self) -> usize {
        self.rate.as_ref().map_or(0, RateStage::staged_frames)
    }

    /// Samples per channel converted but not yet surfaced, in target-rate units.
    pub fn buffered_delay(&self) -> usize {
        let staged = max_output_samples(
            self.rate_delay(),
            0,
            self.source.sample_rate,
            self.target.sample_rate,
        );
        self.pending.len() / self.target.channels() + staged
    }

    /// Current write offset into the accumulate target frame.
    pub fn cursor(&self) -> usize {
        self.cursor.offset
    }

    /// Bytes produced by the last extract or flush.
    pub fn last_output(&self) -> &[u8] {
        &self.out
    }

    /// Upper bound on the output of an extract call with `input` samples per channel.
    pub fn max_output_samples(&self, input: usize) -> usize {
        max_output_samples(
            self.rate_delay(),
            input,
            self.source.sample_rate,
            self.target.sample_rate,
        )
    }

    /// Convert one decoded frame into target-format bytes.
    ///
    /// Returns exactly the bytes produced, possibly none while the rate stage is filling.
    /// Empty once closed or when built for accumulation.
    pub fn extract(&mut self, frame: &AudioFrame) -> Result<Extracted<'_>> {
        if self.closed || self.direction != Direction::Extract {
            return Ok(Extracted::empty());
        }
        self.check_input(frame)?;

        self.out.clear();
        let planes = self.target_planes();

        if self.rate.is_none() && self.source.matches(&self.target) {
            let needed = frame.samples() * frame.stride() * frame.plane_count();
            self.out.try_reserve(needed)?;
            for plane in frame.planes() {
                self.out.extend_from_slice(plane);
            }
            return Ok(Extracted {
                bytes: &self.out,
                planes,
            });
        }

        let first_estimate = max_output_samples(
            0,
            frame.samples(),
            self.source.sample_rate,
            self.target.sample_rate,
        );
        let estimate = self.max_output_samples(frame.samples());
        let bytes_per_frame = self.target.format.bytes_per_sample() * self.target.channels();
        self.out
            .try_reserve(first_estimate.max(estimate) * bytes_per_frame)?;

        self.decoded.clear();
        read_interleaved(frame, &mut self.decoded)?;
        self.mapped.clear();
        map_channels(
            &self.decoded,
            self.source.channels(),
            self.target.channels(),
            &mut self.mapped,
        )?;

        let samples = match self.rate.as_mut() {
            Some(rate) => {
                self.converted.clear();
                rate.process(&self.mapped, &mut self.converted)?;
                &self.converted
            }
            None => &self.mapped,
        };
        encode_interleaved(samples, self.target.channels(), self.target.format, &mut self.out)?;

        Ok(Extracted {
            bytes: &self.out,
            planes,
        })
    }

    /// Drain whatever the rate stage still holds at the end of a stream.
    pub fn flush(&mut self) -> Result<Extracted<'_>> {
        if self.closed || self.direction != Direction::Extract {
            return Ok(Extracted::empty());
        }
        self.out.clear();
        let Some(rate) = self.rate.as_mut() else {
            return Ok(Extracted::empty());
        };
        self.converted.clear();
        rate.flush(&mut self.converted)?;
        encode_interleaved(
            &self.converted,
            self.target.channels(),
            self.target.format,
            &mut self.out,
        )?;
        Ok(Extracted {
            bytes: &self.out,
            planes: self.target_planes(),
        })
    }

    /// Convert `block` and write as much as fits into `target`.
    ///
    /// The write cursor persists across calls and resets to zero when `target` fills.
    /// `block` may be empty to drain buffered samples into the frame.
    pub fn write_frame(&mut self, target: &mut AudioFrame, block: &AudioFrame) -> Result<WriteOutcome> {
        if self.closed || self.direction != Direction::Accumulate {
            return Ok(WriteOutcome {
                is_full: false,
                net_remaining: 0,
            });
        }
        if !block.is_empty() {
            self.check_input(block)?;
        }
        if !target.triple().matches(&self.target) {
            return Err(PlayerError::SpecMismatch {
                expected: self.target.to_string(),
                actual: target.triple().to_string(),
            });
        }

        if !block.is_empty() {
            self.decoded.clear();
            read_interleaved(block, &mut self.decoded)?;
            self.mapped.clear();
            map_channels(
                &self.decoded,
                self.source.channels(),
                self.target.channels(),
                &mut self.mapped,
            )?;
            match self.rate.as_mut() {
                Some(rate) => rate.process(&self.mapped, &mut self.pending)?,
                None => {
                    self.pending.try_reserve(self.mapped.len())?;
                    self.pending.extend_from_slice(&self.mapped);
                }
            }
        }

        let channels = self.target.channels();
        let capacity = target.capacity();
        let offset = self.cursor.offset.min(capacity);
        let room = capacity - offset;
        let take = room.min(self.pending.len() / channels);
        let written = write_into_frame(target, offset, &self.pending[..take * channels]);
        self.pending.drain(..written * channels);
        self.cursor.offset = offset + written;
        target.set_samples(self.cursor.offset);

        let remaining = capacity - self.cursor.offset;
        let net_remaining = remaining as i64 - self.buffered_delay() as i64;
        let is_full = remaining == 0;
        if is_full {
            self.cursor.offset = 0;
        }
        Ok(WriteOutcome {
            is_full,
            net_remaining,
        })
    }

    /// Drop all buffered samples and rewind the accumulate cursor, e.g. after a seek.
    pub fn reset(&mut self) {
        if let Some(rate) = self.rate.as_mut() {
            rate.reset();
        }
        self.pending.clear();
        self.out.clear();
        self.cursor = ResampleCursor::default();
    }

    /// Release buffers; later calls produce nothing. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.rate = None;
        self.decoded = Vec::new();
        self.mapped = Vec::new();
        self.converted = Vec::new();
        self.out = Vec::new();
        self.pending = Vec::new();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn check_input(&self, frame: &AudioFrame) -> Result<()> {
        if frame.triple().matches(&self.source) {
            Ok(())
        } else {
            Err(PlayerError::SpecMismatch {
                expected: self.source.to_string(),
                actual: frame.triple().to_string(),
            })
        }
    }

    fn target_planes(&self) -> usize {
        if self.target.format.is_planar() {
            self.target.channels()
        } else {
            1
        }
    }
}
