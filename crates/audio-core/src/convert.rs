//! Sample codec helpers shared by the resampler and the output callback.
//!
//! Conversions go through interleaved `f64` in `[-1.0, 1.0)`, which represents every
//! supported integer width up to 32 bits exactly. All byte data is native-endian.

use crate::error::Result;
use crate::format::SampleFormat;
use crate::frame::AudioFrame;

const U8_BIAS: f64 = 128.0;
const S16_SCALE: f64 = 32_768.0;
const S32_SCALE: f64 = 2_147_483_648.0;
const S64_SCALE: f64 = 9_223_372_036_854_775_808.0;

fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

/// Decode one sample. `bytes` must hold at least `format.bytes_per_sample()` bytes.
pub(crate) fn read_sample(format: SampleFormat, bytes: &[u8]) -> f64 {
    match format.packed() {
        SampleFormat::Unsigned8 => (bytes[0] as f64 - U8_BIAS) / U8_BIAS,
        SampleFormat::Signed16 => i16::from_ne_bytes(array(bytes)) as f64 / S16_SCALE,
        SampleFormat::Signed32 => i32::from_ne_bytes(array(bytes)) as f64 / S32_SCALE,
        SampleFormat::Float32 => f32::from_ne_bytes(array(bytes)) as f64,
        SampleFormat::Double => f64::from_ne_bytes(array(bytes)),
        SampleFormat::Signed64 => i64::from_ne_bytes(array(bytes)) as f64 / S64_SCALE,
        _ => 0.0,
    }
}

/// Encode one sample, clamping integer formats to their range.
pub(crate) fn write_sample(format: SampleFormat, value: f64, out: &mut [u8]) {
    match format.packed() {
        SampleFormat::Unsigned8 => {
            out[0] = (value * U8_BIAS + U8_BIAS).round().clamp(0.0, 255.0) as u8;
        }
        SampleFormat::Signed16 => {
            let v = (value * S16_SCALE).round().clamp(i16::MIN as f64, i16::MAX as f64) as i16;
            out[..2].copy_from_slice(&v.to_ne_bytes());
        }
        SampleFormat::Signed32 => {
            let v = (value * S32_SCALE).round().clamp(i32::MIN as f64, i32::MAX as f64) as i32;
            out[..4].copy_from_slice(&v.to_ne_bytes());
        }
        SampleFormat::Float32 => out[..4].copy_from_slice(&(value as f32).to_ne_bytes()),
        SampleFormat::Double => out[..8].copy_from_slice(&value.to_ne_bytes()),
        SampleFormat::Signed64 => {
            let v = (value * S64_SCALE).round() as i64;
            out[..8].copy_from_slice(&v.to_ne_bytes());
        }
        _ => {}
    }
}

/// Append the frame's valid samples to `out` as interleaved `f64`.
pub(crate) fn read_interleaved(frame: &AudioFrame, out: &mut Vec<f64>) -> Result<()> {
    let format = frame.triple().format;
    let bps = format.bytes_per_sample();
    let channels = frame.channels();
    let n = frame.samples();
    out.try_reserve(n * channels)?;

    if format.is_planar() {
        for i in 0..n {
            for ch in 0..channels {
                let plane = frame.plane(ch);
                out.push(read_sample(format, &plane[i * bps..]));
            }
        }
    } else {
        out.extend(
            frame
                .plane(0)
                .chunks_exact(bps)
                .map(|chunk| read_sample(format, chunk)),
        );
    }
    Ok(())
}

/// Encode interleaved `samples` into `out` in `format`.
///
/// Packed formats produce one interleaved run; planar formats produce one run per
/// channel, back to back.
pub(crate) fn encode_interleaved(
    samples: &[f64],
    channels: usize,
    format: SampleFormat,
    out: &mut Vec<u8>,
) -> Result<()> {
    let bps = format.bytes_per_sample();
    let frames = samples.len() / channels;
    let start = out.len();
    let needed = frames * channels * bps;
    out.try_reserve(needed)?;
    out.resize(start + needed, 0);
    let dst = &mut out[start..];

    if format.is_planar() {
        let plane_len = frames * bps;
        for (i, frame) in samples.chunks_exact(channels).enumerate() {
            for (ch, value) in frame.iter().enumerate() {
                let at = ch * plane_len + i * bps;
                write_sample(format, *value, &mut dst[at..at + bps]);
            }
        }
    } else {
        for (value, slot) in samples.iter().zip(dst.chunks_exact_mut(bps)) {
            write_sample(format, *value, slot);
        }
    }
    Ok(())
}

/// Write interleaved `samples` into `frame` starting at sample position `at`.
///
/// Returns the number of sample positions written, bounded by the frame capacity.
pub(crate) fn write_into_frame(frame: &mut AudioFrame, at: usize, samples: &[f64]) -> usize {
    let format = frame.triple().format;
    let bps = format.bytes_per_sample();
    let channels = frame.channels();
    let frames = (samples.len() / channels).min(frame.capacity().saturating_sub(at));

    if format.is_planar() {
        for ch in 0..channels {
            let plane = frame.plane_storage_mut(ch);
            for i in 0..frames {
                let pos = (at + i) * bps;
                write_sample(format, samples[i * channels + ch], &mut plane[pos..pos + bps]);
            }
        }
    } else {
        let plane = frame.plane_storage_mut(0);
        let base = at * channels * bps;
        for (k, value) in samples[..frames * channels].iter().enumerate() {
            let pos = base + k * bps;
            write_sample(format, *value, &mut plane[pos..pos + bps]);
        }
    }
    frames
}

/// Remap interleaved audio from `src` to `dst` channels, appending to `out`.
///
/// Mapping rules:
/// - same count: pass-through
/// - stereo → mono: average L/R
/// - otherwise: destination channel `n` reads source channel `min(n, src - 1)`,
///   which also duplicates mono into every output channel
pub(crate) fn map_channels(input: &[f64], src: usize, dst: usize, out: &mut Vec<f64>) -> Result<()> {
    if src == dst {
        out.try_reserve(input.len())?;
        out.extend_from_slice(input);
        return Ok(());
    }
    let frames = input.len() / src;
    out.try_reserve(frames * dst)?;
    for frame in input.chunks_exact(src) {
        match (src, dst) {
            (2, 1) => out.push(0.5 * (frame[0] + frame[1])),
            _ => {
                for ch in 0..dst {
                    out.push(frame[ch.min(src - 1)]);
                }
            }
        }
    }
    Ok(())
}

/// Scale samples in place by `volume / max_volume`.
///
/// Equivalent to mixing the source into a silent buffer at `volume`.
pub fn apply_volume(format: SampleFormat, bytes: &mut [u8], volume: u32, max_volume: u32) {
    if max_volume == 0 {
        return;
    }
    let bps = format.bytes_per_sample();
    if bps == 0 {
        return;
    }
    let vol = volume.min(max_volume) as i64;
    let max = max_volume as i64;
    let gain = vol as f64 / max as f64;
    for slot in bytes.chunks_exact_mut(bps) {
        match format.packed() {
            SampleFormat::Unsigned8 => {
                let centered = slot[0] as i64 - 128;
                slot[0] = (centered * vol / max + 128) as u8;
            }
            SampleFormat::Signed16 => {
                let v = i16::from_ne_bytes(array(slot)) as i64 * vol / max;
                slot.copy_from_slice(&(v as i16).to_ne_bytes());
            }
            SampleFormat::Signed32 => {
                let v = i32::from_ne_bytes(array(slot)) as i64 * vol / max;
                slot.copy_from_slice(&(v as i32).to_ne_bytes());
            }
            SampleFormat::Signed64 => {
                let v = (i64::from_ne_bytes(array(slot)) as i128 * vol as i128 / max as i128) as i64;
                slot.copy_from_slice(&v.to_ne_bytes());
            }
            SampleFormat::Float32 => {
                let v = f32::from_ne_bytes(array(slot)) * gain as f32;
                slot.copy_from_slice(&v.to_ne_bytes());
            }
            SampleFormat::Double => {
                let v = f64::from_ne_bytes(array(slot)) * gain;
                slot.copy_from_slice(&v.to_ne_bytes());
            }
            _ => {}
        }
    }
}
