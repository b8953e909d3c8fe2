//! cpal-backed output devices.
//!
//! [`CpalBackend`] implements [`AudioBackend`]:
//! - selecting either the default device or a device by substring match
//! - negotiating the closest supported config to a wanted [`DeviceSpec`]
//! - running each opened stream on its own thread (cpal streams are not `Send`), controlled
//!   over a command channel
//!
//! The data callback renders into a byte scratch buffer through the engine's
//! [`RenderCallback`] and reinterprets it as the device's native sample type.

use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Sender, bounded, unbounded};

use crate::error::{PlayerError, Result};
use crate::format::SampleFormat;
use crate::output::{AudioBackend, DeviceHandle, DeviceSpec, RenderCallback};

/// Pick the first output device matching `needle` (case-insensitive), or the default device.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    let mut devices: Vec<cpal::Device> = host
        .output_devices()
        .map_err(|e| PlayerError::device(format!("no output devices: {e}")))?
        .collect();

    if let Some(needle) = needle {
        return devices
            .drain(..)
            .find(|d| {
                d.description()
                    .map(|n| matches_device_name(&n.name(), needle))
                    .unwrap_or(false)
            })
            .ok_or_else(|| PlayerError::device(format!("no output device matched: {needle}")));
    }

    host.default_output_device()
        .ok_or_else(|| PlayerError::device("no default output device"))
}

/// Choose the supported config closest to `wanted`.
///
/// Ranking, most important first: same channel count, a rate at or below the wanted rate
/// (the highest such), then the sample format (the wanted one first, float, 32-bit, 16-bit,
/// 8-bit). Ranges in formats the engine cannot write are skipped.
pub fn pick_output_config(
    device: &cpal::Device,
    wanted: &DeviceSpec,
) -> Result<cpal::SupportedStreamConfig> {
    let ranges = device
        .supported_output_configs()
        .map_err(|e| PlayerError::device(format!("supported configs: {e}")))?;

    let mut best: Option<(Candidate, cpal::SupportedStreamConfig)> = None;
    for range in ranges {
        let Some(format) = from_cpal_format(range.sample_format()) else {
            continue;
        };
        let rate = pick_rate_for_range(
            range.min_sample_rate(),
            range.max_sample_rate(),
            Some(wanted.sample_rate),
        );
        let candidate = Candidate {
            channels_match: range.channels() == wanted.channels,
            below: rate <= wanted.sample_rate,
            rate,
            format_rank: sample_format_rank(format, wanted.format),
        };
        if best.as_ref().is_none_or(|(b, _)| candidate.is_better_than(b)) {
            best = Some((candidate, range.with_sample_rate(rate)));
        }
    }

    best.map(|(_, cfg)| cfg)
        .ok_or_else(|| PlayerError::device("no supported output config"))
}

/// Fixed buffer size for `frames`, clamped to what the device advertises.
///
/// Returns `None` when the device does not report a range, so cpal uses its default.
pub fn pick_buffer_size(config: &cpal::SupportedStreamConfig, frames: u32) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            Some(cpal::BufferSize::Fixed(frames.clamp(*min, (*max).max(*min))))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    channels_match: bool,
    below: bool,
    rate: u32,
    format_rank: u8,
}

impl Candidate {
    fn is_better_than(&self, best: &Candidate) -> bool {
        if self.channels_match != best.channels_match {
            self.channels_match
        } else if self.below != best.below {
            self.below
        } else if self.rate != best.rate {
            if self.below {
                self.rate > best.rate
            } else {
                self.rate < best.rate
            }
        } else {
            self.format_rank < best.format_rank
        }
    }
}

fn pick_rate_for_range(min: u32, max: u32, target_rate: Option<u32>) -> u32 {
    match target_rate {
        Some(target) if target < min => min,
        Some(target) if target > max => max,
        Some(target) => target,
        None => max,
    }
}

fn sample_format_rank(format: SampleFormat, wanted: SampleFormat) -> u8 {
    if format == wanted {
        return 0;
    }
    match format {
        SampleFormat::Float32 => 1,
        SampleFormat::Signed32 => 2,
        SampleFormat::Signed16 => 3,
        SampleFormat::Unsigned8 => 4,
        _ => 10,
    }
}

fn from_cpal_format(format: cpal::SampleFormat) -> Option<SampleFormat> {
    match format {
        cpal::SampleFormat::U8 => Some(SampleFormat::Unsigned8),
        cpal::SampleFormat::I16 => Some(SampleFormat::Signed16),
        cpal::SampleFormat::I32 => Some(SampleFormat::Signed32),
        cpal::SampleFormat::F32 => Some(SampleFormat::Float32),
        _ => None,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}

/// Output device metadata for device listings.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub min_rate: u32,
    pub max_rate: u32,
    pub max_channels: u16,
    pub formats: Vec<SampleFormat>,
}

/// Describe every output device of `host`. Devices without a usable config are skipped.
pub fn list_device_infos(host: &cpal::Host) -> Result<Vec<DeviceInfo>> {
    let default_name = host
        .default_output_device()
        .and_then(|d| d.description().ok())
        .map(|d| d.name().to_string());
    let devices = host
        .output_devices()
        .map_err(|e| PlayerError::device(format!("no output devices: {e}")))?;

    let mut out = Vec::new();
    for d in devices {
        let Ok(description) = d.description() else {
            continue;
        };
        let name = description.name().to_string();
        let mut info = DeviceInfo {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            min_rate: u32::MAX,
            max_rate: 0,
            max_channels: 0,
            formats: Vec::new(),
        };
        if let Ok(ranges) = d.supported_output_configs() {
            for r in ranges {
                let Some(format) = from_cpal_format(r.sample_format()) else {
                    continue;
                };
                info.min_rate = info.min_rate.min(r.min_sample_rate());
                info.max_rate = info.max_rate.max(r.max_sample_rate());
                info.max_channels = info.max_channels.max(r.channels());
                if !info.formats.contains(&format) {
                    info.formats.push(format);
                }
            }
        }
        if info.formats.is_empty() || info.max_rate < info.min_rate {
            tracing::warn!(device = %info.name, "skipping device without a usable output config");
            continue;
        }
        out.push(info);
    }
    Ok(out)
}

/// Print available output devices to stdout.
pub fn list_devices(host: &cpal::Host) -> Result<()> {
    for (i, d) in list_device_infos(host)?.iter().enumerate() {
        let formats: Vec<&str> = d.formats.iter().map(|f| f.label()).collect();
        println!(
            "#{i}: {}{} ({}-{} Hz, up to {} ch, {})",
            d.name,
            if d.is_default { " [default]" } else { "" },
            d.min_rate,
            d.max_rate,
            d.max_channels,
            formats.join("/"),
        );
    }
    Ok(())
}

/// [`AudioBackend`] over the default cpal host.
#[derive(Clone, Debug, Default)]
pub struct CpalBackend {
    device_name: Option<String>,
}

impl CpalBackend {
    /// `device_name` selects a device by substring; `None` uses the host default.
    pub fn new(device_name: Option<String>) -> Self {
        let device_name = device_name.filter(|n| !n.trim().is_empty());
        Self { device_name }
    }

    fn device(&self) -> Result<cpal::Device> {
        pick_device(&cpal::default_host(), self.device_name.as_deref())
    }
}

impl AudioBackend for CpalBackend {
    type Handle = CpalHandle;

    fn negotiate(&self, wanted: &DeviceSpec) -> Result<DeviceSpec> {
        let device = self.device()?;
        let config = pick_output_config(&device, wanted)?;
        let format = from_cpal_format(config.sample_format())
            .ok_or_else(|| PlayerError::device("device format not supported"))?;
        let spec = DeviceSpec {
            sample_rate: config.sample_rate(),
            format,
            channels: config.channels(),
            buffer_frames: wanted.buffer_frames,
        };
        if spec != *wanted {
            tracing::debug!(?wanted, negotiated = ?spec, "device spec differs from stream");
        }
        Ok(spec)
    }

    fn open(&self, spec: &DeviceSpec, callback: RenderCallback) -> Result<CpalHandle> {
        let device_name = self.device_name.clone();
        let spec = *spec;
        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);
        let (cmd_tx, cmd_rx) = unbounded::<DeviceCommand>();

        let join = std::thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let stream = match open_stream(device_name.as_deref(), &spec, callback) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                while let Ok(cmd) = cmd_rx.recv() {
                    let res = match cmd {
                        DeviceCommand::Pause => stream.pause().map_err(|e| e.to_string()),
                        DeviceCommand::Resume => stream.play().map_err(|e| e.to_string()),
                        DeviceCommand::Close => break,
                    };
                    if let Err(e) = res {
                        tracing::warn!(?cmd, "output stream command failed: {e}");
                    }
                }
                drop(stream);
            })
            .map_err(|e| PlayerError::device(format!("spawn output thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(CpalHandle {
                cmd_tx,
                join: Some(join),
            }),
            Ok(Err(e)) => {
                let _ = join.join();
                Err(e)
            }
            Err(_) => {
                let _ = join.join();
                Err(PlayerError::device("output thread exited during open"))
            }
        }
    }
}

fn open_stream(
    device_name: Option<&str>,
    spec: &DeviceSpec,
    callback: RenderCallback,
) -> Result<cpal::Stream> {
    let device = pick_device(&cpal::default_host(), device_name)?;
    let config = pick_output_config(&device, spec)?;
    if config.sample_rate() != spec.sample_rate
        || config.channels() != spec.channels
        || from_cpal_format(config.sample_format()) != Some(spec.format)
    {
        return Err(PlayerError::device(format!(
            "device no longer offers {}",
            spec.triple()
        )));
    }

    let mut stream_config: cpal::StreamConfig = config.clone().into();
    if let Some(buf) = pick_buffer_size(&config, spec.buffer_frames) {
        stream_config.buffer_size = buf;
    }
    if let Ok(description) = device.description() {
        tracing::info!(
            device = %description.name(),
            buffer_size = ?stream_config.buffer_size,
            "output stream"
        );
    }

    let stream = match config.sample_format() {
        cpal::SampleFormat::U8 => build_stream::<u8>(&device, &stream_config, callback),
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, callback),
        cpal::SampleFormat::I32 => build_stream::<i32>(&device, &stream_config, callback),
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, callback),
        other => Err(PlayerError::Unsupported(format!("device sample format {other:?}"))),
    }?;
    // Devices start paused; some hosts begin playback as soon as the stream is built.
    let _ = stream.pause();
    Ok(stream)
}

/// Device sample types the render bytes can be reinterpreted as.
trait NativeSample: cpal::SizedSample + Send + 'static {
    const SIZE: usize;

    fn from_ne_slice(bytes: &[u8]) -> Self;
}

macro_rules! native_sample {
    ($($t:ty),*) => {$(
        impl NativeSample for $t {
            const SIZE: usize = std::mem::size_of::<$t>();

            fn from_ne_slice(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$t>()];
                raw.copy_from_slice(bytes);
                <$t>::from_ne_bytes(raw)
            }
        }
    )*};
}

native_sample!(u8, i16, i32, f32);

fn build_stream<T: NativeSample>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut callback: RenderCallback,
) -> Result<cpal::Stream> {
    let mut scratch: Vec<u8> = Vec::new();
    let err_fn = |err| tracing::warn!("stream error: {err}");

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _| {
                let len = data.len() * T::SIZE;
                if scratch.len() < len {
                    scratch.resize(len, 0);
                }
                let bytes = &mut scratch[..len];
                callback(bytes);
                for (dst, src) in data.iter_mut().zip(bytes.chunks_exact(T::SIZE)) {
                    *dst = T::from_ne_slice(src);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| PlayerError::device(format!("build output stream: {e}")))
}

#[derive(Clone, Copy, Debug)]
enum DeviceCommand {
    Pause,
    Resume,
    Close,
}

/// Handle to a stream running on its own thread. Dropping it closes the stream and joins
/// the thread.
pub struct CpalHandle {
    cmd_tx: Sender<DeviceCommand>,
    join: Option<JoinHandle<()>>,
}

impl CpalHandle {
    fn send(&self, cmd: DeviceCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| PlayerError::device("output thread is gone"))
    }
}

impl DeviceHandle for CpalHandle {
    fn pause(&self) -> Result<()> {
        self.send(DeviceCommand::Pause)
    }

    fn resume(&self) -> Result<()> {
        self.send(DeviceCommand::Resume)
    }
}

impl Drop for CpalHandle {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(DeviceCommand::Close);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                tracing::warn!("output thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(channels_match: bool, below: bool, rate: u32, format_rank: u8) -> Candidate {
        Candidate {
            channels_match,
            below,
            rate,
            format_rank,
        }
    }

    #[test]
    fn matches_device_name_is_case_insensitive() {
        assert!(matches_device_name("USB DAC", "dac"));
        assert!(matches_device_name("usb dac", "USB"));
        assert!(!matches_device_name("USB DAC", "speaker"));
        assert!(!matches_device_name("USB DAC", "  "));
    }

    #[test]
    fn pick_rate_for_range_prefers_target_when_in_range() {
        assert_eq!(pick_rate_for_range(44_100, 96_000, Some(48_000)), 48_000);
    }

    #[test]
    fn pick_rate_for_range_clamps() {
        assert_eq!(pick_rate_for_range(44_100, 96_000, Some(22_050)), 44_100);
        assert_eq!(pick_rate_for_range(44_100, 96_000, Some(192_000)), 96_000);
        assert_eq!(pick_rate_for_range(44_100, 96_000, None), 96_000);
    }

    #[test]
    fn channel_match_outranks_rate() {
        let stereo = candidate(true, true, 44_100, 3);
        let surround = candidate(false, true, 48_000, 0);
        assert!(stereo.is_better_than(&surround));
        assert!(!surround.is_better_than(&stereo));
    }

    #[test]
    fn prefers_rate_below_target_then_closest_above() {
        let below = candidate(true, true, 44_100, 1);
        let above = candidate(true, false, 96_000, 1);
        assert!(below.is_better_than(&above));

        let near = candidate(true, false, 48_000, 1);
        assert!(near.is_better_than(&above));
    }

    #[test]
    fn wanted_format_ranks_first() {
        assert_eq!(sample_format_rank(SampleFormat::Signed16, SampleFormat::Signed16), 0);
        assert!(
            sample_format_rank(SampleFormat::Float32, SampleFormat::Signed16)
                < sample_format_rank(SampleFormat::Unsigned8, SampleFormat::Signed16)
        );
        let exact = candidate(true, true, 48_000, 0);
        let float = candidate(true, true, 48_000, 1);
        assert!(exact.is_better_than(&float));
    }

    #[test]
    fn cpal_formats_map_to_device_native_formats() {
        for f in [
            cpal::SampleFormat::U8,
            cpal::SampleFormat::I16,
            cpal::SampleFormat::I32,
            cpal::SampleFormat::F32,
        ] {
            assert!(from_cpal_format(f).unwrap().is_device_native());
        }
        assert_eq!(from_cpal_format(cpal::SampleFormat::U16), None);
    }

    #[test]
    fn native_samples_decode_ne_bytes() {
        assert_eq!(i16::from_ne_slice(&(-1234i16).to_ne_bytes()), -1234);
        assert_eq!(f32::from_ne_slice(&0.5f32.to_ne_bytes()), 0.5);
        assert_eq!(u8::from_ne_slice(&[0x80]), 0x80);
    }

    #[test]
    fn blank_device_name_means_default() {
        assert_eq!(CpalBackend::new(Some("  ".to_string())).device_name, None);
        assert_eq!(
            CpalBackend::new(Some("dac".to_string())).device_name.as_deref(),
            Some("dac")
        );
    }
}
