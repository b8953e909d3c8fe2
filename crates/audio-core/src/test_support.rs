//! Fixtures shared by the unit tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{PlayerError, Result};
use crate::output::{AudioBackend, DeviceHandle, DeviceSpec, RenderCallback};

/// Deterministic, mostly non-zero PCM16 test signal.
pub(crate) fn sample_at(frame: usize, channel: u16) -> i16 {
    ((((frame * 37 + channel as usize * 101) % 2000) as i16) - 1000) * 8
}

/// Write a 16-bit PCM WAV of `frames` frames and return its path.
pub(crate) fn write_wav(dir: &Path, name: &str, rate: u32, channels: u16, frames: usize) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for i in 0..frames {
        for ch in 0..channels {
            writer.write_sample(sample_at(i, ch)).unwrap();
        }
    }
    writer.finalize().unwrap();
    path
}

#[derive(Default)]
struct FakeDeviceState {
    callback: Option<RenderCallback>,
    paused: bool,
    opened: usize,
    closed: usize,
}

/// In-memory backend: accepts any spec (optionally forcing one) and hands the render
/// callback to the test, which drives it with [`FakeBackend::render`].
#[derive(Clone, Default)]
pub(crate) struct FakeBackend {
    state: Arc<Mutex<FakeDeviceState>>,
    forced: Option<DeviceSpec>,
    fail_open: bool,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Backend whose device only supports `spec`.
    pub(crate) fn forcing(spec: DeviceSpec) -> Self {
        Self {
            forced: Some(spec),
            ..Self::default()
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    /// Invoke the render callback for `len` bytes. `None` when no device is open.
    pub(crate) fn render(&self, len: usize) -> Option<Vec<u8>> {
        let mut buf = vec![0xAAu8; len];
        let mut state = self.state.lock();
        let callback = state.callback.as_mut()?;
        callback(&mut buf);
        Some(buf)
    }

    pub(crate) fn is_open(&self) -> bool {
        self.state.lock().callback.is_some()
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    pub(crate) fn opened(&self) -> usize {
        self.state.lock().opened
    }

    pub(crate) fn closed(&self) -> usize {
        self.state.lock().closed
    }
}

pub(crate) struct FakeHandle {
    state: Arc<Mutex<FakeDeviceState>>,
}

impl DeviceHandle for FakeHandle {
    fn pause(&self) -> Result<()> {
        self.state.lock().paused = true;
        Ok(())
    }

    fn resume(&self) -> Result<()> {
        self.state.lock().paused = false;
        Ok(())
    }
}

impl Drop for FakeHandle {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.callback = None;
        state.closed += 1;
    }
}

impl AudioBackend for FakeBackend {
    type Handle = FakeHandle;

    fn negotiate(&self, wanted: &DeviceSpec) -> Result<DeviceSpec> {
        Ok(self.forced.unwrap_or(*wanted))
    }

    fn open(&self, _spec: &DeviceSpec, callback: RenderCallback) -> Result<FakeHandle> {
        if self.fail_open {
            return Err(PlayerError::device("no device"));
        }
        let mut state = self.state.lock();
        state.callback = Some(callback);
        state.paused = true;
        state.opened += 1;
        Ok(FakeHandle {
            state: self.state.clone(),
        })
    }
}
