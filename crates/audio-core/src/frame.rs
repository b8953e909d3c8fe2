//! Reusable sample buffers.
//!
//! [`AudioFrame`] backs three things: the decoder's output frame, the sample blocks fed
//! to the accumulating resampler, and the fixed-capacity frames it fills. A frame keeps
//! its allocation across uses; only the valid sample count changes.

use crate::error::{PlayerError, Result};
use crate::format::AudioTriple;

/// Sample data for one or more channels in a single format/rate/layout.
#[derive(Clone, Debug)]
pub struct AudioFrame {
    triple: AudioTriple,
    samples: usize,
    capacity: usize,
    planes: Vec<Vec<u8>>,
}

/// Decoded output of [`crate::decode::Decoder`]; valid until the next advance.
pub type DecodedFrame = AudioFrame;

impl AudioFrame {
    /// Zeroed frame able to hold `capacity` samples per channel.
    pub fn with_capacity(triple: AudioTriple, capacity: usize) -> Self {
        let stride = stride_of(&triple);
        let planes = (0..plane_count_of(&triple))
            .map(|_| vec![0u8; capacity * stride])
            .collect();
        Self {
            triple,
            samples: 0,
            capacity,
            planes,
        }
    }

    /// Frame over interleaved bytes. `triple.format` must be packed.
    pub fn from_packed(triple: AudioTriple, bytes: Vec<u8>) -> Result<Self> {
        if triple.format.is_planar() {
            return Err(PlayerError::Unsupported(format!(
                "{} is planar; use from_planes",
                triple.format
            )));
        }
        Self::from_planes(triple, vec![bytes])
    }

    /// Frame over one byte vector per plane.
    pub fn from_planes(triple: AudioTriple, planes: Vec<Vec<u8>>) -> Result<Self> {
        let stride = stride_of(&triple);
        if stride == 0 {
            return Err(PlayerError::Unsupported(format!("sample format {}", triple.format)));
        }
        if planes.len() != plane_count_of(&triple) {
            return Err(PlayerError::SpecMismatch {
                expected: format!("{} planes", plane_count_of(&triple)),
                actual: format!("{} planes", planes.len()),
            });
        }
        let Some(first) = planes.first() else {
            return Err(PlayerError::Unsupported("frame without channels".to_string()));
        };
        let len = first.len();
        if planes.iter().any(|p| p.len() != len) || len % stride != 0 {
            return Err(PlayerError::Unsupported(
                "plane lengths must be equal whole samples".to_string(),
            ));
        }
        let samples = len / stride;
        Ok(Self {
            triple,
            samples,
            capacity: samples,
            planes,
        })
    }

    pub fn triple(&self) -> AudioTriple {
        self.triple
    }

    pub fn channels(&self) -> usize {
        self.triple.channels()
    }

    /// Valid samples per channel.
    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }

    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    /// Bytes one sample position occupies inside a single plane.
    pub fn stride(&self) -> usize {
        stride_of(&self.triple)
    }

    /// Valid bytes of plane `index`.
    pub fn plane(&self, index: usize) -> &[u8] {
        &self.planes[index][..self.samples * self.stride()]
    }

    pub fn planes(&self) -> impl Iterator<Item = &[u8]> {
        (0..self.planes.len()).map(move |i| self.plane(i))
    }

    /// Full-capacity view of plane `index` for writers.
    pub(crate) fn plane_storage_mut(&mut self, index: usize) -> &mut [u8] {
        &mut self.planes[index]
    }

    pub(crate) fn set_samples(&mut self, samples: usize) {
        self.samples = samples.min(self.capacity);
    }

    /// Drop the first `samples` valid samples of every plane, keeping the rest in order.
    pub(crate) fn discard_front(&mut self, samples: usize) {
        let samples = samples.min(self.samples);
        if samples == 0 {
            return;
        }
        let stride = self.stride();
        let valid = self.samples * stride;
        for plane in &mut self.planes {
            plane.copy_within(samples * stride..valid, 0);
        }
        self.samples -= samples;
    }

    /// Replace the contents of a packed frame, growing the allocation when needed.
    pub(crate) fn copy_packed_from(&mut self, bytes: &[u8]) -> Result<()> {
        let stride = self.stride();
        if stride == 0 || self.planes.len() != 1 {
            return Err(PlayerError::Unsupported(format!(
                "packed copy into {}",
                self.triple.format
            )));
        }
        let plane = &mut self.planes[0];
        if bytes.len() > plane.len() {
            plane.try_reserve(bytes.len() - plane.len())?;
            plane.resize(bytes.len(), 0);
            self.capacity = bytes.len() / stride;
        }
        plane[..bytes.len()].copy_from_slice(bytes);
        self.samples = bytes.len() / stride;
        Ok(())
    }
}

fn plane_count_of(triple: &AudioTriple) -> usize {
    if triple.format.is_planar() {
        triple.channels()
    } else {
        1
    }
}

fn stride_of(triple: &AudioTriple) -> usize {
    let bps = triple.format.bytes_per_sample();
    if triple.format.is_planar() {
        bps
    } else {
        bps * triple.channels()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{ChannelLayout, SampleFormat};

    fn triple(format: SampleFormat) -> AudioTriple {
        AudioTriple::new(format, 48_000, ChannelLayout::stereo())
    }

    #[test]
    fn with_capacity_allocates_planes() {
        let packed = AudioFrame::with_capacity(triple(SampleFormat::Signed16), 10);
        assert_eq!(packed.plane_count(), 1);
        assert_eq!(packed.stride(), 4);
        assert!(packed.is_empty());

        let planar = AudioFrame::with_capacity(triple(SampleFormat::Float32Planar), 10);
        assert_eq!(planar.plane_count(), 2);
        assert_eq!(planar.stride(), 4);
    }

    #[test]
    fn from_packed_counts_samples() {
        let frame = AudioFrame::from_packed(triple(SampleFormat::Signed16), vec![0; 40]).unwrap();
        assert_eq!(frame.samples(), 10);
        assert_eq!(frame.plane(0).len(), 40);
    }

    #[test]
    fn from_packed_rejects_planar() {
        assert!(AudioFrame::from_packed(triple(SampleFormat::Signed16Planar), vec![0; 4]).is_err());
    }

    #[test]
    fn from_planes_rejects_ragged_planes() {
        let res = AudioFrame::from_planes(
            triple(SampleFormat::Signed16Planar),
            vec![vec![0; 4], vec![0; 6]],
        );
        assert!(res.is_err());
    }

    #[test]
    fn from_planes_rejects_frame_without_channels() {
        let empty = AudioTriple::new(
            SampleFormat::Signed16Planar,
            48_000,
            ChannelLayout::new(0),
        );
        assert!(AudioFrame::from_planes(empty, Vec::new()).is_err());
    }

    #[test]
    fn discard_front_keeps_the_tail() {
        let mut frame =
            AudioFrame::from_packed(triple(SampleFormat::Unsigned8), vec![1, 2, 3, 4, 5, 6]).unwrap();
        frame.discard_front(2);
        assert_eq!(frame.samples(), 1);
        assert_eq!(frame.plane(0), &[5, 6]);
        frame.discard_front(5);
        assert!(frame.is_empty());
    }

    #[test]
    fn copy_packed_from_grows_and_reuses() {
        let mut frame = AudioFrame::with_capacity(triple(SampleFormat::Unsigned8), 2);
        frame.copy_packed_from(&[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(frame.samples(), 3);
        assert_eq!(frame.capacity(), 3);
        frame.copy_packed_from(&[9, 9]).unwrap();
        assert_eq!(frame.samples(), 1);
        assert_eq!(frame.plane(0), &[9, 9]);
        assert_eq!(frame.capacity(), 3);
    }
}
