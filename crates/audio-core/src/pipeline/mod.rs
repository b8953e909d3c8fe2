//! Pipeline wiring: packet source + decoder + optional resampler for one playlist entry.
//!
//! [`Pipeline::open`] performs the build half of a rebuild: open the source, prime it to the
//! first audio packet, build the decoder, negotiate a device spec and insert a resampler only
//! when the stream cannot be played as-is. The resulting [`FrameChain`] is what the output
//! engine's render callback pulls from.

use crate::config::PlaybackConfig;
use crate::decode::Decoder;
use crate::error::Result;
use crate::format::{AudioStreamDescriptor, AudioTriple};
use crate::output::{AudioBackend, AudioOutputEngine, DeviceSpec, PcmSource};
use crate::resample::{Direction, Resampler};
use crate::source::{EofHandler, PacketSource};

/// Decoder plus optional resampler, producing device-ready bytes.
pub struct FrameChain {
    decoder: Decoder,
    resampler: Option<Resampler>,
    generation: u64,
    flushed: bool,
    /// Which stage holds the current buffer.
    from_resampler: bool,
}

impl FrameChain {
    pub fn new(decoder: Decoder, resampler: Option<Resampler>) -> Self {
        Self {
            generation: decoder.generation(),
            decoder,
            resampler,
            flushed: false,
            from_resampler: false,
        }
    }

    pub fn is_resampling(&self) -> bool {
        self.resampler.is_some()
    }

    pub fn source(&self) -> &PacketSource {
        self.decoder.source()
    }

    fn sync_generation(&mut self) {
        let current = self.decoder.source().generation();
        if current != self.generation {
            if let Some(resampler) = self.resampler.as_mut() {
                resampler.reset();
            }
            self.generation = current;
            self.flushed = false;
        }
    }
}

impl PcmSource for FrameChain {
    /// Decode (and convert) until a non-empty buffer is available.
    ///
    /// At the end of the stream the resampler's tail is flushed once before reporting
    /// exhaustion.
    fn next_buffer(&mut self) -> Result<bool> {
        self.sync_generation();
        loop {
            if !self.decoder.advance()? {
                if let Some(resampler) = self.resampler.as_mut() {
                    if !self.flushed {
                        self.flushed = true;
                        if !resampler.flush()?.is_empty() {
                            self.from_resampler = true;
                            return Ok(true);
                        }
                    }
                }
                self.from_resampler = false;
                return Ok(false);
            }

            match self.resampler.as_mut() {
                Some(resampler) => {
                    if !resampler.extract(self.decoder.frame())?.is_empty() {
                        self.from_resampler = true;
                        return Ok(true);
                    }
                }
                None => {
                    if !self.decoder.frame().is_empty() {
                        self.from_resampler = false;
                        return Ok(true);
                    }
                }
            }
        }
    }

    fn buffer(&self) -> &[u8] {
        match (&self.resampler, self.from_resampler) {
            (Some(resampler), true) => resampler.last_output(),
            _ => {
                let frame = self.decoder.frame();
                if frame.plane_count() == 1 {
                    frame.plane(0)
                } else {
                    &[]
                }
            }
        }
    }

    fn output_triple(&self) -> AudioTriple {
        match &self.resampler {
            Some(resampler) => resampler.target(),
            None => self.decoder.output_triple(),
        }
    }

    fn generation(&self) -> u64 {
        self.decoder.source().generation()
    }

    fn end_of_stream(&mut self, generation: u64) {
        self.decoder.source().notify_end_of_stream_if_current(generation);
    }
}

/// Controller-side view of the active pipeline.
pub struct Pipeline {
    id: u64,
    source: PacketSource,
    device_spec: DeviceSpec,
    resampling: bool,
    codec: Option<String>,
}

impl Pipeline {
    /// Build the chain for `uri` and the device spec it plays on.
    ///
    /// `on_eof` fires once the render callback has played the last buffer, resampler tail
    /// included, rather than when the demuxer runs dry.
    pub fn open<B: AudioBackend>(
        id: u64,
        uri: &str,
        engine: &AudioOutputEngine<B>,
        cfg: &PlaybackConfig,
        on_eof: Option<EofHandler>,
    ) -> Result<(Self, FrameChain)> {
        let source = PacketSource::open(uri)?;
        source.defer_end_of_stream();
        if let Some(handler) = on_eof {
            source.set_end_of_stream_handler(handler);
        }

        match Self::build_chain(&source, engine, cfg) {
            Ok((device_spec, chain)) => {
                let pipeline = Self {
                    id,
                    resampling: chain.is_resampling(),
                    codec: chain.decoder.codec_name(),
                    source,
                    device_spec,
                };
                Ok((pipeline, chain))
            }
            Err(e) => {
                source.close();
                Err(e)
            }
        }
    }

    fn build_chain<B: AudioBackend>(
        source: &PacketSource,
        engine: &AudioOutputEngine<B>,
        cfg: &PlaybackConfig,
    ) -> Result<(DeviceSpec, FrameChain)> {
        source.advance()?;
        let decoder = Decoder::new(source.clone())?;

        let source_triple = decoder.output_triple();
        let wanted = DeviceSpec::wanted_for(source_triple, cfg.callback_frames);
        let device_spec = engine.negotiate(&wanted)?;
        let target = device_spec.triple();

        let resampler = if source_triple.matches(&target) {
            tracing::info!(rate_hz = target.sample_rate, format = %target.format, "resample skipped");
            None
        } else {
            tracing::info!(
                from = %source_triple,
                to = %target,
                "resampling"
            );
            Some(Resampler::new(
                source_triple,
                target,
                Direction::Extract,
                cfg.chunk_frames,
            )?)
        };

        Ok((device_spec, FrameChain::new(decoder, resampler)))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn uri(&self) -> &str {
        self.source.uri()
    }

    pub fn source(&self) -> &PacketSource {
        &self.source
    }

    pub fn descriptor(&self) -> &AudioStreamDescriptor {
        self.source.descriptor()
    }

    pub fn device_spec(&self) -> DeviceSpec {
        self.device_spec
    }

    pub fn is_resampling(&self) -> bool {
        self.resampling
    }

    pub fn codec(&self) -> Option<&str> {
        self.codec.as_deref()
    }

    /// Release the demuxer; the chain held by the device stops producing data.
    pub fn close(&self) {
        self.source.close();
    }
}
