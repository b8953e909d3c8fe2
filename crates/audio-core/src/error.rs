//! Error taxonomy for the playback core.
//!
//! Open-time failures (`Open`, `StreamNotFound`) are fatal to pipeline construction.
//! Mid-stream failures (`Read`, `Decode`) are fatal to the running pipeline.
//! End of stream is never an error: it travels through the notification path in
//! [`crate::source`].

use std::collections::TryReserveError;

use symphonia::core::errors::Error as SymphoniaError;

/// Errors raised by the playback core.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    /// The resource could not be read, or its container is not supported.
    #[error("cannot open {uri}: {reason}")]
    Open { uri: String, reason: String },

    /// The resource opened but carries no audio stream.
    #[error("no audio stream in {uri}")]
    StreamNotFound { uri: String },

    /// A packet read failed for a reason other than end of stream.
    #[error("read error: {0}")]
    Read(#[source] SymphoniaError),

    /// The codec rejected a packet.
    #[error("decode error: {0}")]
    Decode(#[source] SymphoniaError),

    /// Growing a conversion buffer failed.
    #[error("resample buffer allocation failed: {0}")]
    ResampleAllocation(#[from] TryReserveError),

    /// The rate converter could not be built or failed while processing.
    #[error("resampler error: {0}")]
    Resampler(String),

    /// A sample format/layout that cannot be converted.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Declared and actual stream triples disagree.
    #[error("stream spec mismatch: expected {expected}, got {actual}")]
    SpecMismatch { expected: String, actual: String },

    /// The audio device could not be opened or controlled.
    #[error("device error: {0}")]
    Device(String),
}

pub type Result<T> = std::result::Result<T, PlayerError>;

impl PlayerError {
    pub(crate) fn open(uri: &str, reason: impl ToString) -> Self {
        PlayerError::Open {
            uri: uri.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn device(reason: impl ToString) -> Self {
        PlayerError::Device(reason.to_string())
    }

    /// Whether the error happened while a pipeline was already running.
    pub fn is_mid_stream(&self) -> bool {
        matches!(self, PlayerError::Read(_) | PlayerError::Decode(_))
    }
}
