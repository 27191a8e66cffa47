//! Error types for soundfield

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SoundfieldError {
    /// No output device matched the request.
    #[error("output device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Device/format negotiation yielded no usable PCM format.
    #[error("output format unsupported: {0}")]
    FormatUnsupported(String),

    /// The spatial renderer failed to allocate its context.
    #[error("renderer initialization failed: {0}")]
    RendererInit(String),

    /// The renderer could not allocate a per-source handle.
    #[error("source allocation failed: {0}")]
    SourceAllocation(String),

    /// Writing to the audio sink failed (transient, recoverable).
    #[error("sink write failed: {0}")]
    SinkWrite(String),

    #[error("engine error: {0}")]
    Engine(String),
}

pub type Result<T> = std::result::Result<T, SoundfieldError>;
