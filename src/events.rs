//! Events emitted by the engine's audio thread.
//!
//! Per-buffer transient failures (underruns, device loss, a source whose
//! renderer handle could not be allocated) never terminate the audio thread;
//! they are reported here and drained from the control thread via
//! [`Engine::poll_events`](crate::Engine::poll_events).

use crate::sound::SourceId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The audio thread started and the output stream is live.
    Started,
    /// The audio thread exited after a stop request.
    Stopped,
    /// The sink ran dry and silence was substituted.
    SinkUnderrun,
    /// A write to the sink failed.
    SinkWriteFailed,
    /// The output device disappeared; the driver will try to reopen it.
    DeviceLost,
    /// A lost device was reopened successfully.
    DeviceRecovered,
    /// Reopening failed repeatedly; the engine now discards its output.
    OutputSilenced,
    /// The renderer could not allocate a handle for this source; it is
    /// skipped in the mix.
    SourceAllocationFailed { source: SourceId },
}

impl EngineEvent {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::SinkUnderrun
                | Self::SinkWriteFailed
                | Self::DeviceLost
                | Self::OutputSilenced
                | Self::SourceAllocationFailed { .. }
        )
    }

    pub fn source_id(&self) -> Option<SourceId> {
        match self {
            Self::SourceAllocationFailed { source } => Some(*source),
            _ => None,
        }
    }
}
