//! Output sink contract: the opaque playback-device boundary this engine
//! writes stereo int16 frames into.
//!
//! Device I/O is explicitly out of scope; what's specified is the interface
//! shape a host implements, grounded in `outputqueue.h`'s `OutputQueue`
//! (`GetQueuedSamplesSize`/`QueueBytes`).

use crate::format::Format;
use crate::status::Status;

/// A playback device the engine hands encoded bytes to. Implementors own
/// the actual device/stream; this crate only ever calls `queued_sample_count`
/// and `queue`.
pub trait Sink {
    /// The sink's native format. Must match the engine's output format
    /// (typically `{i16, stereo, 32000 or 44100}`) or `queue` calls are a
    /// contract violation on the caller's part.
    fn format(&self) -> Format;

    /// Number of samples still queued for playback.
    fn queued_sample_count(&self) -> i64;

    /// Queues raw bytes of `self.format()`-typed samples for playback.
    fn queue(&mut self, bytes: &[u8]) -> Result<(), Status>;
}

/// An in-memory `Sink` for tests and offline rendering: every queued byte
/// is appended to a growable buffer, nothing is ever drained.
pub struct RecordingSink {
    format: Format,
    buffer: Vec<u8>,
}

impl RecordingSink {
    pub fn new(format: Format) -> Self {
        RecordingSink {
            format,
            buffer: Vec::new(),
        }
    }

    pub fn recorded_bytes(&self) -> &[u8] {
        &self.buffer
    }
}

impl Sink for RecordingSink {
    fn format(&self) -> Format {
        self.format
    }

    fn queued_sample_count(&self) -> i64 {
        let frame_bytes = self.format.layout.channel_count() * std::mem::size_of::<i16>();
        (self.buffer.len() / frame_bytes) as i64
    }

    fn queue(&mut self, bytes: &[u8]) -> Result<(), Status> {
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_counts_stereo_frames() {
        let mut sink = RecordingSink::new(Format::stereo_i16(32000));
        let frame_bytes = [0u8; 4]; // one L/R i16 pair
        sink.queue(&frame_bytes).unwrap();
        sink.queue(&frame_bytes).unwrap();
        assert_eq!(sink.queued_sample_count(), 2);
        assert_eq!(sink.recorded_bytes().len(), 8);
    }
}
