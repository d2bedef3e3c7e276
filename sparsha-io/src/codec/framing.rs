//! Reassembly of frames split across transport reads

use crate::core::types::DataFormat;
use serde::de::IgnoredAny;

/// Bytes held while waiting for a frame terminator
const MAX_PENDING: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Framing {
    /// Newline-terminated text frames
    Lines,
    /// Top-level JSON values, with or without separators
    Objects,
    /// Fixed-size binary words
    Words(usize),
    /// No framing, chunks pass through
    Raw,
}

/// Accumulates transport chunks and releases only complete frames
///
/// The bytes returned by [`FrameBuffer::push`] always end on a frame
/// boundary; anything after the last boundary is retained for the next call.
#[derive(Debug)]
pub struct FrameBuffer {
    framing: Framing,
    pending: Vec<u8>,
}

impl FrameBuffer {
    pub fn for_format(format: DataFormat) -> Self {
        let framing = match format {
            DataFormat::AsciiCsv => Framing::Lines,
            DataFormat::Json => Framing::Objects,
            DataFormat::BinaryFloat => Framing::Words(4),
            DataFormat::Mock => Framing::Raw,
        };
        Self {
            framing,
            pending: Vec::with_capacity(4096),
        }
    }

    /// Append a chunk and return the complete frames now available
    pub fn push(&mut self, chunk: &[u8]) -> Vec<u8> {
        self.pending.extend_from_slice(chunk);

        let complete = match self.framing {
            Framing::Raw => self.pending.len(),
            Framing::Lines => self
                .pending
                .iter()
                .rposition(|b| *b == b'\n')
                .map_or(0, |pos| pos + 1),
            Framing::Objects => json_boundary(&self.pending),
            Framing::Words(size) => self.pending.len() - self.pending.len() % size,
        };

        let frames: Vec<u8> = self.pending.drain(..complete).collect();

        if self.pending.len() > MAX_PENDING {
            log::warn!(
                "Discarding {} buffered bytes without frame boundary",
                self.pending.len()
            );
            self.pending.clear();
        }

        frames
    }

    /// Bytes waiting for completion
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// End of the last complete top-level JSON value in `pending`
///
/// A truncated value keeps its bytes pending. A syntax error releases
/// everything so the decoder rejects the chunk instead of stalling on it.
fn json_boundary(pending: &[u8]) -> usize {
    let mut values = serde_json::Deserializer::from_slice(pending).into_iter::<IgnoredAny>();
    let mut boundary = 0;
    loop {
        match values.next() {
            Some(Ok(_)) => boundary = values.byte_offset(),
            Some(Err(e)) if e.is_eof() => return boundary,
            Some(Err(_)) => return pending.len(),
            None => return pending.len(),
        }
    }
}
