use bytes::BytesMut;
use tokio_util::codec::AnyDelimiterCodec;
use tokio_util::codec::Decoder;

use crate::transport::ChunkStream;
use crate::transport::TransportError;

/// Longest line accepted from the event stream, terminator excluded.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Buffered line reader over a chunked response body.
///
/// Chunks are accumulated until a `\n` arrives; the line is returned without
/// its terminator (a trailing `\r` is dropped too). Invalid UTF-8 is replaced
/// rather than rejected so a single bad byte cannot stall the stream. A line
/// longer than the limit fails with [`TransportError::Framing`].
pub struct LineReader {
    source: Box<dyn ChunkStream>,
    codec: AnyDelimiterCodec,
    buffer: BytesMut,
    eof: bool,
}

impl LineReader {
    pub fn new(source: Box<dyn ChunkStream>) -> Self {
        Self::with_max_length(source, MAX_LINE_LENGTH)
    }

    pub fn with_max_length(source: Box<dyn ChunkStream>, max_length: usize) -> Self {
        Self {
            source,
            codec: AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), Vec::new(), max_length),
            buffer: BytesMut::new(),
            eof: false,
        }
    }

    /// Next complete line, or `None` once the body has ended.
    ///
    /// Bytes after the last newline are returned as a final line at EOF.
    pub async fn next_line(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            let frame = if self.eof {
                self.codec.decode_eof(&mut self.buffer)?
            } else {
                self.codec.decode(&mut self.buffer)?
            };

            if let Some(line) = frame {
                return Ok(Some(decode(&line)));
            }

            if self.eof {
                return Ok(None);
            }

            match self.source.next_chunk().await? {
                Some(chunk) => self.buffer.extend_from_slice(&chunk),
                None => self.eof = true,
            }
        }
    }
}

fn decode(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}
