//! Newline-delimited framing.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use memchr::memchr;
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use super::BoxedFramingError;

/// Config used to build a [`LineDecoder`].
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct LineDecoderConfig {
    /// The maximum length of a line, not counting the delimiter.
    ///
    /// By default no maximum is enforced; lines longer than this are
    /// discarded entirely.
    #[serde(default, skip_serializing_if = "super::is_default")]
    pub max_length: Option<usize>,
}

impl LineDecoderConfig {
    /// Build the `LineDecoder` from this configuration.
    pub const fn build(&self) -> LineDecoder {
        if let Some(max_length) = self.max_length {
            LineDecoder::new_with_max_length(max_length)
        } else {
            LineDecoder::new()
        }
    }
}

/// A decoder splitting a byte stream on LF. A trailing CR is stripped from
/// each frame, so CRLF-delimited input works unchanged.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LineDecoder {
    max_length: usize,
}

impl LineDecoder {
    /// Creates a new `LineDecoder` with no length limit.
    pub const fn new() -> Self {
        LineDecoder {
            max_length: usize::MAX,
        }
    }

    /// Creates a `LineDecoder` that discards lines longer than
    /// `max_length` bytes.
    pub const fn new_with_max_length(max_length: usize) -> Self {
        LineDecoder { max_length }
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        LineDecoder::new()
    }
}

fn strip_carriage_return(mut frame: BytesMut) -> Bytes {
    if frame.last() == Some(&b'\r') {
        frame.truncate(frame.len() - 1);
    }
    frame.freeze()
}

impl Decoder for LineDecoder {
    type Item = Bytes;
    type Error = BoxedFramingError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, Self::Error> {
        loop {
            match memchr(b'\n', buf) {
                None => return Ok(None),
                Some(delimiter_index) if delimiter_index > self.max_length => {
                    warn!(
                        message = "Discarding line longer than max_length.",
                        line_length = delimiter_index,
                        max_length = self.max_length,
                    );
                    buf.advance(delimiter_index + 1);
                }
                Some(delimiter_index) => {
                    let frame = buf.split_to(delimiter_index);
                    buf.advance(1);
                    return Ok(Some(strip_carriage_return(frame)));
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() => Ok(None),
            None if buf.len() > self.max_length => {
                warn!(
                    message = "Discarding line longer than max_length.",
                    line_length = buf.len(),
                    max_length = self.max_length,
                );
                buf.clear();
                Ok(None)
            }
            None => {
                let frame = buf.split_to(buf.len());
                Ok(Some(strip_carriage_return(frame)))
            }
        }
    }
}

/// An encoder appending an LF delimiter to each frame.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LineEncoder;

impl Encoder<Bytes> for LineEncoder {
    type Error = BoxedFramingError;

    fn encode(&mut self, frame: Bytes, buffer: &mut BytesMut) -> Result<(), Self::Error> {
        buffer.reserve(frame.len() + 1);
        buffer.extend_from_slice(&frame);
        buffer.put_u8(b'\n');
        Ok(())
    }
}
