//! DJB netstring framing: `<decimal length>:<bytes>,`.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use snafu::Snafu;
use tokio_util::codec::{Decoder, Encoder};

use super::BoxedFramingError;

// A usize length fits in 20 decimal digits; anything longer is garbage,
// not a slow-arriving prefix.
const MAX_LENGTH_DIGITS: usize = 20;

/// A netstring that cannot be parsed.
#[derive(Debug, Snafu)]
pub enum NetstringError {
    /// The length prefix is not a decimal number.
    #[snafu(display("invalid netstring length prefix"))]
    InvalidLength,
    /// The byte after the payload is not the `,` terminator.
    #[snafu(display("netstring payload not followed by ','"))]
    InvalidTerminator,
    /// The declared payload length exceeds the configured maximum.
    #[snafu(display("netstring of {length} bytes exceeds limit of {limit}"))]
    FrameTooLong {
        /// The declared payload length.
        length: usize,
        /// The configured maximum.
        limit: usize,
    },
}

/// Config used to build a [`NetstringDecoder`].
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct NetstringDecoderConfig {
    /// The maximum payload length accepted.
    ///
    /// By default no maximum is enforced.
    #[serde(default, skip_serializing_if = "super::is_default")]
    pub max_length: Option<usize>,
}

impl NetstringDecoderConfig {
    /// Build the `NetstringDecoder` from this configuration.
    pub const fn build(&self) -> NetstringDecoder {
        if let Some(max_length) = self.max_length {
            NetstringDecoder::new_with_max_length(max_length)
        } else {
            NetstringDecoder::new()
        }
    }
}

/// An incremental netstring parser.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NetstringDecoder {
    max_length: usize,
}

impl NetstringDecoder {
    /// Creates a new `NetstringDecoder` with no length limit.
    pub const fn new() -> Self {
        NetstringDecoder {
            max_length: usize::MAX,
        }
    }

    /// Creates a `NetstringDecoder` rejecting payloads longer than
    /// `max_length` bytes.
    pub const fn new_with_max_length(max_length: usize) -> Self {
        NetstringDecoder { max_length }
    }
}

impl Default for NetstringDecoder {
    fn default() -> Self {
        NetstringDecoder::new()
    }
}

impl Decoder for NetstringDecoder {
    type Item = Bytes;
    type Error = BoxedFramingError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, Self::Error> {
        let colon = match buf.iter().position(|byte| !byte.is_ascii_digit()) {
            // Nothing but digits so far; wait for the colon, within reason.
            None if buf.len() <= MAX_LENGTH_DIGITS => return Ok(None),
            None => return Err(NetstringError::InvalidLength.into()),
            Some(position) if buf[position] == b':' && position > 0 => position,
            Some(_) => return Err(NetstringError::InvalidLength.into()),
        };
        let length: usize = std::str::from_utf8(&buf[..colon])
            .ok()
            .and_then(|digits| digits.parse().ok())
            .ok_or(NetstringError::InvalidLength)?;
        if length > self.max_length {
            return Err(NetstringError::FrameTooLong {
                length,
                limit: self.max_length,
            }
            .into());
        }
        let total = colon + 1 + length + 1;
        if buf.len() < total {
            return Ok(None);
        }
        if buf[colon + 1 + length] != b',' {
            return Err(NetstringError::InvalidTerminator.into());
        }
        buf.advance(colon + 1);
        let frame = buf.split_to(length).freeze();
        buf.advance(1);
        Ok(Some(frame))
    }
}

/// An encoder wrapping each frame in netstring length framing.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct NetstringEncoder;

impl NetstringEncoder {
    /// Creates a new `NetstringEncoder`.
    pub const fn new() -> Self {
        NetstringEncoder
    }
}

impl Encoder<Bytes> for NetstringEncoder {
    type Error = BoxedFramingError;

    fn encode(&mut self, frame: Bytes, buffer: &mut BytesMut) -> Result<(), Self::Error> {
        let prefix = frame.len().to_string();
        buffer.reserve(prefix.len() + frame.len() + 2);
        buffer.extend_from_slice(prefix.as_bytes());
        buffer.put_u8(b':');
        buffer.extend_from_slice(&frame);
        buffer.put_u8(b',');
        Ok(())
    }
}
