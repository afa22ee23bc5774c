//! Big-endian length-prefixed framing, in 8-, 16- or 32-bit widths.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use super::BoxedFramingError;

/// Options shared by the length-prefixed decoder and encoder.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct LengthPrefixedCoderOptions {
    /// The number of bytes in the length prefix: 1, 2 or 4 (8-, 16- or
    /// 32-bit).
    #[serde(default = "default_length_field_length")]
    pub length_field_length: usize,
}

const fn default_length_field_length() -> usize {
    4
}

impl Default for LengthPrefixedCoderOptions {
    fn default() -> Self {
        LengthPrefixedCoderOptions {
            length_field_length: default_length_field_length(),
        }
    }
}

impl LengthPrefixedCoderOptions {
    /// Options for a prefix of the given bit width (8, 16 or 32).
    pub const fn with_prefix_bits(bits: usize) -> Self {
        LengthPrefixedCoderOptions {
            length_field_length: bits / 8,
        }
    }

    fn build_codec(&self) -> LengthDelimitedCodec {
        LengthDelimitedCodec::builder()
            .length_field_length(self.length_field_length)
            .big_endian()
            .new_codec()
    }
}

/// Config used to build a [`LengthPrefixedDecoder`].
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct LengthPrefixedDecoderConfig {
    /// Options for the length-prefixed decoder.
    #[serde(default, skip_serializing_if = "super::is_default")]
    pub length_prefixed: LengthPrefixedCoderOptions,
}

impl LengthPrefixedDecoderConfig {
    /// Build the `LengthPrefixedDecoder` from this configuration.
    pub fn build(&self) -> LengthPrefixedDecoder {
        LengthPrefixedDecoder::new(&self.length_prefixed)
    }
}

/// Config used to build a [`LengthPrefixedEncoder`].
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct LengthPrefixedEncoderConfig {
    /// Options for the length-prefixed encoder.
    #[serde(default, skip_serializing_if = "super::is_default")]
    pub length_prefixed: LengthPrefixedCoderOptions,
}

impl LengthPrefixedEncoderConfig {
    /// Build the `LengthPrefixedEncoder` from this configuration.
    pub fn build(&self) -> LengthPrefixedEncoder {
        LengthPrefixedEncoder::new(&self.length_prefixed)
    }
}

/// A decoder for frames preceded by a big-endian length prefix.
#[derive(Debug)]
pub struct LengthPrefixedDecoder(LengthDelimitedCodec);

impl LengthPrefixedDecoder {
    /// Creates a new `LengthPrefixedDecoder` from options.
    pub fn new(options: &LengthPrefixedCoderOptions) -> Self {
        LengthPrefixedDecoder(options.build_codec())
    }
}

impl Default for LengthPrefixedDecoder {
    fn default() -> Self {
        LengthPrefixedDecoder::new(&LengthPrefixedCoderOptions::default())
    }
}

impl Decoder for LengthPrefixedDecoder {
    type Item = Bytes;
    type Error = BoxedFramingError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.0
            .decode(src)
            .map(|frame| frame.map(BytesMut::freeze))
            .map_err(Into::into)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.0
            .decode_eof(src)
            .map(|frame| frame.map(BytesMut::freeze))
            .map_err(Into::into)
    }
}

/// An encoder prepending a big-endian length prefix to each frame.
#[derive(Debug)]
pub struct LengthPrefixedEncoder(LengthDelimitedCodec);

impl LengthPrefixedEncoder {
    /// Creates a new `LengthPrefixedEncoder` from options.
    pub fn new(options: &LengthPrefixedCoderOptions) -> Self {
        LengthPrefixedEncoder(options.build_codec())
    }
}

impl Default for LengthPrefixedEncoder {
    fn default() -> Self {
        LengthPrefixedEncoder::new(&LengthPrefixedCoderOptions::default())
    }
}

impl Encoder<Bytes> for LengthPrefixedEncoder {
    type Error = BoxedFramingError;

    fn encode(&mut self, frame: Bytes, buffer: &mut BytesMut) -> Result<(), Self::Error> {
        self.0.encode(frame, buffer).map_err(Into::into)
    }
}
