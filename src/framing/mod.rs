//! Tubes that convert between segments (arbitrarily-chunked bytes off a
//! stream) and frames (discrete, delimited byte sequences).
//!
//! The protocol knowledge lives in incremental codecs implementing
//! [`tokio_util::codec::Decoder`] / [`Encoder`]; the generic
//! [`SegmentsToFrames`] and [`FramesToSegments`] tubes adapt any such codec
//! into a pipeline. Three framing protocols are provided: newline
//! delimited ([`line`]), netstrings ([`netstring`]) and big-endian length
//! prefixes ([`length_prefixed`]).

mod length_prefixed;
mod line;
mod netstring;

use std::cell::RefCell;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

pub use length_prefixed::{
    LengthPrefixedCoderOptions, LengthPrefixedDecoder, LengthPrefixedDecoderConfig,
    LengthPrefixedEncoder, LengthPrefixedEncoderConfig,
};
pub use line::{LineDecoder, LineDecoderConfig, LineEncoder};
pub use netstring::{NetstringDecoder, NetstringDecoderConfig, NetstringEncoder, NetstringError};

use crate::tube::{Divertable, Emission, Tube, TubeResult};

/// An arbitrarily-sized chunk of bytes as a stream transport delivers
/// them, with no meaningful boundaries.
pub type Segment = Bytes;

/// A discrete, delimited sequence of bytes within a protocol.
pub type Frame = Bytes;

/// A `Box` containing any framing error.
pub type BoxedFramingError = Box<dyn std::error::Error>;

pub(crate) fn is_default<T: Default + PartialEq>(value: &T) -> bool {
    *value == T::default()
}

/// A tube parsing a stream of segments into frames with the given decoder.
///
/// Bytes that do not yet form a complete frame stay buffered until more
/// segments arrive. A decode error tears the pipeline down.
pub struct SegmentsToFrames<D> {
    decoder: RefCell<D>,
    buffer: RefCell<BytesMut>,
}

impl<D> SegmentsToFrames<D>
where
    D: Decoder<Item = Bytes, Error = BoxedFramingError> + 'static,
{
    /// Adapt `decoder` into a segment-to-frame tube.
    pub fn new(decoder: D) -> Self {
        SegmentsToFrames {
            decoder: RefCell::new(decoder),
            buffer: RefCell::new(BytesMut::new()),
        }
    }
}

impl<D> Tube for SegmentsToFrames<D>
where
    D: Decoder<Item = Bytes, Error = BoxedFramingError> + 'static,
{
    type In = Segment;
    type Out = Frame;

    fn received(&self, segment: Segment) -> TubeResult<Frame> {
        let mut buffer = self.buffer.borrow_mut();
        buffer.extend_from_slice(&segment);
        let mut decoder = self.decoder.borrow_mut();
        let mut frames = Vec::new();
        while let Some(frame) = decoder.decode(&mut buffer)? {
            frames.push(frame);
        }
        Ok(frames.into())
    }
}

/// Line frames are reassembled by re-joining them with the delimiter and
/// appending whatever partial line is still buffered.
impl Divertable for SegmentsToFrames<LineDecoder> {
    fn reassemble(&self, buffered: Vec<Frame>) -> Vec<Segment> {
        let leftover = self.buffer.borrow();
        let mut segment = BytesMut::new();
        for frame in &buffered {
            segment.extend_from_slice(frame);
            segment.extend_from_slice(b"\n");
        }
        segment.extend_from_slice(&leftover);
        vec![segment.freeze()]
    }
}

/// A tube wrapping each frame into one or more segments with the given
/// encoder.
pub struct FramesToSegments<E> {
    encoder: RefCell<E>,
}

impl<E> FramesToSegments<E>
where
    E: Encoder<Bytes, Error = BoxedFramingError> + 'static,
{
    /// Adapt `encoder` into a frame-to-segment tube.
    pub fn new(encoder: E) -> Self {
        FramesToSegments {
            encoder: RefCell::new(encoder),
        }
    }
}

impl<E> Tube for FramesToSegments<E>
where
    E: Encoder<Bytes, Error = BoxedFramingError> + 'static,
{
    type In = Frame;
    type Out = Segment;

    fn received(&self, frame: Frame) -> TubeResult<Segment> {
        let mut segment = BytesMut::new();
        self.encoder.borrow_mut().encode(frame, &mut segment)?;
        Ok(Emission::one(segment.freeze()))
    }
}
