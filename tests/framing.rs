//! Framing pipelines driven end-to-end through real founts and drains.

use std::rc::Rc;

use bytes::Bytes;
use similar_asserts::assert_eq;
use sluice::framing::{
    LineDecoder, NetstringDecoder, NetstringEncoder, FramesToSegments, SegmentsToFrames,
};
use sluice::test_util::{FakeDrain, FakeFount};
use sluice::{series, DrainRef, Drain, Fount};

#[test]
fn netstrings_decode_and_leave_the_partial_frame_buffered() {
    let ff = FakeFount::new();
    let fd = FakeDrain::new();
    let head = series(SegmentsToFrames::new(NetstringDecoder::new()))
        .into_drain(fd.clone() as DrainRef<Bytes>);
    Rc::clone(&ff).flow_to(Some(head));

    ff.drain().unwrap().receive(Bytes::from_static(b"1:x,2:yz,3:"));
    assert_eq!(fd.received(), vec![Bytes::from_static(b"x"), Bytes::from_static(b"yz")]);
}

#[test]
fn netstring_encoding_concatenates_to_the_wire_form() {
    let ff = FakeFount::new();
    let fd = FakeDrain::new();
    let head = series(FramesToSegments::new(NetstringEncoder::new()))
        .into_drain(fd.clone() as DrainRef<Bytes>);
    Rc::clone(&ff).flow_to(Some(head));

    ff.drain().unwrap().receive(Bytes::from_static(b"hello"));
    ff.drain().unwrap().receive(Bytes::from_static(b"world"));
    let wire: Vec<u8> = fd.received().iter().flat_map(|s: &Bytes| s.to_vec()).collect();
    assert_eq!(wire, b"5:hello,5:world,".to_vec());
}

#[test]
fn lines_split_on_either_delimiter_with_the_tail_buffered() {
    for input in [&b"alpha\nbeta\ngamma"[..], &b"alpha\r\nbeta\r\ngamma"[..]] {
        let ff = FakeFount::new();
        let fd = FakeDrain::new();
        let head = series(SegmentsToFrames::new(LineDecoder::new()))
            .into_drain(fd.clone() as DrainRef<Bytes>);
        Rc::clone(&ff).flow_to(Some(head));

        ff.drain().unwrap().receive(Bytes::copy_from_slice(input));
        assert_eq!(
            fd.received(),
            vec![Bytes::from_static(b"alpha"), Bytes::from_static(b"beta")],
            "gamma must stay buffered until its delimiter arrives"
        );
    }
}

#[test]
fn a_framing_round_trip_survives_resegmentation() {
    // Encode frames, chop the wire stream into awkward segments, decode.
    let encode = {
        let ff = FakeFount::new();
        let fd = FakeDrain::new();
        let head = series(FramesToSegments::new(NetstringEncoder::new()))
            .into_drain(fd.clone() as DrainRef<Bytes>);
        Rc::clone(&ff).flow_to(Some(head));
        for frame in [&b"one"[..], b"", b"forty-two"] {
            ff.drain().unwrap().receive(Bytes::copy_from_slice(frame));
        }
        fd.received().iter().flat_map(|s: &Bytes| s.to_vec()).collect::<Vec<u8>>()
    };

    let ff = FakeFount::new();
    let fd = FakeDrain::new();
    let head = series(SegmentsToFrames::new(NetstringDecoder::new()))
        .into_drain(fd.clone() as DrainRef<Bytes>);
    Rc::clone(&ff).flow_to(Some(head));
    for chunk in encode.chunks(5) {
        ff.drain().unwrap().receive(Bytes::copy_from_slice(chunk));
    }
    assert_eq!(
        fd.received(),
        vec![
            Bytes::from_static(b"one"),
            Bytes::from_static(b""),
            Bytes::from_static(b"forty-two"),
        ]
    );
}
