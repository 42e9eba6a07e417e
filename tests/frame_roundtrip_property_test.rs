// tests/frame_roundtrip_property_test.rs

//! For every valid `Frame` that fits inline, `decode(encode(f)) == f`.

use bytes::Bytes;
use bytes::BytesMut;
use hyperstore::core::{Frame, FrameCodec};
use proptest::prelude::*;
use std::collections::HashMap;
use tokio_util::codec::{Decoder, Encoder};

proptest! {
    #[test]
    fn data_frames_round_trip(key in "[a-zA-Z0-9_-]{1,40}", payload in proptest::collection::vec(any::<u8>(), 0..512)) {
        let frame = Frame::data(key, Bytes::from(payload), HashMap::new());
        let mut codec = FrameCodec;
        let mut buf = BytesMut::new();
        codec.encode(frame.clone(), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().expect("frame decodes");
        prop_assert_eq!(decoded, frame);
        prop_assert!(buf.is_empty());
    }
}
