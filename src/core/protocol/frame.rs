// src/core/protocol/frame.rs

//! The wire frame: a one-byte kind tag followed by a bincode-encoded,
//! kind-specific payload. `FrameCodec` implements `tokio_util::codec`'s
//! `Encoder`/`Decoder` the way `RespFrameCodec` does for the RESP protocol,
//! except the tag here selects between two payload shapes instead of a RESP
//! type byte.

use crate::core::errors::NodeError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio_util::codec::{Decoder, Encoder};

/// The largest payload a `Data` frame may carry inline. Blobs larger than
/// this travel as a `Store` control frame followed by raw bytes on the same
/// connection (see `core::transport`).
pub const MAX_PAYLOAD: usize = 1024;

const TAG_DATA: u8 = 0x00;
const TAG_CONTROL: u8 = 0x01;

/// Control-plane command. The wire representation is the string name
/// (`"STORE"`, `"FETCH"`, ...), not the enum discriminant, since the
/// protocol treats command names as part of its surface. `Unknown` is never
/// sent; it is synthesized locally when a received name isn't recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlCommand {
    Store,
    Fetch,
    FetchResponse,
    List,
    Exit,
    Unknown,
}

impl ControlCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlCommand::Store => "STORE",
            ControlCommand::Fetch => "FETCH",
            ControlCommand::FetchResponse => "FETCH_RESPONSE",
            ControlCommand::List => "LIST",
            ControlCommand::Exit => "EXIT",
            ControlCommand::Unknown => "UNKNOWN",
        }
    }
}

impl Serialize for ControlCommand {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ControlCommand {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "STORE" => ControlCommand::Store,
            "FETCH" => ControlCommand::Fetch,
            "FETCH_RESPONSE" => ControlCommand::FetchResponse,
            "LIST" => ControlCommand::List,
            "EXIT" => ControlCommand::Exit,
            _ => ControlCommand::Unknown,
        })
    }
}

/// A decoded application-level frame. The sender address is deliberately
/// not part of this type: it is stamped on by the transport on receipt
/// (`InboundFrame`), not carried on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Data {
        key: String,
        data: Bytes,
        metadata: HashMap<String, String>,
    },
    Control {
        command: ControlCommand,
        args: HashMap<String, String>,
    },
}

impl Frame {
    pub fn data(key: impl Into<String>, data: Bytes, metadata: HashMap<String, String>) -> Self {
        Frame::Data {
            key: key.into(),
            data,
            metadata,
        }
    }

    pub fn control(command: ControlCommand, args: HashMap<String, String>) -> Self {
        Frame::Control { command, args }
    }
}

#[derive(Serialize, Deserialize)]
struct DataPayload {
    key: String,
    data: Bytes,
    metadata: HashMap<String, String>,
}

#[derive(Serialize, Deserialize)]
struct ControlPayload {
    command: ControlCommand,
    args: HashMap<String, String>,
}

fn bincode_config() -> bincode::config::Configuration {
    bincode::config::standard()
}

/// Codec for `Frame`, symmetric with `RespFrameCodec`: a thin adapter over
/// `tokio_util::codec` that speaks one frame at a time.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl Encoder<Frame> for FrameCodec {
    type Error = NodeError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), NodeError> {
        let (tag, bytes) = match item {
            Frame::Data {
                key,
                data,
                metadata,
            } => {
                let payload = DataPayload { key, data, metadata };
                (
                    TAG_DATA,
                    bincode::serde::encode_to_vec(&payload, bincode_config())?,
                )
            }
            Frame::Control { command, args } => {
                let payload = ControlPayload { command, args };
                (
                    TAG_CONTROL,
                    bincode::serde::encode_to_vec(&payload, bincode_config())?,
                )
            }
        };
        if bytes.len() > MAX_PAYLOAD {
            return Err(NodeError::Protocol(format!(
                "frame payload of {} bytes exceeds MAX_PAYLOAD ({MAX_PAYLOAD}); use a streamed Store-Control frame instead",
                bytes.len()
            )));
        }
        dst.reserve(1 + bytes.len());
        dst.put_u8(tag);
        dst.extend_from_slice(&bytes);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = NodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, NodeError> {
        if src.is_empty() {
            return Ok(None);
        }
        let tag = src[0];
        let available = src.len() - 1;
        let cap = available.min(MAX_PAYLOAD);
        let slice = &src[1..1 + cap];
        let config = bincode_config();

        let decoded = match tag {
            TAG_DATA => bincode::serde::decode_from_slice::<DataPayload, _>(slice, config).map(
                |(p, consumed)| {
                    (
                        Frame::Data {
                            key: p.key,
                            data: p.data,
                            metadata: p.metadata,
                        },
                        consumed,
                    )
                },
            ),
            TAG_CONTROL => {
                bincode::serde::decode_from_slice::<ControlPayload, _>(slice, config).map(
                    |(p, consumed)| {
                        (
                            Frame::Control {
                                command: p.command,
                                args: p.args,
                            },
                            consumed,
                        )
                    },
                )
            }
            other => return Err(NodeError::UnknownFrameTag(other)),
        };

        match decoded {
            Ok((frame, consumed)) => {
                src.advance(1 + consumed);
                Ok(Some(frame))
            }
            Err(err) => {
                if cap < MAX_PAYLOAD && is_incomplete(&err) {
                    // Not enough bytes buffered yet; wait for more from the socket.
                    Ok(None)
                } else {
                    Err(NodeError::Protocol(format!("frame payload decode error: {err}")))
                }
            }
        }
    }
}

fn is_incomplete(err: &bincode::error::DecodeError) -> bool {
    matches!(err, bincode::error::DecodeError::UnexpectedEnd { .. })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(frame: Frame) {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::new();
        codec.encode(frame.clone(), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().expect("frame decoded");
        assert_eq!(decoded, frame);
        assert!(buf.is_empty());
    }

    #[test]
    fn data_frame_roundtrips() {
        roundtrip(Frame::data("hello", Bytes::from_static(b"world"), HashMap::new()));
    }

    #[test]
    fn control_frame_roundtrips() {
        let mut args = HashMap::new();
        args.insert("key".to_string(), "hello".to_string());
        args.insert("size".to_string(), "4096".to_string());
        roundtrip(Frame::control(ControlCommand::Store, args));
    }

    #[test]
    fn decode_waits_for_more_bytes_on_truncated_input() {
        let mut codec = FrameCodec;
        let mut full = BytesMut::new();
        codec
            .encode(
                Frame::data("k", Bytes::from_static(b"0123456789"), HashMap::new()),
                &mut full,
            )
            .unwrap();
        let mut partial = BytesMut::from(&full[..full.len() - 2]);
        assert!(codec.decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn unknown_tag_is_an_error() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::from(&[0xFFu8, 0x00][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(NodeError::UnknownFrameTag(0xFF))
        ));
    }

    #[test]
    fn control_command_round_trips_through_string_names() {
        for (cmd, name) in [
            (ControlCommand::Store, "STORE"),
            (ControlCommand::Fetch, "FETCH"),
            (ControlCommand::FetchResponse, "FETCH_RESPONSE"),
            (ControlCommand::List, "LIST"),
            (ControlCommand::Exit, "EXIT"),
        ] {
            assert_eq!(cmd.as_str(), name);
        }
    }
}
