// src/core/protocol/mod.rs

//! The wire protocol: frame kinds, control commands, and the codec between
//! them and raw bytes.

mod frame;

pub use frame::{ControlCommand, Frame, FrameCodec, MAX_PAYLOAD};
