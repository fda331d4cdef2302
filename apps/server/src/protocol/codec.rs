//! Length-framed JSON transport.
//!
//! Each TCP stream carries discrete frames produced by a
//! [`LengthDelimitedCodec`]; every frame body is one JSON-encoded message.
//! The same codec is used by the server and by the integration-test clients.

use bytes::{Bytes, BytesMut};
use serde::Serialize;
use tokio_util::codec::LengthDelimitedCodec;

use crate::error::AppError;
use crate::protocol::messages::{ClientMessage, ServerMessage};

/// Frames larger than this are a protocol violation; a full board snapshot on
/// the largest sensible board is a few kilobytes.
const MAX_FRAME_BYTES: usize = 64 * 1024;

pub fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_BYTES)
        .new_codec()
}

pub fn encode_message<T: Serialize>(message: &T) -> Result<Bytes, AppError> {
    let encoded = serde_json::to_vec(message)?;
    Ok(Bytes::from(encoded))
}

pub fn decode_client_message(frame: &BytesMut) -> Result<ClientMessage, AppError> {
    Ok(serde_json::from_slice(frame)?)
}

pub fn decode_server_message(frame: &BytesMut) -> Result<ServerMessage, AppError> {
    Ok(serde_json::from_slice(frame)?)
}
