//! Native-messaging framing for the browser-extension transport.
//!
//! The wire contract is Chrome's: a 4-byte little-endian length prefix
//! followed by that many bytes of UTF-8 JSON. The transport process is
//! external; this module only ships the codec and the inbound message
//! model so the binary can drive the engine from stdio.

use std::io::{Read, Write};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::engine::ActivityStatus;

/// Frames larger than this are rejected as garbage rather than allocated.
const MAX_FRAME_BYTES: u32 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeMessage {
    BrowserActivity {
        url: String,
        title: String,
        timestamp: f64,
    },
    SearchQuery {
        query: String,
        engine: String,
        timestamp: f64,
    },
}

/// Replies mirror the handler status; malformed input gets an explicit
/// error back instead of a silent drop.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum BridgeReply {
    Status { status: ActivityStatus },
    Error { error: String },
}

/// Read one length-prefixed frame. `Ok(None)` means clean EOF before a
/// new frame; a truncated frame is an error.
pub fn read_frame(reader: &mut impl Read) -> Result<Option<Vec<u8>>> {
    let mut length_bytes = [0u8; 4];
    match reader.read_exact(&mut length_bytes) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err).context("failed to read frame length"),
    }

    let length = u32::from_le_bytes(length_bytes);
    if length > MAX_FRAME_BYTES {
        bail!("frame length {length} exceeds limit");
    }

    let mut payload = vec![0u8; length as usize];
    reader
        .read_exact(&mut payload)
        .context("failed to read frame payload")?;
    Ok(Some(payload))
}

pub fn write_frame(writer: &mut impl Write, payload: &[u8]) -> Result<()> {
    let length = u32::try_from(payload.len()).context("frame payload too large")?;
    writer
        .write_all(&length.to_le_bytes())
        .context("failed to write frame length")?;
    writer
        .write_all(payload)
        .context("failed to write frame payload")?;
    writer.flush().context("failed to flush frame")?;
    Ok(())
}

pub fn decode_message(payload: &[u8]) -> Result<BridgeMessage> {
    serde_json::from_slice(payload).context("malformed bridge message")
}

pub fn encode_reply(reply: &BridgeReply) -> Result<Vec<u8>> {
    serde_json::to_vec(reply).context("failed to encode bridge reply")
}
