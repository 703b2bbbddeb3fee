//! Wire protocol shared by client and server.
//!
//! Every message is a JSON object carrying a `type` discriminator, framed
//! with a 4-byte big-endian length prefix. The [`Packet`] enum is the
//! closed set of message shapes; serde keeps encoding and dispatch
//! exhaustive. Field names are a compatibility contract - renaming one is
//! a protocol break.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::EntityKind;
use crate::math::Vec2;

/// Bumped on incompatible protocol changes; checked during the handshake.
pub const PROTOCOL_VERSION: u32 = 1;

/// Size of the big-endian length prefix preceding every payload.
pub const LENGTH_PREFIX_BYTES: usize = 4;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    OversizedFrame { len: usize, max: usize },
    #[error("empty frame")]
    EmptyFrame,
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Public view of one player inside a `game_state` packet. Derived from
/// the authoritative state once per tick; raw skill timers stay
/// server-side, only the active booleans are exposed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: u32,
    pub name: String,
    pub position: Vec2,
    pub radius: f64,
    pub score: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<f64>,
    pub color: String,
    /// Skill name to is-active flag.
    pub skills: HashMap<String, bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodSnapshot {
    pub id: u32,
    pub position: Vec2,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub value: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Packet {
    // Client to server
    Connect {
        name: String,
        version: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<u32>,
    },
    Move {
        dx: f64,
        dy: f64,
        sequence: u32,
        timestamp: u64,
    },
    Skill {
        skill_name: String,
        target_x: f64,
        target_y: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        direction: Option<Vec2>,
    },
    GetGameState {
        full_update: bool,
        last_ack: u64,
    },
    Ping {
        timestamp: u64,
        sequence: u32,
    },

    // Server to client
    Pong {
        timestamp: u64,
        sequence: u32,
        server_time: u64,
    },
    PlayerId {
        player_id: u32,
        spawn_position: Vec2,
        server_tick_rate: u32,
    },
    GameState {
        // JSON object keys are strings; keeping the map string-keyed makes
        // the declared type match the bytes on the wire.
        players: HashMap<String, PlayerSnapshot>,
        food: Vec<FoodSnapshot>,
        server_tick: u64,
        timestamp: u64,
    },
    UsernameTaken {
        message: String,
        suggestions: Vec<String>,
    },
    ServerFull {
        message: String,
        max_players: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        queue_position: Option<u32>,
    },
}

/// Serializes a packet and prepends the length prefix, producing the exact
/// bytes written to the socket.
pub fn encode_frame(packet: &Packet) -> Result<Vec<u8>, ProtocolError> {
    let payload = serde_json::to_vec(packet)?;
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_BYTES + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decodes one framed payload (the bytes after the length prefix).
pub fn decode_packet(payload: &[u8]) -> Result<Packet, ProtocolError> {
    Ok(serde_json::from_slice(payload)?)
}

/// Incremental frame extractor for streams that arrive in arbitrary
/// chunks. Feed bytes with [`FrameDecoder::extend`], then drain complete
/// payloads with [`FrameDecoder::next_frame`].
///
/// An oversized length prefix is reported as soon as the prefix itself is
/// readable, before any of the payload has been buffered.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    max_payload: usize,
}

impl FrameDecoder {
    pub fn new(max_payload: usize) -> Self {
        FrameDecoder {
            buffer: Vec::new(),
            max_payload,
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Returns the next complete payload, `None` if more bytes are needed.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        if self.buffer.len() < LENGTH_PREFIX_BYTES {
            return Ok(None);
        }
        let mut prefix = [0u8; LENGTH_PREFIX_BYTES];
        prefix.copy_from_slice(&self.buffer[..LENGTH_PREFIX_BYTES]);
        let len = u32::from_be_bytes(prefix) as usize;

        if len == 0 {
            return Err(ProtocolError::EmptyFrame);
        }
        if len > self.max_payload {
            return Err(ProtocolError::OversizedFrame {
                len,
                max: self.max_payload,
            });
        }
        if self.buffer.len() < LENGTH_PREFIX_BYTES + len {
            return Ok(None);
        }

        let payload = self.buffer[LENGTH_PREFIX_BYTES..LENGTH_PREFIX_BYTES + len].to_vec();
        self.buffer.drain(..LENGTH_PREFIX_BYTES + len);
        Ok(Some(payload))
    }
}
