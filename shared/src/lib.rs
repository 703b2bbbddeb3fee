//! Types shared between the authoritative server and any client: the
//! entity model, skill state machines, the framed wire protocol, and the
//! typed configuration the core consumes.

pub mod config;
pub mod entity;
pub mod math;
pub mod protocol;
pub mod skill;
pub mod survival;

pub use config::Config;
pub use entity::{Entity, EntityKind, Food, Player};
pub use math::Vec2;
pub use protocol::{
    decode_packet, encode_frame, FrameDecoder, Packet, ProtocolError, PROTOCOL_VERSION,
};
pub use skill::{SkillKind, SkillState};
pub use survival::{Activity, SurvivalStats, SurvivalSystem};
