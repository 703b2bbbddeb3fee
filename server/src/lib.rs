//! Authoritative game server for the grow-by-eating arena.
//!
//! The server owns the canonical world state. Clients send framed intents
//! (movement, skills) over TCP; one session task per connection validates
//! and records them under a shared lock; a fixed-rate tick loop resolves
//! physics, collisions, and skills in a deterministic order and broadcasts
//! an immutable snapshot of the result to every authenticated session.
//!
//! Module layout:
//! - [`game`] - the simulation core and per-tick state transition
//! - [`network`] - listener, client registry, tick/broadcast loop
//! - [`session`] - per-connection state machine and packet dispatch
//! - [`grid`] - broad-phase spatial partitioning for food collisions
//! - [`error`] - the error taxonomy separating fatal from per-client
//!   failures

pub mod error;
pub mod game;
pub mod grid;
pub mod network;
pub mod session;
pub mod utils;
