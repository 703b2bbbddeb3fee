//! Per-connection session handling.
//!
//! Each accepted socket gets one session task (framed reads, validation,
//! dispatch into the simulation) and one writer task draining an outbound
//! frame channel, so a slow receiver never blocks the broadcaster or the
//! reader. The session holds only its id and shared handles; the registry
//! owns connection lifetime.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

use shared::config::Config;
use shared::entity::validate_name;
use shared::protocol::{
    decode_packet, encode_frame, Packet, ProtocolError, LENGTH_PREFIX_BYTES, PROTOCOL_VERSION,
};
use shared::skill::SkillKind;

use crate::error::SessionError;
use crate::game::JoinError;
use crate::network::{remove_client, Registry, SharedGame};
use crate::utils::{get_timestamp, name_suggestions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Authenticating,
    Active,
    Disconnecting,
    Closed,
}

pub struct ClientSession {
    id: u32,
    addr: SocketAddr,
    state: SessionState,
    game: SharedGame,
    registry: Registry,
    config: Arc<Config>,
    outbound: mpsc::UnboundedSender<Arc<Vec<u8>>>,
    shutdown: watch::Receiver<bool>,
}

impl ClientSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u32,
        addr: SocketAddr,
        game: SharedGame,
        registry: Registry,
        config: Arc<Config>,
        outbound: mpsc::UnboundedSender<Arc<Vec<u8>>>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        ClientSession {
            id,
            addr,
            state: SessionState::Connecting,
            game,
            registry,
            config,
            outbound,
            shutdown,
        }
    }

    /// Drives the connection to completion, then deregisters it. Errors
    /// never escape: a broken session only costs that one client.
    pub async fn run(
        mut self,
        stream: TcpStream,
        outbound_rx: mpsc::UnboundedReceiver<Arc<Vec<u8>>>,
    ) {
        stream.set_nodelay(true).ok();
        let (mut reader, writer) = stream.into_split();
        let writer_task = tokio::spawn(write_loop(writer, outbound_rx));

        match self.drive(&mut reader).await {
            Ok(()) | Err(SessionError::Closed) => {
                info!("Client {} ({}) disconnected", self.id, self.addr);
            }
            Err(SessionError::Timeout(window)) => {
                warn!(
                    "Client {} ({}) timed out after {:?} of silence",
                    self.id, self.addr, window
                );
            }
            Err(SessionError::Validation(reason)) => {
                info!("Client {} ({}) rejected: {}", self.id, self.addr, reason);
            }
            Err(err) => {
                warn!("Client {} ({}) dropped: {}", self.id, self.addr, err);
            }
        }

        self.state = SessionState::Disconnecting;
        remove_client(&self.registry, &self.game, self.id).await;
        self.state = SessionState::Closed;
        debug!("Session {} reached {:?}", self.id, self.state);

        // Closing the channel lets the writer flush queued frames (the
        // rejection packet, typically) and shut the socket down.
        drop(self.outbound);
        let _ = writer_task.await;
    }

    async fn drive(&mut self, reader: &mut OwnedReadHalf) -> Result<(), SessionError> {
        self.handshake(reader).await?;

        let window = Duration::from_secs_f64(self.config.network.client_timeout_secs);
        loop {
            if *self.shutdown.borrow() {
                return Ok(());
            }
            let packet = self.read_frame(reader, window).await?;
            self.handle_packet(packet).await?;
        }
    }

    /// `Connecting -> Authenticating -> Active`, with one retry after a
    /// name collision. Capacity rejections transition straight to close.
    async fn handshake(&mut self, reader: &mut OwnedReadHalf) -> Result<(), SessionError> {
        self.state = SessionState::Authenticating;
        let window = Duration::from_secs_f64(self.config.network.handshake_timeout_secs);

        for attempt in 0..2 {
            let (name, version) = match self.read_frame(reader, window).await? {
                Packet::Connect { name, version, .. } => (name, version),
                other => {
                    return Err(SessionError::Protocol(format!(
                        "expected connect packet, got {:?}",
                        discriminator(&other)
                    )))
                }
            };

            if version != PROTOCOL_VERSION {
                return Err(SessionError::Protocol(format!(
                    "protocol version mismatch: client {}, server {}",
                    version, PROTOCOL_VERSION
                )));
            }
            validate_name(&name).map_err(SessionError::Validation)?;

            let join = self.game.write().await.try_add_player(self.id, &name);
            match join {
                Ok(spawn_position) => {
                    self.send_packet(&Packet::PlayerId {
                        player_id: self.id,
                        spawn_position,
                        server_tick_rate: self.config.game.tick_rate,
                    })?;
                    if let Some(handle) = self.registry.write().await.get_mut(&self.id) {
                        handle.authenticated = true;
                    }
                    self.state = SessionState::Active;
                    info!("Player '{}' (ID: {}) authenticated", name, self.id);
                    return Ok(());
                }
                Err(JoinError::ServerFull) => {
                    self.send_packet(&Packet::ServerFull {
                        message: "server is at capacity".to_string(),
                        max_players: self.config.game.max_players as u32,
                        queue_position: None,
                    })?;
                    return Err(SessionError::Validation("server full".to_string()));
                }
                Err(JoinError::NameTaken) => {
                    self.send_packet(&Packet::UsernameTaken {
                        message: format!("username '{}' is already taken", name),
                        suggestions: name_suggestions(&name),
                    })?;
                    if attempt == 1 {
                        return Err(SessionError::Validation(format!(
                            "username '{}' taken, retry exhausted",
                            name
                        )));
                    }
                }
            }
        }
        Err(SessionError::Validation("handshake failed".to_string()))
    }

    async fn handle_packet(&mut self, packet: Packet) -> Result<(), SessionError> {
        match packet {
            Packet::Move {
                dx, dy, sequence, ..
            } => {
                let applied = self.game.write().await.record_move(self.id, dx, dy, sequence);
                if !applied {
                    debug!("Client {}: discarded move seq {}", self.id, sequence);
                }
            }
            Packet::Skill { skill_name, .. } => match SkillKind::from_name(&skill_name) {
                Some(kind) => {
                    let fired = self
                        .game
                        .write()
                        .await
                        .activate_skill(self.id, kind, Instant::now());
                    debug!(
                        "Client {}: skill {} {}",
                        self.id,
                        skill_name,
                        if fired { "activated" } else { "not ready" }
                    );
                }
                None => {
                    return Err(SessionError::Protocol(format!(
                        "unknown skill '{}'",
                        skill_name
                    )))
                }
            },
            Packet::GetGameState { .. } => {
                // Served from the latest published snapshot, not the next
                // tick, so the response is immediate.
                let frame = self.game.read().await.latest_frame();
                if let Some(frame) = frame {
                    self.send_frame(frame)?;
                }
            }
            Packet::Ping {
                timestamp,
                sequence,
            } => {
                self.send_packet(&Packet::Pong {
                    timestamp,
                    sequence,
                    server_time: get_timestamp(),
                })?;
            }
            Packet::Connect { .. } => {
                return Err(SessionError::Protocol(
                    "connect packet outside handshake".to_string(),
                ));
            }
            other => {
                return Err(SessionError::Protocol(format!(
                    "unexpected {} packet from client",
                    discriminator(&other)
                )));
            }
        }
        Ok(())
    }

    /// Reads one length-prefixed frame. An oversized prefix fails before
    /// any payload byte is read, bounding memory exposure. Returns
    /// [`SessionError::Closed`] on clean EOF or server shutdown.
    async fn read_frame(
        &mut self,
        reader: &mut OwnedReadHalf,
        window: Duration,
    ) -> Result<Packet, SessionError> {
        let mut len_buf = [0u8; LENGTH_PREFIX_BYTES];
        tokio::select! {
            result = timeout(window, reader.read_exact(&mut len_buf)) => {
                check_read(result, window)?;
            }
            _ = self.shutdown.changed() => return Err(SessionError::Closed),
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        let max = self.config.network.max_packet_bytes;
        if len == 0 {
            return Err(ProtocolError::EmptyFrame.into());
        }
        if len > max {
            return Err(ProtocolError::OversizedFrame { len, max }.into());
        }

        let mut payload = vec![0u8; len];
        check_read(timeout(window, reader.read_exact(&mut payload)).await, window)?;

        Ok(decode_packet(&payload)?)
    }

    fn send_packet(&self, packet: &Packet) -> Result<(), SessionError> {
        let frame = encode_frame(packet)?;
        self.send_frame(Arc::new(frame))
    }

    fn send_frame(&self, frame: Arc<Vec<u8>>) -> Result<(), SessionError> {
        self.outbound
            .send(frame)
            .map_err(|_| SessionError::Closed)
    }
}

/// Maps a timed read result onto the session error taxonomy.
fn check_read(
    result: Result<io::Result<usize>, tokio::time::error::Elapsed>,
    window: Duration,
) -> Result<(), SessionError> {
    match result {
        Err(_) => Err(SessionError::Timeout(window)),
        Ok(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => Err(SessionError::Closed),
        Ok(Err(e)) => Err(SessionError::Connection(e)),
        Ok(Ok(_)) => Ok(()),
    }
}

fn discriminator(packet: &Packet) -> &'static str {
    match packet {
        Packet::Connect { .. } => "connect",
        Packet::Move { .. } => "move",
        Packet::Skill { .. } => "skill",
        Packet::GetGameState { .. } => "get_game_state",
        Packet::Ping { .. } => "ping",
        Packet::Pong { .. } => "pong",
        Packet::PlayerId { .. } => "player_id",
        Packet::GameState { .. } => "game_state",
        Packet::UsernameTaken { .. } => "username_taken",
        Packet::ServerFull { .. } => "server_full",
    }
}

/// Drains the outbound channel into the socket. Ends when the channel
/// closes (session gone) or the peer stops accepting writes.
async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut outbound_rx: mpsc::UnboundedReceiver<Arc<Vec<u8>>>,
) {
    while let Some(frame) = outbound_rx.recv().await {
        if writer.write_all(&frame).await.is_err() {
            break;
        }
    }
    let _ = writer.shutdown().await;
}
