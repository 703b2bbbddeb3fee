//! Connection management and the authoritative tick/broadcast loop.
//!
//! The [`NetworkManager`] owns the listening socket, the client registry,
//! and the single clock driving the simulation. Sessions are registered
//! before their task spawns so the broadcaster sees them immediately
//! (unauthenticated entries are skipped). The snapshot frame is encoded
//! once per tick and the same bytes are fanned out to every session's
//! outbound channel; a failed channel removes only that client.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::{interval, MissedTickBehavior};

use shared::config::Config;
use shared::protocol::{encode_frame, Packet};

use crate::error::ServerError;
use crate::game::GameManager;
use crate::session::ClientSession;

pub type SharedGame = Arc<RwLock<GameManager>>;
pub type Registry = Arc<RwLock<HashMap<u32, ClientHandle>>>;

/// Registry entry for one connection: enough to route frames to it and to
/// decide whether broadcasts apply yet.
pub struct ClientHandle {
    pub addr: SocketAddr,
    pub sender: mpsc::UnboundedSender<Arc<Vec<u8>>>,
    /// False until the handshake completes; broadcasts skip such sessions.
    pub authenticated: bool,
}

/// Triggers a graceful stop of the accept loop, tick loop, and every
/// session watching the flag.
#[derive(Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.0.send(true);
    }
}

/// Sliding-window per-IP limiter for connection attempts.
pub struct RateLimiter {
    window: Duration,
    max_attempts: usize,
    attempts: HashMap<IpAddr, Vec<Instant>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_attempts: usize) -> Self {
        RateLimiter {
            window,
            max_attempts,
            attempts: HashMap::new(),
        }
    }

    /// Records an attempt and reports whether it is within the limit.
    pub fn allow(&mut self, ip: IpAddr, now: Instant) -> bool {
        self.attempts.retain(|_, timestamps| {
            timestamps.retain(|t| now.duration_since(*t) < self.window);
            !timestamps.is_empty()
        });

        let timestamps = self.attempts.entry(ip).or_default();
        if timestamps.len() >= self.max_attempts {
            return false;
        }
        timestamps.push(now);
        true
    }
}

pub struct NetworkManager {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: Arc<Config>,
    game: SharedGame,
    registry: Registry,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl NetworkManager {
    /// Validates the config and binds the listener. Both failures are
    /// fatal: a server that cannot listen has nothing else to do.
    pub async fn bind(config: Config) -> Result<Self, ServerError> {
        config.validate()?;

        let addr = format!("{}:{}", config.network.host, config.network.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let config = Arc::new(config);
        let game = Arc::new(RwLock::new(GameManager::new(Arc::clone(&config))));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            "Server listening on {} ({}x{} world, {} ticks/s)",
            local_addr, config.world.width, config.world.height, config.game.tick_rate
        );

        Ok(NetworkManager {
            listener,
            local_addr,
            config,
            game,
            registry: Arc::new(RwLock::new(HashMap::new())),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.shutdown_tx))
    }

    pub fn game(&self) -> SharedGame {
        Arc::clone(&self.game)
    }

    /// Runs the accept loop and the tick/broadcast loop until shutdown.
    pub async fn run(self) {
        let NetworkManager {
            listener,
            local_addr: _,
            config,
            game,
            registry,
            shutdown_tx: _shutdown_tx,
            shutdown_rx,
        } = self;

        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&config),
            Arc::clone(&game),
            Arc::clone(&registry),
            shutdown_rx.clone(),
        ));

        tick_loop(config, Arc::clone(&game), Arc::clone(&registry), shutdown_rx).await;

        let _ = accept_task.await;
        // Dropping every sender closes the per-session writers.
        registry.write().await.clear();
        info!("Server shutdown complete");
    }
}

async fn accept_loop(
    listener: TcpListener,
    config: Arc<Config>,
    game: SharedGame,
    registry: Registry,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut limiter = RateLimiter::new(
        Duration::from_secs_f64(config.network.rate_limit_window_secs),
        config.network.rate_limit_max_attempts,
    );
    let mut next_client_id: u32 = 1;

    loop {
        let accepted = tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, addr)) => {
                if !limiter.allow(addr.ip(), Instant::now()) {
                    warn!("Connection rate limit exceeded for {}", addr.ip());
                    refuse(stream, &config, "too many connection attempts, try again later");
                    continue;
                }

                let id = next_client_id;
                next_client_id += 1;

                let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                // Register before spawning so broadcasts see the session
                // immediately; it stays skipped until authenticated.
                registry.write().await.insert(
                    id,
                    ClientHandle {
                        addr,
                        sender: outbound_tx.clone(),
                        authenticated: false,
                    },
                );
                info!("New connection from {} (ID: {})", addr, id);

                let session = ClientSession::new(
                    id,
                    addr,
                    Arc::clone(&game),
                    Arc::clone(&registry),
                    Arc::clone(&config),
                    outbound_tx,
                    shutdown.clone(),
                );
                tokio::spawn(session.run(stream, outbound_rx));
            }
            Err(e) => {
                if *shutdown.borrow() {
                    break;
                }
                error!("Error accepting connection: {}", e);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
    debug!("Accept loop stopped");
}

/// Refuses a throttled connection with an explicit response instead of
/// accepting and silently dropping it. The write happens on its own task
/// so a slow peer cannot stall the accept loop.
fn refuse(mut stream: TcpStream, config: &Config, message: &str) {
    let packet = Packet::ServerFull {
        message: message.to_string(),
        max_players: config.game.max_players as u32,
        queue_position: None,
    };
    match encode_frame(&packet) {
        Ok(frame) => {
            tokio::spawn(async move {
                let _ = stream.write_all(&frame).await;
                let _ = stream.shutdown().await;
            });
        }
        Err(err) => debug!("failed to encode refusal: {}", err),
    }
}

/// The single authoritative clock: advances the simulation at the
/// configured rate (drift-compensated, delta-capped) and broadcasts each
/// tick's snapshot frame outside the state lock.
async fn tick_loop(
    config: Arc<Config>,
    game: SharedGame,
    registry: Registry,
    mut shutdown: watch::Receiver<bool>,
) {
    let tick_duration = Duration::from_secs_f64(1.0 / config.game.tick_rate as f64);
    let mut ticker = interval(tick_duration);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Cap the delta so a stalled host cannot produce a teleporting tick.
    let max_delta = (2.0 * tick_duration.as_secs_f64()).max(0.05);
    let mut last_tick = Instant::now();

    // The first tick fires immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        let now = Instant::now();
        let mut delta_time = now.duration_since(last_tick).as_secs_f64();
        last_tick = now;
        if delta_time > max_delta {
            warn!(
                "Large delta time detected ({:.3}s), capping to {:.3}s",
                delta_time, max_delta
            );
            delta_time = max_delta;
        }

        let (frame, tick, player_count, food_count) = {
            let mut state = game.write().await;
            state.step(delta_time, now);
            (
                state.latest_frame(),
                state.tick_count(),
                state.player_count(),
                state.food_count(),
            )
        };

        if let Some(frame) = frame {
            broadcast(&registry, &game, frame).await;
        }

        if tick % (config.game.tick_rate as u64 * 10).max(1) == 0 {
            debug!(
                "Tick {}: {} players, {} food, {:.1}Hz",
                tick,
                player_count,
                food_count,
                1.0 / delta_time.max(1e-9)
            );
        }
    }
    debug!("Tick loop stopped");
}

/// Hands the already-encoded frame to every authenticated session. A
/// closed channel means the session is gone; it is deregistered without
/// affecting the other writes.
pub async fn broadcast(registry: &Registry, game: &SharedGame, frame: Arc<Vec<u8>>) {
    let mut failed = Vec::new();
    {
        let clients = registry.read().await;
        for (id, handle) in clients.iter() {
            if !handle.authenticated {
                continue;
            }
            if handle.sender.send(Arc::clone(&frame)).is_err() {
                failed.push(*id);
            }
        }
    }

    for id in failed {
        warn!("Dropping client {}: outbound channel closed", id);
        remove_client(registry, game, id).await;
    }
}

/// Deregisters a connection and removes its player from the simulation.
/// Idempotent: both halves tolerate a missing entry.
pub async fn remove_client(registry: &Registry, game: &SharedGame, id: u32) {
    if registry.write().await.remove(&id).is_some() {
        debug!("Client {} deregistered", id);
    }
    game.write().await.remove_player(id);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_rate_limiter_allows_up_to_max() {
        let mut limiter = RateLimiter::new(Duration::from_secs(60), 3);
        let now = Instant::now();
        assert!(limiter.allow(ip("10.0.0.1"), now));
        assert!(limiter.allow(ip("10.0.0.1"), now));
        assert!(limiter.allow(ip("10.0.0.1"), now));
        assert!(!limiter.allow(ip("10.0.0.1"), now));
    }

    #[test]
    fn test_rate_limiter_window_slides() {
        let mut limiter = RateLimiter::new(Duration::from_secs(60), 2);
        let now = Instant::now();
        assert!(limiter.allow(ip("10.0.0.1"), now));
        assert!(limiter.allow(ip("10.0.0.1"), now));
        assert!(!limiter.allow(ip("10.0.0.1"), now));

        // Old attempts age out of the window.
        let later = now + Duration::from_secs(61);
        assert!(limiter.allow(ip("10.0.0.1"), later));
    }

    #[test]
    fn test_rate_limiter_tracks_ips_independently() {
        let mut limiter = RateLimiter::new(Duration::from_secs(60), 1);
        let now = Instant::now();
        assert!(limiter.allow(ip("10.0.0.1"), now));
        assert!(!limiter.allow(ip("10.0.0.1"), now));
        assert!(limiter.allow(ip("10.0.0.2"), now));
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_config() {
        let mut config = Config::default();
        config.world.width = -5.0;
        assert!(matches!(
            NetworkManager::bind(config).await,
            Err(ServerError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_bind_assigns_ephemeral_port() {
        let mut config = Config::default();
        config.network.port = 0;
        let manager = NetworkManager::bind(config).await.unwrap();
        assert_ne!(manager.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_remove_client_is_idempotent() {
        let config = Arc::new(Config::default());
        let game: SharedGame = Arc::new(RwLock::new(GameManager::new(Arc::clone(&config))));
        let registry: Registry = Arc::new(RwLock::new(HashMap::new()));

        let (tx, _rx) = mpsc::unbounded_channel();
        registry.write().await.insert(
            1,
            ClientHandle {
                addr: "127.0.0.1:9999".parse().unwrap(),
                sender: tx,
                authenticated: true,
            },
        );

        remove_client(&registry, &game, 1).await;
        remove_client(&registry, &game, 1).await;
        assert!(registry.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_drops_only_failed_clients() {
        let config = Arc::new(Config::default());
        let game: SharedGame = Arc::new(RwLock::new(GameManager::new(Arc::clone(&config))));
        let registry: Registry = Arc::new(RwLock::new(HashMap::new()));

        let (alive_tx, mut alive_rx) = mpsc::unbounded_channel();
        let (dead_tx, dead_rx) = mpsc::unbounded_channel();
        drop(dead_rx); // simulates a session whose writer died

        let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        {
            let mut clients = registry.write().await;
            clients.insert(
                1,
                ClientHandle {
                    addr,
                    sender: alive_tx,
                    authenticated: true,
                },
            );
            clients.insert(
                2,
                ClientHandle {
                    addr,
                    sender: dead_tx,
                    authenticated: true,
                },
            );
        }

        let frame = Arc::new(vec![1, 2, 3]);
        broadcast(&registry, &game, frame).await;

        let clients = registry.read().await;
        assert!(clients.contains_key(&1));
        assert!(!clients.contains_key(&2));
        drop(clients);
        assert_eq!(*alive_rx.recv().await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_unauthenticated_sessions_skipped_by_broadcast() {
        let config = Arc::new(Config::default());
        let game: SharedGame = Arc::new(RwLock::new(GameManager::new(Arc::clone(&config))));
        let registry: Registry = Arc::new(RwLock::new(HashMap::new()));

        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.write().await.insert(
            1,
            ClientHandle {
                addr: "127.0.0.1:9999".parse().unwrap(),
                sender: tx,
                authenticated: false,
            },
        );

        broadcast(&registry, &game, Arc::new(vec![9])).await;
        assert!(rx.try_recv().is_err());
        // Still registered, just not receiving broadcasts yet.
        assert!(registry.read().await.contains_key(&1));
    }
}
