//! Headless test client: connects, joins, steers in a circle, and prints
//! the state updates the server sends back. Useful for poking a running
//! server without a real client.

use std::env;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

use shared::protocol::{decode_packet, encode_frame, FrameDecoder, Packet, PROTOCOL_VERSION};

// Get current timestamp in milliseconds
fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

async fn read_packet(
    stream: &mut TcpStream,
    decoder: &mut FrameDecoder,
) -> Result<Packet, Box<dyn std::error::Error>> {
    let mut buf = [0u8; 8192];
    loop {
        if let Some(payload) = decoder.next_frame()? {
            return Ok(decode_packet(&payload)?);
        }
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err("connection closed by server".into());
        }
        decoder.extend(&buf[..n]);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8080".to_string());
    let name = env::args().nth(2).unwrap_or_else(|| "tester".to_string());

    let mut stream = TcpStream::connect(&addr).await?;
    println!("Connected to {}", addr);

    let connect = Packet::Connect {
        name: name.clone(),
        version: PROTOCOL_VERSION,
        client_id: None,
    };
    stream.write_all(&encode_frame(&connect)?).await?;

    let mut decoder = FrameDecoder::new(16 * 1024 * 1024);

    match read_packet(&mut stream, &mut decoder).await? {
        Packet::PlayerId {
            player_id,
            spawn_position,
            server_tick_rate,
        } => {
            println!(
                "Joined as player {} at ({:.0}, {:.0}), server runs {} ticks/s",
                player_id, spawn_position.x, spawn_position.y, server_tick_rate
            );
        }
        Packet::UsernameTaken {
            message,
            suggestions,
        } => {
            println!("{} (try one of: {:?})", message, suggestions);
            return Ok(());
        }
        Packet::ServerFull { message, .. } => {
            println!("{}", message);
            return Ok(());
        }
        other => {
            println!("Unexpected response: {:?}", other);
            return Ok(());
        }
    }

    let mut sequence = 0u32;

    // Steer in a slow circle for ten rounds, pinging as we go.
    for i in 0..10 {
        let angle = i as f64 / 5.0;
        sequence += 1;
        let movement = Packet::Move {
            dx: angle.sin(),
            dy: angle.cos(),
            sequence,
            timestamp: get_timestamp(),
        };
        stream.write_all(&encode_frame(&movement)?).await?;

        let ping = Packet::Ping {
            timestamp: get_timestamp(),
            sequence,
        };
        stream.write_all(&encode_frame(&ping)?).await?;

        // Print whatever arrives until the next state update lands.
        loop {
            match timeout(Duration::from_millis(500), read_packet(&mut stream, &mut decoder)).await
            {
                Ok(Ok(Packet::GameState {
                    players,
                    food,
                    server_tick,
                    ..
                })) => {
                    println!(
                        "Tick {}: {} players, {} food",
                        server_tick,
                        players.len(),
                        food.len()
                    );
                    break;
                }
                Ok(Ok(Packet::Pong {
                    timestamp,
                    sequence,
                    server_time,
                })) => {
                    println!(
                        "Pong seq {} (rtt {} ms, server time {})",
                        sequence,
                        get_timestamp().saturating_sub(timestamp),
                        server_time
                    );
                }
                Ok(Ok(other)) => println!("Received: {:?}", other),
                Ok(Err(e)) => {
                    println!("Read error: {}", e);
                    return Ok(());
                }
                Err(_) => {
                    println!("No state update within 500ms");
                    break;
                }
            }
        }

        sleep(Duration::from_millis(200)).await;
    }

    println!("Test client finished");
    Ok(())
}
