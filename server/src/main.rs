use clap::Parser;
use log::{error, info};

use server::network::NetworkManager;
use shared::Config;

/// Parses command-line overrides, binds the server, and runs it until
/// Ctrl+C triggers a graceful shutdown.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "8080")]
        port: u16,
        /// Tick rate (updates per second)
        #[clap(short, long, default_value = "30")]
        tick_rate: u32,
        /// Maximum concurrent players
        #[clap(short, long, default_value = "10")]
        max_players: usize,
    }

    let args = Args::parse();

    let mut config = Config::default();
    config.network.host = args.host;
    config.network.port = args.port;
    config.game.tick_rate = args.tick_rate;
    config.game.max_players = args.max_players;

    let manager = NetworkManager::bind(config).await?;
    let shutdown = manager.shutdown_handle();

    let mut server_task = tokio::spawn(manager.run());

    tokio::select! {
        result = &mut server_task => {
            if let Err(e) = result {
                error!("Server task panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            shutdown.shutdown();
            let _ = server_task.await;
        }
    }

    Ok(())
}
