use clap::Parser;
use log::{error, info};
use server::config::Config;
use server::game_loop::GameLoop;
use server::leaderboard::{InMemoryLeaderboard, Leaderboard};
use server::network::Server;
use server::session::ConnectionHandler;
use server::store::GameStore;
use std::sync::Arc;

/// Parses the command line, wires the game together and serves it over UDP
/// until Ctrl+C or the idle timeout.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();

    let store = Arc::new(match config.seed {
        Some(seed) => GameStore::with_seed(config.game_rules(), seed),
        None => GameStore::new(config.game_rules()),
    });
    info!("Game instance {}", store.instance_id());

    let leaderboard: Arc<dyn Leaderboard> = Arc::new(InMemoryLeaderboard::new());
    let game_loop = GameLoop::with_settings(
        Arc::clone(&store),
        Arc::clone(&leaderboard),
        config.loop_settings(),
    );
    game_loop.start_on_first_join();

    let idle_timeout = config.idle_timeout();
    game_loop.on_idle_timeout(
        move || {
            info!("No game for {:?}, shutting down", idle_timeout);
            std::process::exit(0);
        },
        idle_timeout,
    )?;

    let handler = ConnectionHandler::new(Arc::clone(&store), leaderboard);
    let mut server = Server::new(&config.address(), handler, config.max_clients).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    if let Err(e) = game_loop.force_quit() {
        error!("{}", e);
    }
    Ok(())
}
