use std::{env, path::PathBuf, sync::Arc, time::Duration};

use log::{info, warn};
use mixtape_rooms::Coordinator;
use mixtape_server::{audio::AudioStore, gateway, gateway::Gateway, logging, ServerContext};

/// How often the idle sweeper wakes up when it is enabled.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    logging::init_logger();

    let storage_dir = env::var("MIXTAPE_STORAGE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./mixtape-audio"));

    let coordinator = Arc::new(Coordinator::new());
    let gateway = Gateway::new();
    let audio = AudioStore::new(storage_dir);

    audio
        .init()
        .await
        .expect("storage directory is writable");

    tokio::spawn(gateway::run_event_pump(
        gateway.clone(),
        coordinator.receiver(),
    ));

    // Rooms normally die with their host; the sweeper is an opt-in backstop
    // for rooms nobody has touched in a while
    match idle_timeout() {
        Some(max_idle) => {
            let registry = coordinator.registry.clone();

            info!(
                "Sweeping rooms idle for more than {} seconds",
                max_idle.as_secs()
            );

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(SWEEP_INTERVAL);

                loop {
                    interval.tick().await;
                    registry.sweep_idle(max_idle);
                }
            });
        }
        None => info!("Idle room sweeping is disabled"),
    }

    mixtape_server::run_server(ServerContext {
        coordinator,
        gateway,
        audio,
    })
    .await
}

fn idle_timeout() -> Option<Duration> {
    let raw = env::var("MIXTAPE_ROOM_IDLE_SECS").ok()?;

    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
        _ => {
            warn!("Ignoring invalid MIXTAPE_ROOM_IDLE_SECS value: {}", raw);
            None
        }
    }
}
