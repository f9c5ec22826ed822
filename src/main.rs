use std::error::Error;

use log::info;

use config::load_config;
use domain::UpdateService;
use infra::{health::HttpHealthChecker, notify::TelegramNotifier, snapshot::FileSnapshotStore};

mod config;
mod domain;
mod infra;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = load_config()?;
    info!("Refit starting: {} managed containers", config.containers.len());

    let runtime = infra::connect_runtime(&config).await;
    let service = UpdateService {
        runtime,
        snapshots: Box::new(FileSnapshotStore::new(&config.state_dir)),
        health: Box::new(HttpHealthChecker::new(&config.health)?),
        notifier: Box::new(TelegramNotifier::new(&config.telegram)),
    };

    let outcomes = domain::run_pass(&service, &config.containers, &config.global).await;
    for (name, outcome) in &outcomes {
        info!("{}: {}", name, outcome);
    }
    info!("Update cycle completed");
    Ok(())
}
