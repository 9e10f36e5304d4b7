mod api;
mod auth;
mod commands;
mod config;
mod dashboard;
mod forms;
mod live;
mod models;
mod storage;

use api::HttpPollApi;
use auth::{AuthBridge, CognitoAuth};
use clap::Parser;
use commands::{App, Cli};
use config::Config;
use live::{AppSyncTransport, LiveStatsStore};
use log::{error, info};
use std::sync::Arc;
use storage::ClientStorage;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            eprintln!("{}", e);
            return;
        }
    };
    let host = match config.graphql_host() {
        Ok(host) => host,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return;
        }
    };

    let storage = match ClientStorage::new(&config.database_url).await {
        Ok(storage) => storage,
        Err(e) => {
            error!("Failed to open client storage: {}", e);
            return;
        }
    };

    // One store for the whole process so tallies survive between views
    let live_stats = LiveStatsStore::new();
    let provider = CognitoAuth::new(&config.auth_region, &config.auth_client_id, storage.clone());
    let app = App {
        storage: storage.clone(),
        api: Arc::new(HttpPollApi::new(&config.api_base_url, &config.api_key)),
        live_stats: live_stats.clone(),
        auth: AuthBridge::new(provider, storage, live_stats),
        transport: Arc::new(AppSyncTransport::new(
            config.realtime_endpoint.clone(),
            host,
            config.api_key.clone(),
        )),
    };
    info!("Using poll API at {}", config.api_base_url);

    if let Err(why) = commands::handle_command(&app, cli.command).await {
        error!("Command failed: {}", why);
        eprintln!("{}", why);
    }
}
