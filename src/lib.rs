pub mod cli;
pub mod config;
pub mod models;
pub mod server;
pub mod store;

use cli::Args;
use log::info;
use server::api::AppState;
use server::Server;
use std::error::Error;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("API Prefix: {}", args.api_prefix);
    info!("Store Type: {}", args.store_type);
    info!("Seed Path: {}", args.seed_path);
    info!("Flow Title: {}", args.flow_title);
    match args.store_type.to_lowercase().as_str() {
        "sqlite" => info!("SQLite Path: {}", args.db_path),
        "redis" => {
            info!("Redis URL: {}", args.redis_url);
            info!("Redis Prefix: {}", args.redis_prefix);
        }
        _ => {}
    }
    if let Some(id) = args.default_message_id {
        info!("Default Message Id: {}", id);
    }
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let store = store::initialize_message_store(&args).await?;
    let state = AppState::new(store, args.default_message_id);
    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, state, args);
    server.run().await?;

    Ok(())
}
