use std::{error::Error, sync::Arc};

use tokio::net::TcpListener;

use auth::TokenKeys;
use config::Config;
use db::{get_db_pool, init_schema};
use handlers::{router, AppState};
use storage::{DisabledStorage, PhotoStore, SupabaseStorage};
use store::{PgStore, Store};

mod accounts;
mod auth;
mod availability;
mod booking;
mod catalog;
mod config;
mod db;
mod error;
mod handlers;
mod models;
mod notifications;
mod pricing;
mod revenue;
mod storage;
mod store;

extern crate pretty_env_logger;
#[macro_use] extern crate log;

#[tokio::main]
async fn main() {
    pretty_env_logger::init();
    if let Err(e) = run().await {
        error!("Startup failed: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error + Send + Sync>> {
    let config = Config::from_env()?;

    let pool = get_db_pool(&config).await?;
    init_schema(&pool).await?;
    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool.clone()));

    let photos: Arc<dyn PhotoStore> = match &config.storage {
        Some(s) => {
            info!("Photo uploads go to bucket '{}'", s.bucket);
            Arc::new(SupabaseStorage::new(&s.url, s.key.clone(), s.bucket.clone())?)
        }
        None => {
            warn!("STORAGE_URL/STORAGE_KEY not set, photo uploads are disabled");
            Arc::new(DisabledStorage)
        }
    };

    let keys = Arc::new(TokenKeys::new(config.jwt_secret.as_bytes(), config.token_ttl_days));
    let state = AppState {
        engine: Arc::new(booking::BookingEngine::new(store.clone(), photos)),
        catalog: Arc::new(catalog::Catalog::new(store.clone())),
        accounts: Arc::new(accounts::Accounts::new(store, keys.clone())),
        keys,
    };

    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for ctrl-c: {}", e);
            }
            info!("Shutting down");
        })
        .await?;

    pool.close().await;
    Ok(())
}
