use actix_web::{web, App, HttpServer};
use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod http;

#[actix_web::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = config::Config::from_env();
    tracing::info!(
        faces_dir = %config.faces_dir.display(),
        threshold = config.threshold,
        "facegated starting"
    );

    let engine = engine::spawn_engine(&config)?;

    // Populate the cache now so the first request pays no scan cost.
    let enrolled = engine.preload().await?;
    tracing::info!(enrolled, "authorized faces loaded");

    let state = web::Data::new(http::AppState {
        engine,
        max_upload_bytes: config.max_upload_bytes,
    });

    tracing::info!(addr = %config.bind_addr, port = config.port, "facegated ready");
    HttpServer::new(move || App::new().app_data(state.clone()).configure(http::routes))
        .bind((config.bind_addr.as_str(), config.port))?
        .run()
        .await?;

    tracing::info!("facegated shutting down");
    Ok(())
}
