mod email;
mod error;
mod export;
mod model;
mod prompt;
mod routes;
mod schema;
mod server_config;
#[cfg(test)]
mod testing;

use std::{env, net::SocketAddr, sync::Arc};

use axum::{extract::FromRef, Router};
use lib_store::{HttpStore, RecordStore};
use mimalloc::MiMalloc;
use prompt::{data_extraction::LlmExtractor, StructuredExtractor};
use routes::AppRouter;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub type HttpClient = reqwest::Client;
pub type SharedStore = Arc<dyn RecordStore>;
pub type SharedExtractor = Arc<dyn StructuredExtractor>;

#[derive(Clone, FromRef)]
pub struct ServerState {
    pub http_client: HttpClient,
    pub store: SharedStore,
    pub extractor: SharedExtractor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::Layer::default().with_ansi(false))
        .init();

    let store_url = env::var("STORE_URL").expect("STORE_URL is not set in .env file");
    let store_token =
        env::var("STORE_ADMIN_TOKEN").expect("STORE_ADMIN_TOKEN is not set in .env file");

    let http_client = reqwest::ClientBuilder::new().use_rustls_tls().build()?;
    let store: SharedStore = Arc::new(HttpStore::new(
        &store_url,
        &store_token,
        http_client.clone(),
    ));
    let extractor: SharedExtractor = Arc::new(LlmExtractor::new(http_client.clone()));

    let state = ServerState {
        http_client,
        store,
        extractor,
    };

    let router = AppRouter::create(state);

    // force the config to load before accepting traffic
    println!("{}", *server_config::cfg);

    run_server(router).await
}

async fn run_server(router: Router) -> anyhow::Result<()> {
    let port = env::var("PORT").unwrap_or("5006".to_string());
    let addr = SocketAddr::from(([0, 0, 0, 0], port.parse::<u16>()?));
    tracing::info!("Mailbase server running on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, shutting down");
        },
    }
}
