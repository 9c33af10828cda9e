use std::sync::Arc;

use omnichat::adapter::ProviderAdapter;
use omnichat::config::load_config;
use omnichat::observability::init_tracing;
use omnichat::relay::{router, RelayState};

#[tokio::main]
async fn main() {
    let config = load_config("config.yaml").unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        eprintln!("Please copy 'config.example.yaml' to 'config.yaml' and modify as needed.");
        std::process::exit(1);
    });

    init_tracing(&config.features.log_level);

    let adapter = Arc::new(ProviderAdapter::new(&config.server, &config.providers));
    let state = Arc::new(RelayState { adapter });
    let app = router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|err| {
            eprintln!("Failed to bind to {addr}: {err}");
            std::process::exit(1);
        });

    tracing::info!(
        "omnichat-relay listening on {} ({} providers)",
        addr,
        config.providers.len()
    );

    if let Err(err) = axum::serve(listener, app).await {
        eprintln!("Server error: {err}");
        std::process::exit(1);
    }
}
