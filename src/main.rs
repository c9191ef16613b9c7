use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vcs_hooks::server::{build_router, AppState, Config};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vcs_hooks=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().expect("invalid configuration");
    let app = build_router(AppState::new(config.origins));

    tracing::info!("listening on {}", config.listen_addr);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .unwrap();
    axum::serve(listener, app).await.unwrap();
}
