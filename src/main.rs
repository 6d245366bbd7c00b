use std::net::SocketAddr;

use anyhow::Context;
use http::HeaderValue;
use tokio::signal;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer},
};
use tracing::{error, info};

use oreka_api as api;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);
    api::handlers::health::init_start_time();

    // Build CORS layer from config
    let cors_layer = if cfg.cors_allow_any_origin {
        if cfg.cors_allow_credentials {
            with_credentials(CorsLayer::new().allow_origin(AllowOrigin::mirror_request()))
        } else {
            CorsLayer::permissive()
        }
    } else {
        let origins: Vec<HeaderValue> = cfg
            .cors_origins()
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    error!("Ignoring invalid CORS origin: {}", origin);
                    None
                }
            })
            .collect();
        if origins.is_empty() {
            anyhow::bail!(
                "Missing CORS configuration: set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true"
            );
        }
        let layer = CorsLayer::new().allow_origin(origins);
        if cfg.cors_allow_credentials {
            with_credentials(layer)
        } else {
            layer.allow_methods(Any).allow_headers(Any)
        }
    };

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cfg.host, cfg.port))?;

    let state = api::AppState::initialize(cfg)
        .await
        .context("failed to initialize application state")?;

    let app = api::app_router(state)
        // Apply compression
        .layer(CompressionLayer::new())
        // Apply CORS
        .layer(cors_layer);

    // Bind and serve
    info!("oreka-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Wildcards are not allowed together with credentials, so methods and
/// headers are mirrored from the preflight request.
fn with_credentials(layer: CorsLayer) -> CorsLayer {
    layer
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
