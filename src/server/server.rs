use anyhow::{Context, Result};
use std::{net::SocketAddr, time::Duration};

use tracing::{error, info};

use tower::ServiceBuilder;
use tower_http::services::ServeDir;

use axum::{
    extract::State,
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::auth_routes::make_auth_routes;
use super::backup_routes::make_backup_routes;
use super::maintenance_routes::make_maintenance_routes;
use super::metrics::metrics_handler;
use super::session::AuthSession;
use super::state::ServerState;
use super::{log_requests, security_headers, security_layer};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(session: Option<AuthSession>, State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        uid: session.map(|s| s.uid),
    };
    Json(stats)
}

pub fn make_app(state: ServerState) -> Router {
    let admin_routes: Router<ServerState> = make_maintenance_routes().merge(make_backup_routes());

    let api_routes: Router = Router::new()
        .nest("/v1/admin", admin_routes)
        .nest("/v1/auth", make_auth_routes())
        .layer(middleware::from_fn_with_state(state.clone(), security_layer))
        .with_state(state.clone());

    let home_router: Router = match state.config.frontend_dir_path.clone() {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new().fallback_service(static_files_service)
        }
        None => Router::new()
            .route("/", get(home))
            .with_state(state.clone()),
    };

    home_router.merge(api_routes).layer(
        ServiceBuilder::new()
            .layer(middleware::from_fn_with_state(state, log_requests))
            .layer(middleware::map_response(security_headers)),
    )
}

fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Serves the app and the metrics endpoint until `shutdown` is cancelled.
pub async fn run_server(state: ServerState, shutdown: CancellationToken) -> Result<()> {
    let port = state.config.port;
    let metrics_port = state.config.metrics_port;
    let app = make_app(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    let metrics_listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", metrics_port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", metrics_port))?;

    info!("Ready to serve at port {}!", port);
    info!("Metrics available at port {}!", metrics_port);

    let metrics_shutdown = shutdown.clone();
    let metrics_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(metrics_listener, make_metrics_app())
            .with_graceful_shutdown(async move { metrics_shutdown.cancelled().await })
            .await
        {
            error!("Metrics server error: {}", e);
        }
    });

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await?;

    let _ = metrics_task.await;
    Ok(())
}
