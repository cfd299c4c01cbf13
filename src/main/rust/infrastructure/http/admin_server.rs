use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;

use serde::Serialize;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Reply};

use crate::application::services::{CommissioningInfo, RecordSummary};
use crate::domain::errors::DomainError;
use crate::infrastructure::host::BridgeDirectory;
use crate::infrastructure::metrics::PrometheusReporter;
use crate::infrastructure::network::usable_interfaces;

const SERVICE_NAME: &str = "matter-dynamic-bridge";

/// Health check response structure
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct DevicesResponse {
    bridge: String,
    state: String,
    pending: Vec<String>,
    devices: Vec<RecordSummary>,
}

fn with_directory(
    directory: BridgeDirectory,
) -> impl Filter<Extract = (BridgeDirectory,), Error = Infallible> + Clone {
    warp::any().map(move || directory.clone())
}

fn not_found() -> Response {
    StatusCode::NOT_FOUND.into_response()
}

fn commissioning_reply(directory: BridgeDirectory, id: String) -> Response {
    match directory.get(&id).and_then(|bridge| bridge.commissioning()) {
        Some(info) => warp::reply::json(&info).into_response(),
        None => not_found(),
    }
}

async fn reopen_reply(directory: BridgeDirectory, id: String) -> Result<Response, Infallible> {
    let Some(bridge) = directory.get(&id).filter(|b| b.has_hub()) else {
        return Ok(not_found());
    };
    Ok(match bridge.reopen_commissioning().await {
        Ok(codes) => warp::reply::json(&CommissioningInfo::Ready(codes)).into_response(),
        Err(e @ DomainError::BridgeNotReady(_)) => {
            tracing::warn!(bridge = %id, error = %e, "Cannot reopen commissioning");
            warp::reply::with_status(e.to_string(), StatusCode::SERVICE_UNAVAILABLE).into_response()
        }
        Err(e) => {
            tracing::error!(bridge = %id, error = %e, "Failed to reopen commissioning");
            warp::reply::with_status(e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                .into_response()
        }
    })
}

fn devices_reply(directory: BridgeDirectory, id: String) -> Response {
    let Some(bridge) = directory.get(&id) else {
        return not_found();
    };
    let registry = bridge.registry();
    warp::reply::json(&DevicesResponse {
        bridge: id,
        state: bridge.state().to_string(),
        pending: registry.pending(),
        devices: registry.summary(),
    })
    .into_response()
}

/// Administrative, health and metrics routes
pub fn routes(
    directory: BridgeDirectory,
) -> impl Filter<Extract = (Response,), Error = warp::Rejection> + Clone {
    let admin = warp::path("_matterbridge");

    let commissioning_route = admin
        .and(warp::path("commissioning"))
        .and(warp::get())
        .and(with_directory(directory.clone()))
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .map(commissioning_reply);

    let reopen_route = admin
        .and(warp::path("reopen"))
        .and(warp::get())
        .and(with_directory(directory.clone()))
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and_then(reopen_reply);

    let interfaces_route = admin
        .and(warp::path("interfaces"))
        .and(warp::get())
        .and(warp::path::end())
        .map(|| warp::reply::json(&usable_interfaces()).into_response());

    let devices_route = admin
        .and(warp::path("devices"))
        .and(warp::get())
        .and(with_directory(directory.clone()))
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .map(devices_reply);

    let metrics_route = warp::path("metrics").map(|| {
        let body = PrometheusReporter::gather_metrics();
        warp::reply::with_header(body, "content-type", "text/plain; version=0.0.4; charset=utf-8")
            .into_response()
    });

    let health_route = warp::path("health").map(|| {
        let response = HealthResponse {
            status: "healthy",
            service: SERVICE_NAME,
            version: env!("CARGO_PKG_VERSION"),
        };
        warp::reply::json(&response).into_response()
    });

    // Liveness probe endpoint (minimal check - is the process running?)
    let liveness_route = warp::path("livez")
        .map(|| warp::reply::with_status("OK", StatusCode::OK).into_response());

    // Readiness probe endpoint (every bridge online)
    let readiness_route = warp::path("readyz")
        .and(with_directory(directory))
        .map(|directory: BridgeDirectory| {
            let online = directory.all().iter().all(|b| b.state().is_online());
            let response = HealthResponse {
                status: if online { "ready" } else { "starting" },
                service: SERVICE_NAME,
                version: env!("CARGO_PKG_VERSION"),
            };
            let status = if online {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            warp::reply::with_status(warp::reply::json(&response), status).into_response()
        });

    commissioning_route
        .or(reopen_route)
        .unify()
        .or(interfaces_route)
        .unify()
        .or(devices_route)
        .unify()
        .or(metrics_route)
        .unify()
        .or(health_route)
        .unify()
        .or(liveness_route)
        .unify()
        .or(readiness_route)
        .unify()
}

/// Serve the admin routes until `shutdown` resolves
pub fn serve_admin(
    port: u16,
    directory: BridgeDirectory,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> (SocketAddr, impl Future<Output = ()> + Send + 'static) {
    // CORS configuration for browser access
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "OPTIONS"])
        .allow_headers(vec!["Content-Type"]);

    let (addr, server) = warp::serve(routes(directory).with(cors))
        .bind_with_graceful_shutdown(([0, 0, 0, 0], port), shutdown);
    tracing::info!("Admin server listening on http://{}", addr);
    (addr, server)
}
