//! HTTP front end
//!
//! Every metadata request is answered from the record of the machine that
//! sent it: caller address, then backend lookup, then path resolution and
//! query evaluation against that record.

use crate::forwarded::client_ip;
use crate::health::AvailabilityTracker;
use crate::metrics::HegelMetrics;
use crate::metrics_middleware::track_requests;
use axum::{
    Json, Router,
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{Method, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{any, get},
};
use hegel_client::{Hardware, HardwareClient};
use hegel_common::{CustomEndpoints, DataModel, Error, Result, TrustedProxies};
use hegel_metadata::{
    Composite, EC2_VERSION_PREFIX, Query, ec2_tree, execute, export_hardware, relative_path,
    resolve, run_query,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

/// Paths served by Hegel itself; custom endpoints may not shadow them
const HEALTHCHECK_PATH: &str = "/_packet/healthcheck";
const VERSION_PATH: &str = "/_packet/version";
const METRICS_PATH: &str = "/metrics";

/// Startup configuration of the HTTP front end
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub custom_endpoints: CustomEndpoints,
    pub data_model: DataModel,
    pub trusted_proxies: TrustedProxies,
    /// Upper bound on a single backend lookup
    pub backend_timeout: Duration,
    pub git_rev: String,
}

/// Shared application state
pub struct AppState {
    pub client: Arc<dyn HardwareClient>,
    pub health: Arc<AvailabilityTracker>,
    pub metrics: Arc<HegelMetrics>,
    tree: Composite,
    endpoints: BTreeMap<String, Query>,
    data_model: DataModel,
    trusted_proxies: TrustedProxies,
    backend_timeout: Duration,
    git_rev: String,
    started: Instant,
}

impl AppState {
    /// Build the state, compiling the EC2 tree and every custom endpoint query
    ///
    /// # Errors
    /// Returns `Error::InvalidFilter` for an unparsable endpoint query and
    /// `Error::Configuration` for an endpoint path that collides with a
    /// built-in route.
    pub fn new(
        client: Arc<dyn HardwareClient>,
        health: Arc<AvailabilityTracker>,
        metrics: Arc<HegelMetrics>,
        config: ServerConfig,
    ) -> Result<Self> {
        let mut endpoints = BTreeMap::new();
        for (path, filter) in config.custom_endpoints.iter() {
            check_endpoint_path(path)?;
            let query = Query::parse(filter).map_err(|e| {
                Error::invalid_filter(format!("custom endpoint {path}: {e}"))
            })?;
            endpoints.insert(path.to_string(), query);
        }

        Ok(Self {
            client,
            health,
            metrics,
            tree: ec2_tree()?,
            endpoints,
            data_model: config.data_model,
            trusted_proxies: config.trusted_proxies,
            backend_timeout: config.backend_timeout,
            git_rev: config.git_rev,
            started: Instant::now(),
        })
    }

    /// Configured custom endpoint paths
    pub fn endpoint_paths(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }

    /// Address of the caller, or `None` if the connection carries none
    fn caller(&self, request: &Request) -> Option<String> {
        let ConnectInfo(peer) = request.extensions().get::<ConnectInfo<SocketAddr>>()?;
        Some(client_ip(*peer, request.headers(), &self.trusted_proxies).to_string())
    }

    /// Fetch the caller's record, counting the request and any failure
    async fn lookup(&self, ip: &str) -> std::result::Result<Hardware, Response> {
        self.metrics.metadata_request();
        let result = match tokio::time::timeout(self.backend_timeout, self.client.by_ip(ip)).await
        {
            Ok(result) => result,
            Err(_) => Err(Error::BackendUnavailable(format!(
                "lookup timed out after {:?}",
                self.backend_timeout
            ))),
        };

        result.map_err(|e| {
            self.metrics.error("metadata", "lookup");
            error!(ip, "failed to get hardware: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
    }
}

fn check_endpoint_path(path: &str) -> Result<()> {
    let reserved = [HEALTHCHECK_PATH, VERSION_PATH, METRICS_PATH, EC2_VERSION_PREFIX];
    if reserved.contains(&path) || path.starts_with(&format!("{EC2_VERSION_PREFIX}/")) {
        return Err(Error::configuration(format!(
            "custom endpoint {path} collides with a built-in route"
        )));
    }
    if path.contains(['{', '}', '*'])
        || path.split('/').any(|segment| segment.starts_with([':', '*']))
    {
        return Err(Error::configuration(format!(
            "custom endpoint {path} contains route pattern characters"
        )));
    }
    Ok(())
}

/// Build the HTTP router
pub fn router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route(HEALTHCHECK_PATH, get(healthcheck))
        .route(VERSION_PATH, get(version))
        .route(METRICS_PATH, get(metrics_handler))
        .route(EC2_VERSION_PREFIX, any(ec2_metadata))
        .route(&format!("{EC2_VERSION_PREFIX}/"), any(ec2_metadata))
        .route(&format!("{EC2_VERSION_PREFIX}/{{*path}}"), any(ec2_metadata));

    for path in state.endpoint_paths() {
        router = router.route(path, any(custom_metadata));
    }

    router
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            track_requests,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Empty 200, used where the caller gets nothing (non-GET, no address)
fn empty() -> Response {
    StatusCode::OK.into_response()
}

fn respond(result: Result<Vec<u8>>) -> Response {
    match result {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(e @ Error::InvalidMetadataItem(_)) => {
            debug!("{e}");
            (StatusCode::NOT_FOUND, "404 not found").into_response()
        }
        Err(e) => {
            error!("failed to serve metadata: {e}");
            StatusCode::from_u16(e.http_status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
                .into_response()
        }
    }
}

/// `/2009-04-04/...`: EC2-style metadata
async fn ec2_metadata(State(state): State<Arc<AppState>>, request: Request) -> Response {
    if request.method() != Method::GET {
        return empty();
    }
    let Some(ip) = state.caller(&request) else {
        return empty();
    };

    let hardware = match state.lookup(&ip).await {
        Ok(hardware) => hardware,
        Err(response) => return response,
    };

    let path = relative_path(request.uri().path()).unwrap_or_default();
    debug!(%ip, path, "serving ec2 metadata");
    respond(resolve(&state.tree, path).and_then(|r| execute(&r, hardware.document())))
}

/// Custom endpoints: whole-record export or the endpoint's query, by data model
async fn custom_metadata(State(state): State<Arc<AppState>>, request: Request) -> Response {
    if request.method() != Method::GET {
        return empty();
    }
    let Some(ip) = state.caller(&request) else {
        return empty();
    };
    let Some(query) = state.endpoints.get(request.uri().path()) else {
        return (StatusCode::NOT_FOUND, "404 not found").into_response();
    };

    let hardware = match state.lookup(&ip).await {
        Ok(hardware) => hardware,
        Err(response) => return response,
    };

    let record = hardware.document();
    respond(match state.data_model {
        DataModel::Legacy => export_hardware(record),
        DataModel::Filtered => run_query(query, record),
    })
}

#[derive(Debug, Serialize)]
struct HealthReport<'a> {
    git_rev: &'a str,
    uptime_seconds: f64,
    concurrent_task_count: u64,
    backend_available: bool,
}

/// `/_packet/healthcheck`: 200 only while the last backend probe succeeded
async fn healthcheck(State(state): State<Arc<AppState>>) -> Response {
    let available = state.health.snapshot().is_available();
    let report = HealthReport {
        git_rev: &state.git_rev,
        uptime_seconds: state.started.elapsed().as_secs_f64(),
        // in-flight requests plus the prober
        concurrent_task_count: state.metrics.in_flight() + 1,
        backend_available: available,
    };

    let status = if available {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(report)).into_response()
}

#[derive(Debug, Serialize)]
struct VersionReport<'a> {
    git_rev: &'a str,
}

/// `/_packet/version`
async fn version(State(state): State<Arc<AppState>>) -> Response {
    Json(VersionReport {
        git_rev: &state.git_rev,
    })
    .into_response()
}

/// `/metrics`: Prometheus text exposition
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.metrics.export_prometheus(),
    )
        .into_response()
}

/// Serve `router` on `listener` until ctrl-c
///
/// # Errors
/// Returns any I/O error from the accept loop.
pub async fn serve(listener: tokio::net::TcpListener, router: Router) -> std::io::Result<()> {
    info!("Serving metadata on {}", listener.local_addr()?);
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    })
    .await
}
