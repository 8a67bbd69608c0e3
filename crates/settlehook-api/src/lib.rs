//! # Settlehook HTTP Service
//!
//! HTTP management surface for the webhook notification subsystem.
//!
//! This service provides:
//! - Subscription management (register, list, get, remove, status changes)
//! - Operator test deliveries
//! - An event intake endpoint that triggers fan-out
//! - Health and Prometheus metrics endpoints

pub mod config;
pub mod errors;
pub mod metrics;
pub mod responses;

pub use config::{DeliverySettings, HealthSettings, LoggingConfig, ServerConfig, ServiceConfig};
pub use errors::{ApiError, ConfigError, ServiceError};
pub use metrics::ServiceMetrics;

use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    middleware,
    response::{Json, Response},
    routing::{get, post, put},
    Router,
};
use responses::{
    HealthResponse, NotifyRequest, NotifyResponse, RegisterSubscriptionRequest,
    SubscriptionListResponse, SubscriptionResponse, TestDeliveryParams, UpdateStatusRequest,
};
use settlehook_core::{
    EventType, NewSubscription, SubscriptionId, SubscriptionRegistry, SubscriptionStatus,
    TestDeliveryResult, Timestamp, Uuid, WebhookDispatcher,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, instrument, warn};

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: Arc<ServiceConfig>,

    /// Fan-out entry point; also gives access to the registry
    pub dispatcher: WebhookDispatcher,

    /// Metrics collector for observability
    pub metrics: Arc<ServiceMetrics>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: ServiceConfig,
        dispatcher: WebhookDispatcher,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            dispatcher,
            metrics,
        }
    }

    fn registry(&self) -> &Arc<dyn SubscriptionRegistry> {
        self.dispatcher.registry()
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/health", get(handle_health_check))
        .route("/metrics", get(metrics_endpoint));

    let api_routes = Router::new()
        .route("/api/events", post(handle_notify))
        .route(
            "/api/subscriptions",
            post(register_subscription).get(list_subscriptions),
        )
        .route(
            "/api/subscriptions/{id}",
            get(get_subscription).delete(remove_subscription),
        )
        .route(
            "/api/subscriptions/{id}/status",
            put(update_subscription_status),
        )
        .route("/api/subscriptions/{id}/test", post(test_subscription));

    let mut router = Router::new()
        .merge(health_routes)
        .merge(api_routes)
        .layer(DefaultBodyLimit::max(state.config.server.max_body_size))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            metrics_middleware,
        ));

    if state.config.server.enable_compression {
        router = router.layer(CompressionLayer::new());
    }
    if state.config.server.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Start HTTP server and run until SIGINT/SIGTERM
pub async fn start_server(
    config: ServiceConfig,
    dispatcher: WebhookDispatcher,
) -> Result<(), ServiceError> {
    let metrics = ServiceMetrics::new().map_err(|e| {
        ServiceError::Configuration(ConfigError::Invalid {
            message: format!("Failed to initialize metrics: {}", e),
        })
    })?;

    let address = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config, dispatcher, metrics);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|e| ServiceError::BindFailed {
            address: address.clone(),
            message: e.to_string(),
        })?;

    info!("Starting HTTP server on {}", address);

    // In-flight requests finish; deliveries already spawned keep running until
    // the runtime shuts down
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        })?;

    info!("HTTP server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}

// ============================================================================
// Health and Observability Handlers
// ============================================================================

/// Liveness check
async fn handle_health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Timestamp::now(),
    })
}

/// Prometheus metrics endpoint
#[instrument(skip_all)]
async fn metrics_endpoint(State(state): State<AppState>) -> Result<String, ApiError> {
    let subscriptions = state.registry().list().await?;
    state.metrics.set_subscription_counts(&subscriptions);

    state.metrics.render().map_err(|e| ApiError::Internal {
        message: format!("Failed to encode metrics: {}", e),
    })
}

// ============================================================================
// Event Intake
// ============================================================================

/// Accept a business event and schedule its fan-out
///
/// Responds `202 Accepted` as soon as deliveries are scheduled.
#[instrument(skip(state, request), fields(event = %request.event_type))]
async fn handle_notify(
    State(state): State<AppState>,
    Json(request): Json<NotifyRequest>,
) -> Result<(StatusCode, Json<NotifyResponse>), ApiError> {
    let event_type: EventType = request.event_type.parse()?;

    let dispatch = state.dispatcher.notify(event_type, request.payload).await;
    state
        .metrics
        .record_notification(event_type, dispatch.recipient_count());

    let response = NotifyResponse {
        event_type,
        recipients: dispatch.recipient_count(),
        timestamp: dispatch.notification().timestamp,
    };

    Ok((StatusCode::ACCEPTED, Json(response)))
}

// ============================================================================
// Subscription Handlers
// ============================================================================

#[instrument(skip(state, request), fields(endpoint = %request.endpoint))]
async fn register_subscription(
    State(state): State<AppState>,
    Json(request): Json<RegisterSubscriptionRequest>,
) -> Result<(StatusCode, Json<SubscriptionResponse>), ApiError> {
    let input = NewSubscription::parse(&request.endpoint, &request.event_types, request.secret)?;
    let subscription = state.registry().register(input).await?;

    info!(subscription_id = %subscription.id, "Subscription created");
    Ok((
        StatusCode::CREATED,
        Json(SubscriptionResponse::from(&subscription)),
    ))
}

#[instrument(skip(state))]
async fn list_subscriptions(
    State(state): State<AppState>,
) -> Result<Json<SubscriptionListResponse>, ApiError> {
    let mut subscriptions = state.registry().list().await?;
    subscriptions.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let subscriptions: Vec<SubscriptionResponse> =
        subscriptions.iter().map(SubscriptionResponse::from).collect();
    Ok(Json(SubscriptionListResponse {
        total: subscriptions.len(),
        subscriptions,
    }))
}

#[instrument(skip(state))]
async fn get_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    let id = parse_id(&id)?;

    let subscription = state
        .registry()
        .get(id)
        .await?
        .ok_or_else(|| not_found(id))?;

    Ok(Json(SubscriptionResponse::from(&subscription)))
}

#[instrument(skip(state))]
async fn remove_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;

    if state.registry().remove(id).await? {
        info!(subscription_id = %id, "Subscription removed");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(id))
    }
}

#[instrument(skip(state, request), fields(status = %request.status))]
async fn update_subscription_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    let id = parse_id(&id)?;
    let status: SubscriptionStatus = request.status.parse()?;

    if !state.registry().set_status(id, status).await? {
        return Err(not_found(id));
    }
    info!(subscription_id = %id, status = %status, "Subscription status changed");

    // The record can vanish between the update and this read
    let subscription = state
        .registry()
        .get(id)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(SubscriptionResponse::from(&subscription)))
}

/// Run a synchronous test delivery for operator diagnostics
#[instrument(skip(state, params))]
async fn test_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<TestDeliveryParams>,
) -> Result<Json<TestDeliveryResult>, ApiError> {
    let id = parse_id(&id)?;
    let event = params
        .event
        .as_deref()
        .map(str::parse::<EventType>)
        .transpose()?;

    if state.registry().get(id).await?.is_none() {
        return Err(not_found(id));
    }

    let result = state.dispatcher.test_delivery(id, event).await;
    state.metrics.record_test_delivery(result.success);

    if !result.success {
        warn!(subscription_id = %id, message = %result.message, "Test delivery failed");
    }
    Ok(Json(result))
}

fn parse_id(raw: &str) -> Result<SubscriptionId, ApiError> {
    raw.parse().map_err(|_| ApiError::InvalidId {
        value: raw.to_string(),
    })
}

fn not_found(id: SubscriptionId) -> ApiError {
    ApiError::NotFound { id: id.to_string() }
}

// ============================================================================
// Middleware
// ============================================================================

/// Metrics collection middleware
///
/// Records request count and latency per method, normalized path and status.
async fn metrics_middleware(
    State(state): State<AppState>,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let start = std::time::Instant::now();
    let method = request.method().clone();
    let normalized_path = normalize_path_for_metrics(request.uri().path());

    let response = next.run(request).await;
    let duration = start.elapsed();
    let status = response.status();

    state
        .metrics
        .record_http_request(method.as_str(), &normalized_path, status.as_u16(), duration);

    info!(
        method = %method,
        path = %normalized_path,
        status = %status,
        duration_ms = %duration.as_millis(),
        "HTTP request metrics"
    );

    response
}

/// Normalize path for metrics to avoid cardinality explosion
///
/// Converts paths like `/api/subscriptions/<uuid>/status` to
/// `/api/subscriptions/:id/status`
fn normalize_path_for_metrics(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment.parse::<Uuid>().is_ok() {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
