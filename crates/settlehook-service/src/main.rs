//! # Settlehook Service
//!
//! Binary entry point for the webhook notification service.
//!
//! This executable:
//! - Loads configuration from files and environment
//! - Initializes structured logging
//! - Wires the subscription registry, delivery engine, health tracker and dispatcher
//! - Starts the HTTP server from settlehook-api
//!
//! Exit codes: 1 bind failure, 2 server failure, 3 configuration error.

use settlehook_api::{start_server, ConfigError, LoggingConfig, ServiceConfig, ServiceError};
use settlehook_core::{
    DeliveryEngine, DeliveryError, HealthTracker, InMemorySubscriptionRegistry, SubscriptionRegistry,
    WebhookDispatcher,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable naming an explicit configuration file
const CONFIG_FILE_ENV: &str = "SETTLEHOOK_CONFIG_FILE";

/// Prefix for `SETTLEHOOK__SECTION__KEY` overrides
const ENV_PREFIX: &str = "SETTLEHOOK";

#[tokio::main]
async fn main() {
    let explicit_path = std::env::var(CONFIG_FILE_ENV)
        .ok()
        .filter(|path| !path.is_empty());
    let loaded = load_config(explicit_path.as_deref());

    // Logging comes up before the config error is reported so it is visible
    let logging = loaded
        .as_ref()
        .map(|config| config.logging.clone())
        .unwrap_or_default();
    init_tracing(&logging);

    let service_config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Service configuration is invalid; aborting");
            std::process::exit(3);
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config_file = explicit_path.as_deref().unwrap_or("<none>"),
        "Starting Settlehook service"
    );

    let dispatcher = match build_dispatcher(&service_config) {
        Ok(dispatcher) => dispatcher,
        Err(e) => {
            error!(error = %e, "Failed to initialise webhook delivery; aborting");
            std::process::exit(3);
        }
    };

    info!(
        host = %service_config.server.host,
        port = service_config.server.port,
        max_attempts = service_config.delivery.max_attempts,
        failure_threshold = service_config.health.failure_threshold,
        "Starting HTTP server"
    );

    if let Err(e) = start_server(service_config, dispatcher).await {
        error!("Failed to start server: {}", e);

        let exit_code = match e {
            ServiceError::BindFailed { .. } => 1,
            ServiceError::ServerFailed { .. } => 2,
            ServiceError::Configuration(_) => 3,
        };

        std::process::exit(exit_code);
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Load and validate configuration
///
/// Sources, later ones overriding earlier ones:
///  1. /etc/settlehook/service.yaml  (system-wide defaults)
///  2. ./config/service.yaml         (deployment-local override)
///  3. `explicit_path`, usually from SETTLEHOOK_CONFIG_FILE (must exist)
///  4. Environment variables such as SETTLEHOOK__DELIVERY__MAX_ATTEMPTS=5
///
/// Missing optional files fall back to built-in defaults. A malformed file or
/// a value of the wrong type is an error.
fn load_config(explicit_path: Option<&str>) -> Result<ServiceConfig, ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(
            config::File::with_name("/etc/settlehook/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        )
        .add_source(
            config::File::with_name("config/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        );

    if let Some(path) = explicit_path {
        builder = builder.add_source(config::File::with_name(path).required(true));
    }

    let service_config: ServiceConfig = builder
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()
        .and_then(|config| config.try_deserialize())
        .map_err(|e| ConfigError::Load {
            message: e.to_string(),
        })?;

    service_config.validate()?;
    Ok(service_config)
}

// ============================================================================
// Wiring
// ============================================================================

fn build_dispatcher(config: &ServiceConfig) -> Result<WebhookDispatcher, DeliveryError> {
    let registry: Arc<dyn SubscriptionRegistry> =
        Arc::new(InMemorySubscriptionRegistry::new());
    let engine = Arc::new(DeliveryEngine::new(config.delivery.to_delivery_config())?);
    let health = Arc::new(
        HealthTracker::new(Arc::clone(&registry))
            .with_failure_threshold(config.health.failure_threshold),
    );

    Ok(WebhookDispatcher::new(registry, engine, health))
}

/// Initialise the global tracing subscriber
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{level},settlehook_service={level},settlehook_api={level},settlehook_core={level},tower_http=info",
            level = logging.level
        ))
    });

    let (json_layer, text_layer) = if logging.json_format {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer()))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
