//! # Settlehook CLI
//!
//! Command-line interface for operating a running Settlehook service.
//!
//! This module provides CLI commands for:
//! - Checking service liveness
//! - Publishing business events for fan-out
//! - Managing subscriptions (register, inspect, enable, disable, remove)
//! - Running synchronous test deliveries against a subscriber endpoint

use clap::{Parser, Subcommand};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use settlehook_api::responses::{
    HealthResponse, NotifyRequest, NotifyResponse, RegisterSubscriptionRequest,
    SubscriptionListResponse, SubscriptionResponse, UpdateStatusRequest,
};
use settlehook_core::{EventType, SubscriptionId, SubscriptionStatus, TestDeliveryResult};
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Per-request timeout; covers synchronous test deliveries with retries
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

// ============================================================================
// CLI Structure
// ============================================================================

/// Settlehook CLI - manage webhook subscriptions and publish events
#[derive(Parser)]
#[command(name = "settlehook")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Manage webhook subscriptions on a Settlehook service")]
pub struct Cli {
    /// Base URL of the Settlehook service
    #[arg(long, env = "SETTLEHOOK_URL", default_value = "http://localhost:8080")]
    pub url: String,

    /// Print raw JSON responses instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Logging level for diagnostics written to stderr
    #[arg(short, long, default_value = "warn")]
    pub log_level: String,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Check that the service is up
    Health,

    /// Publish an event to every matching active subscription
    Notify {
        /// Event type tag, e.g. onSwapFinalized
        event: EventType,

        /// JSON payload delivered as the envelope's `data`
        #[arg(short, long, default_value = "{}")]
        payload: String,
    },

    /// Subscription management commands
    Subscriptions {
        #[command(subcommand)]
        action: SubscriptionCommands,
    },
}

/// Subscription management subcommands
#[derive(Subcommand)]
pub enum SubscriptionCommands {
    /// List all subscriptions, newest first
    List,

    /// Show one subscription
    Show {
        /// Subscription ID
        id: SubscriptionId,
    },

    /// Register a new subscription
    Register {
        /// Absolute http or https URL of the subscriber
        endpoint: String,

        /// Event type to subscribe to; repeat for several
        #[arg(short, long = "event", required = true)]
        events: Vec<EventType>,

        /// Shared secret used to sign deliveries
        #[arg(short, long, env = "SETTLEHOOK_WEBHOOK_SECRET")]
        secret: Option<String>,
    },

    /// Remove a subscription
    Remove {
        /// Subscription ID
        id: SubscriptionId,
    },

    /// Set a subscription to active, also reactivating a failed one
    Enable {
        /// Subscription ID
        id: SubscriptionId,
    },

    /// Set a subscription to inactive
    Disable {
        /// Subscription ID
        id: SubscriptionId,
    },

    /// Send a synthetic test delivery and wait for the result
    Test {
        /// Subscription ID
        id: SubscriptionId,

        /// Event type to label the test with; defaults to the first subscribed type
        #[arg(short, long)]
        event: Option<EventType>,
    },
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Could not reach {url}: {message}")]
    Connection { url: String, message: String },

    #[error("Service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("Unexpected response: {message}")]
    UnexpectedResponse { message: String },
}

/// Error body returned by the management API
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

// ============================================================================
// Management Client
// ============================================================================

/// HTTP client for the Settlehook management API
#[derive(Debug, Clone)]
pub struct ManagementClient {
    client: reqwest::Client,
    base_url: String,
}

impl ManagementClient {
    /// Create a client for the service at `base_url`
    pub fn new(base_url: &str) -> Result<Self, CliError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(CliError::InvalidArgument {
                arg: "url".to_string(),
                message: format!("expected an http or https URL, got '{}'", base_url),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("settlehook-cli/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CliError::Connection {
                url: base_url.clone(),
                message: e.to_string(),
            })?;

        Ok(Self { client, base_url })
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<HealthResponse, CliError> {
        self.send_json(self.client.get(self.url("/health"))).await
    }

    pub async fn notify(
        &self,
        event: EventType,
        payload: serde_json::Value,
    ) -> Result<NotifyResponse, CliError> {
        let body = NotifyRequest {
            event_type: event.as_str().to_string(),
            payload,
        };
        self.send_json(self.client.post(self.url("/api/events")).json(&body))
            .await
    }

    pub async fn list_subscriptions(&self) -> Result<SubscriptionListResponse, CliError> {
        self.send_json(self.client.get(self.url("/api/subscriptions")))
            .await
    }

    pub async fn get_subscription(
        &self,
        id: SubscriptionId,
    ) -> Result<SubscriptionResponse, CliError> {
        let path = format!("/api/subscriptions/{}", id);
        self.send_json(self.client.get(self.url(&path))).await
    }

    pub async fn register_subscription(
        &self,
        endpoint: &str,
        events: &[EventType],
        secret: Option<String>,
    ) -> Result<SubscriptionResponse, CliError> {
        let body = RegisterSubscriptionRequest {
            endpoint: endpoint.to_string(),
            event_types: events.iter().map(|e| e.as_str().to_string()).collect(),
            secret,
        };
        self.send_json(self.client.post(self.url("/api/subscriptions")).json(&body))
            .await
    }

    pub async fn remove_subscription(&self, id: SubscriptionId) -> Result<(), CliError> {
        let path = format!("/api/subscriptions/{}", id);
        self.send(self.client.delete(self.url(&path))).await?;
        Ok(())
    }

    pub async fn set_status(
        &self,
        id: SubscriptionId,
        status: SubscriptionStatus,
    ) -> Result<SubscriptionResponse, CliError> {
        let path = format!("/api/subscriptions/{}/status", id);
        let body = UpdateStatusRequest {
            status: status.as_str().to_string(),
        };
        self.send_json(self.client.put(self.url(&path)).json(&body))
            .await
    }

    pub async fn test_delivery(
        &self,
        id: SubscriptionId,
        event: Option<EventType>,
    ) -> Result<TestDeliveryResult, CliError> {
        let path = format!("/api/subscriptions/{}/test", id);
        let mut request = self.client.post(self.url(&path));
        if let Some(event) = event {
            request = request.query(&[("event", event.as_str())]);
        }
        self.send_json(request).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, CliError> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| CliError::UnexpectedResponse {
                message: e.to_string(),
            })
    }

    /// Send a request; non-2xx statuses become `CliError::Api`
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, CliError> {
        let response = request.send().await.map_err(|e| CliError::Connection {
            url: self.base_url.clone(),
            message: e.to_string(),
        })?;

        let status = response.status();
        debug!(status = status.as_u16(), url = %response.url(), "Received response");
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => parsed.error,
            Err(_) if body.is_empty() => status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
            Err(_) => body,
        };

        Err(CliError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Main CLI entry point
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();
    initialize_logging(&cli.log_level);

    let output = execute(cli).await?;
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}

/// Run a parsed command and return the text to print
pub async fn execute(cli: Cli) -> Result<String, CliError> {
    let client = ManagementClient::new(&cli.url)?;
    let json = cli.json;
    info!(url = %client.base_url(), "Using Settlehook service");

    match cli.command {
        Commands::Health => {
            let health = client.health().await?;
            render(json, &health, |h| {
                format!("{} (version {}, {})", h.status, h.version, h.timestamp)
            })
        }
        Commands::Notify { event, payload } => {
            let payload: serde_json::Value =
                serde_json::from_str(&payload).map_err(|e| CliError::InvalidArgument {
                    arg: "payload".to_string(),
                    message: e.to_string(),
                })?;
            let response = client.notify(event, payload).await?;
            render(json, &response, |r| {
                format!(
                    "Accepted {}; scheduled for {} subscription(s)",
                    r.event_type, r.recipients
                )
            })
        }
        Commands::Subscriptions { action } => {
            execute_subscription_command(&client, action, json).await
        }
    }
}

async fn execute_subscription_command(
    client: &ManagementClient,
    action: SubscriptionCommands,
    json: bool,
) -> Result<String, CliError> {
    match action {
        SubscriptionCommands::List => {
            let list = client.list_subscriptions().await?;
            render(json, &list, render_subscription_table)
        }
        SubscriptionCommands::Show { id } => {
            let subscription = client.get_subscription(id).await?;
            render(json, &subscription, render_subscription)
        }
        SubscriptionCommands::Register {
            endpoint,
            events,
            secret,
        } => {
            let subscription = client
                .register_subscription(&endpoint, &events, secret)
                .await?;
            render(json, &subscription, render_subscription)
        }
        SubscriptionCommands::Remove { id } => {
            client.remove_subscription(id).await?;
            if json {
                to_json(&serde_json::json!({ "removed": id }))
            } else {
                Ok(format!("Removed subscription {}", id))
            }
        }
        SubscriptionCommands::Enable { id } => {
            let subscription = client.set_status(id, SubscriptionStatus::Active).await?;
            render(json, &subscription, render_subscription)
        }
        SubscriptionCommands::Disable { id } => {
            let subscription = client.set_status(id, SubscriptionStatus::Inactive).await?;
            render(json, &subscription, render_subscription)
        }
        SubscriptionCommands::Test { id, event } => {
            let result = client.test_delivery(id, event).await?;
            render(json, &result, |r| {
                let outcome = if r.success { "succeeded" } else { "failed" };
                format!(
                    "Test delivery {} after {} attempt(s): {}",
                    outcome, r.attempts, r.message
                )
            })
        }
    }
}

// ============================================================================
// Output
// ============================================================================

fn render<T: Serialize>(json: bool, value: &T, text: impl Fn(&T) -> String) -> Result<String, CliError> {
    if json {
        to_json(value)
    } else {
        Ok(text(value))
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, CliError> {
    serde_json::to_string_pretty(value).map_err(|e| CliError::UnexpectedResponse {
        message: e.to_string(),
    })
}

/// Multi-line detail view of one subscription
pub fn render_subscription(subscription: &SubscriptionResponse) -> String {
    let last_triggered = subscription
        .last_triggered_at
        .map(|t| t.to_string())
        .unwrap_or_else(|| "never".to_string());

    format!(
        "{}\n  endpoint:        {}\n  events:          {}\n  status:          {}\n  failure count:   {}\n  signed:          {}\n  last triggered:  {}\n  created:         {}",
        subscription.id,
        subscription.endpoint,
        join_events(&subscription.event_types),
        subscription.status,
        subscription.failure_count,
        if subscription.has_secret { "yes" } else { "no" },
        last_triggered,
        subscription.created_at,
    )
}

/// One line per subscription
pub fn render_subscription_table(list: &SubscriptionListResponse) -> String {
    if list.subscriptions.is_empty() {
        return "No subscriptions registered".to_string();
    }

    let mut lines = vec![format!(
        "{:<36}  {:<8}  {:>8}  {}",
        "ID", "STATUS", "FAILURES", "ENDPOINT"
    )];
    for subscription in &list.subscriptions {
        lines.push(format!(
            "{:<36}  {:<8}  {:>8}  {} [{}]",
            subscription.id.to_string(),
            subscription.status.as_str(),
            subscription.failure_count,
            subscription.endpoint,
            join_events(&subscription.event_types),
        ));
    }
    lines.push(format!("{} subscription(s)", list.total));
    lines.join("\n")
}

fn join_events(events: &[EventType]) -> String {
    events
        .iter()
        .map(EventType::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Diagnostics go to stderr so command output stays pipeable
fn initialize_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
