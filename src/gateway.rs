use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    Form, Json, Router,
    body::Body,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::IntentBridge;
use crate::config::GatewaySettings;
use crate::intent::ParseError;
use crate::resolver::Resolution;
use crate::telemetry::ResolverMetrics;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// HTTP host around the resolution core: a small HTML form for humans, a
/// JSON endpoint for machines, health and metrics for operators.
pub struct GatewayDaemon {
    settings: GatewaySettings,
    bridge: Arc<IntentBridge>,
    metrics: Arc<ResolverMetrics>,
}

#[derive(Clone)]
struct GatewayState {
    bridge: Arc<IntentBridge>,
    metrics: Arc<ResolverMetrics>,
}

impl GatewayDaemon {
    pub fn new(settings: GatewaySettings, bridge: IntentBridge) -> Result<Self> {
        let metrics = ResolverMetrics::new().context("Failed to initialise gateway metrics")?;
        Ok(Self {
            settings,
            bridge: Arc::new(bridge),
            metrics: Arc::new(metrics),
        })
    }

    pub async fn run(self) -> Result<()> {
        let addr: SocketAddr = self
            .settings
            .listen_addr
            .parse()
            .with_context(|| format!("Invalid gateway listen address: {}", self.settings.listen_addr))?;

        let state = GatewayState {
            bridge: self.bridge.clone(),
            metrics: self.metrics.clone(),
        };
        let app = router(state);

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind gateway listener at {addr}"))?;

        info!(
            listener = %addr,
            domains = self.bridge.registry().domain_count(),
            mappings = self.bridge.registry().mapping_count(),
            "Starting Waylink gateway"
        );

        let server = axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(shutdown_signal());

        if let Some(metrics_addr) = self.settings.metrics_listen.clone() {
            tokio::try_join!(
                async {
                    server
                        .await
                        .context("Waylink gateway terminated unexpectedly")
                },
                async { run_metrics_server(&metrics_addr, self.metrics.clone()).await },
            )?;
        } else {
            server
                .await
                .context("Waylink gateway terminated unexpectedly")?;
        }

        Ok(())
    }
}

fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(index_handler).post(submit_handler))
        .route("/resolve", get(resolve_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(state_metrics_handler))
        .with_state(state)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received; stopping Waylink gateway");
}

async fn run_metrics_server(addr: &str, metrics: Arc<ResolverMetrics>) -> Result<()> {
    let socket_addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("Invalid metrics listener address: {addr}"))?;

    let listener = TcpListener::bind(socket_addr)
        .await
        .with_context(|| format!("Failed to bind metrics listener at {socket_addr}"))?;

    info!(listener = %socket_addr, "Starting Waylink metrics server");

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Waylink metrics server terminated unexpectedly")
}

fn render_metrics(metrics: &ResolverMetrics) -> Response {
    match metrics.render() {
        Ok(buffer) => {
            let mut response = Response::new(Body::from(buffer));
            *response.status_mut() = StatusCode::OK;
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(PROMETHEUS_CONTENT_TYPE),
            );
            response
        }
        Err(err) => {
            error!(error = %err, "Failed to render gateway metrics");
            let mut response = Response::new(Body::from(err.to_string()));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

async fn metrics_handler(State(metrics): State<Arc<ResolverMetrics>>) -> Response {
    render_metrics(&metrics)
}

async fn state_metrics_handler(State(state): State<GatewayState>) -> Response {
    render_metrics(&state.metrics)
}

struct ApiError {
    status: StatusCode,
    kind: Option<&'static str>,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: None,
            message: message.into(),
        }
    }

    fn parse_failure(err: ParseError) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            kind: Some("parse_error"),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = match self.kind {
            Some(kind) => json!({ "kind": kind, "error": self.message }),
            None => json!({ "error": self.message }),
        };
        (self.status, Json(payload)).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct ResolveQuery {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    target: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResolveForm {
    #[serde(default)]
    intent_uri: String,
    #[serde(default)]
    target: Option<String>,
}

fn requested_target(target: Option<&str>) -> Option<&str> {
    target.map(str::trim).filter(|value| !value.is_empty())
}

async fn index_handler(State(state): State<GatewayState>) -> Html<String> {
    Html(page(&render_form(state.bridge.default_target_app())))
}

async fn submit_handler(
    State(state): State<GatewayState>,
    Form(form): Form<ResolveForm>,
) -> Response {
    let request_id = Uuid::new_v4();
    let raw = form.intent_uri.trim();
    if raw.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Html(page(&render_invalid("Please enter an intent URI."))),
        )
            .into_response();
    }

    state.metrics.inc_request();
    let target = requested_target(form.target.as_deref());
    match state.bridge.resolve_raw(raw, target) {
        Ok(Resolution::Resolved(uri)) => {
            state.metrics.inc_resolved();
            info!(request = %request_id, uri = %uri, "resolved intent to target link");
            Html(page(&render_resolved(&uri))).into_response()
        }
        Ok(Resolution::Fallback(uri)) => {
            state.metrics.inc_fallback();
            info!(request = %request_id, "no mapping registered; offering store fallback");
            Html(page(&render_fallback(&uri))).into_response()
        }
        Err(err) => {
            state.metrics.inc_parse_error();
            warn!(request = %request_id, error = %err, "rejected unparsable intent URI");
            Html(page(&render_invalid(&err.to_string()))).into_response()
        }
    }
}

async fn resolve_handler(
    State(state): State<GatewayState>,
    Query(query): Query<ResolveQuery>,
) -> Result<Json<Value>, ApiError> {
    let request_id = Uuid::new_v4();
    let raw = query.uri.as_deref().map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(ApiError::bad_request("uri must not be empty"));
    }

    state.metrics.inc_request();
    let target = requested_target(query.target.as_deref());
    match state.bridge.resolve_raw(raw, target) {
        Ok(resolution) => {
            match &resolution {
                Resolution::Resolved(uri) => {
                    state.metrics.inc_resolved();
                    info!(request = %request_id, uri = %uri, "resolved intent to target link");
                }
                Resolution::Fallback(_) => {
                    state.metrics.inc_fallback();
                    info!(request = %request_id, "no mapping registered; offering store fallback");
                }
            }
            Ok(Json(json!({
                "kind": resolution.kind(),
                "uri": resolution.uri(),
            })))
        }
        Err(err) => {
            state.metrics.inc_parse_error();
            warn!(request = %request_id, error = %err, "rejected unparsable intent URI");
            Err(ApiError::parse_failure(err))
        }
    }
}

async fn health_handler(State(state): State<GatewayState>) -> Json<Value> {
    let registry = state.bridge.registry();
    Json(json!({
        "status": "ok",
        "domains": registry.domain_count(),
        "mappings": registry.mapping_count(),
        "default_target": state.bridge.default_target_app(),
    }))
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn page(body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Waylink</title></head>\n<body>\n{body}\n</body>\n</html>\n"
    )
}

fn render_form(default_target: &str) -> String {
    let target = escape_html(default_target);
    format!(
        concat!(
            "<h1>Waylink</h1>\n",
            "<p>Paste an intent URI to resolve it into an application deep link.</p>\n",
            "<form method=\"post\" action=\"/\">\n",
            "<label for=\"intent_uri\">Intent URI</label>\n",
            "<input type=\"text\" id=\"intent_uri\" name=\"intent_uri\" size=\"80\" placeholder=\"beckn://...\">\n",
            "<label for=\"target\">Target application</label>\n",
            "<input type=\"text\" id=\"target\" name=\"target\" value=\"{target}\">\n",
            "<button type=\"submit\">Resolve</button>\n",
            "</form>"
        ),
        target = target
    )
}

fn render_resolved(uri: &str) -> String {
    let link = escape_html(uri);
    format!(
        concat!(
            "<h2>Constructed Redirect URL:</h2>\n",
            "<p><a href=\"{link}\">{link}</a></p>\n",
            "<p>Click the link above to proceed.</p>"
        ),
        link = link
    )
}

fn render_fallback(uri: &str) -> String {
    let link = escape_html(uri);
    format!(
        concat!(
            "<h2>No Supported App Found</h2>\n",
            "<p>No application could handle the URI. Search the store instead:</p>\n",
            "<p><a href=\"{link}\">{link}</a></p>"
        ),
        link = link
    )
}

fn render_invalid(message: &str) -> String {
    format!("<p style=\"color:red;\">{}</p>", escape_html(message))
}
