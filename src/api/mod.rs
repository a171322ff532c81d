//! HTTP surface of the queue service.
//!
//! Every route is a `GET` with plain-text responses, except `/skip` which
//! answers with a JSON array. Clients outside the configured whitelist are
//! refused before routing.

pub mod error;
pub mod resolver;

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

pub use self::error::ApiError;
pub use self::resolver::{Blob, PayloadResolver, ResolveError};

use crate::broker::Broker;
use crate::core::Message;
use crate::metrics;

/// Header carrying the original payload when a blob is served in its place.
pub const MESSAGE_HEADER: &str = "message";

#[derive(Debug, Clone)]
pub struct AppState {
    pub broker: Arc<Broker>,
    pub resolver: Arc<PayloadResolver>,
    whitelist: Arc<HashSet<IpAddr>>,
}

impl AppState {
    /// An empty `whitelist` admits every client.
    pub fn new(broker: Arc<Broker>, resolver: PayloadResolver, whitelist: HashSet<IpAddr>) -> Self {
        Self {
            broker,
            resolver: Arc::new(resolver),
            whitelist: Arc::new(whitelist),
        }
    }

    fn admits(&self, ip: IpAddr) -> bool {
        self.whitelist.is_empty() || self.whitelist.contains(&ip.to_canonical())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/list", get(list_queues))
        .route("/count/{queue}", get(count_messages))
        .route("/skip/{queue}/{number}", get(skip_messages))
        .route("/set/{queue}", get(missing_message))
        .route("/set/{queue}/{*message}", get(set_message))
        .route("/get/{queue}", get(get_message))
        .route("/fetch/{queue}", get(fetch_message))
        .route("/download", get(missing_message))
        .route("/download/{*message}", get(download_message))
        .route("/delete/{queue}", get(delete_queue))
        .route("/metrics", get(metrics_text))
        .layer(middleware::from_fn_with_state(state.clone(), ip_whitelist))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the router on every address until `shutdown` changes or is
/// dropped.
pub async fn serve(
    state: AppState,
    addresses: &[String],
    shutdown: watch::Receiver<()>,
) -> std::io::Result<()> {
    let app = router(state);

    let servers = addresses.iter().map(|address| {
        let app = app.clone();
        let mut shutdown = shutdown.clone();
        async move {
            let listener = TcpListener::bind(address.as_str()).await?;
            info!("listening on {}", listener.local_addr()?);
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
        }
    });

    futures::future::try_join_all(servers).await?;
    Ok(())
}

async fn ip_whitelist(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.admits(peer.ip()) {
        debug!("refusing client {}", peer);
        return Err(ApiError::Forbidden);
    }
    Ok(next.run(request).await)
}

async fn list_queues(State(state): State<AppState>) -> String {
    state
        .broker
        .list()
        .into_iter()
        .map(|name| name + "\n")
        .collect()
}

async fn count_messages(
    State(state): State<AppState>,
    Path(queue): Path<String>,
) -> Result<String, ApiError> {
    Ok(state.broker.count(&queue)?.to_string())
}

async fn skip_messages(
    State(state): State<AppState>,
    Path((queue, number)): Path<(String, String)>,
) -> Result<Json<Vec<String>>, ApiError> {
    state.broker.count(&queue)?;
    let n: usize = number
        .parse()
        .map_err(|_| ApiError::BadRequest("Number must be a non-negative integer!".to_string()))?;
    let messages = state.broker.peek(&queue, n)?;
    Ok(Json(messages.iter().map(|m| m.as_str().to_string()).collect()))
}

async fn missing_message() -> ApiError {
    ApiError::BadRequest("Message is empty!".to_string())
}

async fn set_message(
    State(state): State<AppState>,
    Path((queue, message)): Path<(String, String)>,
) -> Result<&'static str, ApiError> {
    if message.is_empty() {
        return Err(missing_message().await);
    }
    let message = Message::from(message);
    state.resolver.check(&message).await?;
    state.broker.set(&queue, message)?;
    Ok("OK.")
}

async fn get_message(
    State(state): State<AppState>,
    Path(queue): Path<String>,
) -> Result<String, ApiError> {
    Ok(state.broker.get(&queue)?.to_string())
}

async fn fetch_message(
    State(state): State<AppState>,
    Path(queue): Path<String>,
) -> Result<Response, ApiError> {
    let message = state.broker.get(&queue)?;
    respond_with_payload(&state.resolver, message).await
}

async fn download_message(
    State(state): State<AppState>,
    Path(message): Path<String>,
) -> Result<Response, ApiError> {
    if message.is_empty() {
        return Err(missing_message().await);
    }
    respond_with_payload(&state.resolver, Message::from(message)).await
}

async fn delete_queue(
    State(state): State<AppState>,
    Path(queue): Path<String>,
) -> Result<&'static str, ApiError> {
    state.broker.delete(&queue)?;
    Ok("OK.")
}

async fn metrics_text() -> String {
    metrics::snapshot()
}

async fn respond_with_payload(
    resolver: &PayloadResolver,
    message: Message,
) -> Result<Response, ApiError> {
    let Some(blob) = resolver.resolve(&message).await.map_err(ApiError::on_read)? else {
        return Ok(message.to_string().into_response());
    };

    let mut response = blob.data.into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(blob.content_type));
    match HeaderValue::from_str(message.as_str()) {
        Ok(value) => {
            headers.insert(MESSAGE_HEADER, value);
        }
        Err(_) => debug!("payload {:?} is not a valid header value", message.as_str()),
    }
    Ok(response)
}
