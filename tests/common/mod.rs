//! Shared harness for integration tests.
//!
//! Runs an axum front end that turns every call into a `RequestEnvelope`,
//! queues it, and waits on its completion handle. The test supplies the
//! worker that plays the queue/retry/forwarding stages.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use proxy_envelope::config::{parse_config, ApiRegistry};
use proxy_envelope::envelope::{EnvelopeError, RequestEnvelope};
use proxy_envelope::net::{track_inbound, ConnectionTable};

#[derive(Clone)]
struct AppState {
    registry: ApiRegistry,
    queue: mpsc::Sender<RequestEnvelope>,
    wait_timeout: Duration,
}

/// A running test front end.
#[allow(dead_code)]
pub struct TestProxy {
    pub addr: SocketAddr,
    pub registry: ApiRegistry,
    pub connections: ConnectionTable,
}

#[allow(dead_code)]
impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

async fn inbound_handler(
    State(state): State<AppState>,
    Path((api, _rest)): Path<(String, String)>,
    request: Request,
) -> Response {
    let mut envelope =
        match RequestEnvelope::from_inbound_call(request, state.registry.max_body_bytes()).await {
            Ok(envelope) => envelope,
            Err(e) => return e.into_response(),
        };
    envelope.set_api_name(api);
    state.registry.apply_to(&mut envelope);
    envelope.detect_streaming();

    let mut receiver = envelope.attach_completion();
    if state.queue.send(envelope).await.is_err() {
        return (StatusCode::SERVICE_UNAVAILABLE, "Queue closed").into_response();
    }

    match receiver.wait_timeout(state.wait_timeout).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

/// Start the front end on an ephemeral port with a programmable worker.
pub async fn start_proxy<F, Fut>(config: &str, wait_timeout: Duration, worker: F) -> TestProxy
where
    F: Fn(RequestEnvelope, ConnectionTable) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let config = parse_config(config).expect("test config must be valid");
    let registry = ApiRegistry::new(&config).unwrap();
    let connections = ConnectionTable::new();
    let (queue, mut rx) = mpsc::channel::<RequestEnvelope>(64);

    let worker = Arc::new(worker);
    let worker_connections = connections.clone();
    tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            let worker = worker.clone();
            let connections = worker_connections.clone();
            tokio::spawn(async move { worker(envelope, connections).await });
        }
    });

    let state = AppState {
        registry: registry.clone(),
        queue,
        wait_timeout,
    };
    let app = Router::new()
        .route("/{api}/{*rest}", any(inbound_handler))
        .with_state(state)
        .layer(middleware::from_fn_with_state(connections.clone(), track_inbound));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    TestProxy {
        addr,
        registry,
        connections,
    }
}

/// JSON response as a forwarding stage would produce it.
#[allow(dead_code)]
pub fn json_response(status: StatusCode, value: serde_json::Value) -> Response {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(value.to_string()))
        .unwrap()
}

/// Settle with an error, asserting the handle was still pending.
#[allow(dead_code)]
pub fn fail_once(envelope: &RequestEnvelope, error: EnvelopeError) {
    envelope.fail(error).expect("completion settled twice");
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
