//! Shared helpers for adapter tests against local mock servers.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpListener;

use regfleet_core::{CliOptions, ProviderKind, Registry, RegistryRole, RegistrySpec};

/// Requests seen by a mock server, as `"METHOD /raw/path"`.
pub type RequestLog = Arc<Mutex<Vec<String>>>;

/// Serves the router on an ephemeral port and returns its base URL.
pub async fn spawn(router: Router) -> (String, RequestLog) {
    let log: RequestLog = Arc::default();
    let app = router.layer(middleware::from_fn_with_state(log.clone(), record));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), log)
}

async fn record(State(log): State<RequestLog>, request: Request, next: Next) -> Response {
    log.lock()
        .push(format!("{} {}", request.method(), request.uri().path()));
    next.run(request).await
}

/// Returns the logged requests using the given method.
pub fn requests_with(log: &RequestLog, method: &str) -> Vec<String> {
    log.lock()
        .iter()
        .filter(|r| r.starts_with(&format!("{method} ")))
        .cloned()
        .collect()
}

/// Builds a registry pointing at a mock server.
pub fn registry(provider: ProviderKind, url: &str, annotations: &[(&str, &str)]) -> Registry {
    Registry::from_spec(
        RegistrySpec {
            name: format!("{provider}-mock"),
            provider,
            api_endpoint: url.to_string(),
            username: "admin".to_string(),
            password: "secret".to_string(),
            role: RegistryRole::Local,
            annotations: annotations
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect::<BTreeMap<_, _>>(),
        },
        &CliOptions::default(),
    )
}

/// Slices `items` the way a `page`/`page_size` API does.
pub fn paged(items: &[Value], query: &HashMap<String, String>) -> Json<Value> {
    let page: usize = query.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let size: usize = query
        .get("page_size")
        .and_then(|p| p.parse().ok())
        .unwrap_or(items.len().max(1));
    let start = (page - 1).saturating_mul(size).min(items.len());
    let end = (start + size).min(items.len());
    Json(Value::Array(items[start..end].to_vec()))
}
