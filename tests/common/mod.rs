//! An HTTP backend for tests: `MemoryTransport` served over axum the way the real document
//! service answers, so `HttpTransport` and the binary can be exercised end to end.
#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::{Path as UrlPath, Query as Params, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use fieldstore::path::{Query, ResourcePath};
use fieldstore::transport::{MemoryTransport, Transport};
use fieldstore::StoreError;
use serde_json::{json, Value};
use std::sync::Arc;
use std::thread;

type Reply = (StatusCode, Json<Value>);

#[derive(Clone)]
struct Backend {
    tree: Arc<MemoryTransport>,
    auth: Option<String>,
}

pub struct TestBackend {
    pub base_url: String,
    pub tree: Arc<MemoryTransport>,
}

fn failure(error: StoreError) -> Reply {
    match error {
        StoreError::BackendError { status, message } => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Json(json!({ "error": message })),
        ),
        other => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": other.to_string() })),
        ),
    }
}

fn param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.as_str())
}

/// `url_path` is the request path after URL decoding, as any HTTP server hands it over; the
/// keys in it are still escaped the way the backend stores them.
fn admit(
    backend: &Backend,
    url_path: &str,
    params: &[(String, String)],
) -> Result<(ResourcePath, Query), Reply> {
    if let Some(expected) = &backend.auth {
        if param(params, "auth") != Some(expected.as_str()) {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Permission denied" })),
            ));
        }
    }
    let query = Query::from_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .map_err(|e| (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))))?;
    Ok((ResourcePath::from_encoded(url_path), query))
}

async fn read(
    State(backend): State<Backend>,
    UrlPath(url_path): UrlPath<String>,
    Params(params): Params<Vec<(String, String)>>,
) -> Reply {
    let (path, query) = match admit(&backend, &url_path, &params) {
        Ok(admitted) => admitted,
        Err(reply) => return reply,
    };
    match backend.tree.get(&path, &query).await {
        Ok(value) => (StatusCode::OK, Json(value)),
        Err(e) => failure(e),
    }
}

async fn write(
    State(backend): State<Backend>,
    UrlPath(url_path): UrlPath<String>,
    Params(params): Params<Vec<(String, String)>>,
    Json(body): Json<Value>,
) -> Reply {
    let (path, _) = match admit(&backend, &url_path, &params) {
        Ok(admitted) => admitted,
        Err(reply) => return reply,
    };
    match backend.tree.put(&path, &body).await {
        Ok(value) => (StatusCode::OK, Json(value)),
        Err(e) => failure(e),
    }
}

async fn append_or_delete(
    State(backend): State<Backend>,
    UrlPath(url_path): UrlPath<String>,
    Params(params): Params<Vec<(String, String)>>,
    body: Bytes,
) -> Reply {
    let (path, _) = match admit(&backend, &url_path, &params) {
        Ok(admitted) => admitted,
        Err(reply) => return reply,
    };
    if param(&params, "x-http-method-override") == Some("DELETE") {
        return match backend.tree.delete(&path).await {
            Ok(()) => (StatusCode::OK, Json(Value::Null)),
            Err(e) => failure(e),
        };
    }
    let body: Value = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": e.to_string() })),
            )
        }
    };
    match backend.tree.append(&path, &body).await {
        Ok(key) => (StatusCode::OK, Json(json!({ "name": key }))),
        Err(e) => failure(e),
    }
}

#[tokio::main]
async fn serve(backend: Backend, ready: std::sync::mpsc::Sender<u16>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let app = Router::new()
        .route("/{*path}", get(read).put(write).post(append_or_delete))
        .with_state(backend);
    ready.send(port).unwrap();
    axum::serve(listener, app).await.unwrap();
}

/// Starts a backend on its own thread and runtime. It lives until the test process exits.
pub fn start_backend(auth: Option<&str>) -> TestBackend {
    let tree = Arc::new(MemoryTransport::new());
    let backend = Backend {
        tree: tree.clone(),
        auth: auth.map(str::to_string),
    };
    let (ready_tx, ready_rx) = std::sync::mpsc::channel();
    thread::spawn(move || serve(backend, ready_tx));
    let port = ready_rx.recv().unwrap();
    TestBackend {
        base_url: format!("http://127.0.0.1:{port}"),
        tree,
    }
}

/// A port nothing listens on.
pub fn unreachable_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}
