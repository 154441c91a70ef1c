//! Shared utilities for integration, failure-injection and load testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tower::ServiceExt;

use sec_gateway::auth::{CredentialStore, Role};
use sec_gateway::{GatewayConfig, GatewayServer, Shutdown};

pub const PASSWD_LINE: &str = "root:x:0:0:root:/root:/bin/bash";

/// A throwaway serving root with a sibling "secret" outside it.
pub struct TestDir {
    pub base: PathBuf,
    pub root: PathBuf,
}

impl TestDir {
    pub fn new() -> Self {
        let base = std::env::temp_dir().join(format!("sgw-it-{}", uuid::Uuid::new_v4()));
        let root = base.join("files");
        std::fs::create_dir_all(root.join("reports")).unwrap();
        std::fs::write(root.join("reports/scan.txt"), b"22/tcp open ssh\n80/tcp open http\n").unwrap();
        std::fs::write(base.join("passwd"), PASSWD_LINE).unwrap();
        Self { base, root }
    }

    /// Write an executable shell script and return its path.
    #[cfg(unix)]
    pub fn script(&self, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = self.base.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    pub fn config(&self) -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.files.root = self.root.to_string_lossy().into_owned();
        config
    }
}

impl Drop for TestDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.base);
    }
}

/// Tokens issued into a fresh store, one per role.
pub struct Keys {
    pub store: CredentialStore,
    pub viewer: String,
    pub analyst: String,
    pub admin: String,
}

impl Keys {
    pub fn new() -> Self {
        let store = CredentialStore::new(None);
        let viewer = store.issue(Role::Viewer, Some("viewer".into()), None).token;
        let analyst = store.issue(Role::Analyst, Some("analyst".into()), None).token;
        let admin = store.issue(Role::Admin, Some("admin".into()), None).token;
        Self {
            store,
            viewer,
            analyst,
            admin,
        }
    }
}

pub fn app(config: GatewayConfig, store: CredentialStore) -> Router {
    GatewayServer::new(config, store).unwrap().router()
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

/// Drive one request through the router as if it came from 127.0.0.1.
pub async fn send(app: &Router, mut request: Request<Body>) -> TestResponse {
    let peer: SocketAddr = "127.0.0.1:40000".parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(peer));

    let response = app.clone().oneshot(request).await.unwrap();
    let (parts, body) = response.into_parts();
    TestResponse {
        status: parts.status,
        headers: parts.headers,
        body: body.collect().await.unwrap().to_bytes(),
    }
}

pub fn get(uri: &str, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(key) = key {
        builder = builder.header("X-API-Key", key);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, key: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header("X-API-Key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Run a gateway on an ephemeral port until `shutdown` fires.
pub async fn spawn_gateway(config: GatewayConfig, store: CredentialStore, shutdown: &Shutdown) -> SocketAddr {
    let server = GatewayServer::new(config, store).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, &shutdown).await;
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    addr
}

/// Start a programmable mock upstream on an ephemeral port.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = std::sync::Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let mut buf = [0u8; 4096];
                        let _ = socket.read(&mut buf).await;

                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    addr
}

pub fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
