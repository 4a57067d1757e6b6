//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::Request, http::HeaderMap, Router};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use auth_gateway::config::{GatewayConfig, ListenerConfig, UpstreamConfig};
use auth_gateway::http::ServerError;
use auth_gateway::security::{AuthKind, Tenant};
use auth_gateway::{assemble, Gateway, Server};

/// Mock backend answering every request with a description of what it received.
pub struct EchoBackend {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl EchoBackend {
    pub async fn start() -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let app = Router::new().fallback(move |request: Request| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                describe(&request)
            }
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, hits }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

fn describe(request: &Request) -> String {
    let header = |headers: &HeaderMap, name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("<none>")
            .to_string()
    };
    let headers = request.headers();

    format!(
        "method: {}\npath: {}\nquery: {}\norg: {}\nauthorization: {}\nhost: {}\nforwarded-for: {}\n",
        request.method(),
        request.uri().path(),
        request.uri().query().unwrap_or("<none>"),
        header(headers, "x-scope-orgid"),
        header(headers, "authorization"),
        header(headers, "host"),
        header(headers, "x-forwarded-for"),
    )
}

/// A port that was free a moment ago.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub fn listener_config() -> ListenerConfig {
    ListenerConfig {
        address: "127.0.0.1".to_string(),
        port: free_port(),
        graceful_shutdown_timeout_secs: 2,
        ..ListenerConfig::default()
    }
}

pub fn tenant(username: &str, password: &str, id: &str) -> Tenant {
    Tenant {
        id: id.to_string(),
        username: username.to_string(),
        password: password.to_string(),
        authentication: AuthKind::Basic,
        passthrough: false,
    }
}

pub fn upstream(url: &str) -> UpstreamConfig {
    UpstreamConfig {
        url: url.to_string(),
        ..UpstreamConfig::default()
    }
}

/// Config with free loopback ports and the `alice`/`secret`/`org1` tenant.
pub fn base_config() -> GatewayConfig {
    GatewayConfig {
        server: listener_config(),
        admin: listener_config(),
        tenants: vec![tenant("alice", "secret", "org1")],
        ..GatewayConfig::default()
    }
}

/// A gateway serving in the background.
pub struct TestGateway {
    pub server: Arc<Server>,
    pub gateway: Gateway,
    pub running: JoinHandle<Result<(), ServerError>>,
}

impl TestGateway {
    pub async fn start(config: GatewayConfig) -> Self {
        let (server, gateway) = assemble(&config).await.unwrap();
        let server = Arc::new(server);

        let running = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.run().await }
        });

        tokio::time::timeout(Duration::from_secs(5), async {
            while !server.is_ready() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("gateway never became ready");

        Self { server, gateway, running }
    }

    pub fn auth_url(&self, path: &str) -> String {
        format!("http://{}{}", self.server.local_addr(auth_gateway::ListenerKind::Authenticated), path)
    }

    pub fn admin_url(&self, path: &str) -> String {
        format!("http://{}{}", self.server.local_addr(auth_gateway::ListenerKind::Unauthenticated), path)
    }

    pub async fn stop(self) {
        self.server.shutdown().await;
        self.gateway.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(5), self.running)
            .await
            .expect("server did not stop")
            .unwrap();
        assert!(result.is_ok(), "run returned {:?}", result);
    }
}

/// HTTP client that ignores proxy environment variables.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
