//! End-to-end tests: real listeners, real upstream proxies, mock backends.

use auth_gateway::config::UpstreamConfig;
use auth_gateway::http::NOT_FOUND_BODY;
use auth_gateway::proxy::ProxyError;
use auth_gateway::security::{BASIC_CHALLENGE, ORG_ID_HEADER};
use auth_gateway::{assemble, GatewayError};
use reqwest::StatusCode;

mod common;

use common::{base_config, client, tenant, upstream, EchoBackend, TestGateway};

#[tokio::test]
async fn authenticated_push_is_forwarded_with_org_id() {
    let backend = EchoBackend::start().await;
    let mut config = base_config();
    config.distributor = upstream(&backend.url());
    let gw = TestGateway::start(config).await;

    let response = client()
        .post(gw.auth_url("/api/v1/push?debug=1"))
        .basic_auth("alice", Some("secret"))
        .body("payload")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(body.contains("method: POST"), "{}", body);
    assert!(body.contains("path: /api/v1/push\n"), "{}", body);
    assert!(body.contains("query: debug=1\n"), "{}", body);
    assert!(body.contains("org: org1\n"), "{}", body);
    assert!(body.contains("authorization: <none>\n"), "{}", body);
    assert!(body.contains(&format!("host: {}\n", backend.addr)), "{}", body);
    assert!(body.contains("forwarded-for: 127.0.0.1\n"), "{}", body);

    gw.stop().await;
}

#[tokio::test]
async fn client_supplied_org_id_is_overwritten() {
    let backend = EchoBackend::start().await;
    let mut config = base_config();
    config.distributor = upstream(&backend.url());
    let gw = TestGateway::start(config).await;

    let body = client()
        .post(gw.auth_url("/api/prom/push"))
        .basic_auth("alice", Some("secret"))
        .header(ORG_ID_HEADER, "someone-else")
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("org: org1\n"), "{}", body);

    gw.stop().await;
}

#[tokio::test]
async fn passthrough_tenant_keeps_client_org_id() {
    let backend = EchoBackend::start().await;
    let mut config = base_config();
    let mut relay = tenant("relay", "relay-pass", "relay-org");
    relay.passthrough = true;
    config.tenants.push(relay);
    config.distributor = upstream(&backend.url());
    let gw = TestGateway::start(config).await;

    let body = client()
        .post(gw.auth_url("/api/v1/push"))
        .basic_auth("relay", Some("relay-pass"))
        .header(ORG_ID_HEADER, "downstream-org")
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("org: downstream-org\n"), "{}", body);

    gw.stop().await;
}

#[tokio::test]
async fn second_tenant_is_matched() {
    let backend = EchoBackend::start().await;
    let mut config = base_config();
    config.tenants.push(tenant("bob", "hunter2", "org2"));
    config.distributor = upstream(&backend.url());
    let gw = TestGateway::start(config).await;

    let body = client()
        .post(gw.auth_url("/api/v1/push"))
        .basic_auth("bob", Some("hunter2"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("org: org2\n"), "{}", body);

    gw.stop().await;
}

#[tokio::test]
async fn missing_credentials_get_challenge() {
    let backend = EchoBackend::start().await;
    let mut config = base_config();
    config.distributor = upstream(&backend.url());
    let gw = TestGateway::start(config).await;

    let response = client().post(gw.auth_url("/api/v1/push")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()["www-authenticate"], BASIC_CHALLENGE);
    assert_eq!(backend.hits(), 0);

    gw.stop().await;
}

#[tokio::test]
async fn wrong_password_is_unauthorized_for_every_tenant() {
    let backend = EchoBackend::start().await;
    let mut config = base_config();
    config.tenants.push(tenant("bob", "hunter2", "org2"));
    config.distributor = upstream(&backend.url());
    let gw = TestGateway::start(config).await;

    for user in ["alice", "bob"] {
        let response = client()
            .post(gw.auth_url("/api/v1/push"))
            .basic_auth(user, Some("wrong"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "user {}", user);
    }
    assert_eq!(backend.hits(), 0);

    gw.stop().await;
}

#[tokio::test]
async fn unknown_path_is_not_found_with_or_without_auth() {
    let backend = EchoBackend::start().await;
    let mut config = base_config();
    config.distributor = upstream(&backend.url());
    let gw = TestGateway::start(config).await;

    let anonymous = client().get(gw.auth_url("/unknown")).send().await.unwrap();
    assert_eq!(anonymous.status(), StatusCode::NOT_FOUND);
    assert_eq!(anonymous.text().await.unwrap(), NOT_FOUND_BODY);

    let authenticated = client()
        .get(gw.auth_url("/unknown"))
        .basic_auth("alice", Some("secret"))
        .send()
        .await
        .unwrap();
    assert_eq!(authenticated.status(), StatusCode::NOT_FOUND);

    let admin = client().get(gw.admin_url("/unknown")).send().await.unwrap();
    assert_eq!(admin.status(), StatusCode::NOT_FOUND);
    assert_eq!(admin.text().await.unwrap(), NOT_FOUND_BODY);

    gw.stop().await;
}

#[tokio::test]
async fn disabled_backend_paths_are_not_found() {
    let backend = EchoBackend::start().await;
    let mut config = base_config();
    config.distributor = upstream(&backend.url());
    let gw = TestGateway::start(config).await;

    let response = client()
        .get(gw.auth_url("/api/v1/rules"))
        .basic_auth("alice", Some("secret"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    gw.stop().await;
}

#[tokio::test]
async fn path_overrides_replace_defaults() {
    let backend = EchoBackend::start().await;
    let mut config = base_config();
    config.frontend = UpstreamConfig {
        paths: vec!["/custom/query".to_string()],
        ..upstream(&backend.url())
    };
    let gw = TestGateway::start(config).await;

    let custom = client()
        .get(gw.auth_url("/custom/query"))
        .basic_auth("alice", Some("secret"))
        .send()
        .await
        .unwrap();
    assert_eq!(custom.status(), StatusCode::OK);

    let default = client()
        .get(gw.auth_url("/prometheus/api/v1/query"))
        .basic_auth("alice", Some("secret"))
        .send()
        .await
        .unwrap();
    assert_eq!(default.status(), StatusCode::NOT_FOUND);
    assert_eq!(backend.hits(), 1);

    gw.stop().await;
}

#[tokio::test]
async fn subtree_patterns_forward_nested_paths() {
    let backend = EchoBackend::start().await;
    let mut config = base_config();
    config.alertmanager = upstream(&backend.url());
    config.frontend = upstream(&backend.url());
    let gw = TestGateway::start(config).await;

    for path in ["/alertmanager/", "/alertmanager/api/v2/status", "/prometheus/api/v1/label/job/values"] {
        let response = client()
            .get(gw.auth_url(path))
            .basic_auth("alice", Some("secret"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{}", path);
        let body = response.text().await.unwrap();
        assert!(body.contains(&format!("path: {}\n", path)), "{}", body);
    }

    // exact pattern: nothing below it
    let response = client()
        .get(gw.auth_url("/api/v1/alerts/extra"))
        .basic_auth("alice", Some("secret"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    gw.stop().await;
}

#[tokio::test]
async fn unreachable_backend_is_bad_gateway() {
    let port = common::free_port();
    let mut config = base_config();
    config.ruler = upstream(&format!("http://127.0.0.1:{}", port));
    let gw = TestGateway::start(config).await;

    let response = client()
        .get(gw.auth_url("/api/v1/rules"))
        .basic_auth("alice", Some("secret"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    gw.stop().await;
}

#[tokio::test]
async fn invalid_upstream_url_prevents_startup() {
    let mut config = base_config();
    config.distributor = upstream("not-a-url");

    let err = assemble(&config).await.err().expect("assemble should fail");
    assert!(matches!(
        err,
        GatewayError::Proxy { source: ProxyError::InvalidUrl { .. }, .. }
    ));
}

#[tokio::test]
async fn readiness_and_metrics_on_admin_listener() {
    let backend = EchoBackend::start().await;
    let mut config = base_config();
    config.distributor = upstream(&backend.url());
    let gw = TestGateway::start(config).await;

    let ready = client().get(gw.admin_url("/ready")).send().await.unwrap();
    assert_eq!(ready.status(), StatusCode::OK);
    assert_eq!(ready.text().await.unwrap(), "Ready!");

    client()
        .post(gw.auth_url("/api/v1/push"))
        .basic_auth("alice", Some("secret"))
        .send()
        .await
        .unwrap();
    client().post(gw.auth_url("/api/v1/push")).send().await.unwrap();

    let metrics = client()
        .get(gw.admin_url("/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("cortex_request_duration_seconds"), "{}", metrics);
    assert!(metrics.contains(r#"route="/api/v1/push""#), "{}", metrics);
    assert!(metrics.contains(r#"status_code="200""#), "{}", metrics);
    assert!(metrics.contains(r#"status_code="401""#), "{}", metrics);

    // admin endpoints are not exposed on the authenticated listener
    let hidden = client().get(gw.auth_url("/metrics")).send().await.unwrap();
    assert_eq!(hidden.status(), StatusCode::NOT_FOUND);

    let pprof = client().get(gw.admin_url("/debug/pprof/runtime")).send().await.unwrap();
    assert_eq!(pprof.status(), StatusCode::OK);
    let unknown = client().get(gw.admin_url("/debug/pprof/heap")).send().await.unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    gw.stop().await;
}

#[tokio::test]
async fn shutdown_is_idempotent() {
    let backend = EchoBackend::start().await;
    let mut config = base_config();
    config.distributor = upstream(&backend.url());
    let gw = TestGateway::start(config).await;
    assert!(gw.server.is_ready());

    gw.server.shutdown().await;
    assert!(!gw.server.is_ready());
    gw.server.shutdown().await;
    assert!(!gw.server.is_ready());
    gw.gateway.shutdown();
    gw.gateway.shutdown();

    gw.stop().await;
}
