//! Real-socket tests: serving, proxying and graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use habitflow_guard::http::ServerError;
use habitflow_guard::{GuardServer, Shutdown};

mod common;

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_serves_and_shuts_down() {
    let upstream = common::start_programmable_backend(|req| match req.path.as_str() {
        "/api/user/profile" => (
            200,
            r#"{"email":"sam@example.com","secret":"s","streak":4}"#.to_string(),
        ),
        _ => (404, r#"{"error":"missing"}"#.to_string()),
    })
    .await;

    let mut config = common::test_config();
    config.upstream.url = Some(format!("http://{upstream}"));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = GuardServer::new(config).unwrap();
    let shutdown = Arc::new(Shutdown::new());
    let s = shutdown.clone();
    let handle = tokio::spawn(async move { server.run(listener, &s).await });

    let client = client();
    let res = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .expect("guard unreachable");
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["x-content-type-options"], "nosniff");
    assert!(res.headers().contains_key("x-request-id"));

    let res = client
        .get(format!("http://{addr}/api/user/profile"))
        .header("user-agent", "habitflow-web/2.1")
        .header("accept", "application/json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert!(res.headers().contains_key("x-ratelimit-remaining"));
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body, serde_json::json!({"email":"sam@example.com","streak":4}));

    let res = client
        .get(format!("http://{addr}/api/user/missing"))
        .header("user-agent", "habitflow-web/2.1")
        .header("accept", "application/json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);

    shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server did not stop")
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(shutdown.receiver_count(), 0);
}

#[tokio::test]
async fn test_validate_keys_reports_unconfigured_providers() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = GuardServer::new(habitflow_guard::GuardConfig::default()).unwrap();
    let shutdown = Arc::new(Shutdown::new());
    let s = shutdown.clone();
    let handle = tokio::spawn(async move { server.run(listener, &s).await });

    let res = client()
        .get(format!("http://{addr}/api/validate-keys"))
        .header("user-agent", "guard-cli")
        .header("accept", "application/json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["valid"], false);
    let providers = body["providers"].as_array().unwrap();
    assert_eq!(providers.len(), 2);
    assert_eq!(providers[0]["provider"], "stripe");
    assert_eq!(providers[0]["error"], "credential is not configured");
    assert!(providers[0]["checkedAtMs"].as_u64().unwrap() > 0);

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    let mut config = common::test_config();
    config.upstream.url = Some(format!("http://{}", common::closed_port().await));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = GuardServer::new(config).unwrap();
    let shutdown = Arc::new(Shutdown::new());
    let s = shutdown.clone();
    let handle = tokio::spawn(async move { server.run(listener, &s).await });

    let res = client()
        .get(format!("http://{addr}/"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 502);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["code"], "UPSTREAM_UNAVAILABLE");

    shutdown.trigger();
    let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
}

#[test]
fn test_invalid_config_is_refused_before_serving() {
    let mut config = common::test_config();
    config.maintenance.client_sweep_secs = 0;
    assert!(matches!(GuardServer::new(config), Err(ServerError::Config(_))));

    let mut config = common::test_config();
    config.upstream.url = Some("https://app.internal".into());
    assert!(matches!(GuardServer::new(config), Err(ServerError::Config(_))));
}
