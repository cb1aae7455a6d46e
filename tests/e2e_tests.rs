//! End-to-end tests for Mirage
//!
//! These tests bind real listeners and talk to them over HTTP.

use mirage::{AppState, Config, Server};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A server running on an ephemeral loopback port
struct TestServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<mirage::Result<()>>,
}

impl TestServer {
    async fn start(mut config: Config) -> Self {
        config.server.bind_address = "127.0.0.1".to_string();
        config.server.port = 0;
        config.server.shutdown_timeout_secs = 5;

        let server = Server::bind(AppState::new(config).unwrap()).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run_until(async move {
            let _ = shutdown_rx.await;
        }));

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_echo_over_socket() {
    let server = TestServer::start(Config::default()).await;

    let response = client()
        .post(server.url("/echo"))
        .header("content-type", "text/csv")
        .body("a,b\n1,2\n")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.headers()["content-type"], "text/csv");
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.text().await.unwrap(), "a,b\n1,2\n");

    server.stop().await;
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let mut config = Config::default();
    config.server.max_body_size = 16;
    let server = TestServer::start(config).await;

    let response = client()
        .post(server.url("/echo"))
        .body(vec![b'x'; 64])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 413);

    let response = client()
        .post(server.url("/echo"))
        .body(vec![b'x'; 16])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    server.stop().await;
}

#[tokio::test]
async fn test_replay_to_target() {
    let origin = TestServer::start(Config::default()).await;
    let target = TestServer::start(Config::default()).await;
    let client = client();

    let response = client
        .post(origin.url("/orders?src=a"))
        .header("x-request-id", "order-1")
        .header("content-type", "application/json")
        .body(r#"{"sku":"abc"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let replayed = client
        .post(origin.url("/replay"))
        .body(
            serde_json::json!({
                "id": "order-1",
                "target": target.url("/orders?src=replay"),
            })
            .to_string(),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(replayed.status().as_u16(), 200);
    assert_eq!(replayed.headers()["content-type"], "application/json");
    assert_eq!(replayed.text().await.unwrap(), r#"{"sku":"abc"}"#);

    // the target recorded the replayed request under the same id
    let history = client
        .get(target.url("/history"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let history: serde_json::Value = serde_json::from_str(&history).unwrap();
    assert_eq!(history[0]["id"], "order-1");
    assert_eq!(history[0]["url"], "/orders?src=replay");

    origin.stop().await;
    target.stop().await;
}

#[tokio::test]
async fn test_replay_failure_is_500() {
    let server = TestServer::start(Config::default()).await;
    let client = client();

    client
        .post(server.url("/x"))
        .header("x-request-id", "gone-1")
        .body("x")
        .send()
        .await
        .unwrap();

    let response = client
        .post(server.url("/replay"))
        .body(r#"{"id":"gone-1","target":"http://127.0.0.1:9/x"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 500);
    assert!(response.text().await.unwrap().starts_with("Replay failed"));

    server.stop().await;
}
