//! The relay over a real loopback socket to the daemon's `/relay` endpoint.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::Error as WsError;

use wallet_relay::frontdoor::{FrontDoorProvider, FrontDoorSettings, ProviderDescriptor};
use wallet_relay::relay::{PageContext, RelayChannel, RelaySettings, WindowBus, WsConnector};

mod common;
use common::{wait_until, StackBuilder};

const PAGE: &str = "https://remote.example";

async fn daemon(stack: &common::Stack) -> (String, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let ctx = stack.ctx.clone();
    let server = tokio::spawn(async move {
        let _ = wallet_relay::http::serve(ctx, listener).await;
    });
    (format!("ws://{}/relay", addr), server)
}

#[tokio::test]
async fn page_reaches_the_daemon_over_websocket() {
    let stack = StackBuilder::new().start().await;
    let (endpoint, server) = daemon(&stack).await;

    let page = PageContext::new(PAGE, "Remote");
    let bus = WindowBus::new();
    let front = FrontDoorProvider::new(
        page.clone(),
        bus.clone(),
        ProviderDescriptor::new("Test Wallet", "data:image/svg+xml,", "io.example.wallet"),
        FrontDoorSettings {
            request_timeout: Duration::from_secs(5),
            rate_limit: None,
        },
    );
    let _listener = front.attach();

    let connector = Arc::new(WsConnector::new(&endpoint).unwrap());
    let settings = RelaySettings {
        reconnect_base: Duration::from_millis(5),
        reconnect_max: Duration::from_millis(50),
    };
    let relay = RelayChannel::new(page, bus, connector, settings).spawn();

    wait_until(|| front.is_connected()).await;
    assert_eq!(front.chain_id(), Some(1));
    assert_eq!(front.request("eth_chainId", json!([])).await.unwrap(), json!("0x1"));
    assert_eq!(front.request("eth_accounts", json!([])).await.unwrap(), json!([]));
    assert_eq!(stack.dispatcher().sessions().get(PAGE).origin, PAGE);

    relay.stop().await;
    stack.ctx.shutdown().trigger();
    let _ = server.await;
    stack.shutdown().await;
}

#[tokio::test]
async fn upgrade_with_a_mismatched_origin_header_is_refused() {
    let stack = StackBuilder::new().start().await;
    let (endpoint, server) = daemon(&stack).await;

    let url = WsConnector::new(&endpoint).unwrap().url_for("https://bank.example");
    let mut request = url.as_str().into_client_request().unwrap();
    request
        .headers_mut()
        .insert(header::ORIGIN, HeaderValue::from_static("https://evil.example"));

    match tokio_tungstenite::connect_async(request).await {
        Err(WsError::Http(response)) => assert_eq!(response.status(), StatusCode::FORBIDDEN),
        Err(other) => panic!("expected an HTTP refusal, got {}", other),
        Ok(_) => panic!("upgrade accepted a forged origin"),
    }
    assert!(!stack.dispatcher().sessions().contains("https://bank.example"));

    stack.ctx.shutdown().trigger();
    let _ = server.await;
    stack.shutdown().await;
}
