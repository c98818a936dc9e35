//! Symbol Switch Integration Tests
//!
//! Tests the switch choreography over a live connection: unsubscribe
//! strictly before subscribe, commit only after the subscribe is sent,
//! and a full round trip even when the symbol does not change.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use finnhub_stream_ingest::{
    ApiToken, EventRouter, IngestClient, IngestClientConfig, IngestClientError, IngestHandle,
    IngestState, IngestStatus, SharedIngestStatus, SinkConfig, SymbolRegistry, TradeHub,
    WatchdogConfig,
};

// =============================================================================
// Test Harness
// =============================================================================

/// In-process stand-in for the upstream trade stream.
struct UpstreamServer {
    url: String,
    /// Control frames the client sent, in arrival order.
    control_rx: mpsc::Receiver<String>,
    /// Cancelling this makes the server initiate a close handshake.
    close: CancellationToken,
    handle: JoinHandle<()>,
}

async fn spawn_upstream() -> UpstreamServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (control_tx, control_rx) = mpsc::channel::<String>(64);
    let close = CancellationToken::new();
    let server_close = close.clone();

    let handle = tokio::spawn(async move {
        let (stream, _peer) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        loop {
            tokio::select! {
                () = server_close.cancelled() => {
                    let _ = ws.send(Message::Close(None)).await;
                    while let Some(msg) = ws.next().await {
                        if msg.is_err() {
                            break;
                        }
                    }
                    return;
                }
                msg = ws.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let _ = control_tx.send(text.as_str().to_owned()).await;
                        }
                        Some(Ok(Message::Close(_))) | None => return,
                        Some(Ok(_)) => {}
                        Some(Err(_)) => return,
                    }
                }
            }
        }
    });

    UpstreamServer {
        url: format!("ws://{addr}"),
        control_rx,
        close,
        handle,
    }
}

struct IngestUnderTest {
    handle: IngestHandle,
    status: SharedIngestStatus,
    cancel: CancellationToken,
    task: JoinHandle<Result<(), IngestClientError>>,
}

async fn spawn_ingest(url: &str) -> IngestUnderTest {
    let mut config =
        IngestClientConfig::new(url.to_string(), ApiToken::new("test-token").unwrap());
    config.watchdog = WatchdogConfig::new(Duration::ZERO);

    let hub = Arc::new(TradeHub::with_defaults());
    let registry = Arc::new(SymbolRegistry::new(&[], SinkConfig::default()));
    let router = EventRouter::new(registry, hub);
    let status: SharedIngestStatus = Arc::new(IngestStatus::new());
    let cancel = CancellationToken::new();

    let (client, handle) = IngestClient::new(config, router, Arc::clone(&status), cancel.clone());
    let task = tokio::spawn(client.run());

    let ingest = IngestUnderTest {
        handle,
        status,
        cancel,
        task,
    };
    wait_for_state(&ingest.status, IngestState::Streaming).await;
    ingest
}

async fn wait_for_state(status: &SharedIngestStatus, want: IngestState) {
    timeout(Duration::from_secs(2), async {
        while status.state() != want {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for ingest state");
}

async fn wait_for_active(status: &SharedIngestStatus, want: &str) {
    timeout(Duration::from_secs(2), async {
        while status.active_symbol().as_deref() != Some(want) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for the active symbol to commit");
}

async fn next_control(server: &mut UpstreamServer) -> serde_json::Value {
    let text = timeout(Duration::from_secs(2), server.control_rx.recv())
        .await
        .expect("timed out waiting for a control frame")
        .expect("upstream connection is gone");
    serde_json::from_str(&text).unwrap()
}

// =============================================================================
// Switch Choreography Tests
// =============================================================================

#[tokio::test]
async fn test_first_switch_subscribes_without_prior_unsubscribe() {
    let mut server = spawn_upstream().await;
    let ingest = spawn_ingest(&server.url).await;

    // The venue matches subscription symbols case-sensitively, so the
    // requested casing must reach the wire and the status untouched.
    ingest.handle.change_symbol("BINANCE:BTCUSDT").await.unwrap();

    let control = next_control(&mut server).await;
    assert_eq!(control["type"], "subscribe");
    assert_eq!(control["symbol"], "BINANCE:BTCUSDT");

    wait_for_active(&ingest.status, "BINANCE:BTCUSDT").await;

    // Nothing else went over the wire.
    assert!(server.control_rx.try_recv().is_err());

    ingest.cancel.cancel();
    server.handle.abort();
}

#[tokio::test]
async fn test_switch_unsubscribes_old_before_subscribing_new() {
    let mut server = spawn_upstream().await;
    let ingest = spawn_ingest(&server.url).await;

    ingest.handle.change_symbol("btcusdt").await.unwrap();
    let _first_sub = next_control(&mut server).await;
    wait_for_active(&ingest.status, "btcusdt").await;

    ingest.handle.change_symbol("ethusdt").await.unwrap();

    let unsub = next_control(&mut server).await;
    assert_eq!(unsub["type"], "unsubscribe");
    assert_eq!(unsub["symbol"], "btcusdt");

    let sub = next_control(&mut server).await;
    assert_eq!(sub["type"], "subscribe");
    assert_eq!(sub["symbol"], "ethusdt");

    wait_for_active(&ingest.status, "ethusdt").await;

    ingest.cancel.cancel();
    server.handle.abort();
}

#[tokio::test]
async fn test_same_symbol_switch_performs_full_round_trip() {
    let mut server = spawn_upstream().await;
    let ingest = spawn_ingest(&server.url).await;

    ingest.handle.change_symbol("ethusdt").await.unwrap();
    let _first_sub = next_control(&mut server).await;
    wait_for_active(&ingest.status, "ethusdt").await;

    // Switching to the current symbol still unsubscribes and resubscribes,
    // which is what refreshes a subscription the venue silently dropped.
    ingest.handle.change_symbol("ethusdt").await.unwrap();

    let unsub = next_control(&mut server).await;
    assert_eq!(unsub["type"], "unsubscribe");
    assert_eq!(unsub["symbol"], "ethusdt");

    let sub = next_control(&mut server).await;
    assert_eq!(sub["type"], "subscribe");
    assert_eq!(sub["symbol"], "ethusdt");

    wait_for_active(&ingest.status, "ethusdt").await;

    ingest.cancel.cancel();
    server.handle.abort();
}

#[tokio::test]
async fn test_queued_switches_apply_in_arrival_order() {
    let mut server = spawn_upstream().await;
    let ingest = spawn_ingest(&server.url).await;

    ingest.handle.change_symbol("btcusdt").await.unwrap();
    ingest.handle.change_symbol("ethusdt").await.unwrap();

    let first = next_control(&mut server).await;
    assert_eq!(first["type"], "subscribe");
    assert_eq!(first["symbol"], "btcusdt");

    let second = next_control(&mut server).await;
    assert_eq!(second["type"], "unsubscribe");
    assert_eq!(second["symbol"], "btcusdt");

    let third = next_control(&mut server).await;
    assert_eq!(third["type"], "subscribe");
    assert_eq!(third["symbol"], "ethusdt");

    wait_for_active(&ingest.status, "ethusdt").await;

    ingest.cancel.cancel();
    server.handle.abort();
}

#[tokio::test]
async fn test_switch_after_loop_stops_errors() {
    let server = spawn_upstream().await;
    let ingest = spawn_ingest(&server.url).await;

    server.close.cancel();

    let result = timeout(Duration::from_secs(2), ingest.task)
        .await
        .expect("ingest did not stop after server close")
        .unwrap();
    assert!(result.is_ok());

    let switch = ingest.handle.change_symbol("btcusdt").await;
    assert!(switch.is_err());
}
