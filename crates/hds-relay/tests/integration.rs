//! End-to-end tests for the relay
//!
//! Each test binds a full relay on ephemeral ports and talks to it over real
//! HTTP, WebSocket and UDP sockets.

use futures::StreamExt;
use hds_relay::relay::{BROADCAST_SERVER, METRICS_ENDPOINT, PUSH_RECEIVER};
use hds_relay::Relay;
use hds_relay_core::{IngestMode, PushProtocol, RelayConfig, UpdateMessage};
use rosc::{OscPacket, OscType};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio_tungstenite::tungstenite::Message;

fn ephemeral() -> RelayConfig {
    let mut config = RelayConfig::default();
    config.ingest.push_port = 0;
    config.broadcast.port = 0;
    config.metrics.port = 0;
    config
}

fn http_url(addr: SocketAddr, path: &str) -> String {
    format!("http://127.0.0.1:{}{}", addr.port(), path)
}

fn ws_url(addr: SocketAddr) -> String {
    format!("ws://127.0.0.1:{}/ws", addr.port())
}

async fn push(client: &reqwest::Client, addr: SocketAddr, data: &str) -> reqwest::StatusCode {
    client
        .put(http_url(addr, "/"))
        .json(&json!({ "data": data }))
        .send()
        .await
        .unwrap()
        .status()
}

async fn next_update<S>(stream: &mut S) -> UpdateMessage
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_push_update_reaches_every_exporter() {
    let osc = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let mut config = ephemeral();
    config.broadcast.enabled = true;
    config.metrics.enabled = true;
    config.signal.enabled = true;
    config.signal.port = osc.local_addr().unwrap().port();

    let relay = Relay::bind(&config).await.unwrap();
    let push_addr = relay.local_addr(PUSH_RECEIVER).unwrap();
    let broadcast_addr = relay.local_addr(BROADCAST_SERVER).unwrap();
    let metrics_addr = relay.local_addr(METRICS_ENDPOINT).unwrap();
    let task = tokio::spawn(relay.run());

    let client = reqwest::Client::new();
    assert_eq!(push(&client, push_addr, "heartRate:80").await, reqwest::StatusCode::OK);

    let latest: Value = client
        .get(http_url(broadcast_addr, "/"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(latest["heartRate"], 80);

    let metrics = client
        .get(http_url(metrics_addr, "/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("heart_rate 80"));

    let mut buf = [0u8; rosc::decoder::MTU];
    let len = tokio::time::timeout(Duration::from_secs(5), osc.recv(&mut buf))
        .await
        .unwrap()
        .unwrap();
    let (_, packet) = rosc::decoder::decode_udp(&buf[..len]).unwrap();
    match packet {
        OscPacket::Message(msg) => {
            assert_eq!(msg.addr, "/avatar/parameters/HeartRate");
            assert!(matches!(msg.args[0], OscType::Float(v) if v == 0.3125));
        }
        other => panic!("unexpected packet: {:?}", other),
    }

    task.abort();
}

#[tokio::test]
async fn test_stream_snapshot_only_after_first_update() {
    let mut config = ephemeral();
    config.broadcast.enabled = true;

    let relay = Relay::bind(&config).await.unwrap();
    let push_addr = relay.local_addr(PUSH_RECEIVER).unwrap();
    let broadcast_addr = relay.local_addr(BROADCAST_SERVER).unwrap();
    let task = tokio::spawn(relay.run());

    let (mut early, _) = tokio_tungstenite::connect_async(ws_url(broadcast_addr))
        .await
        .unwrap();
    // Nothing has been received yet, so no snapshot is sent
    assert!(
        tokio::time::timeout(Duration::from_millis(300), early.next())
            .await
            .is_err()
    );

    let client = reqwest::Client::new();
    assert_eq!(push(&client, push_addr, "heartRate:70").await, reqwest::StatusCode::OK);

    let update = next_update(&mut early).await;
    assert_eq!(update.updated_key, "heartRate");
    assert_eq!(update.data.heart_rate, 70);

    let (mut late, _) = tokio_tungstenite::connect_async(ws_url(broadcast_addr))
        .await
        .unwrap();
    let snapshot = next_update(&mut late).await;
    assert!(snapshot.is_snapshot());
    assert_eq!(snapshot.data.heart_rate, 70);

    task.abort();
}

#[tokio::test]
async fn test_malformed_payloads_change_nothing() {
    let mut config = ephemeral();
    config.broadcast.enabled = true;

    let relay = Relay::bind(&config).await.unwrap();
    let push_addr = relay.local_addr(PUSH_RECEIVER).unwrap();
    let broadcast_addr = relay.local_addr(BROADCAST_SERVER).unwrap();
    let receiver = relay.push_receiver().unwrap().clone();
    let task = tokio::spawn(relay.run());

    let client = reqwest::Client::new();
    for data in ["heartRate", "heartRate:80:1", "heartRate:fast"] {
        assert_eq!(
            push(&client, push_addr, data).await,
            reqwest::StatusCode::BAD_REQUEST
        );
    }
    let status = client
        .put(http_url(push_addr, "/"))
        .body("heartRate:80")
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);

    assert!(!receiver.snapshot().is_populated());
    let status = client
        .get(http_url(broadcast_addr, "/"))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, reqwest::StatusCode::NOT_FOUND);

    task.abort();
}

#[tokio::test]
async fn test_legacy_protocol_accepts_heart_rate_only() {
    let mut config = ephemeral();
    config.ingest.push_protocol = PushProtocol::Legacy;

    let relay = Relay::bind(&config).await.unwrap();
    let push_addr = relay.local_addr(PUSH_RECEIVER).unwrap();
    let receiver = relay.push_receiver().unwrap().clone();
    let task = tokio::spawn(relay.run());

    let client = reqwest::Client::new();
    assert_eq!(
        push(&client, push_addr, "stepCount:10").await,
        reqwest::StatusCode::BAD_REQUEST
    );
    assert_eq!(push(&client, push_addr, "heartRate:72").await, reqwest::StatusCode::OK);
    assert_eq!(receiver.snapshot().heart_rate, 72);
    assert_eq!(receiver.snapshot().step_count, 0);

    task.abort();
}

#[tokio::test]
async fn test_pull_relay_follows_upstream() {
    let mut upstream = ephemeral();
    upstream.broadcast.enabled = true;
    let upstream = Relay::bind(&upstream).await.unwrap();
    let upstream_push = upstream.local_addr(PUSH_RECEIVER).unwrap();
    let upstream_stream = upstream.local_addr(BROADCAST_SERVER).unwrap();
    let upstream_task = tokio::spawn(upstream.run());

    let mut downstream = ephemeral();
    downstream.ingest.mode = IngestMode::Pull;
    downstream.ingest.pull_url = Some(ws_url(upstream_stream));
    downstream.broadcast.enabled = true;
    let downstream = Relay::bind(&downstream).await.unwrap();
    let downstream_latest = downstream.local_addr(BROADCAST_SERVER).unwrap();
    let downstream_task = tokio::spawn(downstream.run());

    let client = reqwest::Client::new();
    assert_eq!(
        push(&client, upstream_push, "calories:250").await,
        reqwest::StatusCode::OK
    );

    let latest = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let response = client
                .get(http_url(downstream_latest, "/"))
                .send()
                .await
                .unwrap();
            if response.status() == reqwest::StatusCode::OK {
                let latest: Value = response.json().await.unwrap();
                if latest["calories"] == 250 {
                    return latest;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(latest["heartRate"], 0);

    downstream_task.abort();
    upstream_task.abort();
}

#[tokio::test]
async fn test_relay_from_config_file() {
    use std::io::Write;

    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[ingest]
push_port = 0

[broadcast]
enabled = true
port = 0
"#
    )
    .unwrap();

    let config = RelayConfig::from_file(file.path()).unwrap();
    config.validate().unwrap();
    assert!(config.broadcast.enabled);
    assert!(!config.metrics.enabled);

    let relay = Relay::bind(&config).await.unwrap();
    assert_eq!(relay.exporters().names(), vec!["broadcast"]);
    let push_addr = relay.local_addr(PUSH_RECEIVER).unwrap();
    let broadcast_addr = relay.local_addr(BROADCAST_SERVER).unwrap();
    assert!(relay.local_addr(METRICS_ENDPOINT).is_none());
    let task = tokio::spawn(relay.run());

    let client = reqwest::Client::new();
    assert_eq!(push(&client, push_addr, "stepCount:1200").await, reqwest::StatusCode::OK);
    let latest: Value = client
        .get(http_url(broadcast_addr, "/"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(latest["stepCount"], 1200);

    task.abort();
}
