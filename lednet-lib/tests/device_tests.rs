mod common;

use common::*;
use lednet_lib::constants::NOTIFY_UUID;
use lednet_lib::device::{EMPTY_RESPONSE, POST_SUCCESS};
use lednet_lib::frame::decode_frame;
use lednet_lib::telemetry::{Mode, Power};
use lednet_lib::transport::WriteRecord;
use std::sync::Arc;
use std::time::Duration;

/// Wait until the transport has seen a write of `text`
async fn wait_for_write(transport: &ScriptedTransport, text: &str) {
    for _ in 0..200 {
        if transport.writes().await.iter().any(|w| w.text() == text) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("{} was never written", text);
}

/// Writes after the connection handshake
async fn commands(transport: &ScriptedTransport) -> Vec<String> {
    transport.writes().await.iter().skip(1).map(WriteRecord::text).collect()
}

fn endpoint(path: &str) -> Endpoint {
    EngineConfig::default().endpoints.paths[path].clone()
}

#[tokio::test]
async fn test_connect_subscribes_and_queries_state() {
    let harness = connected(ProtocolVariant::Obfuscated, EngineConfig::default()).await;

    let subscriptions = harness.transport.subscriptions().await;
    assert_eq!(subscriptions.len(), EngineConfig::default().endpoints.paths.len() + 1);
    assert!(subscriptions.iter().any(|c| c.characteristic == NOTIFY_UUID));

    let writes = harness.transport.writes().await;
    assert_eq!(writes.len(), 1);
    let handshake = decode_frame(&writes[0].data).unwrap();
    assert_eq!(handshake.sequence, 0);
    assert_eq!(handshake.inner_command(), DeviceCommand::QueryState.frame_payload().as_ref());
}

#[tokio::test]
async fn test_legacy_connect_sends_plain_handshake() {
    let harness = connected(ProtocolVariant::Legacy, EngineConfig::default()).await;
    let writes = harness.transport.writes().await;
    assert_eq!(hex::encode(&writes[0].data), "000080000004050a818a8b96");
}

#[tokio::test]
async fn test_paginated_presets_read() {
    let harness = connected(ProtocolVariant::Obfuscated, EngineConfig::default()).await;
    let presets = endpoint("/presets.json");
    let body = format!("{{\"1\":{{\"n\":\"{}\"}}}}", "x".repeat(33));
    assert_eq!(response_chunks(body.as_bytes()).len(), 3);
    script_read(&harness.transport, &presets, "presets", body.as_bytes()).await;

    let response = harness.device.get("http://localhost/presets.json").await.unwrap();

    assert_eq!(response, body);
    assert_eq!(
        commands(&harness.transport).await,
        vec!["rpresets:1", "rpresets:2", "rpresets:3"]
    );
    let writes = harness.transport.writes().await;
    assert!(writes[1..].iter().all(|w| w.target == presets.control_characteristic()));
}

#[tokio::test]
async fn test_page_query_becomes_read_parameter() {
    let harness = connected(ProtocolVariant::Obfuscated, EngineConfig::default()).await;
    let presets = endpoint("/presets.json");
    script_read(&harness.transport, &presets, "2", b"{\"2\":{}}").await;

    let response = harness.device.get("/presets.json?page=2").await.unwrap();
    assert_eq!(response, "{\"2\":{}}");
    assert_eq!(commands(&harness.transport).await, vec!["r2:1"]);
}

#[tokio::test]
async fn test_response_ending_on_chunk_boundary() {
    let harness = connected(ProtocolVariant::Obfuscated, EngineConfig::default()).await;
    let info = endpoint("/json/info");
    let body = vec![b'i'; 2 * CHUNK_LENGTH];
    script_read(&harness.transport, &info, "info", &body).await;

    let response = harness.device.get("/json/info").await.unwrap();
    assert_eq!(response.len(), 2 * CHUNK_LENGTH);
    assert_eq!(commands(&harness.transport).await, vec!["rinfo:1", "rinfo:2", "rinfo:3"]);
}

#[tokio::test]
async fn test_effect_names_unwrapped() {
    let harness = connected(ProtocolVariant::Obfuscated, EngineConfig::default()).await;
    let effects = endpoint("/json/eff");
    script_read(&harness.transport, &effects, "eff", br#"{"array":["Solid","Blink"]}"#).await;

    let response = harness.device.get("/json/eff").await.unwrap();
    assert_eq!(response, r#"["Solid","Blink"]"#);
}

#[tokio::test]
async fn test_unknown_path_answers_empty_object() {
    let harness = connected(ProtocolVariant::Obfuscated, EngineConfig::default()).await;
    assert_eq!(harness.device.get("/json/nodes").await.unwrap(), EMPTY_RESPONSE);
    assert!(commands(&harness.transport).await.is_empty());
}

#[tokio::test]
async fn test_read_timeout_frees_characteristic() {
    let config = EngineConfig {
        read_timeout_ms: 50,
        ..EngineConfig::default()
    };
    let harness = connected(ProtocolVariant::Obfuscated, config).await;

    match harness.device.get("/json/si").await {
        Err(LedError::ReadTimeout { timeout, .. }) => assert_eq!(timeout, Duration::from_millis(50)),
        other => panic!("Expected ReadTimeout, got {:?}", other),
    }

    // No retry happened, and the next read is accepted.
    assert_eq!(commands(&harness.transport).await, vec!["rsi:1"]);
    let si = endpoint("/json/si");
    harness
        .transport
        .on_write("rsi:1", vec![chunk(&si.data, Bytes::from_static(b"{}"))])
        .await;
    assert_eq!(harness.device.get("/json/si").await.unwrap(), "{}");
}

#[tokio::test]
async fn test_concurrent_read_on_same_characteristic_is_busy() {
    let harness = connected(ProtocolVariant::Obfuscated, EngineConfig::default()).await;
    let si = endpoint("/json/si");

    let first = {
        let device = Arc::clone(&harness.device);
        tokio::spawn(async move { device.get("/json/si").await })
    };
    wait_for_write(&harness.transport, "rsi:1").await;

    let second = harness.device.get("/json/si").await;
    assert!(matches!(second, Err(LedError::Busy(_))));

    harness
        .transport
        .emit(chunk(&si.data, Bytes::from_static(b"{\"ver\":1}")))
        .unwrap();
    assert_eq!(first.await.unwrap().unwrap(), "{\"ver\":1}");
    assert_eq!(commands(&harness.transport).await, vec!["rsi:1"]);
}

#[tokio::test]
async fn test_disconnect_rejects_all_pending_reads() {
    let harness = connected(ProtocolVariant::Obfuscated, EngineConfig::default()).await;

    let reads: Vec<_> = ["/presets.json", "/json/state"]
        .into_iter()
        .map(|path| {
            let device = Arc::clone(&harness.device);
            tokio::spawn(async move { device.get(path).await })
        })
        .collect();
    wait_for_write(&harness.transport, "rpresets:1").await;
    wait_for_write(&harness.transport, "rstate:1").await;

    harness.transport.disconnect(DEVICE).await.unwrap();

    for read in reads {
        match read.await.unwrap() {
            Err(LedError::Disconnected(device)) => assert_eq!(device, DEVICE),
            other => panic!("Expected Disconnected, got {:?}", other),
        }
    }
    assert!(matches!(
        harness.device.send_command(&DeviceCommand::Power(true)).await,
        Err(LedError::Disconnected(_))
    ));
}

#[tokio::test]
async fn test_telemetry_notification_updates_state() {
    let harness = connected(ProtocolVariant::Obfuscated, EngineConfig::default()).await;
    let mut state = harness.device.subscribe_state();
    assert_eq!(harness.device.state().mode, Mode::Unknown);

    for data in telemetry_chunks(RGB_STATE_PAYLOAD) {
        harness.transport.emit(chunk(NOTIFY_UUID, data)).unwrap();
    }
    tokio::time::timeout(Duration::from_secs(1), state.changed())
        .await
        .expect("telemetry published")
        .unwrap();

    let snapshot = harness.device.state();
    assert_eq!(snapshot.power, Some(Power::On));
    assert_eq!(snapshot.mode, Mode::Rgb);
    assert_eq!(snapshot.rgb, Some((0xFF, 0x80, 0x10)));
    assert_eq!(snapshot.firmware_version, Some(0x0A));
}

#[tokio::test]
async fn test_events_for_other_devices_ignored() {
    let harness = connected(ProtocolVariant::Obfuscated, EngineConfig::default()).await;
    harness
        .device
        .handle_event(TransportEvent::Disconnected {
            device: "00:00:00:00:00:00".to_string(),
        })
        .await
        .unwrap();
    harness.device.send_command(&DeviceCommand::Power(false)).await.unwrap();
    assert_eq!(harness.transport.writes().await.len(), 2);
}

#[tokio::test]
async fn test_post_writes_padded_chunks() {
    let harness = connected(ProtocolVariant::Obfuscated, EngineConfig::default()).await;
    let body = vec![b'{'; 2 * CHUNK_LENGTH];

    let response = harness.device.post("/json/state", &body).await.unwrap();
    assert_eq!(response, POST_SUCCESS);

    let writes = harness.transport.writes().await;
    let lens: Vec<usize> = writes[1..].iter().map(|w| w.data.len()).collect();
    assert_eq!(lens, vec![CHUNK_LENGTH, CHUNK_LENGTH, 1]);
    assert_eq!(writes.last().unwrap().data.as_ref(), b" ");
    assert!(writes[1..].iter().all(|w| w.target == EngineConfig::default().endpoints.write_target));
}

#[tokio::test]
async fn test_post_to_unknown_path_is_acknowledged() {
    let harness = connected(ProtocolVariant::Obfuscated, EngineConfig::default()).await;
    assert_eq!(harness.device.post("/win", b"T=1").await.unwrap(), POST_SUCCESS);
    assert!(commands(&harness.transport).await.is_empty());
}
