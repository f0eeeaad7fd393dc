//! Common test utilities and shared imports

// Not every helper is used by every test file
#![allow(dead_code, unused_imports)]

pub use bytes::Bytes;
pub use lednet_lib::config::EngineConfig;
pub use lednet_lib::constants::CHUNK_LENGTH;
pub use lednet_lib::device::LedDevice;
pub use lednet_lib::endpoint::Endpoint;
pub use lednet_lib::error::LedError;
pub use lednet_lib::sequence::SequenceCounter;
pub use lednet_lib::transport::{ScriptedTransport, Transport, TransportEvent};
pub use lednet_lib::{DeviceCommand, ProtocolVariant};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

pub const DEVICE: &str = "C4:A1:0E:33:D1:A1";

/// State payload: power on, RGB mode (0xff, 0x80, 0x10), firmware 0x0a
pub const RGB_STATE_PAYLOAD: &str = "8133236cf000ff8010000a";

/// Decode hex string to bytes for testing
pub fn hex_to_bytes(hex_data: &str) -> Bytes {
    Bytes::from(hex::decode(hex_data).expect("Failed to decode hex"))
}

/// Split a response the way the controller sends it: full chunks followed by
/// one short chunk
pub fn response_chunks(body: &[u8]) -> Vec<Bytes> {
    let mut chunks: Vec<Bytes> = body.chunks(CHUNK_LENGTH).map(Bytes::copy_from_slice).collect();
    if body.len() % CHUNK_LENGTH == 0 {
        chunks.push(Bytes::new());
    }
    chunks
}

pub fn chunk(characteristic: &str, data: Bytes) -> TransportEvent {
    TransportEvent::Chunk {
        device: DEVICE.to_string(),
        characteristic: characteristic.to_string(),
        data,
    }
}

/// Answer `r<parameter>:<n>` with page n of `body`
pub async fn script_read(transport: &ScriptedTransport, endpoint: &Endpoint, parameter: &str, body: &[u8]) {
    for (page, data) in response_chunks(body).into_iter().enumerate() {
        let command = format!("r{}:{}", parameter, page + 1);
        transport.on_write(command, vec![chunk(&endpoint.data, data)]).await;
    }
}

/// Telemetry notification in the vendor's JSON envelope, split into chunks
pub fn telemetry_chunks(payload_hex: &str) -> Vec<Bytes> {
    let body = format!("\u{1}\u{2}{{\"payload\":\"{}\"}}", payload_hex);
    response_chunks(body.as_bytes())
}

pub struct Harness {
    pub device: Arc<LedDevice<ScriptedTransport>>,
    pub transport: Arc<ScriptedTransport>,
    pub pump: JoinHandle<()>,
}

/// Route engine logs to the test output; `RUST_LOG=debug` shows chunk traffic
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A connected device with its event pump running
pub async fn connected(variant: ProtocolVariant, config: EngineConfig) -> Harness {
    init_tracing();
    let (transport, events) = ScriptedTransport::new();
    let transport = Arc::new(transport);
    let device = Arc::new(LedDevice::new(
        DEVICE,
        Arc::clone(&transport),
        config,
        variant,
        Arc::new(SequenceCounter::new()),
    ));

    let pump = {
        let device = Arc::clone(&device);
        tokio::spawn(async move { device.run(events).await })
    };
    device.connect().await.expect("connect");

    Harness { device, transport, pump }
}
