use anyhow::{Context, Result, bail};
use bytes::Bytes;
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use lednet_lib::transport::ScriptedTransport;
use lednet_lib::{DeviceKind, EngineConfig, LedDevice, ProtocolVariant, SequenceCounter, TransportEvent, classify};
use lednet_rs::logging::setup_logging;

const REPLAY_DEVICE: &str = "replay";

/// Replays a recorded BLE session against the protocol engine.
///
/// Each line of the capture is one JSON record:
/// `{"kind":"reply","on":"rsi:1","characteristic":"…","text":"…"}` answers a
/// write, `{"kind":"notify","characteristic":"…","hex":"…"}` is an unsolicited
/// chunk and `{"kind":"disconnect"}` drops the link after the read.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON-lines capture file
    capture: PathBuf,
    /// Resource to read once connected
    #[arg(short, long, default_value = "/json/si")]
    path: String,
    /// Advertised name, used to pick the frame variant
    #[arg(short, long, default_value = "LEDnetWF02")]
    name: String,
    /// Engine configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Optional path to a file to write logs to, in addition to the console.
    #[arg(short, long)]
    log_file: Option<PathBuf>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[derive(Debug, Deserialize)]
struct ChunkData {
    text: Option<String>,
    hex: Option<String>,
}

impl ChunkData {
    fn bytes(&self) -> Result<Bytes> {
        match (&self.text, &self.hex) {
            (Some(text), None) => Ok(Bytes::from(text.clone())),
            (None, Some(hex)) => Ok(Bytes::from(hex::decode(hex).with_context(|| format!("Invalid hex {:?}", hex))?)),
            _ => bail!("a chunk needs exactly one of text or hex"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum CaptureRecord {
    Reply {
        on: String,
        characteristic: String,
        #[serde(flatten)]
        data: ChunkData,
    },
    Notify {
        characteristic: String,
        #[serde(flatten)]
        data: ChunkData,
    },
    Disconnect,
}

fn load_capture(path: &Path) -> Result<Vec<CaptureRecord>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read capture {:?}", path))?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| serde_json::from_str(line).with_context(|| format!("{:?} line {}", path, n + 1)))
        .collect()
}

fn chunk(characteristic: &str, data: Bytes) -> TransportEvent {
    TransportEvent::Chunk {
        device: REPLAY_DEVICE.to_string(),
        characteristic: characteristic.to_string(),
        data,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = setup_logging(cli.log_file.as_deref(), &cli.verbose)?;

    if let Err(e) = run_replay(cli).await {
        error!("Replay failed: {:?}", e);
        process::exit(1);
    }

    Ok(())
}

async fn run_replay(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let variant = match classify(&cli.name) {
        Some(DeviceKind::LedNet { variant, .. }) => variant,
        Some(DeviceKind::Ble2Json) => bail!("{} speaks self-describing JSON, nothing to replay", cli.name),
        None => {
            warn!(name = %cli.name, "Unrecognised name, assuming current firmware");
            ProtocolVariant::Obfuscated
        }
    };

    let records = load_capture(&cli.capture)?;
    info!(records = records.len(), %variant, "Loaded capture");

    let (transport, events) = ScriptedTransport::new();
    let transport = Arc::new(transport);
    let mut notifications = Vec::new();
    let mut disconnect = false;
    for record in records {
        match record {
            CaptureRecord::Reply {
                on,
                characteristic,
                data,
            } => {
                transport.on_write(on, vec![chunk(&characteristic, data.bytes()?)]).await;
            }
            CaptureRecord::Notify { characteristic, data } => notifications.push(chunk(&characteristic, data.bytes()?)),
            CaptureRecord::Disconnect => disconnect = true,
        }
    }

    let device = Arc::new(LedDevice::new(
        REPLAY_DEVICE,
        Arc::clone(&transport),
        config,
        variant,
        Arc::new(SequenceCounter::new()),
    ));
    let pump = {
        let device = Arc::clone(&device);
        tokio::spawn(async move { device.run(events).await })
    };

    device.connect().await.context("Connect failed")?;
    for event in notifications {
        transport.emit(event)?;
    }

    let response = device.get(&cli.path).await;

    if disconnect {
        transport.disconnect(REPLAY_DEVICE).await?;
    }
    // Let the pump drain what is already queued.
    tokio::time::sleep(Duration::from_millis(50)).await;
    pump.abort();

    println!("--- Writes ---");
    for write in transport.writes().await {
        println!("{} <- {}", write.target.characteristic, render(&write.data));
    }
    println!("--- Response ({}) ---", cli.path);
    match response {
        Ok(text) => println!("{}", text),
        Err(e) => println!("error: {}", e),
    }
    println!("--- Telemetry ---");
    println!("{}", serde_json::to_string_pretty(&device.state())?);

    Ok(())
}

/// Printable ASCII as text, anything else as hex
fn render(data: &[u8]) -> String {
    if data.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        String::from_utf8_lossy(data).into_owned()
    } else {
        hex::encode(data)
    }
}
