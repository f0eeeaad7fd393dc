use crate::advert::ProtocolVariant;
use crate::chunk::split_body;
use crate::command::DeviceCommand;
use crate::config::EngineConfig;
use crate::correlator::{Correlator, Effect, Event, RequestId};
use crate::endpoint::{Characteristic, Endpoint, ResourceRequest};
use crate::error::{LedError, Result};
use crate::frame::{CommandFrame, FrameCodec};
use crate::legacy::LegacyCodec;
use crate::sequence::SequenceCounter;
use crate::telemetry::{DeviceState, decode_notification};
use crate::transport::{Transport, TransportEvent};
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Answer to every accepted post
pub const POST_SUCCESS: &str = r#"{"success":true}"#;

/// Answer to a get on an unmapped path
pub const EMPTY_RESPONSE: &str = "{}";

type Sink = oneshot::Sender<Result<String>>;

/// A connection to one LED controller.
///
/// Reads and writes may be issued from any task. Incoming transport events
/// must be fed through [`LedDevice::handle_event`], usually by [`LedDevice::run`].
pub struct LedDevice<T> {
    id: String,
    transport: Arc<T>,
    config: EngineConfig,
    variant: ProtocolVariant,
    frames: FrameCodec,
    legacy: LegacyCodec,
    correlator: Mutex<Correlator<Sink>>,
    next_request: AtomicU64,
    state: watch::Sender<DeviceState>,
}

impl<T: Transport> LedDevice<T> {
    pub fn new(
        id: impl Into<String>,
        transport: Arc<T>,
        config: EngineConfig,
        variant: ProtocolVariant,
        counter: Arc<SequenceCounter>,
    ) -> Self {
        let id = id.into();
        let correlator = Correlator::new(id.clone(), config.chunk_length, config.read_timeout());
        let (state, _) = watch::channel(DeviceState::default());
        Self {
            id,
            transport,
            config,
            variant,
            frames: FrameCodec::new(counter.clone()),
            legacy: LegacyCodec::new(counter),
            correlator: Mutex::new(correlator),
            next_request: AtomicU64::new(1),
            state,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    /// Connect, enable every data and telemetry notification and ask the
    /// controller for its state
    pub async fn connect(&self) -> Result<()> {
        info!(device = %self.id, variant = %self.variant, "Connecting");
        self.transport.connect(&self.id).await?;

        for endpoint in self.config.endpoints.paths.values() {
            self.transport.subscribe(&self.id, &endpoint.data_characteristic()).await?;
        }
        let telemetry = &self.config.endpoints.telemetry;
        self.transport.subscribe(&self.id, telemetry).await?;
        self.correlator.lock().await.watch(&telemetry.characteristic);

        info!("--- Sending state query ---");
        self.send_command(&DeviceCommand::QueryState).await?;
        info!(device = %self.id, "Connection established");
        Ok(())
    }

    /// Latest telemetry snapshot
    pub fn state(&self) -> DeviceState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every new telemetry snapshot
    pub fn subscribe_state(&self) -> watch::Receiver<DeviceState> {
        self.state.subscribe()
    }

    /// Read a resource by URL. Unmapped paths answer `{}`.
    pub async fn get(&self, url: &str) -> Result<String> {
        let request = ResourceRequest::parse(url);
        let endpoint = match self.config.endpoints.lookup(&request.path) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!(%url, "{}", e);
                return Ok(EMPTY_RESPONSE.to_string());
            }
        };
        // The vendor app sends an empty parameter (`r:1`) here; the resource
        // name is sent instead so each endpoint is addressed explicitly.
        let parameter = request.page.unwrap_or_else(|| endpoint.parameter.clone());
        self.read(endpoint, parameter).await
    }

    /// Send a body to a writable resource. Unknown paths are acknowledged
    /// without writing.
    pub async fn post(&self, url: &str, body: &[u8]) -> Result<String> {
        let request = ResourceRequest::parse(url);
        match request.path.as_str() {
            "/json/state" | "/json/si" => {
                let target = self.config.endpoints.write_target.clone();
                self.write_body(&target, body).await?;
            }
            path => warn!(%path, "Ignoring post to unmapped path"),
        }
        Ok(POST_SUCCESS.to_string())
    }

    /// Paginated read of `endpoint`, requesting pages of `parameter`
    pub async fn read(&self, endpoint: &Endpoint, parameter: String) -> Result<String> {
        let id: RequestId = self.next_request.fetch_add(1, Ordering::Relaxed);
        let (sink, mut receiver) = oneshot::channel();

        let effects = self.correlator.lock().await.handle(Event::StartRead {
            id,
            endpoint: endpoint.clone(),
            parameter,
            sink,
        });
        if let Err(e) = self.perform(effects).await {
            self.correlator.lock().await.cancel(id);
            return Err(e);
        }

        let dropped = || LedError::Disconnected(self.id.clone());
        match timeout(self.config.read_timeout(), &mut receiver).await {
            Ok(received) => received.map_err(|_| dropped())?,
            Err(_) => {
                let effects = self.correlator.lock().await.handle(Event::Timeout { id });
                self.perform(effects).await?;
                // Resolved either by the timeout or by a response that raced it.
                receiver.await.map_err(|_| dropped())?
            }
        }
    }

    /// Pad, split and write a body chunk by chunk
    pub async fn write_body(&self, target: &Characteristic, body: &[u8]) -> Result<()> {
        let chunks = split_body(body, self.config.chunk_length);
        debug!(device = %self.id, len = body.len(), chunks = chunks.len(), "Writing body");
        for chunk in chunks {
            self.write(target, chunk).await?;
        }
        Ok(())
    }

    /// Encode a command for this controller's frame variant and send it
    pub async fn send_command(&self, command: &DeviceCommand) -> Result<()> {
        let frame = match self.variant {
            ProtocolVariant::Obfuscated => {
                let frame = self.frames.encode(&CommandFrame::command(command.frame_payload()))?;
                Bytes::copy_from_slice(&frame)
            }
            ProtocolVariant::Legacy => self.legacy.encode(command)?,
        };
        debug!(device = %self.id, ?command, frame = %hex::encode(&frame), "Sending command");
        let target = self.config.endpoints.command.clone();
        self.write(&target, frame).await
    }

    /// Feed one transport event through the correlator
    pub async fn handle_event(&self, event: TransportEvent) -> Result<()> {
        if event.device() != self.id {
            return Ok(());
        }
        let correlated = match event {
            TransportEvent::Chunk {
                characteristic, data, ..
            } => Event::Chunk { characteristic, data },
            TransportEvent::Disconnected { .. } => {
                warn!(device = %self.id, "Disconnected");
                Event::Disconnected
            }
        };
        let effects = self.correlator.lock().await.handle(correlated);
        self.perform(effects).await
    }

    /// Pump events until the channel closes
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            if let Err(e) = self.handle_event(event).await {
                warn!(device = %self.id, "Event handling failed: {}", e);
            }
        }
        debug!(device = %self.id, "Event channel closed");
    }

    async fn write(&self, target: &Characteristic, data: Bytes) -> Result<()> {
        timeout(self.config.write_timeout(), self.transport.write(&self.id, target, data)).await?
    }

    async fn perform(&self, effects: Vec<Effect<Sink>>) -> Result<()> {
        for effect in effects {
            match effect {
                Effect::Write { target, data } => self.write(&target, data).await?,
                Effect::Resolve { sink, result } => {
                    if sink.send(result).is_err() {
                        debug!(device = %self.id, "Reader gone before resolution");
                    }
                }
                Effect::Notification { characteristic, message } => {
                    if characteristic.eq_ignore_ascii_case(&self.config.endpoints.telemetry.characteristic) {
                        let snapshot = decode_notification(&message);
                        info!(device = %self.id, power = ?snapshot.power, mode = ?snapshot.mode, "Telemetry");
                        self.state.send_replace(snapshot);
                    } else {
                        debug!(%characteristic, len = message.len(), "Unhandled notification");
                    }
                }
            }
        }
        Ok(())
    }
}
