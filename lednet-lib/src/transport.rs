//! The link-layer seam.
//!
//! A [`Transport`] connects, writes characteristics and enables
//! notifications. Incoming chunks and link failures are not returned from
//! these calls: the transport pushes them as [`TransportEvent`]s into the
//! channel it was built with, in the order the link delivered them.

use crate::endpoint::Characteristic;
use crate::error::{LedError, Result};
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Chunk {
        device: String,
        characteristic: String,
        data: Bytes,
    },
    Disconnected {
        device: String,
    },
}

impl TransportEvent {
    pub fn device(&self) -> &str {
        match self {
            TransportEvent::Chunk { device, .. } => device,
            TransportEvent::Disconnected { device } => device,
        }
    }
}

pub trait Transport: Send + Sync {
    fn connect(&self, device: &str) -> impl Future<Output = Result<()>> + Send;

    fn write(&self, device: &str, target: &Characteristic, data: Bytes) -> impl Future<Output = Result<()>> + Send;

    /// Start forwarding notifications of `source` as [`TransportEvent::Chunk`]
    fn subscribe(&self, device: &str, source: &Characteristic) -> impl Future<Output = Result<()>> + Send;
}

/// A write as seen by the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub device: String,
    pub target: Characteristic,
    pub data: Bytes,
}

impl WriteRecord {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    connected: HashSet<String>,
    subscriptions: Vec<Characteristic>,
    writes: Vec<WriteRecord>,
    /// Events released when a given payload is written
    replies: HashMap<Bytes, Vec<TransportEvent>>,
}

/// In-memory transport driven by a script of replies.
///
/// Every write is recorded. A write whose payload matches a scripted trigger
/// releases that trigger's events into the event channel.
#[derive(Debug)]
pub struct ScriptedTransport {
    events: mpsc::UnboundedSender<TransportEvent>,
    state: Mutex<ScriptState>,
}

impl ScriptedTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let transport = Self {
            events,
            state: Mutex::new(ScriptState::default()),
        };
        (transport, receiver)
    }

    /// Release `events` the next time `trigger` is written
    pub async fn on_write(&self, trigger: impl Into<Bytes>, events: Vec<TransportEvent>) {
        self.state
            .lock()
            .await
            .replies
            .entry(trigger.into())
            .or_default()
            .extend(events);
    }

    /// Deliver an event immediately
    pub fn emit(&self, event: TransportEvent) -> Result<()> {
        if let TransportEvent::Disconnected { device } = &event {
            info!(%device, "Link dropped");
        }
        self.events
            .send(event)
            .map_err(|_| LedError::Transport("event receiver closed".to_string()))
    }

    /// Drop the link: later writes fail and a disconnect event is delivered
    pub async fn disconnect(&self, device: &str) -> Result<()> {
        self.state.lock().await.connected.remove(device);
        self.emit(TransportEvent::Disconnected {
            device: device.to_string(),
        })
    }

    pub async fn writes(&self) -> Vec<WriteRecord> {
        self.state.lock().await.writes.clone()
    }

    pub async fn subscriptions(&self) -> Vec<Characteristic> {
        self.state.lock().await.subscriptions.clone()
    }
}

impl Transport for ScriptedTransport {
    async fn connect(&self, device: &str) -> Result<()> {
        info!(%device, "Connected");
        self.state.lock().await.connected.insert(device.to_string());
        Ok(())
    }

    async fn write(&self, device: &str, target: &Characteristic, data: Bytes) -> Result<()> {
        let released = {
            let mut state = self.state.lock().await;
            if !state.connected.contains(device) {
                return Err(LedError::Disconnected(device.to_string()));
            }
            state.writes.push(WriteRecord {
                device: device.to_string(),
                target: target.clone(),
                data: data.clone(),
            });
            state.replies.remove(&data).unwrap_or_default()
        };

        debug!(%device, characteristic = %target.characteristic, len = data.len(), released = released.len(), "Write");
        for event in released {
            self.emit(event)?;
        }
        Ok(())
    }

    async fn subscribe(&self, device: &str, source: &Characteristic) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.connected.contains(device) {
            return Err(LedError::Disconnected(device.to_string()));
        }
        debug!(%device, characteristic = %source.characteristic, "Subscribed");
        state.subscriptions.push(source.clone());
        Ok(())
    }
}
