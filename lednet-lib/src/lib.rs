pub mod advert;
pub mod chunk;
pub mod command;
pub mod config;
pub mod constants;
pub mod correlator;
pub mod device;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod legacy;
pub mod sequence;
pub mod telemetry;
pub mod transport;

// Re-export the driver and its collaborators for easy access
pub use advert::{DeviceKind, ProtocolVariant, classify};
pub use command::DeviceCommand;
pub use config::EngineConfig;
pub use device::LedDevice;
pub use error::{LedError, Result};
pub use sequence::SequenceCounter;
pub use telemetry::DeviceState;
pub use transport::{ScriptedTransport, Transport, TransportEvent};
