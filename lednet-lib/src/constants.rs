// Protocol constants for LEDnetWF controllers

/// GATT service carrying the vendor command and notify characteristics
pub const SERVICE_UUID: &str = "0000ffff-0000-1000-8000-00805f9b34fb";

/// Command characteristic (host → device)
pub const WRITE_UUID: &str = "0000ff01-0000-1000-8000-00805f9b34fb";

/// Telemetry notify characteristic (device → host)
pub const NOTIFY_UUID: &str = "0000ff02-0000-1000-8000-00805f9b34fb";

/// Maximum transport chunk size in bytes
pub const CHUNK_LENGTH: usize = 20;

/// Filler appended to bodies whose length is an exact multiple of the chunk size
pub const CHUNK_FILLER: u8 = 0x20;

// --- Obfuscated command frame (generation 2+) ---

/// Total size of an obfuscated command frame
pub const FRAME_LEN: usize = 26;

/// First header byte
pub const FRAME_MAGIC: u8 = 0x5A;

/// Second header byte
pub const FRAME_PROTOCOL: u8 = 0x71;

/// Opcode used for device commands
pub const FRAME_OPCODE_COMMAND: u8 = 0x11;

/// Sub-opcode used for device commands
pub const FRAME_SUB_OPCODE_COMMAND: u8 = 0x0B;

pub const OFFSET_OPCODE: usize = 3;
pub const OFFSET_SUB_OPCODE: usize = 5;
pub const OFFSET_SEQUENCE: usize = 6;
pub const OFFSET_TARGET: usize = 7;
pub const OFFSET_SELECTOR: usize = 12;
pub const OFFSET_PAYLOAD: usize = 13;
pub const OFFSET_NONCE: usize = 23;
pub const OFFSET_CHECKSUM: usize = 24;

/// Maximum payload carried by one obfuscated frame
pub const MAX_FRAME_PAYLOAD: usize = 9;

/// Layer-1 key constants, XORed with the nonce
pub const KEY_CONST_A: u8 = 0x0A;
pub const KEY_CONST_B: u8 = 0x16;

/// Start of the layer-2 substitution window
pub const WINDOW_START: usize = 0x04;

/// Length of the layer-2 substitution window
pub const WINDOW_LEN: usize = 0x17;

/// Layer-2 substitution table. The firmware ships 20 entries; positions past
/// them inside the window are XORed with zero.
#[rustfmt::skip]
pub const SUBSTITUTION_TABLE: [u8; WINDOW_LEN] = [
    0x11, 0x22, 0x04, 0x08, 0x99, 0x04, 0x24, 0x16, 0x04, 0xAA,
    0xBB, 0xCC, 0xF0, 0x60, 0x61, 0xCD, 0xCF, 0x80, 0x35, 0x2A,
    0x00, 0x00, 0x00,
];

// --- Legacy command frame (generation 1) ---

/// Size of the legacy wrapper header (sequence + fixed prefix + lengths)
pub const LEGACY_HEADER_LEN: usize = 8;

/// Fixed bytes following the 16-bit sequence number
pub const LEGACY_PREFIX: [u8; 3] = [0x80, 0x00, 0x00];

// --- Telemetry layout ---

/// Minimum decoded telemetry payload length
pub const TELEMETRY_MIN_LEN: usize = 10;

pub const TELEMETRY_OFFSET_POWER: usize = 2;
pub const TELEMETRY_OFFSET_MODE: usize = 4;
pub const TELEMETRY_OFFSET_VERSION: usize = 10;

pub const POWER_ON: u8 = 0x23;
pub const POWER_OFF: u8 = 0x24;

pub const MODE_RGB: u8 = 0xF0;
pub const MODE_WHITE: u8 = 0x0F;

/// Inclusive range of preset (symphony) mode indices
pub const MODE_SYMPHONY_FIRST: u8 = 0x01;
pub const MODE_SYMPHONY_LAST: u8 = 0x71;

// --- Advertisement names ---

/// Advertised name prefix of the obfuscating vendor
pub const LEDNET_NAME_PREFIX: &str = "LEDnetWF";

/// Advertised name of the pass-through JSON vendor
pub const BLE2JSON_NAME: &str = "WLED BLE2JSON";
