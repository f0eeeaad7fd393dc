use anyhow::{Context, Result, bail};
use bytes::Bytes;
use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{debug, error};

use lednet_lib::chunk::split_body;
use lednet_lib::config::EngineConfig;
use lednet_lib::constants::{FRAME_OPCODE_COMMAND, FRAME_SUB_OPCODE_COMMAND};
use lednet_lib::frame::{CommandFrame, FrameCodec, decode_frame};
use lednet_lib::legacy::LegacyCodec;
use lednet_lib::telemetry::{decode_notification, decode_payload};
use lednet_lib::{DeviceCommand, SequenceCounter, classify};
use lednet_rs::logging::setup_logging;

/// Offline toolbox for the LEDnetWF BLE wire protocol.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Engine configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Optional path to a file to write logs to, in addition to the console.
    #[arg(short, long, global = true)]
    log_file: Option<PathBuf>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build an obfuscated frame around a raw payload
    Encode {
        /// Payload bytes as hex, 1 to 9 bytes
        payload: String,
        #[arg(long, value_parser = parse_byte, default_value_t = FRAME_OPCODE_COMMAND)]
        opcode: u8,
        #[arg(long, value_parser = parse_byte, default_value_t = FRAME_SUB_OPCODE_COMMAND)]
        sub_opcode: u8,
        /// 24-bit target field
        #[arg(long, value_parser = parse_u32, default_value_t = 0)]
        target: u32,
        /// Defaults to the payload length
        #[arg(long, value_parser = parse_byte)]
        selector: Option<u8>,
        #[arg(long, value_parser = parse_byte, default_value_t = 0)]
        sequence: u8,
        /// Random when omitted
        #[arg(long, value_parser = parse_byte)]
        nonce: Option<u8>,
    },
    /// Validate an obfuscated frame and print its fields
    Decode {
        /// 26-byte frame as hex
        frame: String,
    },
    /// Encode a device command in an obfuscated frame
    Frame {
        #[arg(long, value_parser = parse_byte, default_value_t = 0)]
        sequence: u8,
        #[command(subcommand)]
        command: CommandArgs,
    },
    /// Encode a device command in a legacy (generation 1) frame
    Legacy {
        #[arg(long, value_parser = parse_u16, default_value_t = 0)]
        sequence: u16,
        #[command(subcommand)]
        command: CommandArgs,
    },
    /// Decode a telemetry notification or a hex state payload
    Telemetry {
        /// `{"payload":"…"}` notification text, or bare payload hex
        input: String,
    },
    /// Show how a body is padded and split for writing
    Chunk {
        body: String,
    },
    /// Identify the protocol variant from an advertised name
    Classify {
        name: String,
    },
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum CommandArgs {
    /// Ask for a state report
    Query,
    Power {
        /// on or off
        #[arg(value_parser = parse_on_off, action = clap::ArgAction::Set)]
        on: bool,
    },
    Rgb(RgbArgs),
    White {
        /// Percent, 0 is warmest
        temperature: u8,
        /// Percent
        brightness: u8,
    },
    Mode {
        mode: u8,
        speed: u8,
        brightness: u8,
    },
}

#[derive(Args, Debug, Clone, Copy)]
struct RgbArgs {
    r: u8,
    g: u8,
    b: u8,
}

impl From<CommandArgs> for DeviceCommand {
    fn from(args: CommandArgs) -> Self {
        match args {
            CommandArgs::Query => DeviceCommand::QueryState,
            CommandArgs::Power { on } => DeviceCommand::Power(on),
            CommandArgs::Rgb(RgbArgs { r, g, b }) => DeviceCommand::Rgb { r, g, b },
            CommandArgs::White {
                temperature,
                brightness,
            } => DeviceCommand::White {
                temperature,
                brightness,
            },
            CommandArgs::Mode {
                mode,
                speed,
                brightness,
            } => DeviceCommand::Mode {
                mode,
                speed,
                brightness,
            },
        }
    }
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number {:?}: {}", s, e))
}

fn parse_byte(s: &str) -> Result<u8, String> {
    parse_u32(s)?
        .try_into()
        .map_err(|_| format!("{} does not fit in a byte", s))
}

fn parse_u16(s: &str) -> Result<u16, String> {
    parse_u32(s)?
        .try_into()
        .map_err(|_| format!("{} does not fit in 16 bits", s))
}

fn parse_on_off(s: &str) -> Result<bool, String> {
    match s {
        "on" | "1" | "true" => Ok(true),
        "off" | "0" | "false" => Ok(false),
        other => Err(format!("expected on or off, got {:?}", other)),
    }
}

fn parse_hex(s: &str) -> Result<Vec<u8>> {
    let cleaned: String = s.chars().filter(|c| !c.is_whitespace() && *c != ':').collect();
    hex::decode(&cleaned).with_context(|| format!("Invalid hex: {:?}", s))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = setup_logging(cli.log_file.as_deref(), &cli.verbose)?;

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path).with_context(|| format!("Failed to load config {:?}", path))?,
        None => EngineConfig::default(),
    };
    debug!(?config, "Using configuration");

    if let Err(e) = run(cli.command, &config) {
        error!("{:?}", e);
        process::exit(1);
    }
    Ok(())
}

fn run(command: Command, config: &EngineConfig) -> Result<()> {
    match command {
        Command::Encode {
            payload,
            opcode,
            sub_opcode,
            target,
            selector,
            sequence,
            nonce,
        } => {
            let payload = Bytes::from(parse_hex(&payload)?);
            let frame = CommandFrame {
                opcode,
                sub_opcode,
                target,
                selector: selector.unwrap_or(payload.len() as u8),
                payload,
            };
            let encoded = match nonce {
                Some(nonce) => frame.encode_with(sequence, nonce),
                None => FrameCodec::new(Arc::new(SequenceCounter::starting_at(sequence as u16))).encode(&frame),
            }
            .context("Failed to encode frame")?;
            println!("{}", hex::encode(encoded));
        }
        Command::Decode { frame } => {
            let raw = parse_hex(&frame)?;
            let decoded = decode_frame(&raw).context("Frame rejected")?;
            println!("opcode:     {:#04x}", decoded.opcode);
            println!("sub-opcode: {:#04x}", decoded.sub_opcode);
            println!("sequence:   {}", decoded.sequence);
            println!("target:     {:#08x}", decoded.target);
            println!("selector:   {:#04x}", decoded.selector);
            println!("payload:    {}", hex::encode(decoded.payload));
            println!("inner:      {}", hex::encode(decoded.inner_command()));
            println!("nonce:      {:#04x}", decoded.nonce);
        }
        Command::Frame { sequence, command } => {
            let codec = FrameCodec::new(Arc::new(SequenceCounter::starting_at(sequence as u16)));
            let command = DeviceCommand::from(command);
            let frame = codec.encode(&CommandFrame::command(command.frame_payload()))?;
            println!("{}", hex::encode(frame));
        }
        Command::Legacy { sequence, command } => {
            let codec = LegacyCodec::new(Arc::new(SequenceCounter::starting_at(sequence)));
            let frame = codec.encode(&DeviceCommand::from(command))?;
            println!("{}", hex::encode(frame));
        }
        Command::Telemetry { input } => {
            let state = if input.contains('{') {
                decode_notification(input.as_bytes())
            } else {
                decode_payload(&parse_hex(&input)?)
            };
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        Command::Chunk { body } => {
            for (i, chunk) in split_body(body.as_bytes(), config.chunk_length).iter().enumerate() {
                println!("{:>3} [{:>2}] {}", i + 1, chunk.len(), hex::encode(chunk));
            }
        }
        Command::Classify { name } => match classify(&name) {
            Some(kind) => println!("{}", serde_json::to_string(&kind)?),
            None => bail!("{:?} is not a supported controller", name),
        },
    }
    Ok(())
}
