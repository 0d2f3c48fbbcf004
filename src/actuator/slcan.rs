// Serial-line CAN (SLCAN) adapter backend
//
// ASCII protocol over a serial port, one command per '\r'-terminated line:
//   C          close channel
//   S8         set bitrate to 1 Mbit/s
//   O          open channel
//   tIIILDD..  standard frame: 3 hex id digits, length digit, 2 hex per byte
// The adapter answers commands with '\r' (ok) or '\x07' (error) and echoes
// transmitted frames as 'z\r'. Received frames arrive as 't' lines.

use serialport::{self, SerialPort};
use std::fmt::Write as _;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::bus::{BusError, CanBus, CanFrame, MAX_DATA_LEN};
use super::codec::FeedbackPacket;
use super::layout::Leg;
use crate::state::RigState;

/// Default serial configuration for the adapters
pub const DEFAULT_BAUDRATE: u32 = 921_600;
pub const DEFAULT_TIMEOUT_MS: u64 = 10;

/// CAN bitrate selector for 1 Mbit/s
const BITRATE_1M: &str = "S8";

const LINE_END: u8 = b'\r';
const BELL: u8 = 0x07;

pub type Result<T> = std::result::Result<T, BusError>;

/// One SLCAN adapter, shared between the transmit path and a receive thread
pub struct SlcanBus {
    name: String,
    port: Mutex<Box<dyn SerialPort>>,
}

impl SlcanBus {
    /// Open and configure an adapter for 1 Mbit/s
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    /// Open with custom serial baudrate
    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        let bus = Self {
            name: port_name.to_string(),
            port: Mutex::new(port),
        };
        // Close first in case the adapter was left open by a previous run
        bus.command("C")?;
        bus.command(BITRATE_1M)?;
        bus.command("O")?;
        info!("SLCAN adapter {} open at 1 Mbit/s", port_name);
        Ok(bus)
    }

    fn port(&self) -> MutexGuard<'_, Box<dyn SerialPort>> {
        self.port.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn command(&self, cmd: &str) -> Result<()> {
        debug!("{} <- {}", self.name, cmd);
        let mut port = self.port();
        port.write_all(cmd.as_bytes())?;
        port.write_all(&[LINE_END])?;
        port.flush()?;
        Ok(())
    }

    /// Start a thread that decodes incoming feedback for `leg` into `state`
    /// until `running` is cleared.
    pub fn spawn_receiver(
        &self,
        leg: Leg,
        state: Arc<RigState>,
        running: Arc<AtomicBool>,
    ) -> Result<JoinHandle<()>> {
        let mut reader = self.port().try_clone()?;
        let name = self.name.clone();

        let handle = std::thread::Builder::new()
            .name(format!("rx-{}", name))
            .spawn(move || {
                let mut lines = LineBuffer::default();
                let mut chunk = [0u8; 64];
                while running.load(Ordering::Acquire) {
                    let n = match reader.read(&mut chunk) {
                        Ok(n) => n,
                        Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                        Err(e) => {
                            warn!("{}: read failed, receiver stopping: {}", name, e);
                            break;
                        }
                    };
                    for line in lines.push(&chunk[..n]) {
                        on_line(leg, &state, &line);
                    }
                }
                debug!("{}: receiver stopped", name);
            })?;
        Ok(handle)
    }
}

impl CanBus for SlcanBus {
    fn send(&self, frame: &CanFrame) -> Result<()> {
        let line = encode_frame(frame);
        let mut port = self.port();
        port.write_all(line.as_bytes())?;
        port.flush()?;
        Ok(())
    }
}

/// Receive-interrupt body: decode one adapter line into the leg's state
fn on_line(leg: Leg, state: &RigState, line: &str) {
    match parse_frame(line) {
        Ok(Some(frame)) => match FeedbackPacket::parse(frame.payload()) {
            Ok(packet) => state.record_feedback(leg, &packet),
            Err(e) => warn!("{}: dropped feedback frame: {}", leg, e),
        },
        Ok(None) => {}
        Err(e) => warn!("{}: {}", leg, e),
    }
}

/// Split a byte stream into '\r'-terminated lines
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &b in bytes {
            match b {
                LINE_END => {
                    lines.push(String::from_utf8_lossy(&self.pending).into_owned());
                    self.pending.clear();
                }
                BELL => {
                    warn!("SLCAN adapter reported an error");
                    self.pending.clear();
                }
                _ => self.pending.push(b),
            }
        }
        lines
    }
}

/// Render a frame as an SLCAN transmit line (with trailing '\r')
pub fn encode_frame(frame: &CanFrame) -> String {
    let payload = frame.payload();
    let mut line = String::with_capacity(6 + 2 * payload.len());
    let _ = write!(line, "t{:03X}{}", frame.id & 0x7FF, payload.len());
    for b in payload {
        let _ = write!(line, "{:02X}", b);
    }
    line.push(LINE_END as char);
    line
}

/// Parse one adapter line (without '\r').
///
/// Returns `Ok(None)` for lines that are not received standard frames
/// (transmit acknowledgements, empty command acks).
pub fn parse_frame(line: &str) -> Result<Option<CanFrame>> {
    let malformed = |reason: &str| BusError::MalformedFrame {
        line: line.to_string(),
        reason: reason.to_string(),
    };

    let Some(body) = line.strip_prefix('t') else {
        return Ok(None);
    };
    if body.len() < 4 || !body.is_ascii() {
        return Err(malformed("truncated header"));
    }

    let id = u16::from_str_radix(&body[..3], 16).map_err(|_| malformed("bad id"))?;
    let len = body[3..4]
        .parse::<usize>()
        .map_err(|_| malformed("bad length"))?;
    if len > MAX_DATA_LEN {
        return Err(malformed("length over 8"));
    }

    let hex = &body[4..];
    if hex.len() != 2 * len {
        return Err(malformed("length does not match data"));
    }
    let mut data = [0u8; MAX_DATA_LEN];
    for (i, byte) in data.iter_mut().take(len).enumerate() {
        *byte = u8::from_str_radix(&hex[2 * i..2 * i + 2], 16).map_err(|_| malformed("bad data"))?;
    }

    CanFrame::new(id, &data[..len]).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::codec::{ActuatorCommand, CommandPacket, Sentinel};
    use crate::actuator::layout::Joint;

    #[test]
    fn test_encode_command_frame() {
        let frame = CanFrame::command(Joint::Abad, &CommandPacket::encode(ActuatorCommand::zero()));
        assert_eq!(encode_frame(&frame), "t0013000800\r");

        let frame = CanFrame::command(Joint::Knee, &CommandPacket::sentinel(Sentinel::EnterMotorMode));
        assert_eq!(encode_frame(&frame), "t0033FFFFFC\r");
    }

    #[test]
    fn test_parse_feedback_frame() {
        let frame = parse_frame("t00150280008000").unwrap().unwrap();
        assert_eq!(frame.id, 1);
        assert_eq!(frame.payload(), &[0x02, 0x80, 0x00, 0x80, 0x00]);

        let packet = FeedbackPacket::parse(frame.payload()).unwrap();
        assert_eq!(packet.joint, Joint::Hip);
    }

    #[test]
    fn test_parse_non_frames() {
        assert!(parse_frame("").unwrap().is_none());
        assert!(parse_frame("z").unwrap().is_none());
        assert!(parse_frame("V1013").unwrap().is_none());
    }

    #[test]
    fn test_parse_malformed() {
        assert!(parse_frame("t00").is_err());
        assert!(parse_frame("tXYZ1FF").is_err());
        assert!(parse_frame("t0019").is_err());
        assert!(parse_frame("t0012FF").is_err());
        assert!(parse_frame("t0011GG").is_err());
    }

    #[test]
    fn test_line_buffer_splits_on_cr() {
        let mut buffer = LineBuffer::default();
        assert!(buffer.push(b"t001").is_empty());
        let lines = buffer.push(b"0\rz\r\x07t002");
        assert_eq!(lines, vec!["t0010".to_string(), "z".to_string()]);
        let lines = buffer.push(b"0\r");
        assert_eq!(lines, vec!["t0020".to_string()]);
    }

    #[test]
    fn test_on_line_updates_leg() {
        let state = RigState::new();
        // knee, position 0xFFFF (12.5), velocity 0x0000 (-45)
        on_line(Leg::Two, &state, "t003503FFFF0000");
        let knee = state.leg(Leg::Two).joints[2];
        assert_eq!(knee.raw_q, 12.5);
        assert_eq!(state.leg(Leg::One).joints[2].raw_q, 0.0);

        // unknown actuator id leaves state alone
        on_line(Leg::One, &state, "t003509FFFF0000");
        assert_eq!(state.leg(Leg::One).joints[2].raw_q, 0.0);
    }
}
