// Bit-exact actuator wire codec
//
// Command payload (3 bytes, MSB first):
//   [kd[11-4]] [kd[3-0], torque[11-8]] [torque[7-0]]
// Feedback payload (5 bytes):
//   [id] [position[15-8]] [position[7-0]] [velocity[15-8]] [velocity[7-0]]
//
// The velocity feedback field is decoded with 16-bit resolution. Older
// protocol notes describe it as 12-bit; the 16-bit decode matches what the
// control laws were tuned against.

use serde::Serialize;

use super::layout::Joint;
use crate::config::{
    ANGLE_OFFSET, KD_MAX, KD_MIN, KNEE_BELT_RATIO, P_MAX, P_MIN, T_MAX, T_MIN, V_MAX, V_MIN,
};

pub const COMMAND_LEN: usize = 3;
pub const FEEDBACK_LEN: usize = 5;

const COMMAND_FIELD_BITS: u32 = 12;

// With kd at full scale, torque codes above this collide with the sentinels
const KD_FULL_SCALE: u16 = 0xFFF;
const T_MAX_AT_KD_FULL_SCALE: u16 = 0xFFB;
const FEEDBACK_FIELD_BITS: u32 = 16;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Feedback payload too short: expected 5 bytes, got {len}")]
    ShortFeedback { len: usize },

    #[error("Feedback from unknown actuator id {id}")]
    UnknownActuator { id: u8 },
}

/// Map a value in [min, max] onto an unsigned field of `bits` width
pub fn float_to_uint(x: f32, min: f32, max: f32, bits: u32) -> u16 {
    let top = ((1u32 << bits) - 1) as f32;
    let x = x.clamp(min, max);
    ((x - min) / (max - min) * top).round().clamp(0.0, top) as u16
}

/// Inverse of [`float_to_uint`]
pub fn uint_to_float(x: u16, min: f32, max: f32, bits: u32) -> f32 {
    let top = ((1u32 << bits) - 1) as f32;
    x as f32 / top * (max - min) + min
}

/// Size of one command quantization step for a range
#[cfg(test)]
fn command_step(min: f32, max: f32) -> f32 {
    (max - min) / ((1u32 << COMMAND_FIELD_BITS) - 1) as f32
}

/// Damping / feed-forward torque pair for one actuator
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ActuatorCommand {
    pub kd: f32,
    pub tau: f32,
}

impl ActuatorCommand {
    pub fn new(kd: f32, tau: f32) -> Self {
        Self { kd, tau }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Clamp both fields to the device-declared ranges
    pub fn clamped(self) -> Self {
        Self {
            kd: self.kd.clamp(KD_MIN, KD_MAX),
            tau: self.tau.clamp(T_MIN, T_MAX),
        }
    }
}

/// Reserved payloads that drive the device's motor-mode state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    /// Rebias the position reference to the current physical position
    Zero,
    EnterMotorMode,
    ExitMotorMode,
}

impl Sentinel {
    pub fn payload(self) -> [u8; COMMAND_LEN] {
        match self {
            Sentinel::Zero => [0xFF, 0xFF, 0xFE],
            Sentinel::EnterMotorMode => [0xFF, 0xFF, 0xFC],
            Sentinel::ExitMotorMode => [0xFF, 0xFF, 0xFD],
        }
    }

    pub fn from_payload(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [0xFF, 0xFF, 0xFE] => Some(Sentinel::Zero),
            [0xFF, 0xFF, 0xFC] => Some(Sentinel::EnterMotorMode),
            [0xFF, 0xFF, 0xFD] => Some(Sentinel::ExitMotorMode),
            _ => None,
        }
    }
}

/// Outgoing 3-byte payload, either a quantized command or a sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandPacket([u8; COMMAND_LEN]);

impl CommandPacket {
    /// Clamp, quantize and pack a command. Never produces a sentinel payload.
    pub fn encode(cmd: ActuatorCommand) -> Self {
        let kd_int = float_to_uint(cmd.kd, KD_MIN, KD_MAX, COMMAND_FIELD_BITS);
        let mut t_int = float_to_uint(cmd.tau, T_MIN, T_MAX, COMMAND_FIELD_BITS);
        if kd_int == KD_FULL_SCALE {
            t_int = t_int.min(T_MAX_AT_KD_FULL_SCALE);
        }
        Self([
            (kd_int >> 4) as u8,
            (((kd_int & 0xF) << 4) | (t_int >> 8)) as u8,
            (t_int & 0xFF) as u8,
        ])
    }

    pub fn sentinel(sentinel: Sentinel) -> Self {
        Self(sentinel.payload())
    }

    pub fn from_bytes(bytes: [u8; COMMAND_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; COMMAND_LEN] {
        &self.0
    }

    /// Raw (kd, torque) integer fields
    pub fn fields(&self) -> (u16, u16) {
        let [b0, b1, b2] = self.0;
        let kd_int = ((b0 as u16) << 4) | ((b1 as u16) >> 4);
        let t_int = (((b1 as u16) & 0xF) << 8) | b2 as u16;
        (kd_int, t_int)
    }

    pub fn as_sentinel(&self) -> Option<Sentinel> {
        Sentinel::from_payload(&self.0)
    }

    /// Dequantize; sentinel payloads have no command meaning
    pub fn decode(&self) -> Option<ActuatorCommand> {
        if self.as_sentinel().is_some() {
            return None;
        }
        let (kd_int, t_int) = self.fields();
        Some(ActuatorCommand {
            kd: uint_to_float(kd_int, KD_MIN, KD_MAX, COMMAND_FIELD_BITS),
            tau: uint_to_float(t_int, T_MIN, T_MAX, COMMAND_FIELD_BITS),
        })
    }
}

/// Decoded 5-byte reply from one actuator, in device units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedbackPacket {
    pub joint: Joint,
    pub position: f32,
    pub velocity: f32,
}

impl FeedbackPacket {
    pub fn parse(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < FEEDBACK_LEN {
            return Err(CodecError::ShortFeedback { len: data.len() });
        }
        let joint = Joint::from_id(data[0]).ok_or(CodecError::UnknownActuator { id: data[0] })?;
        let p_int = u16::from_be_bytes([data[1], data[2]]);
        let v_int = u16::from_be_bytes([data[3], data[4]]);

        Ok(Self {
            joint,
            position: uint_to_float(p_int, P_MIN, P_MAX, FEEDBACK_FIELD_BITS),
            velocity: uint_to_float(v_int, V_MIN, V_MAX, FEEDBACK_FIELD_BITS),
        })
    }

    /// Device-side encoding, used by the simulated actuators
    pub fn to_bytes(&self) -> [u8; FEEDBACK_LEN] {
        let p = float_to_uint(self.position, P_MIN, P_MAX, FEEDBACK_FIELD_BITS).to_be_bytes();
        let v = float_to_uint(self.velocity, V_MIN, V_MAX, FEEDBACK_FIELD_BITS).to_be_bytes();
        [self.joint.id(), p[0], p[1], v[0], v[1]]
    }

    /// Apply mounting corrections to get joint-frame angle and velocity
    pub fn reading(&self) -> JointReading {
        let (q, dq) = match self.joint {
            Joint::Knee => (
                -self.position * KNEE_BELT_RATIO,
                -self.velocity * KNEE_BELT_RATIO,
            ),
            Joint::Abad => (-self.position, -self.velocity),
            Joint::Hip => (self.position, self.velocity),
        };
        JointReading {
            raw_q: self.position,
            raw_dq: self.velocity,
            q: q + ANGLE_OFFSET[self.joint.index()],
            dq,
        }
    }
}

/// One joint's decoded and corrected state
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct JointReading {
    pub raw_q: f32,
    pub raw_dq: f32,
    pub q: f32,
    pub dq: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_command_bytes() {
        // kd=0 -> 0x000, tau=0 -> round(2047.5) = 0x800
        let packet = CommandPacket::encode(ActuatorCommand::zero());
        assert_eq!(packet.as_bytes(), &[0x00, 0x08, 0x00]);
        assert_eq!(packet.fields(), (0, 0x800));
    }

    #[test]
    fn test_full_scale_command_bytes() {
        let packet = CommandPacket::encode(ActuatorCommand::new(KD_MAX, T_MIN));
        assert_eq!(packet.as_bytes(), &[0xFF, 0xF0, 0x00]);
    }

    #[test]
    fn test_round_trip_within_one_step() {
        let kd_step = command_step(KD_MIN, KD_MAX);
        let t_step = command_step(T_MIN, T_MAX);
        for &(kd, tau) in &[(0.005, 0.0), (0.0033, -6.67), (2.5, 17.2), (4.99, -17.9)] {
            let decoded = CommandPacket::encode(ActuatorCommand::new(kd, tau))
                .decode()
                .unwrap();
            assert!((decoded.kd - kd).abs() <= kd_step, "kd {} -> {}", kd, decoded.kd);
            assert!((decoded.tau - tau).abs() <= t_step, "tau {} -> {}", tau, decoded.tau);
        }
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        let cases = [(10.0, 100.0), (-1.0, -100.0), (7.5, 3.0), (0.2, -40.0)];
        for (kd, tau) in cases {
            let raw = CommandPacket::encode(ActuatorCommand::new(kd, tau));
            let clamped = CommandPacket::encode(ActuatorCommand::new(kd, tau).clamped());
            assert_eq!(raw, clamped);
        }
    }

    #[test]
    fn test_sentinels() {
        assert_eq!(
            CommandPacket::sentinel(Sentinel::Zero).as_bytes(),
            &[0xFF, 0xFF, 0xFE]
        );
        assert_eq!(
            Sentinel::from_payload(&[0xFF, 0xFF, 0xFC]),
            Some(Sentinel::EnterMotorMode)
        );
        assert_eq!(
            CommandPacket::sentinel(Sentinel::ExitMotorMode).decode(),
            None
        );
        assert_eq!(Sentinel::from_payload(&[0x00, 0x08, 0x00]), None);
    }

    #[test]
    fn test_full_scale_command_never_aliases_sentinel() {
        let t_step = command_step(T_MIN, T_MAX);
        for code in 0xFF0u16..=0xFFF {
            let tau = uint_to_float(code, T_MIN, T_MAX, COMMAND_FIELD_BITS);
            for tau in [tau - t_step / 4.0, tau, tau + t_step / 4.0] {
                let packet = CommandPacket::encode(ActuatorCommand::new(KD_MAX, tau));
                assert_eq!(packet.as_sentinel(), None, "tau {} -> {:02X?}", tau, packet.as_bytes());
                assert!(packet.decode().is_some());
            }
        }

        // Full-scale torque is held just under the reserved codes
        let packet = CommandPacket::encode(ActuatorCommand::new(KD_MAX, 17.975));
        assert_eq!(packet.fields(), (0xFFF, 0xFFB));
        assert_eq!(
            CommandPacket::encode(ActuatorCommand::new(KD_MAX - 0.01, T_MAX)).fields().1,
            0xFFF
        );
    }

    #[test]
    fn test_parse_feedback_full_scale() {
        let packet = FeedbackPacket::parse(&[1, 0xFF, 0xFF, 0x00, 0x00]).unwrap();
        assert_eq!(packet.joint, Joint::Abad);
        assert_eq!(packet.position, P_MAX);
        assert_eq!(packet.velocity, V_MIN);

        // abad readings are negated, no offset
        let reading = packet.reading();
        assert_eq!(reading.raw_q, P_MAX);
        assert_eq!(reading.q, -P_MAX);
        assert_eq!(reading.dq, -V_MIN);
    }

    #[test]
    fn test_knee_correction() {
        let packet = FeedbackPacket {
            joint: Joint::Knee,
            position: 1.0,
            velocity: 2.0,
        };
        let reading = packet.reading();
        assert!((reading.q - (-0.643 - 2.766)).abs() < 1e-5);
        assert!((reading.dq + 1.286).abs() < 1e-5);
    }

    #[test]
    fn test_hip_offset_only() {
        let packet = FeedbackPacket {
            joint: Joint::Hip,
            position: -0.5,
            velocity: 3.0,
        };
        let reading = packet.reading();
        assert!((reading.q - (3.493 - 0.5)).abs() < 1e-5);
        assert_eq!(reading.dq, 3.0);
    }

    #[test]
    fn test_parse_feedback_errors() {
        assert_eq!(
            FeedbackPacket::parse(&[1, 2, 3]),
            Err(CodecError::ShortFeedback { len: 3 })
        );
        assert_eq!(
            FeedbackPacket::parse(&[0, 0x80, 0x00, 0x80, 0x00]),
            Err(CodecError::UnknownActuator { id: 0 })
        );
    }

    #[test]
    fn test_feedback_device_encoding() {
        let packet = FeedbackPacket {
            joint: Joint::Hip,
            position: 0.0,
            velocity: 0.0,
        };
        let bytes = packet.to_bytes();
        assert_eq!(bytes[0], 2);
        let parsed = FeedbackPacket::parse(&bytes).unwrap();
        assert!(parsed.position.abs() <= (P_MAX - P_MIN) / 65535.0);
        assert!(parsed.velocity.abs() <= (V_MAX - V_MIN) / 65535.0);
    }
}
