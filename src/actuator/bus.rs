// CAN frame type and the two-bus transmit path
//
// Each leg has its own bus. Sends are fire-and-forget: a failed send is
// logged and the remaining frames still go out.

use std::sync::Arc;
use std::time::Duration;

use tracing::{trace, warn};

use super::codec::CommandPacket;
use super::layout::{Joint, Leg, PerActuator};
use crate::config::SEND_SPACING;

/// Classic CAN payload limit
pub const MAX_DATA_LEN: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame payload of {len} bytes exceeds 8")]
    FrameTooLong { len: usize },

    #[error("Malformed frame {line:?}: {reason}")]
    MalformedFrame { line: String, reason: String },
}

/// Standard-id CAN frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    pub id: u16,
    len: u8,
    data: [u8; MAX_DATA_LEN],
}

impl CanFrame {
    pub fn new(id: u16, payload: &[u8]) -> Result<Self, BusError> {
        if payload.len() > MAX_DATA_LEN {
            return Err(BusError::FrameTooLong { len: payload.len() });
        }
        let mut data = [0u8; MAX_DATA_LEN];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            id,
            len: payload.len() as u8,
            data,
        })
    }

    /// Command frame addressed to one joint's actuator
    pub fn command(joint: Joint, packet: &CommandPacket) -> Self {
        let mut data = [0u8; MAX_DATA_LEN];
        data[..3].copy_from_slice(packet.as_bytes());
        Self {
            id: joint.id() as u16,
            len: 3,
            data,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }
}

/// Transmit primitive for one CAN interface
pub trait CanBus: Send + Sync {
    fn send(&self, frame: &CanFrame) -> Result<(), BusError>;
}

/// The rig's two CAN interfaces, one per leg
pub struct RigBuses {
    legs: [Arc<dyn CanBus>; 2],
    spacing: Duration,
}

impl RigBuses {
    pub fn new(leg_one: Arc<dyn CanBus>, leg_two: Arc<dyn CanBus>) -> Self {
        Self {
            legs: [leg_one, leg_two],
            spacing: SEND_SPACING,
        }
    }

    /// Override the gap between transmit groups
    pub fn with_spacing(mut self, spacing: Duration) -> Self {
        self.spacing = spacing;
        self
    }

    pub fn send(&self, leg: Leg, joint: Joint, packet: &CommandPacket) -> Result<(), BusError> {
        let frame = CanFrame::command(joint, packet);
        trace!("{} {} <- {:02X?}", leg, joint, frame.payload());
        self.legs[leg.index()].send(&frame)
    }

    /// Send one packet to each of the six actuators in group order
    /// (abad pair, hip pair, knee pair), pausing between groups.
    ///
    /// Returns which actuators the frame was handed to successfully.
    pub fn write_all(&self, packets: &PerActuator<CommandPacket>) -> PerActuator<bool> {
        let mut delivered = PerActuator::splat(false);
        for joint in Joint::ALL {
            self.pause();
            for leg in Leg::ALL {
                match self.send(leg, joint, &packets[(leg, joint)]) {
                    Ok(()) => delivered[(leg, joint)] = true,
                    Err(e) => warn!("Send to {} {} failed: {}", leg, joint, e),
                }
            }
        }
        self.pause();
        delivered
    }

    fn pause(&self) {
        if !self.spacing.is_zero() {
            std::thread::sleep(self.spacing);
        }
    }
}
