// Simulated CAN bus with three emulated actuators
//
// Stands in for the hardware when running without adapters and doubles as
// the test fixture. Every frame is recorded. Each actuator tracks its own
// motor mode from the sentinels it receives and, while active, answers every
// frame with a feedback packet, which is decoded into the shared state the
// same way the hardware receive path does it.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, trace, warn};

use super::bus::{BusError, CanBus, CanFrame};
use super::codec::{ActuatorCommand, CommandPacket, FeedbackPacket, Sentinel, COMMAND_LEN};
use super::handshake::MotorModeState;
use super::layout::{Joint, Leg};
use crate::state::RigState;

#[derive(Debug, Clone, Copy, Default)]
struct SimActuator {
    mode: MotorModeState,
    /// Physical rotor position in device units
    position: f32,
    /// Reference captured by the last Zero sentinel
    reference: f32,
    last_command: Option<ActuatorCommand>,
}

#[derive(Debug, Default)]
struct SimInner {
    actuators: [SimActuator; 3],
    sent: Vec<CanFrame>,
}

pub struct SimBus {
    leg: Leg,
    state: Arc<RigState>,
    inner: Mutex<SimInner>,
}

impl SimBus {
    pub fn new(leg: Leg, state: Arc<RigState>) -> Self {
        Self {
            leg,
            state,
            inner: Mutex::new(SimInner::default()),
        }
    }

    /// Place the rotors at fixed device-unit positions [abad, hip, knee]
    pub fn with_positions(self, positions: [f32; 3]) -> Self {
        {
            let mut inner = self.lock();
            for (actuator, position) in inner.actuators.iter_mut().zip(positions) {
                actuator.position = position;
            }
        }
        self
    }

    /// All frames received so far
    pub fn sent(&self) -> Vec<CanFrame> {
        self.lock().sent.clone()
    }

    pub fn clear(&self) {
        self.lock().sent.clear();
    }

    pub fn modes(&self) -> [MotorModeState; 3] {
        self.lock().actuators.map(|a| a.mode)
    }

    /// Move one rotor without touching its reference
    #[cfg(test)]
    pub fn move_to(&self, joint: Joint, position: f32) {
        self.lock().actuators[joint.index()].position = position;
    }

    /// Last ordinary command each actuator accepted while active
    #[cfg(test)]
    pub fn last_commands(&self) -> [Option<ActuatorCommand>; 3] {
        self.lock().actuators.map(|a| a.last_command)
    }

    fn lock(&self) -> MutexGuard<'_, SimInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CanBus for SimBus {
    fn send(&self, frame: &CanFrame) -> Result<(), BusError> {
        // Held until the reply is stored: the tick and the operator both send,
        // and the leg's feedback must have one writer at a time.
        let mut inner = self.lock();
        inner.sent.push(*frame);

        let Some(joint) = u8::try_from(frame.id).ok().and_then(Joint::from_id) else {
            warn!("Sim {}: no actuator with id {}", self.leg, frame.id);
            return Ok(());
        };
        let Ok(bytes) = <[u8; COMMAND_LEN]>::try_from(frame.payload()) else {
            warn!("Sim {}: ignoring {}-byte frame", self.leg, frame.payload().len());
            return Ok(());
        };

        let actuator = &mut inner.actuators[joint.index()];
        let packet = CommandPacket::from_bytes(bytes);
        match packet.as_sentinel() {
            Some(sentinel) => {
                debug!("Sim {} {}: {:?}", self.leg, joint, sentinel);
                actuator.mode = actuator.mode.on_sentinel(sentinel);
                if sentinel == Sentinel::Zero {
                    actuator.reference = actuator.position;
                }
            }
            None if actuator.mode == MotorModeState::Active => {
                actuator.last_command = packet.decode();
                trace!("Sim {} {}: accepted {:?}", self.leg, joint, actuator.last_command);
            }
            None => {}
        }
        if actuator.mode != MotorModeState::Active {
            return Ok(());
        }

        // Reply through the same decode path as a hardware receive
        let reply = FeedbackPacket {
            joint,
            position: actuator.position - actuator.reference,
            velocity: 0.0,
        };
        match FeedbackPacket::parse(&reply.to_bytes()) {
            Ok(packet) => self.state.record_feedback(self.leg, &packet),
            Err(e) => warn!("Sim {}: bad reply: {}", self.leg, e),
        }
        Ok(())
    }
}
