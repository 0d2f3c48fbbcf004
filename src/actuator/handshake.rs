// Motor-mode handshake
//
// Per actuator:  Off --EnterMotorMode--> Active --ExitMotorMode--> Off
// Zero is accepted in either state and only rebiases the device's position
// reference. Transitions happen only through sentinel payloads; ordinary
// commands never change the mode.

use serde::Serialize;
use tracing::{info, warn};

use super::bus::RigBuses;
use super::codec::{CommandPacket, Sentinel};
use super::layout::PerActuator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MotorModeState {
    #[default]
    Off,
    Active,
}

impl MotorModeState {
    pub fn on_sentinel(self, sentinel: Sentinel) -> Self {
        match sentinel {
            Sentinel::EnterMotorMode => MotorModeState::Active,
            Sentinel::ExitMotorMode => MotorModeState::Off,
            Sentinel::Zero => self,
        }
    }
}

/// Controller-side view of all six actuators' motor mode
#[derive(Debug, Clone, Default)]
pub struct Handshake {
    states: PerActuator<MotorModeState>,
}

impl Handshake {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn states(&self) -> &PerActuator<MotorModeState> {
        &self.states
    }

    /// True when every actuator is in `state`
    pub fn all(&self, state: MotorModeState) -> bool {
        self.states.iter_group_order().all(|(_, _, s)| s == state)
    }

    /// Send `sentinel` to all six actuators in group order.
    ///
    /// Only actuators whose frame went out advance their state. Returns
    /// whether every actuator got the sentinel.
    pub fn broadcast(&mut self, buses: &RigBuses, sentinel: Sentinel) -> bool {
        let delivered = buses.write_all(&PerActuator::splat(CommandPacket::sentinel(sentinel)));

        let mut complete = true;
        for (leg, joint, ok) in delivered.iter_group_order() {
            if ok {
                let state = &mut self.states[(leg, joint)];
                *state = state.on_sentinel(sentinel);
            } else {
                complete = false;
            }
        }

        if complete {
            info!("{:?} sent to all actuators", sentinel);
        } else {
            warn!("{:?} did not reach every actuator", sentinel);
        }
        complete
    }
}
