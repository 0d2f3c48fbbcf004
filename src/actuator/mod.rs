// Actuator-side modules for the two-leg rig
//
// Provides:
// - Bit-exact command / feedback wire codec and sentinel payloads
// - Leg forward kinematics, Jacobian and approximate inverse mass matrix
// - Motor-mode handshake state machine
// - CAN frame type, bus trait and the two-bus transmit path
// - SLCAN serial adapter backend and a simulated rig

pub mod bus;
pub mod codec;
pub mod handshake;
pub mod kinematics;
pub mod layout;
pub mod sim;
pub mod slcan;

pub use bus::{BusError, CanBus, CanFrame, RigBuses};
pub use codec::{ActuatorCommand, CodecError, CommandPacket, FeedbackPacket, Sentinel};
pub use handshake::{Handshake, MotorModeState};
pub use kinematics::LegKinematics;
pub use layout::{Joint, Leg, PerActuator};
pub use sim::SimBus;
pub use slcan::SlcanBus;
