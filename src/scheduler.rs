// Fixed-period control tick and its cancellable periodic task
//
// Each tick, in order:
// 1. smooth the knob into the gain scale
// 2. refresh both legs' kinematics from the latest feedback snapshots
// 3. run the selected control law if enabled, else command zero
// 4. transmit all six commands in group order

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, error, trace};

use crate::actuator::bus::RigBuses;
use crate::actuator::codec::{ActuatorCommand, CommandPacket};
use crate::actuator::layout::{Leg, PerActuator};
use crate::config::GAIN_SMOOTHING;
use crate::control::{self, Gains, LegSample, RigCommands};
use crate::state::RigState;

/// Operator gain knob, sampled once per tick
pub trait AnalogInput: Send {
    /// Current reading in [0, 1]
    fn read(&mut self) -> f32;
}

/// Knob held at a constant position
#[derive(Debug, Clone, Copy)]
pub struct FixedKnob(f32);

impl FixedKnob {
    pub fn new(value: f32) -> Self {
        Self(value.clamp(0.0, 1.0))
    }
}

impl AnalogInput for FixedKnob {
    fn read(&mut self) -> f32 {
        self.0
    }
}

/// Owns everything the periodic tick touches
pub struct Controller {
    state: Arc<RigState>,
    buses: Arc<RigBuses>,
    knob: Box<dyn AnalogInput>,
    gains: Gains,
    last: RigCommands,
    ticks: u64,
}

impl Controller {
    pub fn new(state: Arc<RigState>, buses: Arc<RigBuses>, knob: Box<dyn AnalogInput>) -> Self {
        Self {
            state,
            buses,
            knob,
            gains: Gains::default(),
            last: control::idle(),
            ticks: 0,
        }
    }

    pub fn with_gains(mut self, gains: Gains) -> Self {
        self.gains = gains;
        self
    }

    /// Commands sent on the most recent tick
    pub fn last_commands(&self) -> &RigCommands {
        &self.last
    }

    /// Forget the commands Hold would retransmit. Used when a new motor-mode
    /// session starts, since the device references have moved.
    pub fn reset_hold(&mut self) {
        self.last = control::idle();
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Run one control tick and return the commands that were sent
    pub fn tick(&mut self) -> &RigCommands {
        self.ticks += 1;
        let scale = self.update_gain_scale();

        let legs = Leg::ALL.map(|leg| {
            let feedback = self.state.leg(leg);
            LegSample::new(feedback.q(), feedback.dq())
        });

        let mode = self.state.mode();
        let commands = if self.state.enabled() {
            match control::evaluate(mode, &legs, scale, &self.gains) {
                Some(commands) => clamp_all(&commands),
                // Hold: retransmit what the actuators already have
                None => self.last,
            }
        } else {
            control::idle()
        };

        trace!("tick {} mode={:?} scale={:.3}", self.ticks, mode, scale);
        self.transmit(&commands);
        self.last = commands;
        &self.last
    }

    fn update_gain_scale(&mut self) -> f32 {
        let input = self.knob.read();
        let scale = (1.0 - GAIN_SMOOTHING) * self.state.gain_scale() + GAIN_SMOOTHING * input;
        self.state.set_gain_scale(scale);
        scale
    }

    fn transmit(&self, commands: &RigCommands) {
        let packets = PerActuator(commands.0.map(|leg| leg.map(CommandPacket::encode)));
        self.buses.write_all(&packets);
    }
}

fn clamp_all(commands: &RigCommands) -> RigCommands {
    PerActuator(commands.0.map(|leg| leg.map(ActuatorCommand::clamped)))
}

/// Periodic control tick running on its own thread.
///
/// Stopping lets an in-flight tick finish, then hands the controller back for
/// a later start.
pub struct TickTask {
    running: Arc<AtomicBool>,
    handle: JoinHandle<Controller>,
}

impl TickTask {
    pub fn start(mut controller: Controller, period: Duration) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();

        let handle = std::thread::Builder::new()
            .name("control-tick".to_string())
            .spawn(move || {
                debug!("Control tick attached ({:?} period)", period);
                let mut next = Instant::now();
                while flag.load(Ordering::Acquire) {
                    controller.tick();

                    next += period;
                    let now = Instant::now();
                    if next > now {
                        std::thread::sleep(next - now);
                    } else {
                        trace!("tick overran by {:?}", now - next);
                        next = now;
                    }
                }
                debug!("Control tick detached after {} ticks", controller.ticks());
                controller
            })?;

        Ok(Self { running, handle })
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop issuing ticks and wait for the current one to complete
    pub fn stop(self) -> Option<Controller> {
        self.running.store(false, Ordering::Release);
        match self.handle.join() {
            Ok(controller) => Some(controller),
            Err(_) => {
                error!("Control tick thread panicked");
                None
            }
        }
    }
}
