// Operator command channel
//
// Drives the motor-mode handshake, the enable flag and the control mode, and
// attaches/detaches the periodic tick. The tick is attached exactly while the
// rig is enabled.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::actuator::bus::RigBuses;
use crate::actuator::codec::{ActuatorCommand, CommandPacket, Sentinel};
use crate::actuator::handshake::{Handshake, MotorModeState};
use crate::actuator::layout::PerActuator;
use crate::config::{SETTLE_DELAY, TICK_PERIOD};
use crate::control::ControlMode;
use crate::scheduler::{Controller, TickTask};
use crate::state::RigState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    /// Detach the tick, exit motor mode everywhere, disable
    Stop,
    /// Enter motor mode, zero, settle, enable and attach the tick
    Start,
    /// Rebias every actuator's position reference, no mode change
    Zero,
    SelectMode(ControlMode),
}

impl OperatorCommand {
    pub fn from_key(key: char) -> Option<Self> {
        match key {
            '\x1b' => Some(OperatorCommand::Stop),
            'm' => Some(OperatorCommand::Start),
            'z' => Some(OperatorCommand::Zero),
            c => ControlMode::from_digit(c).map(OperatorCommand::SelectMode),
        }
    }
}

pub struct Operator {
    state: Arc<RigState>,
    buses: Arc<RigBuses>,
    handshake: Handshake,
    /// Parked here while the tick is detached
    controller: Option<Controller>,
    task: Option<TickTask>,
    period: Duration,
    settle: Duration,
}

impl Operator {
    pub fn new(state: Arc<RigState>, buses: Arc<RigBuses>, controller: Controller) -> Self {
        Self {
            state,
            buses,
            handshake: Handshake::new(),
            controller: Some(controller),
            task: None,
            period: TICK_PERIOD,
            settle: SETTLE_DELAY,
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    pub fn is_attached(&self) -> bool {
        self.task.is_some()
    }

    pub async fn handle(&mut self, cmd: OperatorCommand) {
        match cmd {
            OperatorCommand::Stop => self.stop(),
            OperatorCommand::Start => self.start().await,
            OperatorCommand::Zero => {
                info!("Zeroing all actuators");
                self.handshake.broadcast(&self.buses, Sentinel::Zero);
            }
            OperatorCommand::SelectMode(mode) => {
                info!("Control mode -> {:?}", mode);
                self.state.set_mode(mode);
            }
        }
    }

    /// Boot sequence: command zero, settle, zero the references, enter motor
    /// mode, then enable and attach the tick.
    pub async fn power_on(&mut self) {
        info!("Power-on sequence");
        let zero = PerActuator::splat(CommandPacket::encode(ActuatorCommand::zero()));
        self.buses.write_all(&zero);
        tokio::time::sleep(self.settle).await;

        self.handshake.broadcast(&self.buses, Sentinel::Zero);
        self.handshake.broadcast(&self.buses, Sentinel::EnterMotorMode);
        self.enable();
    }

    pub async fn shutdown(&mut self) {
        self.stop();
    }

    async fn start(&mut self) {
        if self.is_attached() {
            info!("Motor mode already active");
            return;
        }
        info!("Entering motor mode");
        self.handshake.broadcast(&self.buses, Sentinel::EnterMotorMode);
        self.handshake.broadcast(&self.buses, Sentinel::Zero);
        tokio::time::sleep(self.settle).await;
        self.enable();
    }

    fn stop(&mut self) {
        info!("Exiting motor mode");
        self.detach();
        self.handshake.broadcast(&self.buses, Sentinel::ExitMotorMode);
        self.state.set_enabled(false);
    }

    /// Enable and attach, provided every actuator made it into motor mode
    fn enable(&mut self) {
        if !self.handshake.all(MotorModeState::Active) {
            warn!("Not every actuator is in motor mode, staying disabled");
            return;
        }
        let Some(mut controller) = self.controller.take() else {
            error!("Control tick has no controller to run");
            return;
        };
        controller.reset_hold();

        self.state.set_enabled(true);
        match TickTask::start(controller, self.period) {
            Ok(task) => {
                self.task = Some(task);
                info!("Enabled, mode {:?}", self.state.mode());
            }
            Err(e) => {
                self.state.set_enabled(false);
                error!("Failed to start control tick: {}", e);
            }
        }
    }

    fn detach(&mut self) {
        if let Some(task) = self.task.take() {
            self.controller = task.stop();
        }
    }
}

impl Drop for Operator {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::bus::{BusError, CanBus, CanFrame};
    use crate::actuator::layout::{Joint, Leg};
    use crate::actuator::sim::SimBus;
    use crate::scheduler::FixedKnob;

    struct Rig {
        state: Arc<RigState>,
        one: Arc<SimBus>,
        two: Arc<SimBus>,
        operator: Operator,
    }

    fn rig() -> Rig {
        let state = RigState::shared();
        let one = Arc::new(SimBus::new(Leg::One, state.clone()));
        let two = Arc::new(SimBus::new(Leg::Two, state.clone()));
        let buses = Arc::new(RigBuses::new(one.clone(), two.clone()).with_spacing(Duration::ZERO));
        let controller = Controller::new(state.clone(), buses.clone(), Box::new(FixedKnob::new(1.0)));
        let operator = Operator::new(state.clone(), buses, controller).with_settle(Duration::ZERO);
        Rig {
            state,
            one,
            two,
            operator,
        }
    }

    fn payloads(bus: &SimBus) -> Vec<Vec<u8>> {
        bus.sent().iter().map(|f| f.payload().to_vec()).collect()
    }

    #[test]
    fn test_key_mapping() {
        assert_eq!(OperatorCommand::from_key('\x1b'), Some(OperatorCommand::Stop));
        assert_eq!(OperatorCommand::from_key('m'), Some(OperatorCommand::Start));
        assert_eq!(OperatorCommand::from_key('z'), Some(OperatorCommand::Zero));
        assert_eq!(
            OperatorCommand::from_key('2'),
            Some(OperatorCommand::SelectMode(ControlMode::VirtualWall))
        );
        assert_eq!(OperatorCommand::from_key('x'), None);
        assert_eq!(OperatorCommand::from_key('9'), None);
    }

    #[tokio::test]
    async fn test_power_on_sequence() {
        let mut rig = rig();
        rig.operator.power_on().await;

        assert!(rig.state.enabled());
        assert!(rig.operator.is_attached());
        assert_eq!(rig.one.modes(), [MotorModeState::Active; 3]);
        assert_eq!(rig.two.modes(), [MotorModeState::Active; 3]);

        let sent = payloads(&rig.one);
        assert!(sent.len() >= 9);
        for frame in &sent[..3] {
            assert_eq!(frame, &[0x00, 0x08, 0x00]);
        }
        for frame in &sent[3..6] {
            assert_eq!(frame, &Sentinel::Zero.payload());
        }
        for frame in &sent[6..9] {
            assert_eq!(frame, &Sentinel::EnterMotorMode.payload());
        }

        rig.operator.shutdown().await;
        assert!(!rig.state.enabled());
        assert!(!rig.operator.is_attached());
        assert_eq!(rig.one.modes(), [MotorModeState::Off; 3]);
        assert!(rig.operator.handshake().all(MotorModeState::Off));

        // Exit is the last thing on the bus
        let sent = payloads(&rig.two);
        for frame in &sent[sent.len() - 3..] {
            assert_eq!(frame, &Sentinel::ExitMotorMode.payload());
        }
    }

    #[tokio::test]
    async fn test_hold_after_restart_sends_zero_torque() {
        let mut rig = rig();
        rig.state.set_gain_scale(1.0);
        rig.operator.handle(OperatorCommand::Start).await;

        // Leg two's hip pulled off its zero drives leg one's hip
        rig.two.move_to(Joint::Hip, 0.1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let coupled = rig.one.last_commands()[Joint::Hip.index()].unwrap();
        assert!(coupled.tau > 5.0, "{:?}", coupled);

        rig.operator.handle(OperatorCommand::Stop).await;
        rig.operator
            .handle(OperatorCommand::SelectMode(ControlMode::Hold))
            .await;
        rig.one.clear();
        rig.operator.handle(OperatorCommand::Start).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        rig.operator.handle(OperatorCommand::Stop).await;

        let commands: Vec<Vec<u8>> = payloads(&rig.one)
            .into_iter()
            .filter(|p| Sentinel::from_payload(p).is_none())
            .collect();
        assert!(!commands.is_empty());
        for frame in &commands {
            assert_eq!(frame, &[0x00, 0x08, 0x00]);
        }
    }

    #[tokio::test]
    async fn test_start_stop_keys() {
        let mut rig = rig();
        assert!(!rig.state.enabled());

        rig.operator.handle(OperatorCommand::Start).await;
        assert!(rig.state.enabled());
        assert!(rig.operator.is_attached());

        // A second start is ignored
        rig.one.clear();
        rig.operator.handle(OperatorCommand::Start).await;
        assert!(!payloads(&rig.one).contains(&Sentinel::EnterMotorMode.payload().to_vec()));

        rig.operator.handle(OperatorCommand::Stop).await;
        assert!(!rig.state.enabled());
        assert!(!rig.operator.is_attached());

        // Nothing is transmitted once stopped
        let sent = rig.one.sent().len();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(rig.one.sent().len(), sent);

        // Restart reuses the parked controller
        rig.operator.handle(OperatorCommand::Start).await;
        assert!(rig.operator.is_attached());
        rig.operator.shutdown().await;
    }

    #[tokio::test]
    async fn test_zero_keeps_mode() {
        let mut rig = rig();
        rig.operator.handle(OperatorCommand::Zero).await;
        assert_eq!(rig.one.modes(), [MotorModeState::Off; 3]);
        assert!(!rig.state.enabled());
        assert!(rig
            .two
            .sent()
            .iter()
            .all(|f| f.payload() == Sentinel::Zero.payload()));
    }

    #[tokio::test]
    async fn test_select_mode() {
        let mut rig = rig();
        rig.operator
            .handle(OperatorCommand::SelectMode(ControlMode::Hold))
            .await;
        assert_eq!(rig.state.mode(), ControlMode::Hold);
        rig.operator
            .handle(OperatorCommand::SelectMode(ControlMode::Idle))
            .await;
        assert_eq!(rig.state.mode(), ControlMode::Idle);
    }

    struct DeadBus;

    impl CanBus for DeadBus {
        fn send(&self, _frame: &CanFrame) -> Result<(), BusError> {
            Err(BusError::Io(std::io::Error::other("no adapter")))
        }
    }

    #[tokio::test]
    async fn test_start_refused_when_leg_unreachable() {
        let state = RigState::shared();
        let one = Arc::new(SimBus::new(Leg::One, state.clone()));
        let buses = Arc::new(RigBuses::new(one.clone(), Arc::new(DeadBus)).with_spacing(Duration::ZERO));
        let controller = Controller::new(state.clone(), buses.clone(), Box::new(FixedKnob::new(1.0)));
        let mut operator = Operator::new(state.clone(), buses, controller).with_settle(Duration::ZERO);

        operator.handle(OperatorCommand::Start).await;
        assert!(!state.enabled());
        assert!(!operator.is_attached());
        assert_eq!(one.modes(), [MotorModeState::Active; 3]);
    }
}
