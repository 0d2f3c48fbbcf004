// Control laws for the two-leg rig
//
// Each law is a pure function of both legs' joint state and kinematics plus
// the gain scale, producing one (damping, torque) command per actuator.
// Damping from a law is topped up with a small per-joint baseline so every
// actuator keeps some viscous damping.

use serde::Serialize;

use crate::actuator::codec::ActuatorCommand;
use crate::actuator::kinematics::{LegKinematics, Vec3};
use crate::actuator::layout::{Joint, Leg, PerActuator};
use crate::config::{
    BASE_DAMPING, KD, KD_Q, KP_Q, WALL_FORCE_DAMPING, WALL_JOINT_DAMPING,
    WALL_KNEE_DAMPING_SCALE, WALL_K_MAX, WALL_WN_DES, WALL_X_LIMIT, WALL_Y_LIMIT, WALL_Z_LIMIT,
};

/// One command per actuator, indexed by leg and joint
pub type RigCommands = PerActuator<ActuatorCommand>;

/// Operator-selectable control law
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    /// Zero damping and torque everywhere
    Idle = 0,
    /// Virtual spring-damper between matching joints of the two legs
    #[default]
    JointCoupling = 1,
    /// One-sided Cartesian walls on each foot
    VirtualWall = 2,
    /// No law: keep retransmitting the last commands
    Hold = 3,
}

impl ControlMode {
    /// Decode a stored mode index; anything past the known laws holds
    pub fn from_index(index: u8) -> Self {
        match index {
            0 => ControlMode::Idle,
            1 => ControlMode::JointCoupling,
            2 => ControlMode::VirtualWall,
            _ => ControlMode::Hold,
        }
    }

    /// Console digit '0'..'3'
    pub fn from_digit(c: char) -> Option<Self> {
        match c {
            '0'..='3' => c.to_digit(10).map(|d| Self::from_index(d as u8)),
            _ => None,
        }
    }
}

/// Gains shared by the laws
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gains {
    /// Cartesian damping
    pub kd: f32,
    /// Joint coupling stiffness
    pub kp_q: f32,
    /// Joint coupling damping
    pub kd_q: f32,
}

impl Default for Gains {
    fn default() -> Self {
        Self {
            kd: KD,
            kp_q: KP_Q,
            kd_q: KD_Q,
        }
    }
}

/// Everything a law may read about one leg for the current tick
#[derive(Debug, Clone, Copy, Default)]
pub struct LegSample {
    pub q: Vec3,
    pub dq: Vec3,
    pub kin: LegKinematics,
}

impl LegSample {
    pub fn new(q: Vec3, dq: Vec3) -> Self {
        Self {
            q,
            dq,
            kin: LegKinematics::compute(&q, &dq),
        }
    }
}

/// Run the law for `mode`. `Hold` has no law and returns `None`.
pub fn evaluate(
    mode: ControlMode,
    legs: &[LegSample; 2],
    scale: f32,
    gains: &Gains,
) -> Option<RigCommands> {
    match mode {
        ControlMode::Idle => Some(idle()),
        ControlMode::JointCoupling => Some(joint_coupling(legs, scale, gains)),
        ControlMode::VirtualWall => Some(virtual_wall(legs, scale, gains)),
        ControlMode::Hold => None,
    }
}

pub fn idle() -> RigCommands {
    PerActuator::splat(ActuatorCommand::zero())
}

/// Drive matching joints of the two legs toward the same angle and velocity.
///
/// Hip torque carries the opposite sign to abad and knee, and the knee gains
/// are softened (kp / 1.5, kd / 2.25).
pub fn joint_coupling(legs: &[LegSample; 2], scale: f32, gains: &Gains) -> RigCommands {
    let [one, two] = legs;
    let mut commands = idle();

    for joint in Joint::ALL {
        let i = joint.index();
        let (kp, kd, sign) = match joint {
            Joint::Abad => (gains.kp_q, gains.kd_q, -1.0),
            Joint::Hip => (gains.kp_q, gains.kd_q, 1.0),
            Joint::Knee => (gains.kp_q / 1.5, gains.kd_q / 2.25, -1.0),
        };
        let spring = kp * (two.q[i] - one.q[i]) + kd * (two.dq[i] - one.dq[i]);
        let damping = BASE_DAMPING[i];

        commands[(Leg::One, joint)] = ActuatorCommand::new(damping, sign * scale * spring);
        commands[(Leg::Two, joint)] = ActuatorCommand::new(damping, sign * scale * -spring);
    }

    commands
}

/// Per-leg output of the virtual wall law
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WallResponse {
    /// Axis (x, y, z) currently past its wall plane
    pub contact: [bool; 3],
    /// Cartesian stiffness per axis after capping
    pub stiffness: Vec3,
    /// Cartesian force per axis, zero out of contact
    pub force: Vec3,
    /// Joint torque from the Jacobian transpose
    pub torque: Vec3,
    /// Joint damping injected for in-contact axes
    pub damping: Vec3,
}

/// Virtual wall for a single leg
pub fn wall_response(kin: &LegKinematics, scale: f32, gains: &Gains) -> WallResponse {
    let limits = [WALL_X_LIMIT, WALL_Y_LIMIT, WALL_Z_LIMIT];
    let p = kin.position;
    let contact = [p[0] < limits[0], p[1] > limits[1], p[2] < limits[2]];

    let mut response = WallResponse {
        contact,
        ..Default::default()
    };

    for axis in 0..3 {
        // Cap stiffness so a small effective inertia cannot push it past the ceiling
        let k = (WALL_WN_DES / kin.inv_mass[axis][axis]).min(WALL_K_MAX);
        response.stiffness[axis] = k;
        if contact[axis] {
            response.force[axis] = scale
                * (k * (limits[axis] - p[axis])
                    + WALL_FORCE_DAMPING * gains.kd * (0.0 - kin.velocity[axis]));
        }
    }

    let j = &kin.jacobian;
    let f = &response.force;
    for joint in Joint::ALL {
        let i = joint.index();
        let projected = f[0] * j[0][i] + f[1] * j[1][i] + f[2] * j[2][i];
        response.torque[i] = match joint {
            Joint::Hip => projected,
            Joint::Abad | Joint::Knee => -projected,
        };

        let in_contact: f32 = (0..3)
            .filter(|&axis| contact[axis])
            .map(|axis| j[axis][i] * j[axis][i])
            .sum();
        let family = match joint {
            Joint::Knee => WALL_KNEE_DAMPING_SCALE,
            Joint::Abad | Joint::Hip => 1.0,
        };
        response.damping[i] = WALL_JOINT_DAMPING * family * gains.kd * scale * in_contact;
    }

    response
}

pub fn virtual_wall(legs: &[LegSample; 2], scale: f32, gains: &Gains) -> RigCommands {
    let mut commands = idle();
    for leg in Leg::ALL {
        let wall = wall_response(&legs[leg.index()].kin, scale, gains);
        for joint in Joint::ALL {
            let i = joint.index();
            commands[(leg, joint)] =
                ActuatorCommand::new(wall.damping[i] + BASE_DAMPING[i], wall.torque[i]);
        }
    }
    commands
}
