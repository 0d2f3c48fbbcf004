// Telemetry message types published by the runtime

use std::time::Duration;

use serde::Serialize;

use crate::actuator::codec::JointReading;
use crate::actuator::kinematics::{LegKinematics, Vec3};
use crate::actuator::layout::Leg;
use crate::control::ControlMode;
use crate::state::RigState;

// One leg as seen by the control tick
#[derive(Debug, Clone, Serialize)]
pub struct LegTelemetry {
    pub leg: Leg,
    pub joints: [JointReading; 3],
    /// End-effector position from forward kinematics
    pub position: Vec3,
    /// None until the leg has reported at least once
    pub feedback_age_ms: Option<u64>,
}

// Read-only snapshot of the rig, runtime -> observers
#[derive(Debug, Clone, Serialize)]
pub struct RigTelemetry {
    pub enabled: bool,
    pub mode: ControlMode,
    pub gain_scale: f32,
    pub legs: [LegTelemetry; 2],
}

impl RigTelemetry {
    pub fn snapshot(state: &RigState) -> Self {
        let legs = Leg::ALL.map(|leg| {
            let feedback = state.leg(leg);
            let kin = LegKinematics::compute(&feedback.q(), &feedback.dq());
            LegTelemetry {
                leg,
                joints: feedback.joints,
                position: kin.position,
                feedback_age_ms: state.feedback_age(leg).map(|age| age.as_millis() as u64),
            }
        });

        Self {
            enabled: state.enabled(),
            mode: state.mode(),
            gain_scale: state.gain_scale(),
            legs,
        }
    }
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    FeedbackStale,
}

impl RuntimeHealth {
    /// Stale if either leg is silent for longer than `timeout`
    pub fn assess(state: &RigState, timeout: Duration) -> Self {
        let fresh = Leg::ALL
            .iter()
            .all(|&leg| state.feedback_age(leg).is_some_and(|age| age <= timeout));
        if fresh {
            RuntimeHealth::Ok
        } else {
            RuntimeHealth::FeedbackStale
        }
    }
}
