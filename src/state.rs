// Shared state between feedback receivers, the control tick and the operator
//
// Ownership is single-writer per field:
// - joint feedback for a leg: that leg's bus receiver
// - gain scale: the control tick
// - enabled flag and control mode: the operator
// Nothing here blocks. Joint feedback for a leg is published as an immutable
// snapshot that is swapped atomically, so the tick never sees a half-updated
// leg. Scalars are plain atomics.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use serde::Serialize;

use crate::actuator::codec::{FeedbackPacket, JointReading};
use crate::actuator::layout::Leg;
use crate::control::ControlMode;

/// Latest corrected readings for the three joints of one leg
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LegFeedback {
    pub joints: [JointReading; 3],
}

impl LegFeedback {
    /// Offset-corrected joint angles [abad, hip, knee]
    pub fn q(&self) -> [f32; 3] {
        self.joints.map(|j| j.q)
    }

    /// Corrected joint velocities
    pub fn dq(&self) -> [f32; 3] {
        self.joints.map(|j| j.dq)
    }

    pub fn with_reading(mut self, packet: &FeedbackPacket) -> Self {
        self.joints[packet.joint.index()] = packet.reading();
        self
    }
}

const NO_FEEDBACK: u64 = u64::MAX;

/// Explicit shared context handed to every interrupt-like source
pub struct RigState {
    legs: [ArcSwap<LegFeedback>; 2],
    feedback_at_us: [AtomicU64; 2],
    enabled: AtomicBool,
    mode: AtomicU8,
    gain_scale: AtomicU32,
    epoch: Instant,
}

impl RigState {
    pub fn new() -> Self {
        Self {
            legs: [
                ArcSwap::from_pointee(LegFeedback::default()),
                ArcSwap::from_pointee(LegFeedback::default()),
            ],
            feedback_at_us: [AtomicU64::new(NO_FEEDBACK), AtomicU64::new(NO_FEEDBACK)],
            enabled: AtomicBool::new(false),
            mode: AtomicU8::new(ControlMode::default() as u8),
            gain_scale: AtomicU32::new(0.0f32.to_bits()),
            epoch: Instant::now(),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Store one decoded feedback packet for the leg whose bus delivered it.
    ///
    /// Calls for one leg must not overlap: only that leg's receiver writes it.
    pub fn record_feedback(&self, leg: Leg, packet: &FeedbackPacket) {
        let slot = &self.legs[leg.index()];
        let next = slot.load().with_reading(packet);
        slot.store(Arc::new(next));
        self.feedback_at_us[leg.index()]
            .store(self.epoch.elapsed().as_micros() as u64, Ordering::Release);
    }

    /// Latest consistent snapshot of one leg
    pub fn leg(&self, leg: Leg) -> LegFeedback {
        **self.legs[leg.index()].load()
    }

    /// Time since the leg last delivered feedback, `None` if it never has
    pub fn feedback_age(&self, leg: Leg) -> Option<Duration> {
        let at = self.feedback_at_us[leg.index()].load(Ordering::Acquire);
        if at == NO_FEEDBACK {
            return None;
        }
        let now = self.epoch.elapsed().as_micros() as u64;
        Some(Duration::from_micros(now.saturating_sub(at)))
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn mode(&self) -> ControlMode {
        ControlMode::from_index(self.mode.load(Ordering::Acquire))
    }

    pub fn set_mode(&self, mode: ControlMode) {
        self.mode.store(mode as u8, Ordering::Release);
    }

    pub fn gain_scale(&self) -> f32 {
        f32::from_bits(self.gain_scale.load(Ordering::Acquire))
    }

    pub fn set_gain_scale(&self, scale: f32) {
        self.gain_scale.store(scale.to_bits(), Ordering::Release);
    }
}

impl Default for RigState {
    fn default() -> Self {
        Self::new()
    }
}
