// Device ranges, rig geometry, gains and timing
use std::time::Duration;

// Control tick period (0.6 ms)
pub const TICK_PERIOD: Duration = Duration::from_micros(600);

// Gap between consecutive transmissions within one tick
pub const SEND_SPACING: Duration = Duration::from_micros(10);

// Wait after a batch motor-mode entry before closed-loop torque starts
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);

// Exponential smoothing factor applied to the knob every tick
pub const GAIN_SMOOTHING: f32 = 0.01;

// Command field ranges
pub const KD_MIN: f32 = 0.0;
pub const KD_MAX: f32 = 5.0;
pub const T_MIN: f32 = -18.0;
pub const T_MAX: f32 = 18.0;

// Feedback field ranges
pub const P_MIN: f32 = -12.5;
pub const P_MAX: f32 = 12.5;
pub const V_MIN: f32 = -45.0;
pub const V_MAX: f32 = 45.0;

// Link lengths (m): abad offset, thigh, shank
pub const L1: f32 = 0.0577;
pub const L2: f32 = 0.2088;
pub const L3: f32 = 0.175;

// Joint-space inertias [abad, hip, knee]
pub const JOINT_INERTIA: [f32; 3] = [0.005, 0.0045, 0.006];

// Joint angle offsets at the zero position [abad, hip, knee]
pub const ANGLE_OFFSET: [f32; 3] = [0.0, 3.493, -2.766];

// 28:18 belt reduction on the knees
pub const KNEE_BELT_RATIO: f32 = 0.643;

// Cartesian damping gain
pub const KD: f32 = 100.0;

// Joint coupling gains
pub const KP_Q: f32 = 100.0;
pub const KD_Q: f32 = 0.8;

// Baseline viscous damping added to every command [abad, hip, knee]
pub const BASE_DAMPING: [f32; 3] = [0.005, 0.005, 0.0033];

// Virtual wall planes and stiffness shaping
pub const WALL_X_LIMIT: f32 = 0.0;
pub const WALL_Y_LIMIT: f32 = 0.2;
pub const WALL_Z_LIMIT: f32 = -0.2;
pub const WALL_K_MAX: f32 = 25_000.0;
pub const WALL_WN_DES: f32 = 100_000.0;
pub const WALL_FORCE_DAMPING: f32 = 0.03;
pub const WALL_JOINT_DAMPING: f32 = 0.01;
pub const WALL_KNEE_DAMPING_SCALE: f32 = 0.44;

// Serial-line CAN adapters, one per leg
pub const BUS_PORT_LEG_ONE: &str = "/dev/ttyACM0";
pub const BUS_PORT_LEG_TWO: &str = "/dev/ttyACM1";

// Telemetry
pub const TELEMETRY_HZ: u64 = 50;
pub const FEEDBACK_TIMEOUT: Duration = Duration::from_millis(50);
pub const TOPIC_TELEMETRY: &str = "twinleg/state/rig"; // joint and mode snapshot
pub const TOPIC_HEALTH: &str = "twinleg/state/health"; // health status
