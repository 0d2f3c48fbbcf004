// Rig runtime: wires buses, control tick, operator console and telemetry
//
// The control tick runs on its own thread at the tick period. This task only
// forwards console commands to the operator and publishes telemetry at a
// much slower rate; nothing here feeds back into control.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{info, warn};

use crate::actuator::bus::{BusError, RigBuses};
use crate::actuator::layout::Leg;
use crate::actuator::sim::SimBus;
use crate::actuator::slcan::SlcanBus;
use crate::config::{
    BUS_PORT_LEG_ONE, BUS_PORT_LEG_TWO, FEEDBACK_TIMEOUT, TELEMETRY_HZ, TOPIC_HEALTH,
    TOPIC_TELEMETRY,
};
use crate::console::{self, ConsoleEvent};
use crate::messages::{RigTelemetry, RuntimeHealth};
use crate::operator::Operator;
use crate::scheduler::{Controller, FixedKnob};
use crate::state::RigState;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser, Debug, Clone)]
#[command(name = "twinleg-runtime", about = "Real-time control for the two-leg rig")]
pub struct Args {
    /// Serial port of the leg one CAN adapter
    #[arg(long, default_value = BUS_PORT_LEG_ONE)]
    pub port_one: String,

    /// Serial port of the leg two CAN adapter
    #[arg(long, default_value = BUS_PORT_LEG_TWO)]
    pub port_two: String,

    /// Run against simulated actuators instead of the adapters
    #[arg(long)]
    pub sim: bool,

    /// Gain knob position in [0, 1]
    #[arg(long, default_value_t = 0.0)]
    pub knob: f32,

    /// Wait for 'm' instead of running the power-on sequence
    #[arg(long)]
    pub no_autostart: bool,

    /// Do not open a Zenoh session
    #[arg(long)]
    pub no_telemetry: bool,
}

/// Feedback receive threads for the hardware buses
struct Receivers {
    running: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl Receivers {
    fn stop(self) {
        self.running.store(false, Ordering::Release);
        for handle in self.handles {
            if handle.join().is_err() {
                warn!("Feedback receiver panicked");
            }
        }
    }
}

fn open_buses(args: &Args, state: &Arc<RigState>) -> Result<(RigBuses, Receivers), BusError> {
    let running = Arc::new(AtomicBool::new(true));
    let mut handles = Vec::new();

    if args.sim {
        info!("Using simulated actuators");
        let one = SimBus::new(Leg::One, state.clone());
        let two = SimBus::new(Leg::Two, state.clone());
        let buses = RigBuses::new(Arc::new(one), Arc::new(two));
        return Ok((buses, Receivers { running, handles }));
    }

    let one = SlcanBus::open(&args.port_one)?;
    let two = SlcanBus::open(&args.port_two)?;
    handles.push(one.spawn_receiver(Leg::One, state.clone(), running.clone())?);
    handles.push(two.spawn_receiver(Leg::Two, state.clone(), running.clone())?);

    let buses = RigBuses::new(Arc::new(one), Arc::new(two));
    Ok((buses, Receivers { running, handles }))
}

struct Telemetry {
    _session: zenoh::Session,
    pub_state: zenoh::pubsub::Publisher<'static>,
    pub_health: zenoh::pubsub::Publisher<'static>,
}

impl Telemetry {
    async fn open() -> Result<Self, BoxError> {
        info!("Opening Zenoh session...");
        let session = zenoh::open(zenoh::Config::default()).await?;
        let pub_state = session.declare_publisher(TOPIC_TELEMETRY).await?;
        let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;
        info!("Publishing to: {}, {}", TOPIC_TELEMETRY, TOPIC_HEALTH);
        Ok(Self {
            _session: session,
            pub_state,
            pub_health,
        })
    }

    async fn publish(&self, state: &RigState, health: RuntimeHealth) -> Result<(), BoxError> {
        let snapshot = serde_json::to_string(&RigTelemetry::snapshot(state))?;
        self.pub_state.put(snapshot).await?;
        let health_json = serde_json::to_string(&health)?;
        self.pub_health.put(health_json).await?;
        Ok(())
    }
}

pub async fn run(args: Args) -> Result<(), BoxError> {
    let state = RigState::shared();
    let (buses, receivers) = open_buses(&args, &state)?;
    let buses = Arc::new(buses);

    let knob = FixedKnob::new(args.knob);
    let controller = Controller::new(state.clone(), buses.clone(), Box::new(knob));
    let mut operator = Operator::new(state.clone(), buses, controller);

    let telemetry = if args.no_telemetry {
        None
    } else {
        Some(Telemetry::open().await?)
    };

    let (tx, mut rx) = mpsc::channel(16);
    let console_running = Arc::new(AtomicBool::new(true));
    let console = console::spawn(tx, console_running.clone());
    let mut console_open = true;

    info!("Keys: Esc=stop, m=start, z=zero, 0-3=mode, q=quit");
    if args.no_autostart {
        info!("Waiting for 'm' to enter motor mode");
    } else {
        operator.power_on().await;
    }

    let mut tick = interval(Duration::from_millis(1000 / TELEMETRY_HZ));
    let mut health = RuntimeHealth::FeedbackStale;

    loop {
        tokio::select! {
            event = rx.recv(), if console_open => match event {
                Some(ConsoleEvent::Command(cmd)) => operator.handle(cmd).await,
                Some(ConsoleEvent::Quit) => break,
                None => {
                    warn!("Console closed, Ctrl-C to quit");
                    console_open = false;
                }
            },
            _ = tick.tick() => {
                let current = RuntimeHealth::assess(&state, FEEDBACK_TIMEOUT);
                if current != health && state.enabled() {
                    match current {
                        RuntimeHealth::FeedbackStale => warn!(
                            "Feedback stale (no frames for {}ms)",
                            FEEDBACK_TIMEOUT.as_millis()
                        ),
                        RuntimeHealth::Ok => info!("Feedback restored"),
                    }
                }
                health = current;

                if let Some(telemetry) = &telemetry {
                    if let Err(e) = telemetry.publish(&state, health).await {
                        warn!("Failed to publish telemetry: {}", e);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("Shutting down");
    operator.shutdown().await;
    console_running.store(false, Ordering::Release);
    match console.await {
        Ok(Err(e)) => warn!("Console error: {}", e),
        Err(e) => warn!("Console task failed: {}", e),
        Ok(Ok(())) => {}
    }
    receivers.stop();
    Ok(())
}
