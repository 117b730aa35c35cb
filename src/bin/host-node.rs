//! Host simulation of a sensor node and its two peers.
//!
//! Runs the duty-cycle controller against an in-process radio medium and
//! file-backed storage. A simulated gateway logs telemetry (and optionally
//! keeps offering a control message) and a simulated experiment controller
//! logs the experiment-start signal.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin host-node -- --cycles 3 --interval-ms 12000 --max-sleep-ms 2000
//! ```

use espnow_sensor_node::config::NodeConfig;
use espnow_sensor_node::link::{ControlMessage, Message, Payload, PeerAddress, PeerLink};
use espnow_sensor_node::persistence::{default_data_dir, FileStorage};
use espnow_sensor_node::platform::SystemClock;
use espnow_sensor_node::sensors::SurrogateEnvironment;
use espnow_sensor_node::sim::Air;
use espnow_sensor_node::{supervise, BootAccountant, DutyCycleController, Verdict};
use log::{error, info};
use rand_core::OsRng;
use std::path::PathBuf;
use std::process::exit;
use std::thread;
use std::time::Duration;

/// Address of the simulated node.
const NODE_ADDRESS: PeerAddress = PeerAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x0c]);

/// How often the gateway repeats its control message.
const CONTROL_REPEAT: Duration = Duration::from_secs(1);

struct Options {
    cycles: usize,
    data_dir: Option<PathBuf>,
    interval_ms: Option<i64>,
    disable_sensing: bool,
    max_sleep: Duration,
    reset_boot_count: bool,
}

fn usage(program: &str) -> ! {
    println!("Host sensor node simulation");
    println!();
    println!("Usage:");
    println!("  {} [OPTIONS]", program);
    println!();
    println!("Options:");
    println!("  --cycles N          Number of wake cycles to run (default 3)");
    println!("  --data-dir PATH     Storage directory (default ~/.espnow-sensor-node)");
    println!("  --interval-ms N     Gateway requests this sensing interval");
    println!("  --disable-sensing   Gateway requests sensing off");
    println!("  --max-sleep-ms N    Cap on simulated deep sleep (default 2000)");
    println!("  --reset             Clear the boot counter first (new experiment run)");
    println!("  --help              Show this help");
    exit(0);
}

fn parse_args() -> Result<Options, String> {
    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("host-node");
    let mut options = Options {
        cycles: 3,
        data_dir: None,
        interval_ms: None,
        disable_sensing: false,
        max_sleep: Duration::from_millis(2000),
        reset_boot_count: false,
    };

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        let mut value = |name: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("{} needs a value", name))
        };
        match arg.as_str() {
            "--cycles" => {
                options.cycles = value("--cycles")?
                    .parse()
                    .map_err(|e| format!("--cycles: {}", e))?;
            }
            "--data-dir" => options.data_dir = Some(PathBuf::from(value("--data-dir")?)),
            "--interval-ms" => {
                options.interval_ms = Some(
                    value("--interval-ms")?
                        .parse()
                        .map_err(|e| format!("--interval-ms: {}", e))?,
                );
            }
            "--disable-sensing" => options.disable_sensing = true,
            "--max-sleep-ms" => {
                let ms: u64 = value("--max-sleep-ms")?
                    .parse()
                    .map_err(|e| format!("--max-sleep-ms: {}", e))?;
                options.max_sleep = Duration::from_millis(ms);
            }
            "--reset" => options.reset_boot_count = true,
            "--help" | "-h" => usage(program),
            other => return Err(format!("unknown argument: {}", other)),
        }
    }
    Ok(options)
}

/// Logs telemetry and keeps offering `control` to the node.
fn spawn_gateway(air: &Air, addr: PeerAddress, control: Option<ControlMessage>) {
    let mut link = PeerLink::new(air.attach(addr));
    if let Err(e) = link.register(NODE_ADDRESS, Some("node")) {
        error!("Gateway could not register node: {}", e);
        return;
    }
    let control = control.map(Message::Control);

    thread::spawn(move || loop {
        if let Some((from, payload)) = link.receive(CONTROL_REPEAT) {
            match payload {
                Payload::Message(Message::SensorData(data)) => info!(
                    "[gateway] telemetry from {}: boot #{} T={:.1}C H={:.1}% t={}ms",
                    from, data.boot_count, data.temperature, data.humidity, data.timestamp
                ),
                other => info!("[gateway] ignoring {:?} from {}", other, from),
            }
        }
        if let Some(message) = &control {
            // Lost while the node sleeps, like on air
            link.send(message, Some(NODE_ADDRESS));
        }
    });
}

/// Waits for the node's start signal, once per experiment run.
fn spawn_experiment_controller(air: &Air, addr: PeerAddress) {
    let mut link = PeerLink::new(air.attach(addr));
    thread::spawn(move || {
        while link.await_from(NODE_ADDRESS).is_ok() {
            info!("[experiment] run started by {}", NODE_ADDRESS);
        }
    });
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let options = match parse_args() {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {}", e);
            exit(2);
        }
    };

    let config = NodeConfig::default();
    let data_dir = match options.data_dir.clone().map(Ok).unwrap_or_else(default_data_dir) {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Error: {}", e);
            exit(1);
        }
    };
    let storage = match FileStorage::open(&data_dir) {
        Ok(storage) => storage,
        Err(e) => {
            eprintln!("Error: cannot open {:?}: {}", data_dir, e);
            exit(1);
        }
    };

    if options.reset_boot_count {
        BootAccountant::new(storage.clone()).reset();
    }

    let control = if options.interval_ms.is_some() || options.disable_sensing {
        Some(ControlMessage {
            sensing_interval_ms: options.interval_ms,
            sensing_enabled: options.disable_sensing.then_some(false),
        })
    } else {
        None
    };

    let air = Air::new();
    spawn_gateway(&air, config.telemetry_peer, control);
    spawn_experiment_controller(&air, config.experiment_peer);

    info!(
        "=== Host sensor node: {} cycle(s), state in {} ===",
        options.cycles,
        storage.dir().display()
    );

    for cycle in 1..=options.cycles {
        let radio = air.attach(NODE_ADDRESS);
        info!("Cycle {}: node {} waking", cycle, radio.address());
        let clock = SystemClock::new();
        let verdict = supervise(|| {
            DutyCycleController::new(
                config.clone(),
                radio,
                storage.clone(),
                clock,
                Box::new(SurrogateEnvironment::new(OsRng)),
            )
            .run_cycle()
        });

        let pause = match verdict {
            Verdict::Sleep(duration) => {
                info!(
                    "Cycle {}: deep sleep for {}ms (simulated {}ms)",
                    cycle,
                    duration.as_millis(),
                    duration.min(options.max_sleep).as_millis()
                );
                duration.min(options.max_sleep)
            }
            Verdict::Reset => {
                error!("Cycle {}: resetting in {}s", cycle, config.fault_reset_delay.as_secs());
                config.fault_reset_delay
            }
        };
        thread::sleep(pause);
    }

    info!("=== Simulation finished ===");
}
