//! `groundtruth` – ground-truth perception sensor runner.
//!
//! 1. Loads `~/.groundtruth/config.toml`, writing the defaults there on first run.
//! 2. Attaches the sensor to a rosbridge server when `bridge.url` is set, or
//!    to an in-process loopback bus that logs every batch otherwise.
//! 3. Drives the sensor from the scripted traffic scenario at the physics
//!    rate until the scenario duration elapses or Ctrl-C is pressed.

mod config;
mod scenario;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use colored::Colorize;
use groundtruth_middleware::{BusTransport, RosbridgeTransport, Transport};
use groundtruth_runtime::{GroundTruthSensor, SensorStats, TickOutcome, init_tracing};
use groundtruth_types::{SensorError, TransportStatus};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::scenario::TrafficScenario;

fn main() {
    let _telemetry = init_tracing("groundtruth");

    print_banner();

    // ── Shutdown flag ─────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping sensor …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load_or_init() {
        Ok((cfg, created)) => {
            let path = config::config_path().display().to_string();
            if created {
                println!("  {} Default config written to {}", "✓".green().bold(), path.bold());
            } else {
                println!("  Config loaded from {}", path.bold());
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            std::process::exit(2);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            println!("{}: {}", "Failed to start async runtime".red(), e);
            std::process::exit(1);
        }
    };

    match runtime.block_on(run(cfg, shutdown)) {
        Ok(stats) => print_summary(&stats),
        Err(e) => {
            println!("{}: {}", "Sensor error".red(), e);
            std::process::exit(1);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Main loop
// ─────────────────────────────────────────────────────────────────────────────

async fn run(cfg: Config, shutdown: Arc<AtomicBool>) -> Result<SensorStats, SensorError> {
    let physics_hz = cfg.scenario.physics_hz;
    if !physics_hz.is_finite() || physics_hz <= 0.0 {
        return Err(SensorError::InvalidConfig(format!(
            "scenario.physics_hz must be > 0, got {physics_hz}"
        )));
    }

    let sensor = GroundTruthSensor::new(cfg.sensor.clone(), 0.0)?;
    let mut world = TrafficScenario::new(&cfg.scenario);

    // The sensor only holds a weak reference; `transport` keeps it alive.
    let (transport, mut status_rx, loopback): (
        Arc<dyn Transport>,
        broadcast::Receiver<TransportStatus>,
        Option<BusTransport>,
    ) = match &cfg.bridge.url {
        Some(url) => {
            let delay = Duration::from_millis(cfg.bridge.reconnect_delay_ms);
            let (bridge, link) = RosbridgeTransport::new(url.clone(), delay);
            let status_rx = bridge.status_events();
            tokio::spawn(link.run());
            println!("  Publishing to rosbridge at {}", url.bold());
            (Arc::new(bridge), status_rx, None)
        }
        None => {
            let bus = BusTransport::connected();
            let status_rx = bus.status_events();
            println!("  Publishing on the {} bus", "loopback".bold());
            (Arc::new(bus.clone()), status_rx, Some(bus))
        }
    };

    sensor.on_transport_available(&transport);
    if let Some(bus) = &loopback {
        spawn_loopback_listener(bus, &cfg.sensor.topic);
    }

    println!(
        "  Target {} · topic {} · {} Hz · {} vehicles\n",
        cfg.sensor.target_mode.to_string().cyan(),
        cfg.sensor.topic.cyan(),
        cfg.sensor.frequency_hz,
        world.vehicles().len()
    );

    let dt = 1.0 / physics_hz;
    let mut interval = tokio::time::interval(Duration::from_secs_f64(dt));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while !shutdown.load(Ordering::SeqCst) {
        interval.tick().await;

        drain_status_events(&mut status_rx, &sensor);

        let events = world.step(dt);
        sensor.set_pose(world.sensor_pose());
        for event in &events {
            sensor.on_object_entered(event);
        }

        if let TickOutcome::Published { detections } = sensor.update(world.time()) {
            debug!(detections, sim_time = world.time(), "cycle flushed");
        }

        if let Some(limit) = cfg.scenario.duration_secs
            && world.time() >= limit
        {
            info!(sim_time = world.time(), "scenario finished");
            break;
        }
    }

    drop(transport);
    Ok(sensor.stats())
}

fn drain_status_events(rx: &mut broadcast::Receiver<TransportStatus>, sensor: &GroundTruthSensor) {
    loop {
        match rx.try_recv() {
            Ok(TransportStatus::Connected) => {
                info!("transport connected");
                sensor.on_transport_connected();
            }
            Ok(TransportStatus::Disconnected) => warn!("transport disconnected"),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                debug!(skipped = n, "status events lagged");
            }
            Err(_) => break,
        }
    }
}

fn spawn_loopback_listener(bus: &BusTransport, topic: &str) {
    let mut rx = match bus.subscribe(topic) {
        Ok(rx) => rx,
        Err(e) => {
            info!(error = %e, "nothing to listen to on the loopback bus");
            return;
        }
    };
    tokio::spawn(async move {
        while let Some(batch) = rx.recv().await {
            let ids: Vec<u32> = batch.detections.iter().map(|d| d.id).collect();
            info!(topic = rx.topic(), detections = batch.len(), ?ids, "ground truth batch");
        }
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", "   ┌─┐┬─┐┌─┐┬ ┬┌┐┌┌┬┐  ┌┬┐┬─┐┬ ┬┌┬┐┬ ┬".bold().cyan());
    println!("{}", "   │ ┬├┬┘│ ││ ││││ ││   │ ├┬┘│ │ │ ├─┤".bold().cyan());
    println!("{}", "   └─┘┴└─└─┘└─┘┘└┘─┴┘   ┴ ┴└─└─┘ ┴ ┴ ┴".bold().cyan());
    println!();
    println!(
        "  {} {}  started {}",
        "groundtruth".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed(),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
    );
    println!("  Simulated ground-truth 3-D object sensor");
    println!();
}

fn print_summary(stats: &SensorStats) {
    println!();
    println!("{}", "  Sensor summary".bold());
    println!("    batches published    {}", stats.batches_published.to_string().green());
    println!("    detections published {}", stats.detections_published.to_string().green());
    println!("    ticks skipped        {}", stats.ticks_skipped.to_string().yellow());
    println!("    publish failures     {}", stats.publish_failures.to_string().red());
    println!("    events ignored       {}", stats.events_ignored.to_string().dimmed());
    println!();
}
