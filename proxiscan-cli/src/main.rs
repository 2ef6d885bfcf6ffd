mod simulated;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};
use humantime::format_duration;
use serde::Serialize;
use tracing::info;

use proxiscan_discovery::local::LocalRadio;
use proxiscan_discovery::{DiscoveryService, RadioAdapter};
use proxiscan_domain::config::DiscoveryConfig;
use proxiscan_domain::device::DiscoveredDevice;
use proxiscan_sinks::notify::DeviceFoundSink;
use proxiscan_sinks::notify::sqllite::SqliteDeviceFoundSink;
use proxiscan_sinks::notify::trace::TracingDeviceFoundSink;
use proxiscan_sinks::settings::SettingsStore;
use proxiscan_sinks::settings::memory::MemorySettingsStore;
use proxiscan_sinks::settings::sqllite::SqliteSettingsStore;

#[derive(ValueEnum, Clone, Copy, Debug)]
enum RadioMode {
    /// first Bluetooth adapter of this machine
    Local,
    /// scripted in-memory camera, no hardware needed
    Simulated,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// path to TOML configuration; defaults apply when absent
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// radio to scan with
    #[arg(short, long, value_enum, default_value = "local")]
    mode: RadioMode,

    /// path to SQLite db file holding settings and device found history
    #[arg(short, long)]
    db: Option<String>,

    /// switch discovery on (persisted)
    #[arg(long, conflicts_with = "disable")]
    enable: bool,

    /// switch discovery off (persisted)
    #[arg(long)]
    disable: bool,

    /// how often to print the nearest device
    #[arg(short, long, default_value = "5s")]
    interval: humantime::Duration,

    /// print reports as JSON lines
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Report {
    date_time: DateTime<Utc>,
    radio_state: String,
    enabled: bool,
    scanning: bool,
    session_active: bool,
    device_found: bool,
    nearest: Option<DiscoveredDevice>,
    devices: Vec<DiscoveredDevice>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => DiscoveryConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => DiscoveryConfig::default(),
    };

    let radio = radio(args.mode, &config).await;
    let (settings, sink) = stores(args.db.as_deref()).await?;
    let service = DiscoveryService::new(config, Arc::clone(&radio), settings, sink)
        .await
        .context("restoring discovery state")?;

    if args.enable || args.disable {
        service
            .set_enabled(args.enable)
            .await
            .context("persisting discovery flag")?;
    }
    if !service.is_enabled().await {
        info!("Discovery is disabled; pass --enable to start scanning");
    }

    let events = radio.events().await.context("subscribing to radio events")?;
    let mut runner = tokio::spawn({
        let service = service.clone();
        async move { service.run(events).await }
    });

    let start = Utc::now();
    let mut tick = tokio::time::interval(*args.interval);
    loop {
        tokio::select! {
            _ = tick.tick() => {
                let report = report(&service).await;
                if args.json {
                    println!("{}", serde_json::to_string(&report)?);
                } else {
                    print_report(&report, start);
                }
            }
            _ = &mut runner => break,
            signal = tokio::signal::ctrl_c() => {
                signal.context("waiting for Ctrl-C")?;
                break;
            }
        }
    }

    service.shutdown().await;
    Ok(())
}

async fn radio(mode: RadioMode, config: &DiscoveryConfig) -> Arc<dyn RadioAdapter> {
    match mode {
        RadioMode::Local => Arc::new(LocalRadio::new().await),
        RadioMode::Simulated => {
            let radio = simulated::radio(config);
            tokio::spawn(simulated::play(
                Arc::clone(&radio),
                config.target_name.clone(),
            ));
            radio
        }
    }
}

async fn stores(db: Option<&str>) -> Result<(Arc<dyn SettingsStore>, Box<dyn DeviceFoundSink>)> {
    let Some(name) = db else {
        let settings: Arc<dyn SettingsStore> = Arc::new(MemorySettingsStore::default());
        let sink: Box<dyn DeviceFoundSink> = Box::<TracingDeviceFoundSink>::default();
        return Ok((settings, sink));
    };
    let path = Path::new(name);
    let settings: Arc<dyn SettingsStore> = Arc::new(
        SqliteSettingsStore::create_from_file(path)
            .await
            .with_context(|| format!("opening settings in {name}"))?,
    );
    let sink = SqliteDeviceFoundSink::create_from_file(path)
        .await
        .with_context(|| format!("opening history in {name}"))?;
    Ok((settings, sink))
}

async fn report(service: &DiscoveryService) -> Report {
    Report {
        date_time: Utc::now(),
        radio_state: service.radio_state().await.to_string(),
        enabled: service.is_enabled().await,
        scanning: service.is_scanning().await,
        session_active: service.session_active().await,
        device_found: service.is_device_found().await,
        nearest: service.nearest_device().await,
        devices: service.snapshot().await,
    }
}

fn print_report(report: &Report, start: DateTime<Utc>) {
    let runtime = format_duration(whole_seconds(report.date_time - start));
    println!(
        "\n=== {} (Runtime: {}) radio {}, {}{} ===",
        report.date_time.format("%H:%M:%S"),
        runtime,
        report.radio_state,
        if report.scanning { "scanning" } else { "idle" },
        if report.session_active { ", resolving" } else { "" }
    );
    if !report.enabled {
        println!("Discovery disabled");
        return;
    }

    if !report.devices.is_empty() {
        println!(
            "{:<36} {:<16} {:>4} {:>8} {:>6}",
            "Identity", "Name", "RSSI", "Distance", "Age"
        );
        println!("{}", "-".repeat(74));
        for device in &report.devices {
            println!(
                "{:<36} {:<16} {:>4} {:>8} {:>6}",
                device.identity,
                device.advertised_name,
                device.rssi,
                distance_summary(device.distance()),
                format_duration(whole_seconds(report.date_time - device.last_seen_at))
            );
        }
    }

    match &report.nearest {
        Some(nearest) if report.device_found => println!(
            "\nNearest: {} at {}",
            nearest.advertised_name,
            distance_summary(nearest.distance())
        ),
        Some(nearest) => println!(
            "\nNearest: {} at {} (too far)",
            nearest.advertised_name,
            distance_summary(nearest.distance())
        ),
        None => println!("\nSearching..."),
    }
}

fn distance_summary(distance: Option<f64>) -> String {
    match distance {
        Some(d) => format!("{d:.2}m"),
        None => "?".to_string(),
    }
}

fn whole_seconds(duration: chrono::TimeDelta) -> std::time::Duration {
    std::time::Duration::from_secs(u64::try_from(duration.num_seconds()).unwrap_or(0))
}
