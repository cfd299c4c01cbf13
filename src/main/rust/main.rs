use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use matter_dynamic_bridge::domain::value_objects::LogLevel;
use matter_dynamic_bridge::{
    serve_admin, BridgeController, BridgeDirectory, ChannelSink, Config, DeviceController,
    DeviceRegistrationFactory, Fleet, HostEvent, InMemoryEngine, Message, MetricsReporter,
    PrometheusReporter,
};

/// One line of host input on stdin
#[derive(Deserialize)]
struct InputLine {
    device: String,
    #[serde(flatten)]
    message: Message,
}

fn verbosity(level: LogLevel) -> u8 {
    match level {
        LogLevel::Fatal => 0,
        LogLevel::Error => 1,
        LogLevel::Warn => 2,
        LogLevel::Info => 3,
        LogLevel::Debug => 4,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration
    let config = Config::parse();
    config.validate()?;
    let fleet = Fleet::load(&config.fleet).map_err(|e| anyhow::anyhow!("{}", e))?;

    // Initialize logging; the most verbose bridge log level applies to the engine
    let base = if config.verbose { "debug" } else { "info" };
    let engine_level = fleet
        .bridges
        .iter()
        .map(|b| b.log_level)
        .max_by_key(|level| verbosity(*level))
        .unwrap_or_default();
    let filter = format!(
        "{},matter_dynamic_bridge::infrastructure::engine={}",
        base,
        engine_level.as_directive()
    );

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    // Initialize metrics
    PrometheusReporter::init_metrics()?;

    info!("Starting dynamic bridge host");
    info!("  Fleet file: {}", config.fleet.display());
    info!("  Bridges: {}", fleet.bridges.len());
    info!("  Devices: {}", fleet.devices.len());
    info!("  Admin port: {}", config.admin_port);

    let settle = config
        .to_settle_policy()
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    // Create infrastructure implementations (dependency injection)
    let metrics: Arc<dyn MetricsReporter> = Arc::new(PrometheusReporter::new());
    let engine = Arc::new(InMemoryEngine::new());
    let factory = Arc::new(DeviceRegistrationFactory::new(engine.clone()));
    let directory = BridgeDirectory::new();
    let disabled = fleet.disabled_nodes();

    for node in &fleet.bridges {
        let bridge_config = node
            .to_bridge_config()
            .map_err(|e| anyhow::anyhow!("bridge {}: {}", node.id, e))?;
        let bridge = BridgeController::new(bridge_config, engine.clone(), settle, metrics.clone());
        for device in fleet.devices_for(&node.id) {
            bridge.expect_device(device.id.clone());
        }
        bridge.prune_disabled(&disabled);
        directory.insert(bridge);
    }

    // Device outputs and statuses become JSON lines on stdout
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<HostEvent>();
    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => error!("Failed to encode host event: {}", e),
            }
        }
    });

    let mut devices: HashMap<String, Arc<DeviceController>> = HashMap::new();
    for node in fleet.enabled_devices() {
        let bridge = node.bridge.as_deref().and_then(|id| directory.get(id));
        let sink = Arc::new(ChannelSink::new(node.id.clone(), events_tx.clone()));
        let controller = DeviceController::spawn(
            node.clone(),
            bridge,
            factory.clone(),
            sink,
            metrics.clone(),
            settle,
        );
        devices.insert(node.id.clone(), controller);
    }
    let devices = Arc::new(devices);

    for bridge in directory.all() {
        if let Err(e) = bridge.create().await {
            error!(bridge = %bridge.id(), "Failed to create bridge: {}", e);
        }
    }

    // Start admin server
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let (_, admin_server) = serve_admin(config.admin_port, directory.clone(), async {
        shutdown_rx.await.ok();
    });
    let admin_server = tokio::spawn(admin_server);

    // Feed stdin lines to devices
    let input_devices = devices.clone();
    let input_task = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read input: {}", e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let input: InputLine = match serde_json::from_str(&line) {
                Ok(input) => input,
                Err(e) => {
                    warn!("Ignoring malformed input line: {}", e);
                    continue;
                }
            };
            let Some(device) = input_devices.get(&input.device).cloned() else {
                warn!(device = %input.device, "Input for unknown device");
                continue;
            };
            tokio::spawn(async move {
                if let Err(e) = device.handle_input(input.message).await {
                    warn!(device = %input.device, "Input failed: {}", e);
                }
            });
        }
    });

    // Wait for Ctrl+C
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");
    input_task.abort();

    for device in devices.values() {
        if let Err(e) = device.close(false).await {
            warn!(device = %device.node_id(), "Failed to close device: {}", e);
        }
    }
    for bridge in directory.all() {
        if let Err(e) = bridge.close(false).await {
            warn!(bridge = %bridge.id(), "Failed to close bridge: {}", e);
        }
    }

    // Signal shutdown to admin server
    let _ = shutdown_tx.send(());
    admin_server.await?;

    drop(events_tx);
    printer.abort();

    info!("Bridge host shutdown complete");
    Ok(())
}
