use lazy_static::lazy_static;
use prometheus::{
    Encoder, Gauge, GaugeVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

use crate::domain::ports::MetricsReporter;
use crate::domain::value_objects::{BridgeState, DeviceState};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Bridge state per bridge id (0=Uninitialized, 1=Creating, 2=Ready, 3=Online)
    pub static ref BRIDGE_STATE: GaugeVec = GaugeVec::new(
        Opts::new("matter_bridge_state", "Current bridge state"),
        &["bridge"]
    ).expect("metric can be created");

    // Devices currently in each lifecycle state
    pub static ref DEVICES_BY_STATE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("matter_devices", "Number of devices per lifecycle state"),
        &["state"]
    ).expect("metric can be created");

    // Engine faults, split by whether a device could be identified
    pub static ref ENGINE_FAULTS: IntCounterVec = IntCounterVec::new(
        Opts::new("matter_engine_faults_total", "Asynchronous engine faults received"),
        &["outcome"]
    ).expect("metric can be created");

    pub static ref COMMANDS_RELAYED: IntCounterVec = IntCounterVec::new(
        Opts::new("matter_commands_relayed_total", "Device commands relayed to the host"),
        &["cluster", "command"]
    ).expect("metric can be created");

    pub static ref ATTRIBUTE_EVENTS: IntCounter = IntCounter::new(
        "matter_attribute_events_total",
        "Attribute change notifications emitted"
    ).expect("metric can be created");

    pub static ref UPDATE_FAILURES: IntCounter = IntCounter::new(
        "matter_update_failures_total",
        "State updates rejected by the engine"
    ).expect("metric can be created");

    // Seconds since the last bridge went online
    pub static ref LAST_ONLINE_TIMESTAMP: Gauge = Gauge::new(
        "matter_bridge_last_online_timestamp_seconds",
        "Unix time at which a bridge last went online"
    ).expect("metric can be created");
}

pub struct PrometheusReporter;

impl PrometheusReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn init_metrics() -> Result<(), prometheus::Error> {
        REGISTRY.register(Box::new(BRIDGE_STATE.clone()))?;
        REGISTRY.register(Box::new(DEVICES_BY_STATE.clone()))?;
        REGISTRY.register(Box::new(ENGINE_FAULTS.clone()))?;
        REGISTRY.register(Box::new(COMMANDS_RELAYED.clone()))?;
        REGISTRY.register(Box::new(ATTRIBUTE_EVENTS.clone()))?;
        REGISTRY.register(Box::new(UPDATE_FAILURES.clone()))?;
        REGISTRY.register(Box::new(LAST_ONLINE_TIMESTAMP.clone()))?;
        Ok(())
    }

    pub fn gather_metrics() -> Vec<u8> {
        let encoder = TextEncoder::new();
        let metric_families = REGISTRY.gather();
        let mut buffer = vec![];
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
            return b"# Error encoding metrics\n".to_vec();
        }
        buffer
    }
}

impl Default for PrometheusReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsReporter for PrometheusReporter {
    fn report_bridge_state(&self, bridge_id: &str, state: BridgeState) {
        BRIDGE_STATE
            .with_label_values(&[bridge_id])
            .set(state.as_metric());
        if state.is_online() {
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or_default();
            LAST_ONLINE_TIMESTAMP.set(now);
        }
    }

    fn report_device_transition(&self, from: Option<DeviceState>, to: DeviceState) {
        if let Some(from) = from {
            DEVICES_BY_STATE.with_label_values(&[from.as_label()]).dec();
        }
        DEVICES_BY_STATE.with_label_values(&[to.as_label()]).inc();
    }

    fn report_engine_fault(&self, matched: bool) {
        let outcome = if matched { "matched" } else { "ignored" };
        ENGINE_FAULTS.with_label_values(&[outcome]).inc();
    }

    fn report_command(&self, cluster: &str, command: &str) {
        COMMANDS_RELAYED.with_label_values(&[cluster, command]).inc();
    }

    fn report_attribute_event(&self) {
        ATTRIBUTE_EVENTS.inc();
    }

    fn report_update_failure(&self) {
        UPDATE_FAILURES.inc();
    }
}
