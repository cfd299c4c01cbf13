use std::sync::Weak;

use lazy_static::lazy_static;
use parking_lot::Mutex;
use regex::Regex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::application::services::BridgeController;
use crate::domain::ports::EngineFaultReport;

const FAULT_MARKER: &str = "Behaviors have errors";
const DEFAULT_REASON: &str = "Missing mandatory attributes";

lazy_static! {
    static ref DEVICE_PATTERN: Regex =
        Regex::new(r"Error initializing ([A-Za-z0-9_]+)\.aggregator\.([A-Za-z0-9_]+)")
            .expect("valid device pattern");
    static ref REASON_PATTERN: Regex =
        Regex::new(r"Validating [^:]+: (.+)").expect("valid reason pattern");
}

/// A deferred validation failure attributed to one bridged device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFault {
    pub hub_id: String,
    pub protocol_id: String,
    pub reason: String,
}

/// Extract the failing device from an engine fault message
pub fn parse_fault(message: &str) -> Option<DeviceFault> {
    if !message.contains(FAULT_MARKER) {
        return None;
    }
    let captures = DEVICE_PATTERN.captures(message)?;
    let reason = REASON_PATTERN
        .captures(message)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| DEFAULT_REASON.to_string());
    Some(DeviceFault {
        hub_id: captures[1].to_string(),
        protocol_id: captures[2].to_string(),
        reason,
    })
}

/// Per-bridge listener on the engine's fault channel
pub struct FaultInterceptor {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl FaultInterceptor {
    /// Start forwarding faults to the bridge; needs a running tokio runtime
    pub fn install(
        mut faults: broadcast::Receiver<EngineFaultReport>,
        bridge: Weak<BridgeController>,
    ) -> Self {
        let task = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => Some(runtime.spawn(async move {
                loop {
                    match faults.recv().await {
                        Ok(report) => {
                            let Some(bridge) = bridge.upgrade() else {
                                break;
                            };
                            bridge.handle_engine_fault(&report).await;
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Fault interceptor lagged behind engine faults");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
                debug!("Fault interceptor stopped");
            })),
            Err(_) => {
                warn!("No async runtime, engine faults will not be intercepted");
                None
            }
        };
        Self {
            task: Mutex::new(task),
        }
    }

    pub fn is_installed(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub fn uninstall(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl Drop for FaultInterceptor {
    fn drop(&mut self) {
        self.uninstall();
    }
}
