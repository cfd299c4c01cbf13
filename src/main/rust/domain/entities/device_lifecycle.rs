use std::time::Instant;

use crate::domain::value_objects::DeviceState;

/// State transition record
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub from: DeviceState,
    pub to: DeviceState,
    pub timestamp: Instant,
    pub reason: Option<String>,
}

/// Domain entity tracking one device's lifecycle
#[derive(Debug)]
pub struct DeviceLifecycle {
    current_state: DeviceState,
    state_history: Vec<StateTransition>,
    ready_at: Option<Instant>,
}

impl DeviceLifecycle {
    pub fn new() -> Self {
        Self {
            current_state: DeviceState::Unconfigured,
            state_history: Vec::new(),
            ready_at: None,
        }
    }

    pub fn current_state(&self) -> DeviceState {
        self.current_state
    }

    pub fn uptime(&self) -> Option<std::time::Duration> {
        self.ready_at.map(|start| start.elapsed())
    }

    pub fn transition_count(&self) -> usize {
        self.state_history.len()
    }

    pub fn last_transition(&self) -> Option<&StateTransition> {
        self.state_history.last()
    }

    pub fn history(&self) -> &[StateTransition] {
        &self.state_history
    }

    /// When the device first entered the given state
    pub fn entered_at(&self, state: DeviceState) -> Option<Instant> {
        self.state_history
            .iter()
            .find(|t| t.to == state)
            .map(|t| t.timestamp)
    }

    pub fn transition_to_awaiting_bridge(&mut self) -> bool {
        self.advance(DeviceState::AwaitingBridge, &[DeviceState::Unconfigured])
    }

    pub fn transition_to_awaiting_server_ready(&mut self) -> bool {
        self.advance(DeviceState::AwaitingServerReady, &[DeviceState::AwaitingBridge])
    }

    /// Only the first readiness broadcast moves the device forward
    pub fn transition_to_subscribing(&mut self) -> bool {
        self.advance(DeviceState::SubscribingEvents, &[DeviceState::AwaitingServerReady])
    }

    pub fn transition_to_ready(&mut self) -> bool {
        let moved = self.advance(DeviceState::Ready, &[DeviceState::SubscribingEvents]);
        if moved && self.ready_at.is_none() {
            self.ready_at = Some(Instant::now());
        }
        moved
    }

    pub fn transition_to_config_error(&mut self, reason: impl Into<String>) -> bool {
        self.fail(DeviceState::ConfigError, reason.into())
    }

    pub fn transition_to_validation_failed(&mut self, reason: impl Into<String>) -> bool {
        self.fail(DeviceState::ValidationFailed, reason.into())
    }

    fn fail(&mut self, state: DeviceState, reason: String) -> bool {
        if self.current_state.is_terminal() {
            tracing::debug!(
                from = %self.current_state,
                to = %state,
                "Ignoring transition out of terminal state"
            );
            return false;
        }
        self.record_transition(state, Some(reason));
        true
    }

    fn advance(&mut self, to: DeviceState, allowed_from: &[DeviceState]) -> bool {
        if !allowed_from.contains(&self.current_state) {
            tracing::debug!(from = %self.current_state, to = %to, "Transition refused");
            return false;
        }
        self.record_transition(to, None);
        true
    }

    fn record_transition(&mut self, new_state: DeviceState, reason: Option<String>) {
        let transition = StateTransition {
            from: self.current_state,
            to: new_state,
            timestamp: Instant::now(),
            reason,
        };

        self.state_history.push(transition);
        self.current_state = new_state;
    }
}

impl Default for DeviceLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
