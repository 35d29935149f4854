//! Detection controller lifecycle
//!
//! # States
//!
//! ```text
//!                    ┌─────────────┐
//!     new() ───────> │    Idle     │ <─── start failed
//!                    └──────┬──────┘
//!                           │ Start
//!                    ┌──────▼──────┐
//!                    │  Starting   │
//!                    └──────┬──────┘
//!                           │ started
//!                    ┌──────▼──────┐ ─── Reload (config changed)
//!                    │   Running   │ <──┘
//!                    └──────┬──────┘
//!                           │ Stop
//!                    ┌──────▼──────┐
//!                    │   Stopped   │ ── Reload ──> Running
//!                    └─────────────┘
//! ```
//!
//! A controller is started at most once. After a stop it is brought back with a
//! reload, never a second start.
//!
//! # Example
//!
//! ```
//! use podwatch::pingmesh::lifecycle::{decide, ControllerCommand, ControllerState};
//!
//! assert_eq!(decide(ControllerState::Idle, true, true), Some(ControllerCommand::Start));
//! assert_eq!(decide(ControllerState::Running, true, false), None);
//! assert_eq!(decide(ControllerState::Running, false, true), Some(ControllerCommand::Stop));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Instant, SystemTime};

/// Maximum lifecycle events retained
const HISTORY_LIMIT: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    /// Never started
    Idle,
    /// Start issued, not yet confirmed
    Starting,
    /// Detection active
    Running,
    /// Stopped after having run
    Stopped,
}

impl ControllerState {
    pub fn as_str(&self) -> &str {
        match self {
            ControllerState::Idle => "idle",
            ControllerState::Starting => "starting",
            ControllerState::Running => "running",
            ControllerState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command sent to the detection controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerCommand {
    Start,
    Reload,
    Stop,
}

impl fmt::Display for ControllerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerCommand::Start => write!(f, "start"),
            ControllerCommand::Reload => write!(f, "reload"),
            ControllerCommand::Stop => write!(f, "stop"),
        }
    }
}

/// Transition function: which command, if any, the current state calls for
pub fn decide(state: ControllerState, want_running: bool, changed: bool) -> Option<ControllerCommand> {
    match (state, want_running, changed) {
        (ControllerState::Idle, true, _) => Some(ControllerCommand::Start),
        (ControllerState::Running, true, true) => Some(ControllerCommand::Reload),
        (ControllerState::Running, false, _) => Some(ControllerCommand::Stop),
        (ControllerState::Stopped, true, _) => Some(ControllerCommand::Reload),
        _ => None,
    }
}

/// Recorded state change
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    pub from: ControllerState,
    pub to: ControllerState,
    pub timestamp: SystemTime,
}

#[derive(Debug)]
pub struct ControllerLifecycle {
    state: ControllerState,
    state_entered_at: Instant,
    events: Vec<LifecycleEvent>,
}

impl ControllerLifecycle {
    pub fn new() -> Self {
        Self {
            state: ControllerState::Idle,
            state_entered_at: Instant::now(),
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Detection is running
    pub fn is_active(&self) -> bool {
        self.state == ControllerState::Running
    }

    pub fn time_in_state(&self) -> std::time::Duration {
        self.state_entered_at.elapsed()
    }

    /// Command for the desired state, see [`decide`]
    pub fn decide(&self, want_running: bool, changed: bool) -> Option<ControllerCommand> {
        decide(self.state, want_running, changed)
    }

    /// Transition: Idle → Starting
    pub fn on_starting(&mut self) -> Option<LifecycleEvent> {
        if self.state != ControllerState::Idle {
            return None;
        }
        self.transition(ControllerState::Starting)
    }

    /// Transition: Starting/Stopped/Running → Running
    ///
    /// Running → Running records a reload.
    pub fn on_running(&mut self) -> Option<LifecycleEvent> {
        if self.state == ControllerState::Idle {
            return None;
        }
        self.transition(ControllerState::Running)
    }

    /// Transition: Starting → Idle after a failed start
    pub fn on_start_failed(&mut self) -> Option<LifecycleEvent> {
        if self.state != ControllerState::Starting {
            return None;
        }
        self.transition(ControllerState::Idle)
    }

    /// Transition: Running → Stopped
    pub fn on_stopped(&mut self) -> Option<LifecycleEvent> {
        if self.state != ControllerState::Running {
            return None;
        }
        self.transition(ControllerState::Stopped)
    }

    pub fn events(&self) -> &[LifecycleEvent] {
        &self.events
    }

    fn transition(&mut self, new_state: ControllerState) -> Option<LifecycleEvent> {
        let event = LifecycleEvent {
            from: self.state,
            to: new_state,
            timestamp: SystemTime::now(),
        };

        self.state = new_state;
        self.state_entered_at = Instant::now();
        if self.events.len() == HISTORY_LIMIT {
            self.events.remove(0);
        }
        self.events.push(event.clone());

        Some(event)
    }
}

impl Default for ControllerLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
