//! Network fault detection (PingMesh) control
//!
//! Turns per-superpod detection configuration into start/stop/reload commands
//! for the external detection controller.

pub mod config;
pub mod controller;
pub mod lifecycle;
pub mod manager;

pub use config::{PingMeshConfig, PingMeshItem};
pub use controller::{CommandController, DetectionController, LogOnlyController};
pub use lifecycle::{ControllerCommand, ControllerLifecycle, ControllerState};
pub use manager::PingMeshManager;
