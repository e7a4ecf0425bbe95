//! Signal control core
//!
//! Lanes and phases, demand scoring, phase selection, cycle execution and
//! the supervising controller. Everything here is independent of the CLI.

pub mod catalog;
pub mod controller;
pub mod executor;
pub mod hardware;
pub mod lane;
pub mod priority;
pub mod selector;
pub mod state;

pub use catalog::{Group, Phase, PhaseCatalog, PhaseId};
pub use controller::{ControllerBuilder, TrafficController};
pub use executor::{CycleOutcome, CyclePlan, CycleReport, CycleState, SignalTiming};
pub use hardware::{SignalHead, SimulatedSignalHead, TcpSignalLink};
pub use lane::{Lane, LaneColor, LaneCounts};
pub use priority::{GreenTimePolicy, TrafficLevel};
pub use selector::{Decision, PhaseSelector};
pub use state::{ControllerStatus, SharedTrafficState, VehicleCountSnapshot};
