//! `signalrig` - Adaptive phase controller for a six-lane traffic-signal rig
//!
//! This library picks which group of lanes gets green next from live
//! vehicle counts, sizes the green interval to demand and drives the
//! signal heads through a safe all-red, green, yellow, red sequence.

pub mod cli;
pub mod config;
pub mod error;
pub mod feed;
pub mod observability;
pub mod persistence;
pub mod signal;
