//! Failure risk scoring engine for industrial machine telemetry.
//!
//! Estimates failure risk from per-machine metric snapshots (vibration,
//! oil level, temperature, pressure, rpm) using either a rule-based
//! heuristic or a trained decision-tree ensemble, behind a single response
//! shape. See the `ml` module for the scoring core and `api` for the HTTP
//! boundary.

pub mod api;
pub mod config;
pub mod error;
pub mod ml;
pub mod models;
