//! psync library - idempotent flight-controller parameter synchronization.
//!
//! This library exposes the core of the `psync` CLI for use in tests and
//! other tools that drive a vehicle's parameter set.
//!
//! # Modules
//!
//! - `params`: Typed parameters, the parameter file parser and exclusion filter
//! - `device`: The `ParameterStore` seam, simulated vehicles and retry decorator
//! - `sync`: Version gate, diff, convergence, readiness, revert and sessions
//! - `state`: Durable last-applied-version state
//! - `snapshot`: SQLite archive of pre-sync snapshots
//! - `config`: Layered configuration
//! - `output`: Output mode abstraction (robot/human)
//! - `error`: Error types with user-recoverable hints
#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod output;
pub mod params;
pub mod snapshot;
pub mod state;
pub mod sync;
pub mod theme;
