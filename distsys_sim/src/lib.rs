//! distsys Simulation Harness
//!
//! Drives the runtime in `distsys_core` through named scenarios and checks
//! their outcome.
//!
//! # Scenarios
//!
//! - **snapshot**: three-node Chandy-Lamport run whose message race is made
//!   deterministic by the relay's delay; repeated runs must agree
//! - **greeting**: nodes exchange greetings and poll until stopped
//! - **ring**: snapshot over a bidirectional ring with message conservation
//!
//! # Usage
//!
//! ```ignore
//! use distsys_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let runner = ScenarioRunner::new(100);
//! let result = runner.run(ScenarioId::Snapshot).await;
//! assert!(result.passed);
//! ```

pub mod console;
mod runner;
pub mod scenarios;

pub use runner::{
    ring_scenario, snapshot_scenario, RunError, ScenarioMetrics, ScenarioResult, ScenarioRunner,
};
