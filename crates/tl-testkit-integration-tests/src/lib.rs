//! tl-testkit integration tests
//!
//! Declarative CLI scenarios for the tl compiler and the runner behind the
//! `run-scenarios` binary.

pub mod scenario;

pub use scenario::{ExpectedExit, Scenario, ScenarioReport, ScenarioResult, ScenarioRunner};
