//! Cucumber integration
//!
//! Step definitions register themselves with the cucumber inventory, so
//! this module is compiled into the binary rather than the library.

pub mod runner;
pub mod steps;
pub mod world;

pub use runner::{run, SuiteContext, SuiteOutcome};
