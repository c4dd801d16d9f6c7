//! Testing utilities and mock implementations
//!
//! This module provides mock implementations for driving the pipeline
//! controller without an agent service, a validator or a human reviewer.

pub mod mocks;

pub use mocks::*;
