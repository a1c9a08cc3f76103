// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared test doubles and fixtures for AIKA field crates.
#![forbid(unsafe_code)]
//!
//! # Modules
//!
//! - [`host`] - Scratch queue host and recording steps
//! - [`logging`] - Test log capture through `tracing-subscriber`
//! - [`recorders`] - Recording queue sinks and selection observers
//! - [`schemas`] - Prebuilt type registries for common field topologies

pub mod host;
pub mod logging;
pub mod recorders;
pub mod schemas;

pub use host::{RecordingStep, ScratchHost};
pub use logging::init_tracing;
pub use recorders::{QueueEvent, RecordingObserver, RecordingSink};
pub use schemas::{
    build_fan_in, build_max_choice, build_softmax, build_sum_chain, FanIn, MaxChoice, Softmax,
    SumChain,
};
