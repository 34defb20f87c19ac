#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Backend-agnostic peer-to-peer networking.
//!
//! The [`traits`] module defines the capability sets every backend provides.
//! The [`simulator`] backend runs a whole network in-process with
//! configurable latency, loss, bandwidth and partitions.

pub mod config;
pub mod traits;
pub mod types;

#[cfg(feature = "simulator")]
pub mod simulator;

pub use config::SimulatorConfig;
pub use traits::{P2PConnection, P2PListener, P2PNodeId, P2PSystem};
pub use types::{P2PError, P2PResult};
