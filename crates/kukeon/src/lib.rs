//! Single-host container workload orchestrator core.
//!
//! The crate manages a four-level hierarchy of execution domains
//! (Realm → Space → Stack → Cell) plus the workload containers attached to
//! cells, backed by an OCI-compatible runtime and a CNI network plane. All
//! runtime-visible effects flow through the [`runner::Runner`] port; the
//! [`controller`] translates declarative intent into the host-side resource
//! graph and reports precise pre/post reconciliation outcomes.

pub mod apischeme;
pub mod cli;
pub mod constants;
pub mod controller;
pub mod error;
pub mod logging;
pub mod model;
pub mod naming;
pub mod runner;

pub use error::{Error, ErrorKind, Result};
