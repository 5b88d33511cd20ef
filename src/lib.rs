//! Core of `gvs`: discovering published toolchain releases, caching and
//! verifying their archives, installing them side by side, and switching the
//! active version through a single symlink.
//!
//! The binary in `main.rs` wires these modules to the command line; everything
//! here takes its environment from an explicit [`config::Context`].

pub mod cache;
pub mod catalog;
pub mod checksums;
pub mod config;
pub mod confirm;
pub mod errors;
pub mod fetch;
pub mod fsutil;
pub mod installer;
pub mod orchestrator;
pub mod platform;
pub mod registry;
pub mod version;
