//! Node registry and health monitoring for the rill client.
//!
//! This crate provides:
//!
//! - [`NodeRegistry`] — the shared view of known store nodes, their health
//!   classification and the current consistent-hash ring.
//! - [`monitor`] — the background probe and discovery loops that keep the
//!   registry fresh.
//!
//! The registry is mutated only by the health monitor; the dispatcher and
//! other readers get snapshot copies and never observe partial updates.

pub mod monitor;
mod registry;

#[cfg(test)]
mod tests;

pub use monitor::{MonitorConfig, MonitorHandle};
pub use registry::NodeRegistry;
