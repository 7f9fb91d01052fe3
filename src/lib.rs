//! parallel-drain: retire Kubernetes nodes of a given version in parallel
//!
//! This crate repeatedly lists cluster nodes, picks those whose kubelet
//! reports a target version, and cordons and drains them with a bounded pool
//! of workers until none are left.

pub mod config;
pub mod controller;
pub mod drain;
pub mod error;
pub mod inventory;

pub use crate::config::DrainConfig;
pub use crate::error::{Error, Result};
