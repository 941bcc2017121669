//! PgFleet: Kubernetes operator core for PostgreSQL database operations
//!
//! This crate provides the orchestration core used by the pgfleet operator:
//! the DbOps launcher, the cluster-scoped operation lock, the restart state
//! model, and self-healing watch plumbing.

pub mod crd;
pub mod dbops;
pub mod error;
pub mod resource;
pub mod watch;

pub use crate::error::{Error, Result};
