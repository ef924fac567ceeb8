//! # Regfleet Core
//!
//! Core types for the regfleet container registry fleet reconciler.
//!
//! This crate is synchronous and free of I/O beyond loading a snapshot file:
//!
//! - [`Registry`], [`ProjectSpec`], [`Member`] - the fleet data model
//! - [`RegistryOptions`] - CLI defaults merged with per-registry annotations
//! - [`topology`] - replication direction, trigger and transport derivation
//! - [`FleetConfig`] - declarative fleet snapshot
//! - [`Error`] - the error taxonomy every other crate converts into
//!
//! ## Example
//!
//! ```rust
//! use regfleet_core::topology::{calculate_replication, CalculatedReplication, TopologyNode};
//!
//! let hub = TopologyNode::new(true, true, true);
//! let leaf = TopologyNode::new(false, false, false);
//! assert_eq!(calculate_replication(hub, leaf).unwrap(), CalculatedReplication::Push);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod model;
pub mod options;
pub mod topology;


pub use config::FleetConfig;
pub use error::{Error, ErrorKind, Result};
pub use model::{
    Credentials, Member, MemberType, Project, ProjectKind, ProjectSpec, ProviderKind, Registry,
    RegistryRole, RegistrySpec, Repository,
};
pub use options::{CliOptions, RegistryOptions, ReplicationType};
pub use topology::{
    CalculatedReplication, ReplicationDirection, ReplicationRule, ReplicationTrigger,
    TopologyConfig,
};
