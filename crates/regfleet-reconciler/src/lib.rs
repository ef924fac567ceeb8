//! # Regfleet Reconciler
//!
//! Turns the difference between expected and actual registry state into
//! ordered actions and carries them out.
//!
//! - [`diff`] - generic expected/actual diff, removals first
//! - [`MemberAction`], [`ProjectAction`] - actions performed against a backend
//! - [`SideEffect`] - credential files created and removed with robot members
//! - [`FleetReconciler`] - bounded-concurrency executor with deadline and
//!   cancellation, producing a [`ReconcileReport`]
//! - [`replication`], [`jobs`], [`copy_tool`] - replication rules and the
//!   scheduled copy-tool jobs implementing cron-driven ones
//! - [`ResourceManipulator`] - where generated objects are persisted
//!
//! ## Example
//!
//! ```rust
//! use regfleet_core::Member;
//! use regfleet_reconciler::member_actions;
//!
//! let actions = member_actions(
//!     "os-images",
//!     &[Member::user("alice", "Developer")],
//!     &[Member::user("alice", "Maintainer")],
//! );
//! assert!(actions[0].is_remove());
//! assert!(!actions[1].is_remove());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod action;
pub mod copy_tool;
pub mod diff;
pub mod error;
pub mod executor;
pub mod jobs;
pub mod manipulator;
pub mod replication;
pub mod report;
pub mod side_effect;

#[cfg(test)]
mod testing;

pub use action::{member_actions, project_actions, MemberAction, ProjectAction};
pub use diff::{diff, Change};
pub use error::{ReconcileError, Result};
pub use executor::{ExecutorConfig, ExecutorConfigBuilder, FleetReconciler};
pub use jobs::{build_replication_job, JobConfig, ReplicationJob};
pub use manipulator::{
    KubeResourceManipulator, ManagedResource, ManifestDirectory, ResourceManipulator,
};
pub use replication::{plan_fleet_replication, plan_replication, sync_replication_jobs};
pub use report::{
    ActionResult, ActionStatus, ReconcileReport, SideEffectStatus, UnitResult, UnitStatus,
};
pub use side_effect::{
    read_credentials, CredentialKey, SecretFormat, SideEffect, SideEffectContext,
    StoredCredentials,
};
