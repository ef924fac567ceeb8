//! Aggregated outcome of a reconciliation run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Outcome of one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ActionStatus {
    /// Computed but not performed (dry run).
    Planned,
    /// Performed successfully.
    Succeeded,
    /// Performing failed.
    Failed(String),
    /// Not performed because a prerequisite failed.
    Skipped(String),
    /// Not started because the run was interrupted or the unit aborted.
    NotStarted,
}

/// Outcome of the side effect attached to an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum SideEffectStatus {
    /// The action required no side effect.
    None,
    /// Applied.
    Applied(String),
    /// Applying failed.
    Failed(String),
}

/// Result of a single action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionResult {
    /// Human readable description of the action.
    pub description: String,
    /// Action outcome.
    pub status: ActionStatus,
    /// Side effect outcome.
    pub side_effect: SideEffectStatus,
}

impl ActionResult {
    /// Creates a result with no side effect.
    pub fn new(description: impl Into<String>, status: ActionStatus) -> Self {
        Self {
            description: description.into(),
            status,
            side_effect: SideEffectStatus::None,
        }
    }

    /// Sets the side effect outcome.
    #[must_use]
    pub fn with_side_effect(mut self, side_effect: SideEffectStatus) -> Self {
        self.side_effect = side_effect;
        self
    }

    /// Returns true if the action or its side effect failed.
    pub const fn is_failed(&self) -> bool {
        matches!(self.status, ActionStatus::Failed(_))
            || matches!(self.side_effect, SideEffectStatus::Failed(_))
    }
}

/// Outcome of one unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum UnitStatus {
    /// Every action succeeded (or was planned).
    Reconciled,
    /// Observation failed, the unit aborted, or an action failed.
    Failed(String),
    /// The backend lacks the capability.
    Skipped(String),
    /// The deadline passed or the run was cancelled first.
    NotReconciled(String),
}

/// Result of one unit: a registry's project set or one project's members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitResult {
    /// Registry name.
    pub registry: String,
    /// Project name, absent for the project-level unit.
    pub project: Option<String>,
    /// Unit outcome.
    pub status: UnitStatus,
    /// Per-action results, in execution order.
    pub actions: Vec<ActionResult>,
}

impl UnitResult {
    /// Creates a unit result without actions.
    pub fn new(registry: impl Into<String>, project: Option<String>, status: UnitStatus) -> Self {
        Self {
            registry: registry.into(),
            project,
            status,
            actions: Vec::new(),
        }
    }

    /// Creates a unit result from its action results.
    ///
    /// The unit is failed if any action failed, skipped if every action was
    /// skipped, not reconciled if any action was never started, reconciled
    /// otherwise.
    pub fn from_actions(
        registry: impl Into<String>,
        project: Option<String>,
        actions: Vec<ActionResult>,
    ) -> Self {
        let failed = actions.iter().filter(|a| a.is_failed()).count();
        let not_started = actions
            .iter()
            .filter(|a| a.status == ActionStatus::NotStarted)
            .count();
        let skipped = actions
            .iter()
            .filter(|a| matches!(a.status, ActionStatus::Skipped(_)))
            .count();
        let status = if failed > 0 {
            UnitStatus::Failed(format!("{failed} of {} actions failed", actions.len()))
        } else if skipped > 0 && skipped == actions.len() {
            UnitStatus::Skipped(format!("{skipped} actions skipped"))
        } else if not_started > 0 {
            UnitStatus::NotReconciled(format!(
                "{not_started} of {} actions not started",
                actions.len()
            ))
        } else {
            UnitStatus::Reconciled
        };
        Self {
            registry: registry.into(),
            project,
            status,
            actions,
        }
    }

    /// Returns a label such as `hub` or `hub/os-images`.
    pub fn label(&self) -> String {
        match &self.project {
            Some(project) => format!("{}/{project}", self.registry),
            None => self.registry.clone(),
        }
    }
}

/// Report of a reconciliation run.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    /// Unique run ID.
    pub run_id: Uuid,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Whether actions were only planned.
    pub dry_run: bool,
    /// Per-unit results, project-level units first.
    pub units: Vec<UnitResult>,
}

impl ReconcileReport {
    /// Starts an empty report.
    pub fn start(dry_run: bool) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::now_v7(),
            started_at: now,
            finished_at: now,
            dry_run,
            units: Vec::new(),
        }
    }

    /// Marks the report finished.
    #[must_use]
    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    fn count(&self, predicate: impl Fn(&UnitStatus) -> bool) -> usize {
        self.units.iter().filter(|u| predicate(&u.status)).count()
    }

    /// Number of reconciled units.
    pub fn succeeded(&self) -> usize {
        self.count(|s| matches!(s, UnitStatus::Reconciled))
    }

    /// Number of failed units.
    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, UnitStatus::Failed(_)))
    }

    /// Number of units skipped for a capability gap.
    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, UnitStatus::Skipped(_)))
    }

    /// Number of units interrupted by the deadline or cancellation.
    pub fn not_reconciled(&self) -> usize {
        self.count(|s| matches!(s, UnitStatus::NotReconciled(_)))
    }

    /// Iterates over every action result.
    pub fn actions(&self) -> impl Iterator<Item = &ActionResult> {
        self.units.iter().flat_map(|u| u.actions.iter())
    }

    /// Number of failed actions or side effects.
    pub fn failed_actions(&self) -> usize {
        self.actions().filter(|a| a.is_failed()).count()
    }

    /// Returns true if no unit failed or was left unreconciled.
    ///
    /// Capability gaps do not count against success.
    pub fn is_fully_successful(&self) -> bool {
        self.failed() == 0 && self.not_reconciled() == 0
    }
}
