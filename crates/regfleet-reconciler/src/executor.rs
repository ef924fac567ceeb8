//! Fleet reconciliation executor.
//!
//! A run has two phases. First every registry's project set is reconciled,
//! then every (registry, expected project) pair's members. Units of a phase
//! run concurrently up to [`ExecutorConfig::max_concurrent`]; the actions of
//! one unit run strictly in order.
//!
//! The overall deadline and the cancellation signal are checked before each
//! unit and each action. Observation calls are abandoned when either fires;
//! an action that already started is allowed to finish.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use regfleet_core::{Error, ProjectSpec};
use regfleet_registry::RegistryProvider;

use crate::action::{member_actions, project_actions, MemberAction, ProjectAction};
use crate::error::{ReconcileError, Result};
use crate::report::{
    ActionResult, ActionStatus, ReconcileReport, SideEffectStatus, UnitResult, UnitStatus,
};
use crate::side_effect::{SideEffect, SideEffectContext};

/// Default number of units reconciled concurrently.
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Default deadline of a whole run.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(300);

/// Executor configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Maximum number of units in flight.
    pub max_concurrent: usize,

    /// Deadline of the whole run.
    pub deadline: Duration,

    /// Plan actions without performing them.
    pub dry_run: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            deadline: DEFAULT_DEADLINE,
            dry_run: false,
        }
    }
}

impl ExecutorConfig {
    /// Creates a configuration builder.
    pub fn builder() -> ExecutorConfigBuilder {
        ExecutorConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidConfig`] for a zero concurrency limit
    /// or a zero deadline.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(ReconcileError::invalid_config(
                "max_concurrent must be at least 1",
            ));
        }
        if self.deadline.is_zero() {
            return Err(ReconcileError::invalid_config("deadline must be positive"));
        }
        Ok(())
    }
}

/// Builder for `ExecutorConfig`.
#[derive(Debug, Default)]
pub struct ExecutorConfigBuilder {
    max_concurrent: Option<usize>,
    deadline: Option<Duration>,
    dry_run: Option<bool>,
}

impl ExecutorConfigBuilder {
    /// Sets the maximum number of concurrent units.
    pub fn max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = Some(max);
        self
    }

    /// Sets the run deadline.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Enables or disables dry-run mode.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = Some(dry_run);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> ExecutorConfig {
        let defaults = ExecutorConfig::default();
        ExecutorConfig {
            max_concurrent: self.max_concurrent.unwrap_or(defaults.max_concurrent),
            deadline: self.deadline.unwrap_or(defaults.deadline),
            dry_run: self.dry_run.unwrap_or(defaults.dry_run),
        }
    }
}

/// Why a unit or action was not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interruption {
    Deadline,
    Cancelled,
}

impl fmt::Display for Interruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deadline => f.write_str("deadline exceeded"),
            Self::Cancelled => f.write_str("run cancelled"),
        }
    }
}

/// Deadline and cancellation shared by every unit of a run.
#[derive(Debug, Clone)]
struct RunGuard {
    deadline: Instant,
    cancel: Option<watch::Receiver<bool>>,
}

impl RunGuard {
    fn interrupted(&self) -> Option<Interruption> {
        if self.cancel.as_ref().is_some_and(|rx| *rx.borrow()) {
            return Some(Interruption::Cancelled);
        }
        (Instant::now() >= self.deadline).then_some(Interruption::Deadline)
    }

    async fn cancelled(&self) {
        let Some(mut rx) = self.cancel.clone() else {
            return std::future::pending().await;
        };
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            // Sender gone without cancelling.
            std::future::pending::<()>().await;
        }
    }

    /// Runs `fut` unless the deadline or cancellation fires first.
    async fn bound<T>(&self, fut: impl Future<Output = T>) -> std::result::Result<T, Interruption> {
        tokio::select! {
            value = fut => Ok(value),
            () = tokio::time::sleep_until(self.deadline) => Err(Interruption::Deadline),
            () = self.cancelled() => Err(Interruption::Cancelled),
        }
    }
}

/// One step of a unit.
enum UnitAction {
    Project(ProjectAction),
    Member(MemberAction),
}

impl UnitAction {
    async fn perform(&self, provider: &dyn RegistryProvider) -> regfleet_core::Result<SideEffect> {
        match self {
            Self::Project(action) => action.perform(provider).await.map(|()| SideEffect::None),
            Self::Member(action) => action.perform(provider).await,
        }
    }

    /// Member name an `Add` depends on having been removed first.
    fn pending_member(&self) -> Option<&str> {
        match self {
            Self::Member(MemberAction::Add { member, .. }) => Some(&member.name),
            _ => None,
        }
    }

    fn removed_member(&self) -> Option<&str> {
        match self {
            Self::Member(MemberAction::Remove { member, .. }) => Some(&member.name),
            _ => None,
        }
    }
}

impl fmt::Display for UnitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Project(action) => fmt::Display::fmt(action, f),
            Self::Member(action) => fmt::Display::fmt(action, f),
        }
    }
}

/// Reconciles a fleet of registries against expected projects and members.
pub struct FleetReconciler {
    providers: Vec<Arc<dyn RegistryProvider>>,
    config: ExecutorConfig,
    side_effects: Option<SideEffectContext>,
    cancel: Option<watch::Receiver<bool>>,
}

impl fmt::Debug for FleetReconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FleetReconciler")
            .field(
                "registries",
                &self
                    .providers
                    .iter()
                    .map(|p| p.registry().name())
                    .collect::<Vec<_>>(),
            )
            .field("config", &self.config)
            .field("side_effects", &self.side_effects)
            .finish_non_exhaustive()
    }
}

impl FleetReconciler {
    /// Creates a reconciler over the given backends.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidConfig`] if the configuration is
    /// invalid.
    pub fn new(providers: Vec<Arc<dyn RegistryProvider>>, config: ExecutorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            providers,
            config,
            side_effects: None,
            cancel: None,
        })
    }

    /// Persists side effects through the given context.
    ///
    /// Without one, any action producing a side effect fails its unit.
    #[must_use]
    pub fn with_side_effects(mut self, context: SideEffectContext) -> Self {
        self.side_effects = Some(context);
        self
    }

    /// Stops starting new work once the receiver observes `true`.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Returns the configuration.
    pub const fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Reconciles every registry against `projects`.
    ///
    /// Failures are recorded in the report; nothing is rolled back.
    pub async fn reconcile(&self, projects: &[ProjectSpec]) -> ReconcileReport {
        let mut report = ReconcileReport::start(self.config.dry_run);
        let guard = RunGuard {
            deadline: Instant::now() + self.config.deadline,
            cancel: self.cancel.clone(),
        };
        info!(
            run_id = %report.run_id,
            registries = self.providers.len(),
            projects = projects.len(),
            dry_run = self.config.dry_run,
            "starting reconciliation"
        );

        let mut project_units: Vec<UnitResult> = stream::iter(
            self.providers
                .iter()
                .map(|provider| self.reconcile_projects(provider.as_ref(), projects, &guard)),
        )
        .buffer_unordered(self.config.max_concurrent)
        .collect()
        .await;
        project_units.sort_by_key(UnitResult::label);

        let member_work = self.providers.iter().flat_map(|provider| {
            let name = provider.registry().name().to_string();
            projects
                .iter()
                .filter(move |spec| spec.is_expected_on(&name))
                .map(move |spec| (Arc::clone(provider), spec))
        });
        let mut member_units: Vec<UnitResult> = stream::iter(
            member_work.map(|(provider, spec)| {
                let guard = &guard;
                async move { self.reconcile_members(provider.as_ref(), spec, guard).await }
            }),
        )
        .buffer_unordered(self.config.max_concurrent)
        .collect()
        .await;
        member_units.sort_by_key(UnitResult::label);

        report.units = project_units;
        report.units.extend(member_units);
        let report = report.finish();
        info!(
            run_id = %report.run_id,
            succeeded = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped(),
            not_reconciled = report.not_reconciled(),
            "reconciliation finished"
        );
        report
    }

    async fn reconcile_projects(
        &self,
        provider: &dyn RegistryProvider,
        projects: &[ProjectSpec],
        guard: &RunGuard,
    ) -> UnitResult {
        let registry = provider.registry().name();
        if let Some(reason) = guard.interrupted() {
            return UnitResult::new(registry, None, UnitStatus::NotReconciled(reason.to_string()));
        }

        let actual = match guard.bound(provider.list_projects()).await {
            Err(reason) => {
                warn!(registry = %registry, reason = %reason, "project listing abandoned");
                return UnitResult::new(registry, None, UnitStatus::NotReconciled(reason.to_string()));
            }
            Ok(Err(e)) => {
                warn!(registry = %registry, error = %e, "failed to list projects");
                return UnitResult::new(registry, None, UnitStatus::Failed(e.to_string()));
            }
            Ok(Ok(projects)) => projects.into_iter().map(|p| p.name).collect::<Vec<_>>(),
        };
        let expected: Vec<String> = projects
            .iter()
            .filter(|spec| spec.is_expected_on(registry))
            .map(|spec| spec.name.clone())
            .collect();

        let actions = project_actions(&actual, &expected)
            .into_iter()
            .map(UnitAction::Project)
            .collect();
        let results = self.run_actions(provider, actions, guard).await;
        UnitResult::from_actions(registry, None, results)
    }

    async fn reconcile_members(
        &self,
        provider: &dyn RegistryProvider,
        spec: &ProjectSpec,
        guard: &RunGuard,
    ) -> UnitResult {
        let registry = provider.registry().name();
        let project = Some(spec.name.clone());
        if let Some(reason) = guard.interrupted() {
            return UnitResult::new(registry, project, UnitStatus::NotReconciled(reason.to_string()));
        }

        let Some(manager) = provider.member_manager() else {
            warn!(
                registry = %registry,
                provider = %provider.registry().provider(),
                project = %spec.name,
                "backend has no member model, skipping member reconciliation"
            );
            return UnitResult::new(
                registry,
                project,
                UnitStatus::Skipped(format!(
                    "{} has no member model",
                    provider.registry().provider()
                )),
            );
        };

        let observed = guard
            .bound(async {
                let found = provider.get_project_by_name(&spec.name).await?;
                manager.members(&found).await
            })
            .await;
        let actual = match observed {
            Err(reason) => {
                warn!(registry = %registry, project = %spec.name, reason = %reason, "member listing abandoned");
                return UnitResult::new(registry, project, UnitStatus::NotReconciled(reason.to_string()));
            }
            Ok(Ok(members)) => members,
            Ok(Err(Error::NotFound { .. })) if self.config.dry_run => Vec::new(),
            Ok(Err(e @ Error::NotFound { .. })) => {
                info!(registry = %registry, project = %spec.name, "project absent, nothing to reconcile");
                return UnitResult::new(registry, project, UnitStatus::Skipped(e.to_string()));
            }
            Ok(Err(e)) => {
                warn!(registry = %registry, project = %spec.name, error = %e, "failed to list members");
                return UnitResult::new(registry, project, UnitStatus::Failed(e.to_string()));
            }
        };

        let actions = member_actions(&spec.name, &actual, &spec.members)
            .into_iter()
            .map(UnitAction::Member)
            .collect();
        let results = self.run_actions(provider, actions, guard).await;
        UnitResult::from_actions(registry, project, results)
    }

    /// Runs the actions of one unit in order.
    ///
    /// A failed action does not stop the unit, except a configuration error
    /// which leaves the remaining actions not started. An `Add` whose
    /// same-name `Remove` failed is skipped so a member never ends up bound
    /// twice.
    async fn run_actions(
        &self,
        provider: &dyn RegistryProvider,
        actions: Vec<UnitAction>,
        guard: &RunGuard,
    ) -> Vec<ActionResult> {
        let registry = provider.registry().name();
        let mut results = Vec::with_capacity(actions.len());
        let mut failed_removals: HashSet<String> = HashSet::new();
        let mut halted = false;

        for action in actions {
            let description = action.to_string();
            if halted {
                results.push(ActionResult::new(description, ActionStatus::NotStarted));
                continue;
            }
            if let Some(reason) = guard.interrupted() {
                warn!(registry = %registry, reason = %reason, action = %description, "not starting action");
                halted = true;
                results.push(ActionResult::new(description, ActionStatus::NotStarted));
                continue;
            }
            if self.config.dry_run {
                info!(registry = %registry, "[dry-run] {description}");
                results.push(ActionResult::new(description, ActionStatus::Planned));
                continue;
            }
            if action
                .pending_member()
                .is_some_and(|name| failed_removals.contains(name))
            {
                results.push(ActionResult::new(
                    description,
                    ActionStatus::Skipped("removing the previous binding failed".to_string()),
                ));
                continue;
            }

            info!(registry = %registry, "{description}");
            let result = match action.perform(provider).await {
                Ok(effect) => {
                    let side_effect = self.apply_side_effect(&effect);
                    if let Err(e) = &side_effect {
                        warn!(registry = %registry, side_effect = %effect, error = %e, "side effect failed");
                        halted |= e.is_fatal();
                    }
                    ActionResult::new(description, ActionStatus::Succeeded).with_side_effect(
                        match side_effect {
                            Ok(()) if effect.is_none() => SideEffectStatus::None,
                            Ok(()) => SideEffectStatus::Applied(effect.to_string()),
                            Err(e) => SideEffectStatus::Failed(e.to_string()),
                        },
                    )
                }
                Err(e) if e.is_capability_gap() => {
                    warn!(registry = %registry, action = %description, error = %e, "capability gap, skipping");
                    ActionResult::new(description, ActionStatus::Skipped(e.to_string()))
                }
                Err(e) => {
                    warn!(registry = %registry, action = %description, error = %e, kind = %e.kind(), "action failed");
                    if let Some(name) = action.removed_member() {
                        failed_removals.insert(name.to_string());
                    }
                    halted |= e.is_fatal();
                    ActionResult::new(description, ActionStatus::Failed(e.to_string()))
                }
            };
            results.push(result);
        }

        debug!(registry = %registry, actions = results.len(), "unit finished");
        results
    }

    fn apply_side_effect(&self, effect: &SideEffect) -> regfleet_core::Result<()> {
        effect.perform(self.side_effects.as_ref())
    }
}
