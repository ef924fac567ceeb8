//! Replication topology calculator.
//!
//! Replication always transits the global hub. Whether a leaf pulls from the
//! hub or the hub pushes to the leaf depends on what each backend can do
//! natively; see [`calculate_replication`].

use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::{ProjectSpec, ProviderKind, Registry};
use crate::options::ReplicationType;

/// Trigger used when the hub pushes and no cron/manual trigger is declared.
pub const EVENT_BASED_TRIGGER: &str = "event_based";

/// Default trigger for pull replication without a cron/manual declaration.
pub const DEFAULT_FALLBACK_PULL_TRIGGER: &str = "cron */10 * * * *";

/// Native replication features of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ReplicationCapabilities {
    /// The backend can push images to a remote registry on its own.
    pub can_push: bool,
    /// The backend can pull images from a remote registry on its own.
    pub can_pull: bool,
}

impl ReplicationCapabilities {
    /// Returns the native replication capabilities of a vendor.
    pub const fn for_provider(provider: ProviderKind) -> Self {
        match provider {
            ProviderKind::Harbor => Self {
                can_push: true,
                can_pull: true,
            },
            ProviderKind::Acr => Self {
                can_push: false,
                can_pull: false,
            },
            ProviderKind::Artifactory => Self {
                can_push: false,
                can_pull: true,
            },
        }
    }
}

/// Topology-relevant view of one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TopologyNode {
    /// The registry is the global hub.
    pub is_global_hub: bool,
    /// Native replication capabilities.
    pub capabilities: ReplicationCapabilities,
}

impl TopologyNode {
    /// Creates a node.
    pub const fn new(is_global_hub: bool, can_push: bool, can_pull: bool) -> Self {
        Self {
            is_global_hub,
            capabilities: ReplicationCapabilities { can_push, can_pull },
        }
    }
}

impl From<&Registry> for TopologyNode {
    fn from(registry: &Registry) -> Self {
        Self {
            is_global_hub: registry.is_global_hub(),
            capabilities: ReplicationCapabilities::for_provider(registry.provider()),
        }
    }
}

/// Outcome of the topology calculation for one (local, remote) edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalculatedReplication {
    /// No rule is configured on the local registry.
    None,
    /// The local registry pulls from the remote.
    Pull,
    /// The local registry pushes to the remote.
    Push,
}

impl CalculatedReplication {
    /// Returns the direction of an actual rule, if any.
    pub const fn direction(self) -> Option<ReplicationDirection> {
        match self {
            Self::None => None,
            Self::Pull => Some(ReplicationDirection::Pull),
            Self::Push => Some(ReplicationDirection::Push),
        }
    }
}

/// Direction of a replication rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReplicationDirection {
    /// Images flow from the local registry to the remote one.
    Push,
    /// Images flow from the remote registry to the local one.
    Pull,
}

impl ReplicationDirection {
    /// Returns a string representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Push => "Push",
            Self::Pull => "Pull",
        }
    }
}

impl std::fmt::Display for ReplicationDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Computes whether `local` should push to, pull from, or ignore `remote`.
///
/// Rules, in order:
/// 1. both are global hubs: configuration error
/// 2. neither is a hub: `None`
/// 3. remote hub pushes natively: `None` (the hub drives replication)
/// 4. local hub pushes natively: `Push`
/// 5. local leaf pulls natively: `Pull`
/// 6. otherwise `None`
///
/// # Errors
///
/// Returns [`Error::Configuration`] when both registries are global hubs.
pub fn calculate_replication(
    local: TopologyNode,
    remote: TopologyNode,
) -> Result<CalculatedReplication> {
    if local.is_global_hub && remote.is_global_hub {
        return Err(Error::configuration(
            "both local and remote registries are global hubs",
        ));
    }
    if !local.is_global_hub && !remote.is_global_hub {
        return Ok(CalculatedReplication::None);
    }
    if remote.is_global_hub && remote.capabilities.can_push {
        return Ok(CalculatedReplication::None);
    }
    if local.is_global_hub && local.capabilities.can_push {
        return Ok(CalculatedReplication::Push);
    }
    if !local.is_global_hub && local.capabilities.can_pull {
        return Ok(CalculatedReplication::Pull);
    }
    Ok(CalculatedReplication::None)
}

/// Rejects fleets declaring more than one global hub.
///
/// # Errors
///
/// Returns [`Error::Configuration`] naming the hubs when more than one is
/// declared.
pub fn validate_hubs<'a>(registries: impl IntoIterator<Item = &'a Registry>) -> Result<()> {
    let hubs: Vec<&str> = registries
        .into_iter()
        .filter(|r| r.is_global_hub())
        .map(Registry::name)
        .collect();
    if hubs.len() > 1 {
        return Err(Error::configuration(format!(
            "a fleet must have exactly one global hub, found: {}",
            hubs.join(", ")
        )));
    }
    Ok(())
}

/// Leading keyword of a trigger string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKeyword {
    /// `cron <schedule>`
    Cron,
    /// `manual`
    Manual,
    /// `event_based`
    EventBased,
    /// Anything else, including an empty string.
    Other,
}

/// A replication trigger, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ReplicationTrigger(String);

impl ReplicationTrigger {
    /// Wraps a trigger string.
    pub fn new(trigger: impl Into<String>) -> Self {
        Self(trigger.into())
    }

    /// The event-based trigger.
    pub fn event_based() -> Self {
        Self(EVENT_BASED_TRIGGER.to_string())
    }

    /// Returns the trigger string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the leading keyword.
    pub fn keyword(&self) -> TriggerKeyword {
        keyword_of(&self.0)
    }

    /// Returns the cron schedule following the `cron` keyword.
    pub fn schedule(&self) -> Option<&str> {
        match self.0.split_once(' ') {
            Some(("cron", schedule)) if !schedule.trim().is_empty() => Some(schedule.trim()),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReplicationTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn keyword_of(trigger: &str) -> TriggerKeyword {
    match trigger.split(' ').next().unwrap_or_default() {
        "cron" => TriggerKeyword::Cron,
        "manual" => TriggerKeyword::Manual,
        EVENT_BASED_TRIGGER => TriggerKeyword::EventBased,
        _ => TriggerKeyword::Other,
    }
}

/// Tunables of the topology calculator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyConfig {
    /// Trigger used for pull rules without a cron/manual declaration.
    pub fallback_pull_trigger: String,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            fallback_pull_trigger: DEFAULT_FALLBACK_PULL_TRIGGER.to_string(),
        }
    }
}

impl TopologyConfig {
    /// Sets the fallback pull trigger.
    #[must_use]
    pub fn with_fallback_pull_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.fallback_pull_trigger = trigger.into();
        self
    }
}

/// Derives the effective trigger of a rule.
///
/// `cron` and `manual` declarations are honored verbatim in both directions.
/// Anything else falls back to an event-based trigger for push rules (the
/// source registry notifies on image push) and to the configured fallback
/// cron trigger for pull rules.
pub fn resolve_trigger(
    direction: ReplicationDirection,
    declared: Option<&str>,
    config: &TopologyConfig,
) -> ReplicationTrigger {
    let declared = declared.unwrap_or_default();
    match keyword_of(declared) {
        TriggerKeyword::Cron | TriggerKeyword::Manual => ReplicationTrigger::new(declared),
        TriggerKeyword::EventBased | TriggerKeyword::Other => match direction {
            ReplicationDirection::Push => ReplicationTrigger::event_based(),
            ReplicationDirection::Pull => {
                ReplicationTrigger::new(config.fallback_pull_trigger.clone())
            }
        },
    }
}

/// Classifies the transport of a rule from its trigger.
///
/// Manual and event-based triggers rely on native registry replication. Cron
/// triggers use the declared type, defaulting to the copy tool.
pub fn replication_type(
    trigger: &ReplicationTrigger,
    declared: Option<ReplicationType>,
) -> ReplicationType {
    match trigger.keyword() {
        TriggerKeyword::Manual | TriggerKeyword::EventBased => ReplicationType::Registry,
        TriggerKeyword::Cron => declared.unwrap_or(ReplicationType::CopyTool),
        TriggerKeyword::Other => ReplicationType::CopyTool,
    }
}

/// A computed replication relationship for one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplicationRule {
    /// Project name.
    pub project: String,
    /// Registry the rule is configured on.
    pub local_registry: String,
    /// Registry on the other end of the rule.
    pub remote_registry: String,
    /// Direction relative to the local registry.
    pub direction: ReplicationDirection,
    /// Effective trigger.
    pub trigger: ReplicationTrigger,
    /// Transport.
    pub transport: ReplicationType,
}

/// Computes the rule `local` needs for `project` towards `remote`.
///
/// Returns `Ok(None)` when no rule is needed on this edge.
///
/// # Errors
///
/// Returns [`Error::Configuration`] when both registries are global hubs.
pub fn plan_rule(
    local: &Registry,
    remote: &Registry,
    project: &ProjectSpec,
    config: &TopologyConfig,
) -> Result<Option<ReplicationRule>> {
    let calculated = calculate_replication(local.into(), remote.into())?;
    let Some(direction) = calculated.direction() else {
        return Ok(None);
    };
    let trigger = resolve_trigger(direction, project.trigger.as_deref(), config);
    let transport = replication_type(&trigger, local.options().replication);
    Ok(Some(ReplicationRule {
        project: project.name.clone(),
        local_registry: local.name().to_string(),
        remote_registry: remote.name().to_string(),
        direction,
        trigger,
        transport,
    }))
}
