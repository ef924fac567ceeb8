//! End-to-end reconciliation runs against in-memory backends.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::watch;

use common::{harbor, ops, providers, registry, unit};
use regfleet_core::{Member, ProjectKind, ProjectSpec, ProviderKind, RegistryRole};
use regfleet_reconciler::{
    read_credentials, ActionStatus, ExecutorConfig, FleetReconciler, ReconcileError, SecretFormat,
    SideEffectContext, SideEffectStatus, UnitStatus,
};
use regfleet_registry::InMemoryRegistry;

fn reconciler(backends: &[&Arc<InMemoryRegistry>], config: ExecutorConfig) -> FleetReconciler {
    FleetReconciler::new(providers(backends), config).unwrap()
}

#[tokio::test]
async fn test_projects_reconciled_before_members() {
    let edge = Arc::new(InMemoryRegistry::new(harbor("edge")).with_project("legacy", &[]));
    let projects =
        vec![ProjectSpec::global("os-images").with_member(Member::user("alice", "Developer"))];

    let report = reconciler(&[&edge], ExecutorConfig::default())
        .reconcile(&projects)
        .await;

    assert!(report.is_fully_successful(), "{report:#?}");
    assert_eq!(
        edge.operations(),
        ops(&[
            "remove_project legacy",
            "create_project os-images",
            "assign_member os-images alice Developer",
        ])
    );
    assert_eq!(unit(&report, "edge").status, UnitStatus::Reconciled);
    assert_eq!(unit(&report, "edge/os-images").status, UnitStatus::Reconciled);
    assert_eq!(report.units[0].label(), "edge");
}

#[tokio::test]
async fn test_local_project_only_on_listed_registries() {
    let a = Arc::new(InMemoryRegistry::new(harbor("edge-a")));
    let b = Arc::new(InMemoryRegistry::new(harbor("edge-b")));
    let mut team = ProjectSpec::global("team");
    team.kind = ProjectKind::Local;
    team.local_registries = vec!["edge-b".to_string()];

    let report = reconciler(&[&a, &b], ExecutorConfig::default())
        .reconcile(&[team])
        .await;

    assert!(report.is_fully_successful());
    assert!(a.project_names().is_empty());
    assert_eq!(b.project_names(), ops(&["team"]));
    assert_eq!(report.units.len(), 3);
}

#[tokio::test]
async fn test_role_change_unassigns_before_assigning() {
    let edge = Arc::new(
        InMemoryRegistry::new(harbor("edge"))
            .with_project("p", &[])
            .with_member("p", Member::user("alice", "Developer")),
    );
    let projects = vec![ProjectSpec::global("p").with_member(Member::user("alice", "Maintainer"))];

    let report = reconciler(&[&edge], ExecutorConfig::default())
        .reconcile(&projects)
        .await;

    assert!(report.is_fully_successful());
    assert_eq!(
        edge.operations(),
        ops(&[
            "unassign_member p alice Developer",
            "assign_member p alice Maintainer",
        ])
    );
    assert_eq!(
        edge.project_members("p").unwrap(),
        vec![Member::user("alice", "Maintainer")]
    );
}

#[tokio::test]
async fn test_robot_credentials_persisted_and_removed() {
    let dir = TempDir::new().unwrap();
    let context = SideEffectContext::new(dir.path(), SecretFormat::Yaml).unwrap();
    let edge = Arc::new(InMemoryRegistry::new(harbor("edge")).with_project("p", &[]));
    let with_robot = vec![ProjectSpec::global("p").with_member(Member::robot("ci", "PullOnly"))];

    let report = reconciler(&[&edge], ExecutorConfig::default())
        .with_side_effects(context.clone())
        .reconcile(&with_robot)
        .await;
    assert!(report.is_fully_successful(), "{report:#?}");
    let action = &unit(&report, "edge/p").actions[0];
    assert_eq!(
        action.side_effect,
        SideEffectStatus::Applied("persist credentials edge_p_ci_creds.yaml".to_string())
    );

    let path = dir.path().join("edge_p_ci_creds.yaml");
    let stored = read_credentials(&path).unwrap();
    assert_eq!(stored.endpoint, "https://edge.example.com");
    assert_eq!(stored.credentials.username, "robot$p+ci");
    assert_eq!(stored.credentials.password, "secret-1");

    let report = reconciler(&[&edge], ExecutorConfig::default())
        .with_side_effects(context)
        .reconcile(&[ProjectSpec::global("p")])
        .await;
    assert!(report.is_fully_successful(), "{report:#?}");
    assert!(!path.exists());
}

#[tokio::test]
async fn test_missing_side_effect_context_aborts_unit() {
    let edge = Arc::new(InMemoryRegistry::new(harbor("edge")).with_project("p", &[]));
    let projects = vec![ProjectSpec::global("p")
        .with_member(Member::robot("ci", "PullOnly"))
        .with_member(Member::user("alice", "Developer"))];

    let report = reconciler(&[&edge], ExecutorConfig::default())
        .reconcile(&projects)
        .await;

    let members = unit(&report, "edge/p");
    assert!(matches!(members.status, UnitStatus::Failed(_)));
    assert_eq!(members.actions[0].status, ActionStatus::Succeeded);
    assert!(matches!(
        members.actions[0].side_effect,
        SideEffectStatus::Failed(_)
    ));
    assert_eq!(members.actions[1].status, ActionStatus::NotStarted);
    assert_eq!(edge.operations(), ops(&["assign_member p ci PullOnly"]));
    assert!(!report.is_fully_successful());
}

#[tokio::test]
async fn test_failed_removal_skips_rebinding_and_continues() {
    let edge = Arc::new(
        InMemoryRegistry::new(harbor("edge"))
            .with_project("p", &[])
            .with_member("p", Member::user("bob", "Guest"))
            .with_failing_member("bob"),
    );
    let projects = vec![ProjectSpec::global("p")
        .with_member(Member::user("bob", "Developer"))
        .with_member(Member::user("alice", "Developer"))];

    let report = reconciler(&[&edge], ExecutorConfig::default())
        .reconcile(&projects)
        .await;

    let members = unit(&report, "edge/p");
    let statuses: Vec<&ActionStatus> = members.actions.iter().map(|a| &a.status).collect();
    assert!(matches!(statuses[0], ActionStatus::Failed(_)));
    assert!(matches!(statuses[1], ActionStatus::Skipped(_)));
    assert_eq!(statuses[2], &ActionStatus::Succeeded);
    assert!(matches!(members.status, UnitStatus::Failed(_)));
    assert_eq!(edge.operations(), ops(&["assign_member p alice Developer"]));
    assert_eq!(report.failed_actions(), 1);
}

#[tokio::test]
async fn test_capability_gaps_are_skipped() {
    let acr = Arc::new(
        InMemoryRegistry::new(registry(
            "acr",
            ProviderKind::Acr,
            RegistryRole::Local,
            false,
        ))
        .without_project_creation()
        .without_members(),
    );
    let projects =
        vec![ProjectSpec::global("os-images").with_member(Member::user("alice", "Developer"))];

    let report = reconciler(&[&acr], ExecutorConfig::default())
        .reconcile(&projects)
        .await;

    assert!(matches!(unit(&report, "acr").status, UnitStatus::Skipped(_)));
    assert!(matches!(
        unit(&report, "acr/os-images").status,
        UnitStatus::Skipped(_)
    ));
    assert_eq!(report.skipped(), 2);
    assert!(report.is_fully_successful());
    assert!(acr.operations().is_empty());
}

#[tokio::test]
async fn test_dry_run_plans_without_mutating() {
    let edge = Arc::new(InMemoryRegistry::new(harbor("edge")).with_project("legacy", &["app"]));
    let projects =
        vec![ProjectSpec::global("os-images").with_member(Member::user("alice", "Developer"))];
    let config = ExecutorConfig::builder().dry_run(true).build();

    let report = reconciler(&[&edge], config).reconcile(&projects).await;

    assert!(report.dry_run);
    assert!(edge.operations().is_empty());
    assert_eq!(edge.project_names(), ops(&["legacy"]));
    let planned: Vec<&str> = report.actions().map(|a| a.description.as_str()).collect();
    assert_eq!(
        planned,
        vec![
            "deleting project legacy",
            "creating project os-images",
            "adding member alice (User, Developer) to os-images",
        ]
    );
    assert!(report.actions().all(|a| a.status == ActionStatus::Planned));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_leaves_units_not_reconciled() {
    let slow = Arc::new(
        InMemoryRegistry::new(harbor("slow"))
            .with_project("p", &[])
            .with_latency(Duration::from_secs(5)),
    );
    let config = ExecutorConfig::builder()
        .deadline(Duration::from_secs(1))
        .build();

    let report = reconciler(&[&slow], config)
        .reconcile(&[ProjectSpec::global("p").with_member(Member::user("alice", "Developer"))])
        .await;

    assert!(matches!(
        unit(&report, "slow").status,
        UnitStatus::NotReconciled(_)
    ));
    assert!(matches!(
        unit(&report, "slow/p").status,
        UnitStatus::NotReconciled(_)
    ));
    assert!(!report.is_fully_successful());
    assert!(slow.operations().is_empty());
}

#[tokio::test]
async fn test_cancelled_run_starts_nothing() {
    let edge = Arc::new(InMemoryRegistry::new(harbor("edge")));
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let report = reconciler(&[&edge], ExecutorConfig::default())
        .with_cancellation(rx)
        .reconcile(&[ProjectSpec::global("p")])
        .await;

    assert_eq!(report.not_reconciled(), report.units.len());
    assert!(edge.operations().is_empty());
}

#[tokio::test]
async fn test_force_delete_refusal_does_not_stop_other_registries() {
    let strict = Arc::new(InMemoryRegistry::new(harbor("strict")).with_project("legacy", &["app"]));
    let lenient = Arc::new(
        InMemoryRegistry::new(registry(
            "lenient",
            ProviderKind::Harbor,
            RegistryRole::Local,
            true,
        ))
        .with_project("legacy", &["app"]),
    );

    let report = reconciler(&[&strict, &lenient], ExecutorConfig::default())
        .reconcile(&[])
        .await;

    assert!(matches!(unit(&report, "strict").status, UnitStatus::Failed(_)));
    assert_eq!(unit(&report, "lenient").status, UnitStatus::Reconciled);
    assert_eq!(report.failed(), 1);
    assert!(strict.operations().is_empty());
    assert_eq!(
        lenient.operations(),
        ops(&["delete_repository legacy/app", "remove_project legacy"])
    );
}

#[tokio::test]
async fn test_concurrency_limit_has_no_effect_on_outcome() {
    let backends: Vec<Arc<InMemoryRegistry>> = (0..6)
        .map(|i| {
            Arc::new(
                InMemoryRegistry::new(harbor(&format!("edge-{i}")))
                    .with_latency(Duration::from_millis(5)),
            )
        })
        .collect();
    let refs: Vec<&Arc<InMemoryRegistry>> = backends.iter().collect();
    let config = ExecutorConfig::builder().max_concurrent(2).build();

    let report = reconciler(&refs, config)
        .reconcile(&[ProjectSpec::global("p").with_member(Member::user("alice", "Developer"))])
        .await;

    assert!(report.is_fully_successful(), "{report:#?}");
    assert_eq!(report.units.len(), 12);
    let labels: Vec<String> = report.units.iter().map(|u| u.label()).collect();
    assert_eq!(labels[0], "edge-0");
    assert_eq!(labels[6], "edge-0/p");
    for backend in &backends {
        assert_eq!(
            backend.operations(),
            ops(&["create_project p", "assign_member p alice Developer"])
        );
    }
}

#[test]
fn test_zero_concurrency_is_rejected() {
    let config = ExecutorConfig::builder().max_concurrent(0).build();
    let err = FleetReconciler::new(Vec::new(), config).unwrap_err();
    assert!(matches!(err, ReconcileError::InvalidConfig { .. }));
}
