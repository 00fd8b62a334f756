//! # Environment Registry Unit Tests / 环境注册表单元测试
//!
//! Resolution behavior against an in-memory runtime: reuse-if-fresh,
//! staleness pruning, degradation on discovery failure, and the
//! diagnostics record of swallowed errors.

mod common;

use std::path::Path;
use std::time::Duration;

use common::{MockRuntime, test_config};
use gluatest_runner::core::models::PROJECT_MOUNT_TARGET;
use gluatest_runner::core::registry::{EnvironmentRegistry, RegistryError};

const DAY: Duration = Duration::from_secs(60 * 60 * 24);

#[tokio::test]
async fn reuses_fresh_environment_for_same_project() {
    let runtime = MockRuntime::new().with_environment("env-a", "/p", Duration::from_secs(60));
    let config = test_config(Path::new("/p"));
    let registry = EnvironmentRegistry::new(&runtime, &config);

    let resolution = registry.resolve().await.unwrap();

    assert_eq!(resolution.id, "env-a");
    assert!(resolution.reused);
    assert!(runtime.created().is_empty());
    assert!(runtime.pulled().is_empty());
}

/// Back-to-back resolves with no intervening mutation return the same
/// environment id: the first call creates, the second reuses.
#[tokio::test]
async fn back_to_back_resolves_do_not_duplicate() {
    let runtime = MockRuntime::new();
    let config = test_config(Path::new("/p"));
    let registry = EnvironmentRegistry::new(&runtime, &config);

    let first = registry.resolve().await.unwrap();
    let second = registry.resolve().await.unwrap();

    assert!(!first.reused);
    assert!(second.reused);
    assert_eq!(first.id, second.id);
    assert_eq!(runtime.created().len(), 1);
}

/// A stale environment is never reused and is removed as a side effect,
/// even when it belongs to the requested project.
#[tokio::test]
async fn stale_environment_is_pruned_not_reused() {
    let runtime = MockRuntime::new().with_environment("env-old", "/p", DAY * 2);
    let config = test_config(Path::new("/p"));
    let registry = EnvironmentRegistry::new(&runtime, &config);

    let resolution = registry.resolve().await.unwrap();

    assert_ne!(resolution.id, "env-old");
    assert!(!resolution.reused);
    assert_eq!(runtime.removed(), vec!["env-old".to_string()]);
}

/// Stale environments of *other* projects are pruned during the scan
/// too; pruning is a side effect of discovery, not of a match.
#[tokio::test]
async fn prunes_stale_environments_of_other_projects() {
    let runtime = MockRuntime::new()
        .with_environment("env-other", "/elsewhere", DAY * 3)
        .with_environment("env-mine", "/p", Duration::from_secs(60));
    let config = test_config(Path::new("/p"));
    let registry = EnvironmentRegistry::new(&runtime, &config);

    let resolution = registry.resolve().await.unwrap();

    assert_eq!(resolution.id, "env-mine");
    assert_eq!(runtime.removed(), vec!["env-other".to_string()]);
}

#[tokio::test]
async fn fresh_environment_of_other_project_is_left_alone() {
    let runtime = MockRuntime::new().with_environment("env-other", "/elsewhere", Duration::ZERO);
    let config = test_config(Path::new("/p"));
    let registry = EnvironmentRegistry::new(&runtime, &config);

    let resolution = registry.resolve().await.unwrap();

    assert!(!resolution.reused);
    assert!(runtime.removed().is_empty());
    assert_eq!(runtime.created().len(), 1);
}

#[tokio::test]
async fn unlabeled_containers_are_ignored() {
    let runtime = MockRuntime::new().with_unlabeled_environment("some-other-container");
    let config = test_config(Path::new("/p"));
    let registry = EnvironmentRegistry::new(&runtime, &config);

    let resolution = registry.resolve().await.unwrap();

    assert!(!resolution.reused);
    assert!(runtime.removed().is_empty());
}

/// Scenario: mount-only configuration, empty daemon. Exactly one create
/// call with a single read-only project mount and no optional mounts.
#[tokio::test]
async fn creates_with_read_only_project_mount_only() {
    let runtime = MockRuntime::new();
    let config = test_config(Path::new("/p"));
    let registry = EnvironmentRegistry::new(&runtime, &config);

    registry.resolve().await.unwrap();

    let created = runtime.created();
    assert_eq!(created.len(), 1);

    let spec = &created[0];
    assert_eq!(spec.mounts.len(), 1);
    assert_eq!(spec.mounts[0].source, Path::new("/p"));
    assert_eq!(spec.mounts[0].target, PROJECT_MOUNT_TARGET);
    assert!(spec.mounts[0].read_only);

    // Only the defaulted gamemode is injected; absent secrets are
    // omitted entirely.
    assert_eq!(spec.env, vec!["GAMEMODE=sandbox".to_string()]);
    assert_eq!(runtime.pulled().len(), 1);
}

/// Listing failure degrades to "nothing reusable" and is recorded in
/// the diagnostics rather than failing the run.
#[tokio::test]
async fn discovery_failure_degrades_to_create() {
    let mut runtime = MockRuntime::new();
    runtime.fail_list = true;
    let runtime = runtime.with_environment("env-a", "/p", Duration::from_secs(60));
    let config = test_config(Path::new("/p"));
    let registry = EnvironmentRegistry::new(&runtime, &config);

    let resolution = registry.resolve().await.unwrap();

    assert!(!resolution.reused);
    assert!(resolution.diagnostics.discovery_failure.is_some());
    assert_eq!(runtime.created().len(), 1);
}

/// A failed removal is swallowed: the scan continues, the run proceeds,
/// and the failure is visible in the diagnostics.
#[tokio::test]
async fn prune_failure_is_absorbed_and_reported() {
    let mut runtime = MockRuntime::new();
    runtime.fail_remove = true;
    let runtime = runtime
        .with_environment("env-stale", "/p", DAY * 2)
        .with_environment("env-fresh", "/p", Duration::from_secs(60));
    let config = test_config(Path::new("/p"));
    let registry = EnvironmentRegistry::new(&runtime, &config);

    let resolution = registry.resolve().await.unwrap();

    assert_eq!(resolution.id, "env-fresh");
    assert!(resolution.reused);
    assert_eq!(resolution.diagnostics.prune_failures.len(), 1);
    assert_eq!(resolution.diagnostics.prune_failures[0].id, "env-stale");
}

#[tokio::test]
async fn pull_failure_is_fatal() {
    let mut runtime = MockRuntime::new();
    runtime.fail_pull = true;
    let config = test_config(Path::new("/p"));
    let registry = EnvironmentRegistry::new(&runtime, &config);

    let error = registry.resolve().await.unwrap_err();
    assert!(matches!(error, RegistryError::ImagePull { .. }));
    assert!(runtime.created().is_empty());
}
