//! Executor unit tests

use drydock::db::models::TargetKind;
use drydock::deploy::compose::ComposeExecutor;
use drydock::deploy::{executor_for, DeploymentResult, Executor};
use drydock::settings::{ComposeSettings, Settings};

#[test]
fn test_executor_selection_follows_target() {
    let mut settings = Settings::default();
    assert_eq!(executor_for(&settings).target(), TargetKind::Helm);

    settings.target = TargetKind::Compose;
    assert_eq!(executor_for(&settings).target(), TargetKind::Compose);
}

#[tokio::test]
async fn test_compose_rollback_without_previous_is_terminal() {
    let executor = ComposeExecutor::new(ComposeSettings::default());

    let result = executor.rollback(None, None).await;
    assert!(!result.is_success());
    assert!(result.error.is_some());
    // No revision to report when nothing was attempted.
    assert_eq!(result.revision, None);
}

#[test]
fn test_result_revision_is_optional() {
    let plain = DeploymentResult::success("applied");
    assert_eq!(plain.revision, None);

    let with_rev = DeploymentResult::success("applied").with_revision(Some(12));
    assert_eq!(with_rev.revision, Some(12));
}
