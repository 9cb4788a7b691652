//! Settings loading unit tests

use std::io::Write;
use std::path::Path;

use drydock::db::models::TargetKind;
use drydock::settings::Settings;

#[tokio::test]
async fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "target": "compose",
            "poll_interval_secs": 5,
            "compose": {{ "project_name": "storefront" }}
        }}"#
    )
    .unwrap();

    let settings = Settings::load(Some(file.path())).await.unwrap();
    assert_eq!(settings.target, TargetKind::Compose);
    assert_eq!(settings.poll_interval_secs, 5);
    assert_eq!(settings.compose.project_name, "storefront");
    // Unset fields keep their defaults.
    assert_eq!(settings.heartbeat_interval_secs, 60);
}

#[tokio::test]
async fn test_load_missing_file_is_an_error() {
    let result = Settings::load(Some(Path::new("/nonexistent/drydock.json"))).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_load_without_path_uses_defaults() {
    let settings = Settings::load(None).await.unwrap();
    assert_eq!(settings.poll_interval_secs, 30);
    assert_eq!(settings.target, TargetKind::Helm);
}
