//! Integration tests for the CLI execution layer.
//!
//! These drive the command implementations against a real project
//! directory (tempdir + `.gantry/`), exercising the same wiring the
//! binary uses: JSON input files in, catalog file out.

use gantry::app::App;
use gantry::catalog::ResourceCatalog;
use gantry::cli::execute;
use gantry::cli::{
    AnalyzeArgs, HealOrderArgs, ImpactArgs, ListArgs, PhaseAction, PhaseArgs, RegisterArgs,
    ShowArgs, StatsArgs,
};
use gantry::commands::init;
use gantry::domain::{ResourceId, ResourceState};
use gantry::output::OutputMode;
use std::path::Path;
use tempfile::TempDir;

/// A temp directory with an initialized gantry project.
async fn project() -> TempDir {
    let temp = TempDir::new().expect("failed to create temp directory");
    init::init(temp.path()).await.unwrap();
    temp
}

async fn write_file(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    tokio::fs::write(&path, content).await.unwrap();
    path
}

const DISCOVERY_BATCH: &str = r#"[
  {"resource_id": "vpc-1", "resource_type": "network::vpc", "phase": "net"},
  {"resource_id": "subnet-1", "resource_type": "network::subnet", "phase": "net",
   "metadata": {"vpc_id": "vpc-1"}},
  {"resource_id": "svc-1", "resource_type": "compute::service", "phase": "compute",
   "metadata": {"subnet_id": "subnet-1"}}
]"#;

async fn register_batch(project: &TempDir) {
    let file = write_file(project.path(), "discovered.json", DISCOVERY_BATCH).await;
    let mut app = App::from_directory(project.path()).await.unwrap();
    execute::execute_register(&mut app, &RegisterArgs { file }, OutputMode::Text)
        .await
        .unwrap();
}

#[tokio::test]
async fn register_persists_across_sessions() {
    let project = project().await;
    register_batch(&project).await;

    // A fresh App sees the registered fleet from the catalog file.
    let app = App::from_directory(project.path()).await.unwrap();
    let record = app
        .catalog()
        .get(&ResourceId::new("subnet-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.resource_type, "network::subnet");
    assert_eq!(record.state, ResourceState::Healthy);

    let deps = app
        .catalog()
        .dependencies(&ResourceId::new("subnet-1"))
        .await
        .unwrap();
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0].target_id.as_str(), "vpc-1");
}

#[tokio::test]
async fn register_accepts_single_observation() {
    let project = project().await;
    let file = write_file(
        project.path(),
        "one.json",
        r#"{"resource_id": "vpc-9", "resource_type": "network::vpc"}"#,
    )
    .await;
    let mut app = App::from_directory(project.path()).await.unwrap();
    execute::execute_register(&mut app, &RegisterArgs { file }, OutputMode::Text)
        .await
        .unwrap();

    assert!(app
        .catalog()
        .get(&ResourceId::new("vpc-9"))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn register_rejects_invalid_record() {
    let project = project().await;
    let file = write_file(
        project.path(),
        "bad.json",
        r#"{"resource_id": "", "resource_type": "network::vpc"}"#,
    )
    .await;
    let mut app = App::from_directory(project.path()).await.unwrap();
    let result =
        execute::execute_register(&mut app, &RegisterArgs { file }, OutputMode::Text).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn list_show_impact_and_stats_flow() {
    let project = project().await;
    register_batch(&project).await;
    let app = App::from_directory(project.path()).await.unwrap();

    execute::execute_list(
        &app,
        &ListArgs {
            state: None,
            phase: Some("net".to_string()),
            resource_type: None,
            limit: 50,
        },
        OutputMode::Json,
    )
    .await
    .unwrap();

    execute::execute_show(
        &app,
        &ShowArgs {
            resource_id: "subnet-1".to_string(),
        },
        OutputMode::Text,
    )
    .await
    .unwrap();

    execute::execute_impact(
        &app,
        &ImpactArgs {
            resource_id: "vpc-1".to_string(),
        },
        OutputMode::Json,
    )
    .await
    .unwrap();

    execute::execute_stats(&app, &StatsArgs {}, OutputMode::Text)
        .await
        .unwrap();
}

#[tokio::test]
async fn show_unknown_resource_fails() {
    let project = project().await;
    let app = App::from_directory(project.path()).await.unwrap();
    let result = execute::execute_show(
        &app,
        &ShowArgs {
            resource_id: "ghost-1".to_string(),
        },
        OutputMode::Text,
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn analyze_marks_drift_and_heal_order_uses_it() {
    let project = project().await;
    register_batch(&project).await;

    let findings = write_file(
        project.path(),
        "findings.json",
        r#"[
          {"resource_id": "subnet-1", "resource_type": "network::subnet",
           "drift_type": "tag_missing"},
          {"resource_id": "svc-1", "resource_type": "compute::service",
           "drift_type": "security_group_changed"}
        ]"#,
    )
    .await;

    let mut app = App::from_directory(project.path()).await.unwrap();
    execute::execute_analyze(&mut app, &AnalyzeArgs { file: findings }, OutputMode::Json)
        .await
        .unwrap();

    // Drift survived the save: a fresh session still sees it.
    let app = App::from_directory(project.path()).await.unwrap();
    let record = app
        .catalog()
        .get(&ResourceId::new("subnet-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.state, ResourceState::Drift);

    // heal-order with no targets picks up both drifted resources, in
    // dependency order.
    execute::execute_heal_order(
        &app,
        &HealOrderArgs {
            resource_ids: vec![],
        },
        OutputMode::Json,
    )
    .await
    .unwrap();

    let graph = app.graph();
    let graph = graph.read().await;
    let order = graph.get_healing_order(None);
    assert_eq!(
        order.order,
        vec![ResourceId::new("subnet-1"), ResourceId::new("svc-1")]
    );
}

#[tokio::test]
async fn phase_delete_without_yes_only_previews() {
    let project = project().await;
    register_batch(&project).await;

    let mut app = App::from_directory(project.path()).await.unwrap();
    execute::execute_phase(
        &mut app,
        &PhaseArgs {
            action: PhaseAction::Delete {
                phase: "compute".to_string(),
                force: false,
                yes: false,
                timeout_secs: None,
            },
        },
        OutputMode::Text,
    )
    .await
    .unwrap();

    // Preview only: nothing was deleted.
    let record = app
        .catalog()
        .get(&ResourceId::new("svc-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.state, ResourceState::Healthy);
}

#[tokio::test]
async fn phase_delete_with_yes_soft_deletes() {
    let project = project().await;
    register_batch(&project).await;

    let mut app = App::from_directory(project.path()).await.unwrap();
    execute::execute_phase(
        &mut app,
        &PhaseArgs {
            action: PhaseAction::Delete {
                phase: "compute".to_string(),
                force: false,
                yes: true,
                timeout_secs: None,
            },
        },
        OutputMode::Json,
    )
    .await
    .unwrap();

    // Soft delete persisted across sessions.
    let app = App::from_directory(project.path()).await.unwrap();
    let record = app
        .catalog()
        .get(&ResourceId::new("svc-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.state, ResourceState::Deleted);
    assert!(record.expires_at.is_some());
}

#[tokio::test]
async fn phase_delete_blocked_leaves_state_alone() {
    let project = project().await;
    register_batch(&project).await;

    let mut app = App::from_directory(project.path()).await.unwrap();
    execute::execute_phase(
        &mut app,
        &PhaseArgs {
            action: PhaseAction::Delete {
                phase: "net".to_string(),
                force: false,
                yes: true,
                timeout_secs: None,
            },
        },
        OutputMode::Json,
    )
    .await
    .unwrap();

    // svc-1 (phase compute) depends on subnet-1, so nothing in "net" moved.
    let app = App::from_directory(project.path()).await.unwrap();
    for id in ["vpc-1", "subnet-1"] {
        let record = app.catalog().get(&ResourceId::new(id)).await.unwrap().unwrap();
        assert_eq!(record.state, ResourceState::Healthy);
    }
}
