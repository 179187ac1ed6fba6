//! End-to-end lifecycle scenarios driven through the public controller API
//! against the in-memory fake runner.

use kukeon::{
    ErrorKind,
    apischeme::parse_documents,
    controller::{
        Action, apply, bootstrap, create_cell, create_realm, create_space, create_stack,
        delete_realm, get_cell, get_realm, list_cells, list_spaces, purge_realm, refresh,
        start_cell, stop_cell,
    },
    model::{Cell, ContainerSpec, Realm, Space, Stack, State},
    runner::{CniDirectories, fake::FakeRunner},
};

fn workload(name: &str, image: &str) -> ContainerSpec {
    ContainerSpec {
        name: name.to_string(),
        image: image.to_string(),
        ..ContainerSpec::default()
    }
}

async fn build_hierarchy(runner: &FakeRunner) {
    create_realm(runner, Realm::new("r1")).await.expect("realm");
    create_space(runner, Space::new("s1", "r1")).await.expect("space");
    create_stack(runner, Stack::new("st1", "r1", "s1"))
        .await
        .expect("stack");

    let mut cell = Cell::new("c1", "r1", "s1", "st1");
    cell.spec.containers = vec![workload("web", "nginx:1.27"), workload("db", "postgres:17")];
    create_cell(runner, cell).await.expect("cell");
}

#[tokio::test]
async fn the_full_hierarchy_comes_up_and_cascades_away() {
    let runner = FakeRunner::new();
    build_hierarchy(&runner).await;

    assert!(runner.has_task("r1-s1-c1-web"));
    assert!(runner.has_task("r1-s1-c1-db"));

    let result = delete_realm(&runner, Realm::new("r1"), false, true)
        .await
        .expect("cascade delete");
    assert!(result.realm_deleted);
    assert_eq!(result.deleted.last().map(String::as_str), Some("namespace"));

    // After a cascade delete the children are gone.
    assert!(
        list_spaces(&runner, "r1")
            .await
            .expect("list spaces")
            .is_empty()
    );
    assert!(
        list_cells(&runner, "r1", "s1", "st1")
            .await
            .expect("list cells")
            .is_empty()
    );
    assert!(!runner.has_task("r1-s1-c1-web"));
}

#[tokio::test]
async fn created_entities_round_trip_through_get() {
    let runner = FakeRunner::new();
    let mut realm = Realm::new("r1");
    realm.spec.namespace = "n1".to_string();
    realm
        .metadata
        .labels
        .insert("team".to_string(), "storage".to_string());

    create_realm(&runner, realm).await.expect("create");

    let fetched = get_realm(&runner, Realm::new("r1")).await.expect("get");
    assert!(fetched.metadata_exists);
    assert!(fetched.cgroup_exists);
    assert!(fetched.namespace_exists);

    // Input survives modulo auto-populated labels and defaults.
    assert_eq!(fetched.realm.metadata.name, "r1");
    assert_eq!(fetched.realm.spec.namespace, "n1");
    assert_eq!(fetched.realm.spec.id, "r1");
    assert_eq!(fetched.realm.metadata.labels["team"], "storage");
    assert_eq!(fetched.realm.metadata.labels["realm"], "r1");
}

#[tokio::test]
async fn stop_and_restart_a_cell() {
    let runner = FakeRunner::new();
    build_hierarchy(&runner).await;

    let stopped = stop_cell(&runner, Cell::new("c1", "r1", "s1", "st1"))
        .await
        .expect("stop");
    assert!(stopped.stopped);
    assert!(!runner.has_task("r1-s1-c1-web"));

    let restarted = start_cell(&runner, Cell::new("c1", "r1", "s1", "st1"))
        .await
        .expect("restart");
    assert_eq!(restarted.started, vec!["web", "db"]);
    assert_eq!(restarted.cell.status.state, State::Ready);
    assert!(runner.has_task("r1-s1-c1-db"));
}

#[tokio::test]
async fn starting_a_running_cell_requires_a_stop_first() {
    let runner = FakeRunner::new();
    build_hierarchy(&runner).await;

    let err = start_cell(&runner, Cell::new("c1", "r1", "s1", "st1"))
        .await
        .expect_err("must refuse");
    assert_eq!(err.kind(), ErrorKind::CellHasRunningContainers);

    stop_cell(&runner, Cell::new("c1", "r1", "s1", "st1"))
        .await
        .expect("stop");
    start_cell(&runner, Cell::new("c1", "r1", "s1", "st1"))
        .await
        .expect("start after stop");
}

#[tokio::test]
async fn bootstrap_then_apply_then_refresh() {
    let runner = FakeRunner::new();

    let report = bootstrap(&runner, CniDirectories::default())
        .await
        .expect("bootstrap");
    assert!(report.created_any());

    let input = r#"
kind: Stack
metadata:
  name: web-tier
spec:
  realmId: kukeon
  spaceId: kukeon
---
kind: Cell
metadata:
  name: edge
spec:
  realmId: kukeon
  spaceId: kukeon
  stackId: web-tier
  containers:
    - name: proxy
      image: envoy:1.31
"#;
    let documents = parse_documents(input).expect("parse");
    let applied = apply(&runner, documents).await.expect("apply");
    assert_eq!(applied.failed_count(), 0);
    assert!(runner.has_task("kukeon-kukeon-edge-proxy"));

    // Kill the proxy behind the controller's back; refresh writes the drift
    // back into metadata.
    runner.remove_task("kukeon-kukeon-edge-proxy");
    let refreshed = refresh(&runner).await.expect("refresh");
    assert!(
        refreshed
            .updated
            .contains(&"kukeon/kukeon/web-tier/edge".to_string())
    );

    let cell = get_cell(&runner, Cell::new("edge", "kukeon", "kukeon", "web-tier"))
        .await
        .expect("get cell");
    assert_eq!(
        cell.cell.container_state("proxy").map(|entry| entry.state),
        Some(State::Stopped)
    );
}

#[tokio::test]
async fn purge_recovers_a_realm_that_lost_its_metadata() {
    let runner = FakeRunner::new();
    build_hierarchy(&runner).await;

    // Force-delete the realm: children become orphans.
    delete_realm(&runner, Realm::new("r1"), true, false)
        .await
        .expect("force delete");
    runner.add_cni_residue("r1-s1");
    runner.add_orphaned_task("r1-s1-c1-web");

    let result = purge_realm(&runner, Realm::new("r1"), true, false)
        .await
        .expect("purge");

    assert!(!result.metadata_existed);
    assert!(result.purged.contains(&"cni-resources".to_string()));
    assert!(result.purged.contains(&"orphaned-containers".to_string()));
}

#[tokio::test]
async fn every_entry_point_closes_the_runner_exactly_once() {
    let runner = FakeRunner::new();

    create_realm(&runner, Realm::new("r1")).await.expect("create");
    assert_eq!(runner.close_count(), 1);

    get_realm(&runner, Realm::new("r1")).await.expect("get");
    assert_eq!(runner.close_count(), 2);

    // Errors close too.
    create_space(&runner, Space::new("s1", "ghost"))
        .await
        .expect_err("missing parent");
    assert_eq!(runner.close_count(), 3);

    refresh(&runner).await.expect("refresh");
    assert_eq!(runner.close_count(), 4);
}

#[tokio::test]
async fn parent_mismatches_name_the_run_path() {
    let run_dir = tempfile::tempdir().expect("tempdir");
    let runner = FakeRunner::with_run_path(run_dir.path());
    build_hierarchy(&runner).await;
    create_stack(&runner, Stack::new("st2", "r1", "s1"))
        .await
        .expect("second stack");

    let err = get_cell(&runner, Cell::new("c1", "r1", "s1", "st2"))
        .await
        .expect_err("cell lives under st1");

    assert_eq!(err.kind(), ErrorKind::GetCell);
    assert!(err.has_kind(ErrorKind::ParentMismatch));
    let cause = err.cause().expect("wrapped cause").to_string();
    assert!(cause.contains(&run_dir.path().display().to_string()));
}

#[tokio::test]
async fn apply_results_use_lowercase_action_labels() {
    let runner = FakeRunner::new();
    let documents = parse_documents("kind: Realm\nmetadata:\n  name: r1\n").expect("parse");

    let result = apply(&runner, documents).await.expect("apply");

    assert_eq!(result.resources[0].action, Action::Created);
    assert_eq!(result.resources[0].action.to_string(), "created");
    assert_eq!(Action::Unchanged.to_string(), "unchanged");
    assert_eq!(Action::Failed.to_string(), "failed");
}
