//! Reconciliation and lifecycle primitives for cells, the unit that actually
//! runs workloads.

use snafu::ResultExt;

use crate::{
    controller::{close_runner, created},
    error::{
        CheckCgroupExistsSnafu, CheckRootContainerExistsSnafu, CreateCellSnafu, DeleteCellSnafu,
        Error, GetCellSnafu, PurgeCellSnafu, Result, StartCellSnafu, StopCellSnafu,
    },
    model::{Cell, CgroupScope, HasMetadata, State},
    runner::Runner,
};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CreateCellResult {
    pub cell: Cell,
    pub metadata_exists_pre: bool,
    pub metadata_exists_post: bool,
    pub cgroup_exists_pre: bool,
    pub cgroup_exists_post: bool,
    pub root_container_exists_pre: bool,
    pub root_container_exists_post: bool,
    pub created: bool,
    pub cgroup_created: bool,
    pub root_container_created: bool,
    /// Names of the workload containers started by this call.
    pub started: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GetCellResult {
    pub cell: Cell,
    pub metadata_exists: bool,
    pub cgroup_exists: bool,
    pub root_container_exists: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StartCellResult {
    pub cell: Cell,
    pub started: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StopCellResult {
    pub cell: Cell,
    pub stopped: bool,
    pub stopped_containers: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeleteCellResult {
    pub cell: Cell,
    pub cell_deleted: bool,
    pub deleted: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PurgeCellResult {
    pub cell: Cell,
    pub metadata_existed: bool,
    pub cell_deleted: bool,
    pub deleted: Vec<String>,
    pub purged: Vec<String>,
}

pub async fn create_cell<R: Runner + ?Sized>(runner: &R, cell: Cell) -> Result<CreateCellResult> {
    let result = create_cell_inner(runner, cell).await;
    close_runner(runner).await;
    result
}

pub async fn get_cell<R: Runner + ?Sized>(runner: &R, cell: Cell) -> Result<GetCellResult> {
    let result = get_cell_inner(runner, cell).await;
    close_runner(runner).await;
    result
}

pub async fn list_cells<R: Runner + ?Sized>(
    runner: &R,
    realm: &str,
    space: &str,
    stack: &str,
) -> Result<Vec<Cell>> {
    let result = runner
        .list_cells(realm.trim(), space.trim(), stack.trim())
        .await;
    close_runner(runner).await;
    result
}

pub async fn start_cell<R: Runner + ?Sized>(runner: &R, cell: Cell) -> Result<StartCellResult> {
    let result = start_cell_inner(runner, cell).await;
    close_runner(runner).await;
    result
}

pub async fn stop_cell<R: Runner + ?Sized>(runner: &R, cell: Cell) -> Result<StopCellResult> {
    let result = stop_cell_inner(runner, cell).await;
    close_runner(runner).await;
    result
}

pub async fn delete_cell<R: Runner + ?Sized>(
    runner: &R,
    cell: Cell,
    force: bool,
    cascade: bool,
) -> Result<DeleteCellResult> {
    let result = delete_cell_inner(runner, cell, force, cascade).await;
    close_runner(runner).await;
    result
}

pub async fn purge_cell<R: Runner + ?Sized>(
    runner: &R,
    cell: Cell,
    force: bool,
    cascade: bool,
) -> Result<PurgeCellResult> {
    let result = purge_cell_inner(runner, cell, force, cascade).await;
    close_runner(runner).await;
    result
}

/// The Ready-cell state machine guard shared by start and create.
///
/// A Ready cell with an empty container status list is stale metadata; a
/// Ready cell with any running container must be stopped first. Any other
/// state, or Ready with every container Stopped/Unknown, may proceed.
pub(crate) fn check_start_guards(cell: &Cell) -> Result<()> {
    if cell.status.state == State::Ready {
        if cell.status.containers.is_empty() {
            return Err(Error::CellAlreadyReady {
                name: cell.name().to_string(),
            });
        }
        if cell.has_running_containers() {
            return Err(Error::CellHasRunningContainers {
                name: cell.name().to_string(),
            });
        }
    }
    Ok(())
}

/// Starts every workload of the cell, requires all of them to come up Ready
/// and persists the `Ready` status transition.
async fn run_start_pipeline<R: Runner + ?Sized>(
    runner: &R,
    cell: Cell,
) -> Result<(Cell, Vec<String>)> {
    let name = cell.name().to_string();
    let mut started = runner.start_cell(cell).await?;

    for spec in &started.spec.containers {
        let ready = started
            .container_state(&spec.name)
            .is_some_and(|entry| entry.state == State::Ready);
        if !ready {
            return Err(Error::ContainerNotReady {
                cell: name,
                container: spec.name.clone(),
            });
        }
    }

    started.status.state = State::Ready;
    let persisted = runner.update_cell_metadata(started).await?;
    let names = persisted
        .spec
        .containers
        .iter()
        .map(|spec| spec.name.clone())
        .collect();
    Ok((persisted, names))
}

pub(crate) async fn create_cell_inner<R: Runner + ?Sized>(
    runner: &R,
    mut cell: Cell,
) -> Result<CreateCellResult> {
    cell.admit()?;
    let name = cell.name().to_string();
    do_create_cell(runner, cell)
        .await
        .context(CreateCellSnafu { name })
}

async fn do_create_cell<R: Runner + ?Sized>(runner: &R, cell: Cell) -> Result<CreateCellResult> {
    let name = cell.name().to_string();
    let mut metadata_exists_pre = false;
    let mut cgroup_exists_pre = false;
    let mut root_container_exists_pre = false;

    let reconciled = match runner.get_cell(cell.clone()).await {
        Ok(found) => {
            metadata_exists_pre = true;
            cgroup_exists_pre = runner
                .exists_cgroup(CgroupScope::from(found.clone()))
                .await
                .context(CheckCgroupExistsSnafu {
                    path: found.status.cgroup_path.clone(),
                })?;
            root_container_exists_pre = runner
                .exists_cell_root_container(found.clone())
                .await
                .context(CheckRootContainerExistsSnafu { cell: name.clone() })?;
            tracing::debug!(
                cell = %name,
                cgroup = cgroup_exists_pre,
                root_container = root_container_exists_pre,
                "cell metadata present, ensuring runtime resources"
            );
            runner.ensure_cell(found).await?
        }
        Err(error) if error.is_not_found() => {
            tracing::info!(
                cell = %name,
                realm = %cell.spec.realm_name,
                space = %cell.spec.space_name,
                stack = %cell.spec.stack_name,
                "creating cell"
            );
            runner.create_cell(cell).await?
        }
        Err(error) => return Err(error),
    };

    // A Ready cell whose declared workloads are running (or that declares
    // none) has reached its goal; everything else goes through the start
    // pipeline.
    let goal_reached = reconciled.status.state == State::Ready
        && (reconciled.spec.containers.is_empty() || reconciled.has_running_containers());
    let (cell, started) = if goal_reached {
        (reconciled, Vec::new())
    } else {
        check_start_guards(&reconciled)?;
        run_start_pipeline(runner, reconciled).await?
    };

    Ok(CreateCellResult {
        created: created(metadata_exists_pre, true),
        cgroup_created: created(cgroup_exists_pre, true),
        root_container_created: created(root_container_exists_pre, true),
        metadata_exists_pre,
        metadata_exists_post: true,
        cgroup_exists_pre,
        cgroup_exists_post: true,
        root_container_exists_pre,
        root_container_exists_post: true,
        started,
        cell,
    })
}

pub(crate) async fn get_cell_inner<R: Runner + ?Sized>(
    runner: &R,
    mut cell: Cell,
) -> Result<GetCellResult> {
    cell.admit()?;
    let name = cell.name().to_string();
    do_get_cell(runner, cell)
        .await
        .context(GetCellSnafu { name })
}

async fn do_get_cell<R: Runner + ?Sized>(runner: &R, cell: Cell) -> Result<GetCellResult> {
    let requested_stack = cell.spec.stack_name.clone();
    let requested_space = cell.spec.space_name.clone();
    let (metadata_exists, observed) = match runner.get_cell(cell.clone()).await {
        Ok(found) => (true, found),
        Err(error) if error.is_not_found() => (false, cell),
        Err(error) => return Err(error),
    };

    if metadata_exists {
        if observed.spec.stack_name != requested_stack {
            return Err(Error::ParentMismatch {
                kind: "cell".to_string(),
                name: observed.metadata.name.clone(),
                field: "stack".to_string(),
                requested: requested_stack,
                found: observed.spec.stack_name.clone(),
                run_path: runner.run_path().display().to_string(),
            });
        }
        if observed.spec.space_name != requested_space {
            return Err(Error::ParentMismatch {
                kind: "cell".to_string(),
                name: observed.metadata.name.clone(),
                field: "space".to_string(),
                requested: requested_space,
                found: observed.spec.space_name.clone(),
                run_path: runner.run_path().display().to_string(),
            });
        }
    }

    let cgroup_exists = runner
        .exists_cgroup(CgroupScope::from(observed.clone()))
        .await
        .context(CheckCgroupExistsSnafu {
            path: observed.status.cgroup_path.clone(),
        })?;
    let root_container_exists = runner
        .exists_cell_root_container(observed.clone())
        .await
        .context(CheckRootContainerExistsSnafu {
            cell: observed.metadata.name.clone(),
        })?;

    Ok(GetCellResult {
        cell: observed,
        metadata_exists,
        cgroup_exists,
        root_container_exists,
    })
}

pub(crate) async fn start_cell_inner<R: Runner + ?Sized>(
    runner: &R,
    mut cell: Cell,
) -> Result<StartCellResult> {
    cell.admit()?;
    let name = cell.name().to_string();

    let found = runner
        .get_cell(cell)
        .await
        .context(GetCellSnafu { name: name.clone() })?;

    // Guard failures surface unwrapped so the refusal names the cell
    // directly.
    check_start_guards(&found)?;

    tracing::info!(cell = %name, "starting cell");
    let (cell, started) = run_start_pipeline(runner, found)
        .await
        .context(StartCellSnafu { name })?;
    Ok(StartCellResult { cell, started })
}

pub(crate) async fn stop_cell_inner<R: Runner + ?Sized>(
    runner: &R,
    mut cell: Cell,
) -> Result<StopCellResult> {
    cell.admit()?;
    let name = cell.name().to_string();

    let found = runner
        .get_cell(cell)
        .await
        .context(GetCellSnafu { name: name.clone() })?;

    do_stop_cell(runner, found)
        .await
        .context(StopCellSnafu { name })
}

async fn do_stop_cell<R: Runner + ?Sized>(runner: &R, found: Cell) -> Result<StopCellResult> {
    if found.status.state == State::Stopped && !found.has_running_containers() {
        return Ok(StopCellResult {
            cell: found,
            stopped: false,
            stopped_containers: Vec::new(),
        });
    }

    tracing::info!(cell = %found.name(), "stopping cell");
    let mut stopped = runner.stop_cell(found).await?;
    stopped.status.state = State::Stopped;
    stopped.record_container_states(State::Stopped);
    let persisted = runner.update_cell_metadata(stopped).await?;
    let stopped_containers = persisted
        .spec
        .containers
        .iter()
        .map(|spec| spec.name.clone())
        .collect();

    Ok(StopCellResult {
        cell: persisted,
        stopped: true,
        stopped_containers,
    })
}

pub(crate) async fn delete_cell_inner<R: Runner + ?Sized>(
    runner: &R,
    mut cell: Cell,
    force: bool,
    cascade: bool,
) -> Result<DeleteCellResult> {
    cell.admit()?;
    let name = cell.name().to_string();
    do_delete_cell(runner, cell, force, cascade)
        .await
        .context(DeleteCellSnafu { name })
}

async fn do_delete_cell<R: Runner + ?Sized>(
    runner: &R,
    cell: Cell,
    force: bool,
    cascade: bool,
) -> Result<DeleteCellResult> {
    let mut found = runner.get_cell(cell).await?;
    let name = found.name().to_string();
    let mut deleted = Vec::new();

    if cascade {
        let names: Vec<_> = found
            .spec
            .containers
            .iter()
            .map(|spec| spec.name.clone())
            .collect();
        for child in names {
            found = runner.delete_container(found, child.clone()).await?;
            deleted.push(format!("container:{child}"));
        }
    } else if !force && !found.spec.containers.is_empty() {
        return Err(Error::ResourceHasDependencies {
            kind: "cell".to_string(),
            name,
            count: found.spec.containers.len(),
            child_kind: "container".to_string(),
        });
    }

    tracing::info!(cell = %name, force, cascade, "deleting cell");
    runner.delete_cell(found.clone()).await?;
    deleted.push("metadata".to_string());
    deleted.push("cgroup".to_string());
    deleted.push("root-container".to_string());

    Ok(DeleteCellResult {
        cell: found,
        cell_deleted: true,
        deleted,
    })
}

pub(crate) async fn purge_cell_inner<R: Runner + ?Sized>(
    runner: &R,
    mut cell: Cell,
    force: bool,
    cascade: bool,
) -> Result<PurgeCellResult> {
    cell.admit()?;
    let name = cell.name().to_string();
    do_purge_cell(runner, cell, force, cascade)
        .await
        .context(PurgeCellSnafu { name })
}

async fn do_purge_cell<R: Runner + ?Sized>(
    runner: &R,
    cell: Cell,
    force: bool,
    cascade: bool,
) -> Result<PurgeCellResult> {
    let name = cell.name().to_string();
    let mut deleted = Vec::new();
    let mut purged = Vec::new();

    let found = match runner.get_cell(cell.clone()).await {
        Ok(found) => Some(found),
        Err(error) if error.is_not_found() => None,
        Err(error) => return Err(error),
    };
    let metadata_existed = found.is_some();

    if let Some(mut found) = found.clone() {
        if cascade {
            let names: Vec<_> = found
                .spec
                .containers
                .iter()
                .map(|spec| spec.name.clone())
                .collect();
            for child in names {
                found = runner.delete_container(found, child.clone()).await?;
                deleted.push(format!("container:{child}"));
            }
        } else if !force && !found.spec.containers.is_empty() {
            return Err(Error::ResourceHasDependencies {
                kind: "cell".to_string(),
                name,
                count: found.spec.containers.len(),
                child_kind: "container".to_string(),
            });
        }

        runner.delete_cell(found.clone()).await?;
        deleted.push("metadata".to_string());
        deleted.push("cgroup".to_string());
        deleted.push("root-container".to_string());
    }

    match runner.purge_cell(cell.clone()).await {
        Ok(entries) => purged.extend(entries),
        Err(error) => {
            tracing::warn!(cell = %cell.name(), %error, "purge left residue behind");
            purged.push(format!("purge-error:{error}"));
        }
    }

    Ok(PurgeCellResult {
        cell: found.unwrap_or(cell),
        metadata_existed,
        cell_deleted: metadata_existed,
        deleted,
        purged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ErrorKind,
        model::{ContainerSpec, Realm, Space, Stack},
        runner::fake::FakeRunner,
    };

    fn seeded_runner() -> FakeRunner {
        let runner = FakeRunner::new();
        let mut realm = Realm::new("r1");
        realm.admit().expect("realm admission");
        runner.seed_realm(realm);
        let mut space = Space::new("s1", "r1");
        space.admit().expect("space admission");
        runner.seed_space(space);
        let mut stack = Stack::new("st1", "r1", "s1");
        stack.admit().expect("stack admission");
        runner.seed_stack(stack);
        runner
    }

    fn cell_with_workload(name: &str) -> Cell {
        let mut cell = Cell::new(name, "r1", "s1", "st1");
        cell.spec.containers = vec![ContainerSpec {
            name: "web".to_string(),
            image: "nginx:1.27".to_string(),
            ..ContainerSpec::default()
        }];
        cell
    }

    #[tokio::test]
    async fn create_cell_starts_all_containers() {
        let runner = seeded_runner();

        let result = create_cell(&runner, cell_with_workload("c1"))
            .await
            .expect("create should succeed");

        assert!(result.created);
        assert!(result.cgroup_created);
        assert!(result.root_container_created);
        assert_eq!(result.started, vec!["web"]);
        assert_eq!(result.cell.status.state, State::Ready);
        assert!(runner.has_task("r1-s1-c1-web"));

        let persisted = runner.cell("r1", "s1", "st1", "c1").expect("cell persisted");
        assert_eq!(persisted.status.state, State::Ready);
    }

    #[tokio::test]
    async fn create_cell_requires_the_parent_stack() {
        let runner = FakeRunner::new();

        let err = create_cell(&runner, Cell::new("c1", "r1", "s1", "ghost"))
            .await
            .expect_err("must fail");

        assert_eq!(err.kind(), ErrorKind::CreateCell);
        assert!(err.has_kind(ErrorKind::StackNotFound));
    }

    #[tokio::test]
    async fn create_of_a_running_cell_is_idempotent() {
        let runner = seeded_runner();
        create_cell(&runner, cell_with_workload("c1"))
            .await
            .expect("first create");

        let second = create_cell(&runner, cell_with_workload("c1"))
            .await
            .expect("second create");

        assert!(!second.created);
        assert!(second.started.is_empty(), "running workloads are left alone");
    }

    #[tokio::test]
    async fn start_refuses_a_ready_cell_with_running_containers() {
        let runner = seeded_runner();
        let mut cell = cell_with_workload("cell-x");
        cell.admit().expect("cell admission");
        cell.status.state = State::Ready;
        cell.record_container_states(State::Ready);
        runner.seed_cell(cell);

        let err = start_cell(&runner, Cell::new("cell-x", "r1", "s1", "st1"))
            .await
            .expect_err("must refuse");

        assert_eq!(err.kind(), ErrorKind::CellHasRunningContainers);
        assert!(
            err.to_string()
                .contains("cell \"cell-x\" has running containers and must first be stopped")
        );
        assert_eq!(runner.call_count("start_cell"), 0);
    }

    #[tokio::test]
    async fn start_refuses_a_ready_cell_with_stale_status() {
        let runner = seeded_runner();
        let mut cell = Cell::new("c1", "r1", "s1", "st1");
        cell.admit().expect("cell admission");
        cell.status.state = State::Ready;
        runner.seed_cell(cell);

        let err = start_cell(&runner, Cell::new("c1", "r1", "s1", "st1"))
            .await
            .expect_err("must refuse");

        assert_eq!(err.kind(), ErrorKind::CellAlreadyReady);
        assert!(
            err.to_string()
                .contains("cell \"c1\" is already in Ready state and must first be stopped")
        );
    }

    #[tokio::test]
    async fn start_proceeds_when_ready_containers_are_all_stopped() {
        let runner = seeded_runner();
        let mut cell = cell_with_workload("c1");
        cell.admit().expect("cell admission");
        cell.status.state = State::Ready;
        cell.record_container_states(State::Stopped);
        runner.seed_cell(cell);
        runner.remove_task("r1-s1-c1-web");

        let result = start_cell(&runner, Cell::new("c1", "r1", "s1", "st1"))
            .await
            .expect("restart should succeed");

        assert_eq!(result.started, vec!["web"]);
        assert!(runner.has_task("r1-s1-c1-web"));
    }

    #[tokio::test]
    async fn stop_cell_tears_down_tasks_and_keeps_metadata() {
        let runner = seeded_runner();
        create_cell(&runner, cell_with_workload("c1"))
            .await
            .expect("create");

        let result = stop_cell(&runner, Cell::new("c1", "r1", "s1", "st1"))
            .await
            .expect("stop");

        assert!(result.stopped);
        assert_eq!(result.stopped_containers, vec!["web"]);
        assert!(!runner.has_task("r1-s1-c1-web"));

        let persisted = runner.cell("r1", "s1", "st1", "c1").expect("cell persisted");
        assert_eq!(persisted.status.state, State::Stopped);
    }

    #[tokio::test]
    async fn stop_of_a_stopped_cell_is_a_no_op() {
        let runner = seeded_runner();
        create_cell(&runner, cell_with_workload("c1"))
            .await
            .expect("create");
        stop_cell(&runner, Cell::new("c1", "r1", "s1", "st1"))
            .await
            .expect("first stop");

        let second = stop_cell(&runner, Cell::new("c1", "r1", "s1", "st1"))
            .await
            .expect("second stop");

        assert!(!second.stopped);
        assert!(second.stopped_containers.is_empty());
    }

    #[tokio::test]
    async fn get_cell_reports_a_stack_mismatch() {
        let runner = seeded_runner();
        let mut other = Stack::new("st2", "r1", "s1");
        other.admit().expect("stack admission");
        runner.seed_stack(other);
        let mut cell = Cell::new("c1", "r1", "s1", "st1");
        cell.admit().expect("cell admission");
        runner.seed_cell(cell);

        let err = get_cell(&runner, Cell::new("c1", "r1", "s1", "st2"))
            .await
            .expect_err("must report the mismatch");

        assert!(err.has_kind(ErrorKind::ParentMismatch));
        let cause = err.cause().expect("wrapped cause").to_string();
        assert!(cause.contains("st1"));
        assert!(cause.contains("st2"));
        assert!(cause.contains("kukeon"), "run path must be part of the message");
    }

    #[tokio::test]
    async fn delete_cell_cascades_over_containers() {
        let runner = seeded_runner();
        create_cell(&runner, cell_with_workload("c1"))
            .await
            .expect("create");

        let err = delete_cell(&runner, Cell::new("c1", "r1", "s1", "st1"), false, false)
            .await
            .expect_err("containers are dependencies");
        assert!(err.has_kind(ErrorKind::ResourceHasDependencies));

        let result = delete_cell(&runner, Cell::new("c1", "r1", "s1", "st1"), false, true)
            .await
            .expect("cascade delete");

        assert_eq!(
            result.deleted,
            vec!["container:web", "metadata", "cgroup", "root-container"]
        );
        assert!(runner.cell("r1", "s1", "st1", "c1").is_none());
        assert!(!runner.has_task("r1-s1-c1-web"));
    }

    #[tokio::test]
    async fn purge_cell_reaps_orphaned_tasks() {
        let runner = seeded_runner();
        let mut cell = cell_with_workload("c1");
        cell.admit().expect("cell admission");
        runner.seed_cell(cell);
        runner.add_orphaned_task("r1-s1-c1-stray");

        let result = purge_cell(&runner, Cell::new("c1", "r1", "s1", "st1"), false, true)
            .await
            .expect("purge");

        assert!(result.metadata_existed);
        assert_eq!(result.deleted[0], "container:web");
        assert!(result.purged.contains(&"orphaned-containers".to_string()));
        assert!(runner.cell("r1", "s1", "st1", "c1").is_none());
    }
}
