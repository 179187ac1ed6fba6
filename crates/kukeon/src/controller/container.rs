//! Reconciliation and lifecycle primitives for workload containers.
//!
//! Containers have no metadata document of their own: every operation here is
//! an edit of the owning cell's spec plus runtime-task effects, persisted
//! through `update_cell_metadata`.

use snafu::ResultExt;

use crate::{
    controller::{cell::check_start_guards, close_runner, created},
    error::{
        CreateContainerSnafu, DeleteContainerSnafu, Error, GetCellSnafu, GetContainerSnafu,
        PurgeContainerSnafu, Result, StartContainerSnafu, StopContainerSnafu,
    },
    model::{Cell, Container, ContainerSpec, HasMetadata, State},
    runner::Runner,
};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CreateContainerResult {
    pub cell: Cell,
    pub container: ContainerSpec,
    pub metadata_exists_pre: bool,
    pub metadata_exists_post: bool,
    pub created: bool,
    /// Whether an existing spec was rewritten with different contents.
    pub changed: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GetContainerResult {
    pub container: Container,
    pub metadata_exists: bool,
    pub running: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StartContainerResult {
    pub cell: Cell,
    pub container: String,
    pub started: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StopContainerResult {
    pub cell: Cell,
    pub container: String,
    pub stopped: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeleteContainerResult {
    pub cell: Cell,
    pub container_deleted: bool,
    pub deleted: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PurgeContainerResult {
    pub cell: Cell,
    pub metadata_existed: bool,
    pub container_deleted: bool,
    pub deleted: Vec<String>,
    pub purged: Vec<String>,
}

pub async fn create_container<R: Runner + ?Sized>(
    runner: &R,
    container: Container,
) -> Result<CreateContainerResult> {
    let result = create_container_inner(runner, container).await;
    close_runner(runner).await;
    result
}

pub async fn get_container<R: Runner + ?Sized>(
    runner: &R,
    container: Container,
) -> Result<GetContainerResult> {
    let result = get_container_inner(runner, container).await;
    close_runner(runner).await;
    result
}

pub async fn list_containers<R: Runner + ?Sized>(
    runner: &R,
    realm: &str,
    space: &str,
    stack: &str,
    cell: &str,
) -> Result<Vec<Container>> {
    let result = runner
        .list_containers(realm.trim(), space.trim(), stack.trim(), cell.trim())
        .await;
    close_runner(runner).await;
    result
}

pub async fn start_container<R: Runner + ?Sized>(
    runner: &R,
    container: Container,
) -> Result<StartContainerResult> {
    let result = start_container_inner(runner, container).await;
    close_runner(runner).await;
    result
}

pub async fn stop_container<R: Runner + ?Sized>(
    runner: &R,
    container: Container,
) -> Result<StopContainerResult> {
    let result = stop_container_inner(runner, container).await;
    close_runner(runner).await;
    result
}

pub async fn delete_container<R: Runner + ?Sized>(
    runner: &R,
    container: Container,
) -> Result<DeleteContainerResult> {
    let result = delete_container_inner(runner, container).await;
    close_runner(runner).await;
    result
}

pub async fn purge_container<R: Runner + ?Sized>(
    runner: &R,
    container: Container,
) -> Result<PurgeContainerResult> {
    let result = purge_container_inner(runner, container).await;
    close_runner(runner).await;
    result
}

/// The owning cell as a lookup value derived from the container's forced
/// parent references.
fn owning_cell(container: &Container) -> Cell {
    Cell::new(
        container.spec.cell_name.clone(),
        container.spec.realm_name.clone(),
        container.spec.space_name.clone(),
        container.spec.stack_name.clone(),
    )
}

pub(crate) async fn create_container_inner<R: Runner + ?Sized>(
    runner: &R,
    mut container: Container,
) -> Result<CreateContainerResult> {
    container.admit()?;
    let name = container.name().to_string();
    do_create_container(runner, container)
        .await
        .context(CreateContainerSnafu { name })
}

async fn do_create_container<R: Runner + ?Sized>(
    runner: &R,
    container: Container,
) -> Result<CreateContainerResult> {
    let name = container.name().to_string();
    let mut cell = runner.get_cell(owning_cell(&container)).await?;

    let metadata_exists_pre = cell.container_spec(&name).is_some();
    let mut changed = false;
    if metadata_exists_pre {
        tracing::debug!(container = %name, cell = %cell.name(), "container spec present, updating in place");
        if let Some(existing) = cell
            .spec
            .containers
            .iter_mut()
            .find(|spec| spec.name == name)
        {
            changed = *existing != container.spec;
            *existing = container.spec.clone();
        }
    } else {
        tracing::info!(container = %name, cell = %cell.name(), "adding container to cell");
        cell.spec.containers.push(container.spec.clone());
        cell.record_container_state(&name, State::Created);
    }

    let persisted = runner.update_cell_metadata(cell).await?;
    let spec = persisted
        .container_spec(&name)
        .cloned()
        .ok_or(Error::ContainerNotFound { name: name.clone() })?;

    Ok(CreateContainerResult {
        created: created(metadata_exists_pre, true),
        changed,
        metadata_exists_pre,
        metadata_exists_post: true,
        container: spec,
        cell: persisted,
    })
}

pub(crate) async fn get_container_inner<R: Runner + ?Sized>(
    runner: &R,
    mut container: Container,
) -> Result<GetContainerResult> {
    container.admit()?;
    let name = container.name().to_string();
    do_get_container(runner, container)
        .await
        .context(GetContainerSnafu { name })
}

async fn do_get_container<R: Runner + ?Sized>(
    runner: &R,
    container: Container,
) -> Result<GetContainerResult> {
    let name = container.name().to_string();
    let cell = match runner.get_cell(owning_cell(&container)).await {
        Ok(found) => found,
        Err(error) if error.is_not_found() => {
            return Ok(GetContainerResult {
                container,
                metadata_exists: false,
                running: false,
            });
        }
        Err(error) => return Err(error),
    };

    match cell.container(&name) {
        Some(observed) => {
            let running = observed.status.state.is_running();
            Ok(GetContainerResult {
                container: observed,
                metadata_exists: true,
                running,
            })
        }
        None => Ok(GetContainerResult {
            container,
            metadata_exists: false,
            running: false,
        }),
    }
}

pub(crate) async fn start_container_inner<R: Runner + ?Sized>(
    runner: &R,
    mut container: Container,
) -> Result<StartContainerResult> {
    container.admit()?;
    let name = container.name().to_string();

    let cell_name = container.spec.cell_name.clone();
    let found = runner
        .get_cell(owning_cell(&container))
        .await
        .context(GetCellSnafu { name: cell_name })?;

    if found.container_spec(&name).is_none() {
        return Err(Error::ContainerNotFound { name });
    }

    // Starting one container against an otherwise-Ready cell falls under the
    // same Ready-cell guard as starting the whole cell; the refusal surfaces
    // unwrapped.
    check_start_guards(&found)?;

    do_start_container(runner, found, name.clone())
        .await
        .context(StartContainerSnafu { name })
}

async fn do_start_container<R: Runner + ?Sized>(
    runner: &R,
    cell: Cell,
    name: String,
) -> Result<StartContainerResult> {
    tracing::info!(container = %name, cell = %cell.name(), "starting container");
    let mut updated = runner.start_container(cell, name.clone()).await?;
    updated.status.state = State::Ready;
    let persisted = runner.update_cell_metadata(updated).await?;

    Ok(StartContainerResult {
        cell: persisted,
        container: name,
        started: true,
    })
}

pub(crate) async fn stop_container_inner<R: Runner + ?Sized>(
    runner: &R,
    mut container: Container,
) -> Result<StopContainerResult> {
    container.admit()?;
    let name = container.name().to_string();

    let cell_name = container.spec.cell_name.clone();
    let found = runner
        .get_cell(owning_cell(&container))
        .await
        .context(GetCellSnafu { name: cell_name })?;

    if found.container_spec(&name).is_none() {
        return Err(Error::ContainerNotFound { name });
    }

    do_stop_container(runner, found, name.clone())
        .await
        .context(StopContainerSnafu { name })
}

async fn do_stop_container<R: Runner + ?Sized>(
    runner: &R,
    cell: Cell,
    name: String,
) -> Result<StopContainerResult> {
    let already_stopped = cell
        .container_state(&name)
        .is_some_and(|entry| entry.state == State::Stopped);
    if already_stopped {
        return Ok(StopContainerResult {
            cell,
            container: name,
            stopped: false,
        });
    }

    tracing::info!(container = %name, cell = %cell.name(), "stopping container");
    let mut updated = runner.stop_container(cell, name.clone()).await?;
    if !updated.has_running_containers() {
        updated.status.state = State::Stopped;
    }
    let persisted = runner.update_cell_metadata(updated).await?;

    Ok(StopContainerResult {
        cell: persisted,
        container: name,
        stopped: true,
    })
}

pub(crate) async fn delete_container_inner<R: Runner + ?Sized>(
    runner: &R,
    mut container: Container,
) -> Result<DeleteContainerResult> {
    container.admit()?;
    let name = container.name().to_string();
    do_delete_container(runner, container)
        .await
        .context(DeleteContainerSnafu { name })
}

async fn do_delete_container<R: Runner + ?Sized>(
    runner: &R,
    container: Container,
) -> Result<DeleteContainerResult> {
    let name = container.name().to_string();
    let found = runner.get_cell(owning_cell(&container)).await?;

    if found.container_spec(&name).is_none() {
        return Err(Error::ContainerNotFound { name });
    }

    tracing::info!(container = %name, cell = %found.name(), "deleting container");
    let updated = runner.delete_container(found, name).await?;

    Ok(DeleteContainerResult {
        cell: updated,
        container_deleted: true,
        deleted: vec!["container-spec".to_string(), "runtime-task".to_string()],
    })
}

pub(crate) async fn purge_container_inner<R: Runner + ?Sized>(
    runner: &R,
    mut container: Container,
) -> Result<PurgeContainerResult> {
    container.admit()?;
    let name = container.name().to_string();
    do_purge_container(runner, container)
        .await
        .context(PurgeContainerSnafu { name })
}

async fn do_purge_container<R: Runner + ?Sized>(
    runner: &R,
    container: Container,
) -> Result<PurgeContainerResult> {
    let name = container.name().to_string();
    let mut deleted = Vec::new();
    let mut purged = Vec::new();

    let found = match runner.get_cell(owning_cell(&container)).await {
        Ok(found) => Some(found),
        Err(error) if error.is_not_found() => None,
        Err(error) => return Err(error),
    };

    let metadata_existed = found
        .as_ref()
        .is_some_and(|cell| cell.container_spec(&name).is_some());

    let mut cell = found.unwrap_or_else(|| owning_cell(&container));
    if metadata_existed {
        cell = runner.delete_container(cell, name.clone()).await?;
        deleted.push("container-spec".to_string());
        deleted.push("runtime-task".to_string());
    }

    // Reap the runtime task even without a spec; the runner falls back from
    // `containerd_id` to the derived runtime name and audits the fallback.
    match runner.purge_container(cell.clone(), name).await {
        Ok(entries) => purged.extend(entries),
        Err(error) => {
            tracing::warn!(container = %container.name(), %error, "purge left residue behind");
            purged.push(format!("purge-error:{error}"));
        }
    }

    Ok(PurgeContainerResult {
        cell,
        metadata_existed,
        container_deleted: metadata_existed,
        deleted,
        purged,
    })
}
