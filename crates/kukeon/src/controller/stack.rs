//! Reconciliation primitives for stacks.

use snafu::ResultExt;

use crate::{
    controller::{cell, close_runner, created},
    error::{
        CheckCgroupExistsSnafu, CreateStackSnafu, DeleteStackSnafu, Error, GetStackSnafu,
        PurgeStackSnafu, Result,
    },
    model::{CgroupScope, HasMetadata, Stack},
    runner::Runner,
};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CreateStackResult {
    pub stack: Stack,
    pub metadata_exists_pre: bool,
    pub metadata_exists_post: bool,
    pub cgroup_exists_pre: bool,
    pub cgroup_exists_post: bool,
    pub created: bool,
    pub cgroup_created: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GetStackResult {
    pub stack: Stack,
    pub metadata_exists: bool,
    pub cgroup_exists: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeleteStackResult {
    pub stack: Stack,
    pub stack_deleted: bool,
    pub deleted: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PurgeStackResult {
    pub stack: Stack,
    pub metadata_existed: bool,
    pub stack_deleted: bool,
    pub deleted: Vec<String>,
    pub purged: Vec<String>,
}

pub async fn create_stack<R: Runner + ?Sized>(runner: &R, stack: Stack) -> Result<CreateStackResult> {
    let result = create_stack_inner(runner, stack).await;
    close_runner(runner).await;
    result
}

pub async fn get_stack<R: Runner + ?Sized>(runner: &R, stack: Stack) -> Result<GetStackResult> {
    let result = get_stack_inner(runner, stack).await;
    close_runner(runner).await;
    result
}

pub async fn list_stacks<R: Runner + ?Sized>(
    runner: &R,
    realm: &str,
    space: &str,
) -> Result<Vec<Stack>> {
    let result = runner.list_stacks(realm.trim(), space.trim()).await;
    close_runner(runner).await;
    result
}

pub async fn delete_stack<R: Runner + ?Sized>(
    runner: &R,
    stack: Stack,
    force: bool,
    cascade: bool,
) -> Result<DeleteStackResult> {
    let result = delete_stack_inner(runner, stack, force, cascade).await;
    close_runner(runner).await;
    result
}

pub async fn purge_stack<R: Runner + ?Sized>(
    runner: &R,
    stack: Stack,
    force: bool,
    cascade: bool,
) -> Result<PurgeStackResult> {
    let result = purge_stack_inner(runner, stack, force, cascade).await;
    close_runner(runner).await;
    result
}

pub(crate) async fn create_stack_inner<R: Runner + ?Sized>(
    runner: &R,
    mut stack: Stack,
) -> Result<CreateStackResult> {
    stack.admit()?;
    let name = stack.name().to_string();
    do_create_stack(runner, stack)
        .await
        .context(CreateStackSnafu { name })
}

async fn do_create_stack<R: Runner + ?Sized>(runner: &R, stack: Stack) -> Result<CreateStackResult> {
    let name = stack.name().to_string();
    let mut metadata_exists_pre = false;
    let mut cgroup_exists_pre = false;

    let reconciled = match runner.get_stack(stack.clone()).await {
        Ok(found) => {
            metadata_exists_pre = true;
            cgroup_exists_pre = runner
                .exists_cgroup(CgroupScope::from(found.clone()))
                .await
                .context(CheckCgroupExistsSnafu {
                    path: found.status.cgroup_path.clone(),
                })?;
            tracing::debug!(
                stack = %name,
                cgroup = cgroup_exists_pre,
                "stack metadata present, ensuring runtime resources"
            );
            runner.ensure_stack(found).await?
        }
        Err(error) if error.is_not_found() => {
            tracing::info!(
                stack = %name,
                realm = %stack.spec.realm_name,
                space = %stack.spec.space_name,
                "creating stack"
            );
            runner.create_stack(stack).await?
        }
        Err(error) => return Err(error),
    };

    Ok(CreateStackResult {
        created: created(metadata_exists_pre, true),
        cgroup_created: created(cgroup_exists_pre, true),
        metadata_exists_pre,
        metadata_exists_post: true,
        cgroup_exists_pre,
        cgroup_exists_post: true,
        stack: reconciled,
    })
}

pub(crate) async fn get_stack_inner<R: Runner + ?Sized>(
    runner: &R,
    mut stack: Stack,
) -> Result<GetStackResult> {
    stack.admit()?;
    let name = stack.name().to_string();
    do_get_stack(runner, stack)
        .await
        .context(GetStackSnafu { name })
}

async fn do_get_stack<R: Runner + ?Sized>(runner: &R, stack: Stack) -> Result<GetStackResult> {
    let requested_space = stack.spec.space_name.clone();
    let (metadata_exists, observed) = match runner.get_stack(stack.clone()).await {
        Ok(found) => (true, found),
        Err(error) if error.is_not_found() => (false, stack),
        Err(error) => return Err(error),
    };

    if metadata_exists && observed.spec.space_name != requested_space {
        return Err(Error::ParentMismatch {
            kind: "stack".to_string(),
            name: observed.metadata.name.clone(),
            field: "space".to_string(),
            requested: requested_space,
            found: observed.spec.space_name.clone(),
            run_path: runner.run_path().display().to_string(),
        });
    }

    let cgroup_exists = runner
        .exists_cgroup(CgroupScope::from(observed.clone()))
        .await
        .context(CheckCgroupExistsSnafu {
            path: observed.status.cgroup_path.clone(),
        })?;

    Ok(GetStackResult {
        stack: observed,
        metadata_exists,
        cgroup_exists,
    })
}

pub(crate) async fn delete_stack_inner<R: Runner + ?Sized>(
    runner: &R,
    mut stack: Stack,
    force: bool,
    cascade: bool,
) -> Result<DeleteStackResult> {
    stack.admit()?;
    let name = stack.name().to_string();
    do_delete_stack(runner, stack, force, cascade)
        .await
        .context(DeleteStackSnafu { name })
}

async fn do_delete_stack<R: Runner + ?Sized>(
    runner: &R,
    stack: Stack,
    force: bool,
    cascade: bool,
) -> Result<DeleteStackResult> {
    let found = runner.get_stack(stack).await?;
    let name = found.name().to_string();
    let realm = found.spec.realm_name.clone();
    let space = found.spec.space_name.clone();
    let mut deleted = Vec::new();

    if cascade {
        for child in runner.list_cells(&realm, &space, &name).await? {
            let child_name = child.name().to_string();
            cell::delete_cell_inner(runner, child, force, cascade).await?;
            deleted.push(format!("cell:{child_name}"));
        }
    } else if !force {
        let children = runner.list_cells(&realm, &space, &name).await?;
        if !children.is_empty() {
            return Err(Error::ResourceHasDependencies {
                kind: "stack".to_string(),
                name,
                count: children.len(),
                child_kind: "cell".to_string(),
            });
        }
    }

    tracing::info!(stack = %name, realm = %realm, space = %space, force, cascade, "deleting stack");
    runner.delete_stack(found.clone()).await?;
    deleted.push("metadata".to_string());
    deleted.push("cgroup".to_string());

    Ok(DeleteStackResult {
        stack: found,
        stack_deleted: true,
        deleted,
    })
}

pub(crate) async fn purge_stack_inner<R: Runner + ?Sized>(
    runner: &R,
    mut stack: Stack,
    force: bool,
    cascade: bool,
) -> Result<PurgeStackResult> {
    stack.admit()?;
    let name = stack.name().to_string();
    do_purge_stack(runner, stack, force, cascade)
        .await
        .context(PurgeStackSnafu { name })
}

async fn do_purge_stack<R: Runner + ?Sized>(
    runner: &R,
    stack: Stack,
    force: bool,
    cascade: bool,
) -> Result<PurgeStackResult> {
    let name = stack.name().to_string();
    let realm = stack.spec.realm_name.clone();
    let space = stack.spec.space_name.clone();
    let mut deleted = Vec::new();
    let mut purged = Vec::new();

    let found = match runner.get_stack(stack.clone()).await {
        Ok(found) => Some(found),
        Err(error) if error.is_not_found() => None,
        Err(error) => return Err(error),
    };
    let metadata_existed = found.is_some();

    if let Some(found) = &found {
        if cascade {
            for child in runner.list_cells(&realm, &space, &name).await? {
                let child_name = child.name().to_string();
                cell::purge_cell_inner(runner, child, force, cascade).await?;
                deleted.push(format!("cell:{child_name}"));
            }
        } else if !force {
            let children = runner.list_cells(&realm, &space, &name).await?;
            if !children.is_empty() {
                return Err(Error::ResourceHasDependencies {
                    kind: "stack".to_string(),
                    name,
                    count: children.len(),
                    child_kind: "cell".to_string(),
                });
            }
        }

        runner.delete_stack(found.clone()).await?;
        deleted.push("metadata".to_string());
        deleted.push("cgroup".to_string());
    }

    match runner.purge_stack(stack.clone()).await {
        Ok(entries) => purged.extend(entries),
        Err(error) => {
            tracing::warn!(stack = %stack.name(), %error, "purge left residue behind");
            purged.push(format!("purge-error:{error}"));
        }
    }

    Ok(PurgeStackResult {
        stack: found.unwrap_or(stack),
        metadata_existed,
        stack_deleted: metadata_existed,
        deleted,
        purged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ErrorKind,
        model::{Realm, Space},
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
        runner
    }

    #[tokio::test]
    async fn create_stack_materializes_the_cgroup() {
        let runner = seeded_runner();

        let result = create_stack(&runner, Stack::new("st1", "r1", "s1"))
            .await
            .expect("create should succeed");

        assert!(result.created);
        assert!(result.cgroup_created);
        assert_eq!(result.stack.status.cgroup_path, "/kukeon/r1/s1/st1");
        assert!(runner.has_cgroup("/kukeon/r1/s1/st1"));
    }

    #[tokio::test]
    async fn create_stack_requires_the_parent_space() {
        let runner = FakeRunner::new();

        let err = create_stack(&runner, Stack::new("st1", "r1", "ghost"))
            .await
            .expect_err("must fail");

        assert_eq!(err.kind(), ErrorKind::CreateStack);
        assert!(err.has_kind(ErrorKind::SpaceNotFound));
    }

    #[tokio::test]
    async fn second_create_reports_unchanged_resources() {
        let runner = seeded_runner();

        create_stack(&runner, Stack::new("st1", "r1", "s1"))
            .await
            .expect("first create");
        let second = create_stack(&runner, Stack::new("st1", "r1", "s1"))
            .await
            .expect("second create");

        assert!(!second.created);
        assert!(!second.cgroup_created);
        assert!(second.metadata_exists_pre);
        assert!(second.cgroup_exists_pre);
    }

    #[tokio::test]
    async fn delete_with_cells_requires_cascade() {
        let runner = seeded_runner();
        let mut stack = Stack::new("st1", "r1", "s1");
        stack.admit().expect("stack admission");
        runner.seed_stack(stack);
        let mut cell = crate::model::Cell::new("c1", "r1", "s1", "st1");
        cell.admit().expect("cell admission");
        runner.seed_cell(cell);

        let err = delete_stack(&runner, Stack::new("st1", "r1", "s1"), false, false)
            .await
            .expect_err("must refuse");
        assert!(err.has_kind(ErrorKind::ResourceHasDependencies));

        let result = delete_stack(&runner, Stack::new("st1", "r1", "s1"), false, true)
            .await
            .expect("cascade delete");
        assert_eq!(result.deleted, vec!["cell:c1", "metadata", "cgroup"]);
        assert!(runner.cell("r1", "s1", "st1", "c1").is_none());
    }
}
