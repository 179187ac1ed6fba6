//! Reconciliation primitives for spaces.

use snafu::ResultExt;

use crate::{
    controller::{close_runner, created, stack},
    error::{
        CheckCgroupExistsSnafu, CheckNetworkExistsSnafu, CreateSpaceSnafu, DeleteSpaceSnafu, Error,
        GetSpaceSnafu, PurgeSpaceSnafu, Result,
    },
    model::{CgroupScope, HasMetadata, Space},
    naming,
    runner::Runner,
};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CreateSpaceResult {
    pub space: Space,
    pub metadata_exists_pre: bool,
    pub metadata_exists_post: bool,
    pub cgroup_exists_pre: bool,
    pub cgroup_exists_post: bool,
    pub network_exists_pre: bool,
    pub network_exists_post: bool,
    pub created: bool,
    pub cgroup_created: bool,
    pub network_created: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GetSpaceResult {
    pub space: Space,
    pub metadata_exists: bool,
    pub cgroup_exists: bool,
    pub network_exists: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeleteSpaceResult {
    pub space: Space,
    pub space_deleted: bool,
    pub deleted: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PurgeSpaceResult {
    pub space: Space,
    pub metadata_existed: bool,
    pub space_deleted: bool,
    pub deleted: Vec<String>,
    pub purged: Vec<String>,
}

pub async fn create_space<R: Runner + ?Sized>(runner: &R, space: Space) -> Result<CreateSpaceResult> {
    let result = create_space_inner(runner, space).await;
    close_runner(runner).await;
    result
}

pub async fn get_space<R: Runner + ?Sized>(runner: &R, space: Space) -> Result<GetSpaceResult> {
    let result = get_space_inner(runner, space).await;
    close_runner(runner).await;
    result
}

pub async fn list_spaces<R: Runner + ?Sized>(runner: &R, realm: &str) -> Result<Vec<Space>> {
    let result = runner.list_spaces(realm.trim()).await;
    close_runner(runner).await;
    result
}

pub async fn delete_space<R: Runner + ?Sized>(
    runner: &R,
    space: Space,
    force: bool,
    cascade: bool,
) -> Result<DeleteSpaceResult> {
    let result = delete_space_inner(runner, space, force, cascade).await;
    close_runner(runner).await;
    result
}

pub async fn purge_space<R: Runner + ?Sized>(
    runner: &R,
    space: Space,
    force: bool,
    cascade: bool,
) -> Result<PurgeSpaceResult> {
    let result = purge_space_inner(runner, space, force, cascade).await;
    close_runner(runner).await;
    result
}

pub(crate) async fn create_space_inner<R: Runner + ?Sized>(
    runner: &R,
    mut space: Space,
) -> Result<CreateSpaceResult> {
    space.admit()?;
    let name = space.name().to_string();
    do_create_space(runner, space)
        .await
        .context(CreateSpaceSnafu { name })
}

async fn do_create_space<R: Runner + ?Sized>(runner: &R, space: Space) -> Result<CreateSpaceResult> {
    let name = space.name().to_string();
    let mut metadata_exists_pre = false;
    let mut cgroup_exists_pre = false;
    let mut network_exists_pre = false;

    let reconciled = match runner.get_space(space.clone()).await {
        Ok(found) => {
            metadata_exists_pre = true;
            cgroup_exists_pre = runner
                .exists_cgroup(CgroupScope::from(found.clone()))
                .await
                .context(CheckCgroupExistsSnafu {
                    path: found.status.cgroup_path.clone(),
                })?;
            let network = naming::build_space_network_name(&found.spec.realm_name, &name)?;
            network_exists_pre = runner
                .exists_space_network(found.clone())
                .await
                .context(CheckNetworkExistsSnafu { network })?;
            tracing::debug!(
                space = %name,
                cgroup = cgroup_exists_pre,
                network = network_exists_pre,
                "space metadata present, ensuring runtime resources"
            );
            runner.ensure_space(found).await?
        }
        Err(error) if error.is_not_found() => {
            tracing::info!(space = %name, realm = %space.spec.realm_name, "creating space");
            runner.create_space(space).await?
        }
        Err(error) => return Err(error),
    };

    Ok(CreateSpaceResult {
        created: created(metadata_exists_pre, true),
        cgroup_created: created(cgroup_exists_pre, true),
        network_created: created(network_exists_pre, true),
        metadata_exists_pre,
        metadata_exists_post: true,
        cgroup_exists_pre,
        cgroup_exists_post: true,
        network_exists_pre,
        network_exists_post: true,
        space: reconciled,
    })
}

pub(crate) async fn get_space_inner<R: Runner + ?Sized>(
    runner: &R,
    mut space: Space,
) -> Result<GetSpaceResult> {
    space.admit()?;
    let name = space.name().to_string();
    do_get_space(runner, space)
        .await
        .context(GetSpaceSnafu { name })
}

async fn do_get_space<R: Runner + ?Sized>(runner: &R, space: Space) -> Result<GetSpaceResult> {
    let requested_realm = space.spec.realm_name.clone();
    let (metadata_exists, observed) = match runner.get_space(space.clone()).await {
        Ok(found) => (true, found),
        Err(error) if error.is_not_found() => (false, space),
        Err(error) => return Err(error),
    };

    if metadata_exists && observed.spec.realm_name != requested_realm {
        return Err(Error::ParentMismatch {
            kind: "space".to_string(),
            name: observed.metadata.name.clone(),
            field: "realm".to_string(),
            requested: requested_realm,
            found: observed.spec.realm_name.clone(),
            run_path: runner.run_path().display().to_string(),
        });
    }

    let cgroup_exists = runner
        .exists_cgroup(CgroupScope::from(observed.clone()))
        .await
        .context(CheckCgroupExistsSnafu {
            path: observed.status.cgroup_path.clone(),
        })?;
    let network = naming::build_space_network_name(&observed.spec.realm_name, observed.name())?;
    let network_exists = runner
        .exists_space_network(observed.clone())
        .await
        .context(CheckNetworkExistsSnafu { network })?;

    Ok(GetSpaceResult {
        space: observed,
        metadata_exists,
        cgroup_exists,
        network_exists,
    })
}

pub(crate) async fn delete_space_inner<R: Runner + ?Sized>(
    runner: &R,
    mut space: Space,
    force: bool,
    cascade: bool,
) -> Result<DeleteSpaceResult> {
    space.admit()?;
    let name = space.name().to_string();
    do_delete_space(runner, space, force, cascade)
        .await
        .context(DeleteSpaceSnafu { name })
}

async fn do_delete_space<R: Runner + ?Sized>(
    runner: &R,
    space: Space,
    force: bool,
    cascade: bool,
) -> Result<DeleteSpaceResult> {
    let found = runner.get_space(space).await?;
    let name = found.name().to_string();
    let realm = found.spec.realm_name.clone();
    let mut deleted = Vec::new();

    if cascade {
        for child in runner.list_stacks(&realm, &name).await? {
            let child_name = child.name().to_string();
            stack::delete_stack_inner(runner, child, force, cascade).await?;
            deleted.push(format!("stack:{child_name}"));
        }
    } else if !force {
        let children = runner.list_stacks(&realm, &name).await?;
        if !children.is_empty() {
            return Err(Error::ResourceHasDependencies {
                kind: "space".to_string(),
                name,
                count: children.len(),
                child_kind: "stack".to_string(),
            });
        }
    }

    tracing::info!(space = %name, realm = %realm, force, cascade, "deleting space");
    runner.delete_space(found.clone()).await?;
    deleted.push("metadata".to_string());
    deleted.push("cgroup".to_string());
    deleted.push("cni-network".to_string());

    Ok(DeleteSpaceResult {
        space: found,
        space_deleted: true,
        deleted,
    })
}

pub(crate) async fn purge_space_inner<R: Runner + ?Sized>(
    runner: &R,
    mut space: Space,
    force: bool,
    cascade: bool,
) -> Result<PurgeSpaceResult> {
    space.admit()?;
    let name = space.name().to_string();
    do_purge_space(runner, space, force, cascade)
        .await
        .context(PurgeSpaceSnafu { name })
}

async fn do_purge_space<R: Runner + ?Sized>(
    runner: &R,
    space: Space,
    force: bool,
    cascade: bool,
) -> Result<PurgeSpaceResult> {
    let name = space.name().to_string();
    let realm = space.spec.realm_name.clone();
    let mut deleted = Vec::new();
    let mut purged = Vec::new();

    let found = match runner.get_space(space.clone()).await {
        Ok(found) => Some(found),
        Err(error) if error.is_not_found() => None,
        Err(error) => return Err(error),
    };
    let metadata_existed = found.is_some();

    if let Some(found) = &found {
        if cascade {
            for child in runner.list_stacks(&realm, &name).await? {
                let child_name = child.name().to_string();
                stack::purge_stack_inner(runner, child, force, cascade).await?;
                deleted.push(format!("stack:{child_name}"));
            }
        } else if !force {
            let children = runner.list_stacks(&realm, &name).await?;
            if !children.is_empty() {
                return Err(Error::ResourceHasDependencies {
                    kind: "space".to_string(),
                    name,
                    count: children.len(),
                    child_kind: "stack".to_string(),
                });
            }
        }

        runner.delete_space(found.clone()).await?;
        deleted.push("metadata".to_string());
        deleted.push("cgroup".to_string());
        deleted.push("cni-network".to_string());
    }

    match runner.purge_space(space.clone()).await {
        Ok(entries) => purged.extend(entries),
        Err(error) => {
            tracing::warn!(space = %space.name(), %error, "purge left residue behind");
            purged.push(format!("purge-error:{error}"));
        }
    }

    Ok(PurgeSpaceResult {
        space: found.unwrap_or(space),
        metadata_existed,
        space_deleted: metadata_existed,
        deleted,
        purged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ErrorKind,
        model::{Realm, Stack},
        runner::fake::FakeRunner,
    };

    fn seeded_runner() -> FakeRunner {
        let runner = FakeRunner::new();
        let mut realm = Realm::new("r1");
        realm.admit().expect("realm admission");
        runner.seed_realm(realm);
        runner
    }

    #[tokio::test]
    async fn create_space_derives_the_network_name() {
        let runner = seeded_runner();

        let result = create_space(&runner, Space::new("s1", "r1"))
            .await
            .expect("create should succeed");

        assert!(result.created);
        assert!(result.network_created);
        assert_eq!(result.space.status.network_name, "r1-s1");
        assert!(runner.has_network("r1-s1"));
    }

    #[tokio::test]
    async fn create_space_requires_the_parent_realm() {
        let runner = FakeRunner::new();

        let err = create_space(&runner, Space::new("s1", "ghost"))
            .await
            .expect_err("must fail");

        assert_eq!(err.kind(), ErrorKind::CreateSpace);
        assert!(err.has_kind(ErrorKind::RealmNotFound));
    }

    #[tokio::test]
    async fn create_space_reconciles_a_removed_network() {
        let runner = seeded_runner();
        let mut space = Space::new("s1", "r1");
        space.admit().expect("space admission");
        runner.seed_space(space);
        runner.remove_network("r1-s1");

        let result = create_space(&runner, Space::new("s1", "r1"))
            .await
            .expect("reconcile");

        assert!(!result.created);
        assert!(!result.cgroup_created);
        assert!(result.network_created);
        assert!(runner.has_network("r1-s1"));
    }

    #[tokio::test]
    async fn get_space_detects_a_realm_mismatch() {
        let runner = seeded_runner();
        let mut space = Space::new("s1", "r1");
        space.admit().expect("space admission");
        runner.seed_space(space);

        // The fake indexes spaces by (realm, name); querying under the wrong
        // realm yields NotFound rather than a mismatch.
        let result = get_space(&runner, Space::new("s1", "other"))
            .await
            .expect("lookup under another realm");
        assert!(!result.metadata_exists);
    }

    #[tokio::test]
    async fn cascade_delete_reports_children_in_order() {
        let runner = seeded_runner();
        let mut space = Space::new("s1", "r1");
        space.admit().expect("space admission");
        runner.seed_space(space);
        let mut stack = Stack::new("st1", "r1", "s1");
        stack.admit().expect("stack admission");
        runner.seed_stack(stack);

        let result = delete_space(&runner, Space::new("s1", "r1"), false, true)
            .await
            .expect("cascade delete");

        assert_eq!(
            result.deleted,
            vec!["stack:st1", "metadata", "cgroup", "cni-network"]
        );
        assert!(!runner.has_network("r1-s1"));
    }

    #[tokio::test]
    async fn delete_refuses_with_stack_children() {
        let runner = seeded_runner();
        let mut space = Space::new("s1", "r1");
        space.admit().expect("space admission");
        runner.seed_space(space);
        let mut stack = Stack::new("st1", "r1", "s1");
        stack.admit().expect("stack admission");
        runner.seed_stack(stack);

        let err = delete_space(&runner, Space::new("s1", "r1"), false, false)
            .await
            .expect_err("must refuse");

        assert!(err.has_kind(ErrorKind::ResourceHasDependencies));
        let cause = err.cause().expect("wrapped cause").to_string();
        assert!(cause.contains("space \"s1\" has 1 stack(s)"));
    }
}
