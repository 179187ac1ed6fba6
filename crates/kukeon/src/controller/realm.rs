//! Reconciliation primitives for realms.

use snafu::ResultExt;

use crate::{
    controller::{close_runner, created, space},
    error::{
        CheckCgroupExistsSnafu, CheckNamespaceExistsSnafu, CreateRealmSnafu, DeleteRealmSnafu,
        Error, ErrorKind, GetRealmSnafu, PurgeRealmSnafu, Result,
    },
    model::{CgroupScope, HasMetadata, Realm},
    runner::Runner,
};

/// Outcome of reconciling a realm: the entity plus the pre/post observation
/// pairs and the flags derived from them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CreateRealmResult {
    pub realm: Realm,
    pub metadata_exists_pre: bool,
    pub metadata_exists_post: bool,
    pub cgroup_exists_pre: bool,
    pub cgroup_exists_post: bool,
    pub namespace_exists_pre: bool,
    pub namespace_exists_post: bool,
    pub created: bool,
    pub cgroup_created: bool,
    pub namespace_created: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GetRealmResult {
    pub realm: Realm,
    pub metadata_exists: bool,
    pub cgroup_exists: bool,
    pub namespace_exists: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeleteRealmResult {
    pub realm: Realm,
    pub realm_deleted: bool,
    pub deleted: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PurgeRealmResult {
    pub realm: Realm,
    pub metadata_existed: bool,
    pub realm_deleted: bool,
    pub deleted: Vec<String>,
    pub purged: Vec<String>,
}

pub async fn create_realm<R: Runner + ?Sized>(runner: &R, realm: Realm) -> Result<CreateRealmResult> {
    let result = create_realm_inner(runner, realm).await;
    close_runner(runner).await;
    result
}

pub async fn get_realm<R: Runner + ?Sized>(runner: &R, realm: Realm) -> Result<GetRealmResult> {
    let result = get_realm_inner(runner, realm).await;
    close_runner(runner).await;
    result
}

pub async fn list_realms<R: Runner + ?Sized>(runner: &R) -> Result<Vec<Realm>> {
    let result = runner.list_realms().await;
    close_runner(runner).await;
    result
}

pub async fn delete_realm<R: Runner + ?Sized>(
    runner: &R,
    realm: Realm,
    force: bool,
    cascade: bool,
) -> Result<DeleteRealmResult> {
    let result = delete_realm_inner(runner, realm, force, cascade).await;
    close_runner(runner).await;
    result
}

pub async fn purge_realm<R: Runner + ?Sized>(
    runner: &R,
    realm: Realm,
    force: bool,
    cascade: bool,
) -> Result<PurgeRealmResult> {
    let result = purge_realm_inner(runner, realm, force, cascade).await;
    close_runner(runner).await;
    result
}

pub(crate) async fn create_realm_inner<R: Runner + ?Sized>(
    runner: &R,
    mut realm: Realm,
) -> Result<CreateRealmResult> {
    realm.admit()?;
    let name = realm.name().to_string();
    do_create_realm(runner, realm)
        .await
        .context(CreateRealmSnafu { name })
}

async fn do_create_realm<R: Runner + ?Sized>(runner: &R, realm: Realm) -> Result<CreateRealmResult> {
    let name = realm.name().to_string();
    let mut metadata_exists_pre = false;
    let mut cgroup_exists_pre = false;
    let mut namespace_exists_pre = false;

    let reconciled = match runner.get_realm(realm.clone()).await {
        Ok(found) => {
            metadata_exists_pre = true;
            cgroup_exists_pre = runner
                .exists_cgroup(CgroupScope::from(found.clone()))
                .await
                .context(CheckCgroupExistsSnafu {
                    path: found.status.cgroup_path.clone(),
                })?;
            namespace_exists_pre = runner
                .exists_realm_namespace(found.spec.namespace.clone())
                .await
                .context(CheckNamespaceExistsSnafu {
                    namespace: found.spec.namespace.clone(),
                })?;
            tracing::debug!(
                realm = %name,
                cgroup = cgroup_exists_pre,
                namespace = namespace_exists_pre,
                "realm metadata present, ensuring runtime resources"
            );
            runner.ensure_realm(found).await?
        }
        Err(error) if error.is_not_found() => {
            tracing::info!(realm = %name, "creating realm");
            match runner.create_realm(realm.clone()).await {
                Ok(created) => created,
                Err(error) if error.kind() == ErrorKind::NamespaceAlreadyExists => {
                    tracing::debug!(
                        realm = %name,
                        "containerd namespace already exists, treating create as success"
                    );
                    realm
                }
                Err(error) => return Err(error),
            }
        }
        Err(error) => return Err(error),
    };

    Ok(CreateRealmResult {
        created: created(metadata_exists_pre, true),
        cgroup_created: created(cgroup_exists_pre, true),
        namespace_created: created(namespace_exists_pre, true),
        metadata_exists_pre,
        metadata_exists_post: true,
        cgroup_exists_pre,
        cgroup_exists_post: true,
        namespace_exists_pre,
        namespace_exists_post: true,
        realm: reconciled,
    })
}

pub(crate) async fn get_realm_inner<R: Runner + ?Sized>(
    runner: &R,
    mut realm: Realm,
) -> Result<GetRealmResult> {
    realm.admit()?;
    let name = realm.name().to_string();
    do_get_realm(runner, realm)
        .await
        .context(GetRealmSnafu { name })
}

async fn do_get_realm<R: Runner + ?Sized>(runner: &R, realm: Realm) -> Result<GetRealmResult> {
    let (metadata_exists, observed) = match runner.get_realm(realm.clone()).await {
        Ok(found) => (true, found),
        Err(error) if error.is_not_found() => (false, realm),
        Err(error) => return Err(error),
    };

    let cgroup_exists = runner
        .exists_cgroup(CgroupScope::from(observed.clone()))
        .await
        .context(CheckCgroupExistsSnafu {
            path: observed.status.cgroup_path.clone(),
        })?;
    let namespace_exists = runner
        .exists_realm_namespace(observed.spec.namespace.clone())
        .await
        .context(CheckNamespaceExistsSnafu {
            namespace: observed.spec.namespace.clone(),
        })?;

    Ok(GetRealmResult {
        realm: observed,
        metadata_exists,
        cgroup_exists,
        namespace_exists,
    })
}

pub(crate) async fn delete_realm_inner<R: Runner + ?Sized>(
    runner: &R,
    mut realm: Realm,
    force: bool,
    cascade: bool,
) -> Result<DeleteRealmResult> {
    realm.admit()?;
    let name = realm.name().to_string();
    do_delete_realm(runner, realm, force, cascade)
        .await
        .context(DeleteRealmSnafu { name })
}

async fn do_delete_realm<R: Runner + ?Sized>(
    runner: &R,
    realm: Realm,
    force: bool,
    cascade: bool,
) -> Result<DeleteRealmResult> {
    let found = runner.get_realm(realm).await?;
    let name = found.name().to_string();
    let mut deleted = Vec::new();

    if cascade {
        for child in runner.list_spaces(&name).await? {
            let child_name = child.name().to_string();
            space::delete_space_inner(runner, child, force, cascade).await?;
            deleted.push(format!("space:{child_name}"));
        }
    } else if !force {
        let children = runner.list_spaces(&name).await?;
        if !children.is_empty() {
            return Err(Error::ResourceHasDependencies {
                kind: "realm".to_string(),
                name,
                count: children.len(),
                child_kind: "space".to_string(),
            });
        }
    }

    tracing::info!(realm = %name, force, cascade, "deleting realm");
    runner.delete_realm(found.clone()).await?;
    deleted.push("metadata".to_string());
    deleted.push("cgroup".to_string());
    deleted.push("namespace".to_string());

    Ok(DeleteRealmResult {
        realm: found,
        realm_deleted: true,
        deleted,
    })
}

pub(crate) async fn purge_realm_inner<R: Runner + ?Sized>(
    runner: &R,
    mut realm: Realm,
    force: bool,
    cascade: bool,
) -> Result<PurgeRealmResult> {
    realm.admit()?;
    let name = realm.name().to_string();
    do_purge_realm(runner, realm, force, cascade)
        .await
        .context(PurgeRealmSnafu { name })
}

async fn do_purge_realm<R: Runner + ?Sized>(
    runner: &R,
    realm: Realm,
    force: bool,
    cascade: bool,
) -> Result<PurgeRealmResult> {
    let name = realm.name().to_string();
    let mut deleted = Vec::new();
    let mut purged = Vec::new();

    let found = match runner.get_realm(realm.clone()).await {
        Ok(found) => Some(found),
        Err(error) if error.is_not_found() => None,
        Err(error) => return Err(error),
    };
    let metadata_existed = found.is_some();

    if let Some(found) = &found {
        if cascade {
            for child in runner.list_spaces(&name).await? {
                let child_name = child.name().to_string();
                space::purge_space_inner(runner, child, force, cascade).await?;
                deleted.push(format!("space:{child_name}"));
            }
        } else if !force {
            let children = runner.list_spaces(&name).await?;
            if !children.is_empty() {
                return Err(Error::ResourceHasDependencies {
                    kind: "realm".to_string(),
                    name,
                    count: children.len(),
                    child_kind: "space".to_string(),
                });
            }
        }

        runner.delete_realm(found.clone()).await?;
        deleted.push("metadata".to_string());
        deleted.push("cgroup".to_string());
        deleted.push("namespace".to_string());
    }

    // Reap orphaned runtime artefacts even when no metadata was found; this
    // is the recovery path. Purge-side failures are recorded, not fatal.
    match runner.purge_realm(realm.clone()).await {
        Ok(entries) => purged.extend(entries),
        Err(error) => {
            tracing::warn!(realm = %realm.name(), %error, "purge left residue behind");
            purged.push(format!("purge-error:{error}"));
        }
    }

    Ok(PurgeRealmResult {
        realm: found.unwrap_or(realm),
        metadata_existed,
        realm_deleted: metadata_existed,
        deleted,
        purged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{model::Space, runner::fake::FakeRunner};

    fn admitted_realm(name: &str) -> Realm {
        let mut realm = Realm::new(name);
        realm.admit().expect("realm admission");
        realm
    }

    #[tokio::test]
    async fn create_fresh_realm_reports_everything_created() {
        let runner = FakeRunner::new();
        let mut realm = Realm::new("r1");
        realm.spec.namespace = "n1".to_string();

        let result = create_realm(&runner, realm).await.expect("create should succeed");

        assert!(!result.metadata_exists_pre);
        assert!(result.metadata_exists_post);
        assert!(result.created);
        assert!(result.cgroup_created);
        assert!(result.namespace_created);
        assert_eq!(runner.call_count("create_realm"), 1);
        assert_eq!(runner.call_count("ensure_realm"), 0);
        assert_eq!(runner.close_count(), 1);
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let runner = FakeRunner::new();

        let first = create_realm(&runner, Realm::new("r1")).await.expect("first create");
        let second = create_realm(&runner, Realm::new("r1")).await.expect("second create");

        assert!(first.created);
        assert!(!second.created);
        assert!(second.metadata_exists_pre);
        assert_eq!(runner.call_count("create_realm"), 1);
        assert_eq!(runner.call_count("ensure_realm"), 1);
    }

    #[tokio::test]
    async fn create_reconciles_a_drifted_cgroup() {
        let runner = FakeRunner::new();
        runner.seed_realm(admitted_realm("r1"));
        runner.remove_cgroup("/kukeon/r1");

        let result = create_realm(&runner, Realm::new("r1")).await.expect("reconcile");

        assert!(!result.created);
        assert!(result.cgroup_created);
        assert!(!result.namespace_created);
        assert!(runner.has_cgroup("/kukeon/r1"));
    }

    #[tokio::test]
    async fn create_treats_existing_namespace_as_success() {
        let runner = FakeRunner::new();
        runner.seed_realm(admitted_realm("other"));

        // Same namespace as the seeded realm, no metadata of its own yet.
        let mut realm = Realm::new("r1");
        realm.spec.namespace = "other".to_string();

        let result = create_realm(&runner, realm).await.expect("idempotent create");
        assert!(result.created);
        assert!(result.namespace_exists_post);
    }

    #[tokio::test]
    async fn blank_name_fails_before_any_runner_call() {
        let runner = FakeRunner::new();
        let err = create_realm(&runner, Realm::new("   ")).await.expect_err("must fail");

        assert_eq!(err.kind(), ErrorKind::RealmNameRequired);
        // Only the scoped close reached the runner.
        assert_eq!(runner.calls(), vec!["close:*".to_string()]);
    }

    #[tokio::test]
    async fn get_reports_missing_metadata_without_failing() {
        let runner = FakeRunner::new();
        let result = get_realm(&runner, Realm::new("ghost")).await.expect("get");

        assert!(!result.metadata_exists);
        assert!(!result.cgroup_exists);
        assert!(!result.namespace_exists);
    }

    #[tokio::test]
    async fn delete_refuses_dependencies_without_cascade() {
        let runner = FakeRunner::new();
        runner.seed_realm(admitted_realm("r1"));
        let mut space = Space::new("s1", "r1");
        space.admit().expect("space admission");
        runner.seed_space(space);

        let err = delete_realm(&runner, Realm::new("r1"), false, false)
            .await
            .expect_err("must refuse");

        assert!(err.has_kind(ErrorKind::ResourceHasDependencies));
        let chain = err.cause().expect("wrapped cause").to_string();
        assert!(chain.contains("realm \"r1\" has 1 space(s)"));
        assert!(runner.realm("r1").is_some(), "realm must survive the refusal");
    }

    #[tokio::test]
    async fn cascade_delete_walks_children_first() {
        let runner = FakeRunner::new();
        runner.seed_realm(admitted_realm("r1"));
        let mut space = Space::new("s1", "r1");
        space.admit().expect("space admission");
        runner.seed_space(space);

        let result = delete_realm(&runner, Realm::new("r1"), false, true)
            .await
            .expect("cascade delete");

        assert!(result.realm_deleted);
        assert_eq!(
            result.deleted,
            vec!["space:s1", "metadata", "cgroup", "namespace"]
        );
        assert!(runner.realm("r1").is_none());
        assert!(runner.space("r1", "s1").is_none());
    }

    #[tokio::test]
    async fn force_delete_orphans_children() {
        let runner = FakeRunner::new();
        runner.seed_realm(admitted_realm("r1"));
        let mut space = Space::new("s1", "r1");
        space.admit().expect("space admission");
        runner.seed_space(space);

        let result = delete_realm(&runner, Realm::new("r1"), true, false)
            .await
            .expect("forced delete");

        assert!(result.realm_deleted);
        assert!(runner.realm("r1").is_none());
        // The orphan is left for purge to reap.
        assert!(runner.space("r1", "s1").is_some());
    }

    #[tokio::test]
    async fn delete_of_missing_realm_fails_with_not_found() {
        let runner = FakeRunner::new();
        let err = delete_realm(&runner, Realm::new("ghost"), false, false)
            .await
            .expect_err("must fail");

        assert_eq!(err.kind(), ErrorKind::DeleteRealm);
        assert!(err.has_kind(ErrorKind::RealmNotFound));
    }

    #[tokio::test]
    async fn purge_succeeds_without_metadata() {
        let runner = FakeRunner::new();
        runner.add_cni_residue("r1-s1");
        runner.add_orphaned_task("r1-s1-c1-web");

        let result = purge_realm(&runner, Realm::new("r1"), false, true)
            .await
            .expect("purge is the recovery path");

        assert!(!result.metadata_existed);
        assert!(!result.realm_deleted);
        assert!(result.deleted.is_empty());
        assert_eq!(result.purged, vec!["cni-resources", "orphaned-containers"]);
    }

    #[tokio::test]
    async fn purge_errors_are_recorded_not_fatal() {
        let runner = FakeRunner::new();
        runner.seed_realm(admitted_realm("r1"));
        runner.fail_next("purge_realm", "ipam backend unavailable");

        let result = purge_realm(&runner, Realm::new("r1"), false, true)
            .await
            .expect("purge must tolerate reap failures");

        assert!(result.realm_deleted);
        assert_eq!(result.purged.len(), 1);
        assert!(result.purged[0].starts_with("purge-error:"));
    }
}
