//! Idempotent scaffolding of the default hierarchy and the global CNI
//! directory layout.

use crate::{
    constants::{DEFAULT_CELL, DEFAULT_REALM, DEFAULT_SPACE, DEFAULT_STACK},
    controller::{
        CreateCellResult, CreateRealmResult, CreateSpaceResult, CreateStackResult, cell,
        close_runner, realm, space, stack,
    },
    error::Result,
    model::{Cell, Realm, Space, Stack},
    runner::{CniBootstrapReport, CniDirectories, Runner},
};

/// Accumulated outcome of one bootstrap run: per-step pre/post flags plus the
/// CNI directory report.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BootstrapReport {
    pub cni: CniBootstrapReport,
    pub realm: CreateRealmResult,
    pub space: CreateSpaceResult,
    pub stack: CreateStackResult,
    pub cell: CreateCellResult,
}

impl BootstrapReport {
    /// Whether this run created anything at all, at any level.
    pub fn created_any(&self) -> bool {
        self.cni.created_any()
            || self.realm.created
            || self.realm.cgroup_created
            || self.realm.namespace_created
            || self.space.created
            || self.space.cgroup_created
            || self.space.network_created
            || self.stack.created
            || self.stack.cgroup_created
            || self.cell.created
            || self.cell.cgroup_created
            || self.cell.root_container_created
    }
}

/// Ensures the default `kukeon` Realm/Space/Stack/Cell scaffolding and the
/// CNI directories exist. Fixed order: CNI directories first, then the
/// hierarchy parent-first.
pub async fn bootstrap<R: Runner + ?Sized>(
    runner: &R,
    dirs: CniDirectories,
) -> Result<BootstrapReport> {
    let result = bootstrap_inner(runner, dirs).await;
    close_runner(runner).await;
    result
}

pub(crate) async fn bootstrap_inner<R: Runner + ?Sized>(
    runner: &R,
    dirs: CniDirectories,
) -> Result<BootstrapReport> {
    tracing::info!("bootstrapping default hierarchy");

    let cni = runner.bootstrap_cni(dirs).await?;
    let realm = realm::create_realm_inner(runner, Realm::new(DEFAULT_REALM)).await?;
    let space =
        space::create_space_inner(runner, Space::new(DEFAULT_SPACE, DEFAULT_REALM)).await?;
    let stack = stack::create_stack_inner(
        runner,
        Stack::new(DEFAULT_STACK, DEFAULT_REALM, DEFAULT_SPACE),
    )
    .await?;
    let cell = cell::create_cell_inner(
        runner,
        Cell::new(DEFAULT_CELL, DEFAULT_REALM, DEFAULT_SPACE, DEFAULT_STACK),
    )
    .await?;

    Ok(BootstrapReport {
        cni,
        realm,
        space,
        stack,
        cell,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::fake::FakeRunner;

    #[tokio::test]
    async fn bootstrap_scaffolds_the_default_hierarchy() {
        let runner = FakeRunner::new();

        let report = bootstrap(&runner, CniDirectories::default())
            .await
            .expect("bootstrap");

        assert!(report.created_any());
        assert!(report.cni.config_dir_created);
        assert!(report.realm.created);
        assert!(report.space.created);
        assert!(report.stack.created);
        assert!(report.cell.created);

        assert!(runner.realm("kukeon").is_some());
        assert!(runner.cell("kukeon", "kukeon", "kukeon", "kukeon").is_some());
        assert!(runner.has_network("kukeon-kukeon"));
    }

    #[tokio::test]
    async fn bootstrap_is_idempotent() {
        let runner = FakeRunner::new();
        bootstrap(&runner, CniDirectories::default())
            .await
            .expect("first bootstrap");

        let second = bootstrap(&runner, CniDirectories::default())
            .await
            .expect("second bootstrap");

        assert!(!second.created_any());
        assert!(second.realm.metadata_exists_pre);
        assert!(second.cell.metadata_exists_pre);
    }

    #[tokio::test]
    async fn cni_directories_run_first() {
        let runner = FakeRunner::new();
        bootstrap(&runner, CniDirectories::default())
            .await
            .expect("bootstrap");

        let calls = runner.calls();
        let cni_index = calls
            .iter()
            .position(|call| call.starts_with("bootstrap_cni"))
            .expect("cni call");
        let realm_index = calls
            .iter()
            .position(|call| call.starts_with("create_realm"))
            .expect("realm call");
        assert!(cni_index < realm_index);
    }
}
