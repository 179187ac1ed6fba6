//! The runner port: the one seam through which the controller causes
//! runtime-visible effects (metadata writes, cgroups, containerd namespaces,
//! CNI networks, container tasks).
//!
//! The controller is written entirely against this trait and never against a
//! concrete runtime, which keeps it testable against the in-memory
//! [`fake::FakeRunner`]. Every operation takes fully-owned values and returns
//! owned values; callers must not retain runner-returned aliases across
//! calls. Operations are expected to block on disk I/O, runtime RPCs or CNI
//! plugin invocations; the controller holds no locks across them.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::{
    constants::{DEFAULT_CNI_BIN_DIR, DEFAULT_CNI_CACHE_DIR, DEFAULT_CNI_CONFIG_DIR},
    error::Result,
    model::{Cell, CgroupScope, Container, Realm, Space, Stack},
};

pub mod fake;

/// The global CNI directory layout bootstrap scaffolds. Unset fields fall
/// back to the conventional host locations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CniDirectories {
    pub config_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub bin_dir: Option<PathBuf>,
}

impl CniDirectories {
    /// Resolves the concrete directories, applying the defaults.
    pub fn resolve(&self) -> (PathBuf, PathBuf, PathBuf) {
        (
            self.config_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CNI_CONFIG_DIR)),
            self.cache_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CNI_CACHE_DIR)),
            self.bin_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CNI_BIN_DIR)),
        )
    }
}

/// Outcome of scaffolding the global CNI directories.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CniBootstrapReport {
    pub config_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub bin_dir: PathBuf,
    pub config_dir_created: bool,
    pub cache_dir_created: bool,
    pub bin_dir_created: bool,
}

impl CniBootstrapReport {
    pub fn created_any(&self) -> bool {
        self.config_dir_created || self.cache_dir_created || self.bin_dir_created
    }
}

/// The abstract capability surface the controller drives. See the module
/// documentation for the ownership and blocking rules.
#[async_trait]
pub trait Runner: Send + Sync {
    /// The run path anchoring the on-disk metadata tree. Used by the
    /// controller for diagnostics only; the layout itself is owned by the
    /// runner.
    fn run_path(&self) -> &Path;

    // Lookup. `get_*` returns the persisted entity or the kind's `*NotFound`
    // sentinel; empty list filters broaden the query.
    async fn get_realm(&self, realm: Realm) -> Result<Realm>;
    async fn get_space(&self, space: Space) -> Result<Space>;
    async fn get_stack(&self, stack: Stack) -> Result<Stack>;
    async fn get_cell(&self, cell: Cell) -> Result<Cell>;

    async fn list_realms(&self) -> Result<Vec<Realm>>;
    async fn list_spaces(&self, realm: &str) -> Result<Vec<Space>>;
    async fn list_stacks(&self, realm: &str, space: &str) -> Result<Vec<Stack>>;
    async fn list_cells(&self, realm: &str, space: &str, stack: &str) -> Result<Vec<Cell>>;
    async fn list_containers(
        &self,
        realm: &str,
        space: &str,
        stack: &str,
        cell: &str,
    ) -> Result<Vec<Container>>;

    // Existence probes bracketing mutations; the controller derives its
    // `*_created` flags from pre/post pairs of these.
    async fn exists_cgroup(&self, scope: CgroupScope) -> Result<bool>;
    async fn exists_realm_namespace(&self, namespace: String) -> Result<bool>;
    async fn exists_space_network(&self, space: Space) -> Result<bool>;
    async fn exists_cell_root_container(&self, cell: Cell) -> Result<bool>;

    // Create: metadata plus all runtime-side sub-resources. `create_realm`
    // may fail with the `NamespaceAlreadyExists` sentinel after the metadata
    // was written; the controller treats that as idempotent success. The
    // other kinds fail when the entity already exists runtime-side.
    async fn create_realm(&self, realm: Realm) -> Result<Realm>;
    async fn create_space(&self, space: Space) -> Result<Space>;
    async fn create_stack(&self, stack: Stack) -> Result<Stack>;
    async fn create_cell(&self, cell: Cell) -> Result<Cell>;

    // Ensure: called only when metadata already exists; reconciles any
    // missing runtime-side resources without touching the metadata identity.
    async fn ensure_realm(&self, realm: Realm) -> Result<Realm>;
    async fn ensure_space(&self, space: Space) -> Result<Space>;
    async fn ensure_stack(&self, stack: Stack) -> Result<Stack>;
    async fn ensure_cell(&self, cell: Cell) -> Result<Cell>;

    // Lifecycle of cells and their workloads.
    async fn start_cell(&self, cell: Cell) -> Result<Cell>;
    async fn stop_cell(&self, cell: Cell) -> Result<Cell>;
    async fn start_container(&self, cell: Cell, name: String) -> Result<Cell>;
    async fn stop_container(&self, cell: Cell, name: String) -> Result<Cell>;

    // Delete: metadata and runtime resources of the entity itself. Child
    // handling is the controller's cascade, not the runner's.
    async fn delete_realm(&self, realm: Realm) -> Result<()>;
    async fn delete_space(&self, space: Space) -> Result<()>;
    async fn delete_stack(&self, stack: Stack) -> Result<()>;
    async fn delete_cell(&self, cell: Cell) -> Result<()>;
    async fn delete_container(&self, cell: Cell, name: String) -> Result<Cell>;

    // Purge: reap orphaned runtime artefacts (CNI residues, IPAM
    // allocations, tasks without metadata). Safe against missing metadata;
    // returns audit entries describing what was reaped.
    async fn purge_realm(&self, realm: Realm) -> Result<Vec<String>>;
    async fn purge_space(&self, space: Space) -> Result<Vec<String>>;
    async fn purge_stack(&self, stack: Stack) -> Result<Vec<String>>;
    async fn purge_cell(&self, cell: Cell) -> Result<Vec<String>>;
    async fn purge_container(&self, cell: Cell, name: String) -> Result<Vec<String>>;

    // Refresh: re-observe runtime truth, write drift back into metadata and
    // report whether anything changed (for cells, how many containers).
    async fn refresh_realm(&self, realm: Realm) -> Result<(Realm, bool)>;
    async fn refresh_space(&self, space: Space) -> Result<(Space, bool)>;
    async fn refresh_stack(&self, stack: Stack) -> Result<(Stack, bool)>;
    async fn refresh_cell(&self, cell: Cell) -> Result<(Cell, usize)>;

    /// Persists a status transition of a cell (the controller owns the
    /// transition, the runner owns the write).
    async fn update_cell_metadata(&self, cell: Cell) -> Result<Cell>;

    /// Scaffolds the global CNI directory layout.
    async fn bootstrap_cni(&self, dirs: CniDirectories) -> Result<CniBootstrapReport>;

    /// Releases persistent connections. Invoked exactly once per top-level
    /// controller entry, on every exit path.
    async fn close(&self) -> Result<()>;
}
