//! Well-known names shared across the controller.

/// Name of the realm the bootstrap scaffolding creates.
pub const DEFAULT_REALM: &str = "kukeon";
/// Name of the space the bootstrap scaffolding creates.
pub const DEFAULT_SPACE: &str = "kukeon";
/// Name of the stack the bootstrap scaffolding creates.
pub const DEFAULT_STACK: &str = "kukeon";
/// Name of the cell the bootstrap scaffolding creates.
pub const DEFAULT_CELL: &str = "kukeon";

/// File name of the per-entity metadata document inside its directory.
pub const METADATA_FILE: &str = "kukeon.meta";

/// Root of the cgroup subtree managed by this controller.
pub const CGROUP_ROOT: &str = "/kukeon";

/// Default run path anchoring the on-disk metadata tree.
pub const DEFAULT_RUN_PATH: &str = "/var/lib/kukeon";

/// Label keys recording the ancestor chain of an admitted entity.
pub const REALM_LABEL: &str = "realm";
pub const SPACE_LABEL: &str = "space";
pub const STACK_LABEL: &str = "stack";
pub const CELL_LABEL: &str = "cell";

/// Default CNI directory layout scaffolded by bootstrap.
pub const DEFAULT_CNI_CONFIG_DIR: &str = "/etc/cni/net.d";
pub const DEFAULT_CNI_CACHE_DIR: &str = "/var/lib/cni";
pub const DEFAULT_CNI_BIN_DIR: &str = "/opt/cni/bin";
