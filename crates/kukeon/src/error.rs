//! The error taxonomy shared across the controller, the runner port and the
//! apischeme.
//!
//! Every failure in this crate is one variant of [`Error`]. Callers identify
//! failures by [`ErrorKind`] comparison ([`Error::kind`], [`Error::has_kind`]),
//! never by message text; messages are for humans only. Operation variants
//! wrap their underlying cause in a boxed source so both the kind sentinel
//! and the original message survive the chain.

use snafu::Snafu;
use strum::EnumDiscriminants;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Process exit code for validation failures.
pub const EXIT_VALIDATION: i32 = 2;
/// Process exit code for refused deletes with remaining dependencies.
pub const EXIT_DEPENDENCIES: i32 = 3;
/// Process exit code for any other operation failure.
pub const EXIT_FAILURE: i32 = 1;

#[derive(Debug, PartialEq, Snafu, EnumDiscriminants)]
#[strum_discriminants(name(ErrorKind), derive(strum::Display))]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    // Validation. Terminal, never wrapped further.
    #[snafu(display("realm name is required"))]
    RealmNameRequired,

    #[snafu(display("space name is required"))]
    SpaceNameRequired,

    #[snafu(display("stack name is required"))]
    StackNameRequired,

    #[snafu(display("cell name is required"))]
    CellNameRequired,

    #[snafu(display("container name is required"))]
    ContainerNameRequired,

    #[snafu(display("invalid container image {image:?}"))]
    InvalidImage { image: String },

    #[snafu(display("invalid configuration: {message}"))]
    ConfigInvalid { message: String },

    // Lookup sentinels. Absence drives the create branch and is not an error
    // on that path.
    #[snafu(display("realm {name:?} not found"))]
    RealmNotFound { name: String },

    #[snafu(display("space {name:?} not found"))]
    SpaceNotFound { name: String },

    #[snafu(display("stack {name:?} not found"))]
    StackNotFound { name: String },

    #[snafu(display("cell {name:?} not found"))]
    CellNotFound { name: String },

    #[snafu(display("container {name:?} not found"))]
    ContainerNotFound { name: String },

    // Lookup wraps.
    #[snafu(display("failed to get realm {name:?}"))]
    GetRealm {
        name: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("failed to get space {name:?}"))]
    GetSpace {
        name: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("failed to get stack {name:?}"))]
    GetStack {
        name: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("failed to get cell {name:?}"))]
    GetCell {
        name: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("failed to get container {name:?}"))]
    GetContainer {
        name: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    // Create wraps.
    #[snafu(display("failed to create realm {name:?}"))]
    CreateRealm {
        name: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("failed to create space {name:?}"))]
    CreateSpace {
        name: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("failed to create stack {name:?}"))]
    CreateStack {
        name: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("failed to create cell {name:?}"))]
    CreateCell {
        name: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("failed to create container {name:?}"))]
    CreateContainer {
        name: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    // Delete wraps.
    #[snafu(display("failed to delete realm {name:?}"))]
    DeleteRealm {
        name: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("failed to delete space {name:?}"))]
    DeleteSpace {
        name: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("failed to delete stack {name:?}"))]
    DeleteStack {
        name: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("failed to delete cell {name:?}"))]
    DeleteCell {
        name: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("failed to delete container {name:?}"))]
    DeleteContainer {
        name: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    // Purge wraps.
    #[snafu(display("failed to purge realm {name:?}"))]
    PurgeRealm {
        name: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("failed to purge space {name:?}"))]
    PurgeSpace {
        name: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("failed to purge stack {name:?}"))]
    PurgeStack {
        name: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("failed to purge cell {name:?}"))]
    PurgeCell {
        name: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("failed to purge container {name:?}"))]
    PurgeContainer {
        name: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    // Lifecycle wraps.
    #[snafu(display("failed to start cell {name:?}"))]
    StartCell {
        name: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("failed to stop cell {name:?}"))]
    StopCell {
        name: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("failed to start container {name:?}"))]
    StartContainer {
        name: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("failed to stop container {name:?}"))]
    StopContainer {
        name: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    // Existence probe wraps.
    #[snafu(display("failed to check whether containerd namespace {namespace:?} exists"))]
    CheckNamespaceExists {
        namespace: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("failed to check whether CNI network {network:?} exists"))]
    CheckNetworkExists {
        network: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("failed to check whether cgroup {path:?} exists"))]
    CheckCgroupExists {
        path: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("failed to check whether the root container of cell {cell:?} exists"))]
    CheckRootContainerExists {
        cell: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    // Guards and remaining sentinels.
    #[snafu(display("containerd namespace {namespace:?} already exists"))]
    NamespaceAlreadyExists { namespace: String },

    #[snafu(display(
        "{kind} {name:?} has {count} {child_kind}(s); delete them first, or pass --cascade to delete them or --force to orphan them"
    ))]
    ResourceHasDependencies {
        kind: String,
        name: String,
        count: usize,
        child_kind: String,
    },

    #[snafu(display("cell {name:?} is already in Ready state and must first be stopped"))]
    CellAlreadyReady { name: String },

    #[snafu(display("cell {name:?} has running containers and must first be stopped"))]
    CellHasRunningContainers { name: String },

    #[snafu(display("container {container:?} in cell {cell:?} did not reach Ready state"))]
    ContainerNotReady { cell: String, container: String },

    #[snafu(display(
        "{kind} {name:?} reports {field} {found:?} but {requested:?} was requested (run path {run_path:?})"
    ))]
    ParentMismatch {
        kind: String,
        name: String,
        field: String,
        requested: String,
        found: String,
        run_path: String,
    },

    #[snafu(display("unknown document kind {kind:?}"))]
    UnknownKind { kind: String },

    #[snafu(display("failed to convert {kind} document"))]
    ConversionFailed {
        kind: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("runner operation {operation} failed: {message}"))]
    RunnerFailure { operation: String, message: String },
}

impl Error {
    /// The stable kind of this error, ignoring any wrapped cause.
    pub fn kind(&self) -> ErrorKind {
        self.into()
    }

    /// The directly wrapped cause, if this variant wraps one.
    pub fn cause(&self) -> Option<&Error> {
        match self {
            Self::GetRealm { source, .. }
            | Self::GetSpace { source, .. }
            | Self::GetStack { source, .. }
            | Self::GetCell { source, .. }
            | Self::GetContainer { source, .. }
            | Self::CreateRealm { source, .. }
            | Self::CreateSpace { source, .. }
            | Self::CreateStack { source, .. }
            | Self::CreateCell { source, .. }
            | Self::CreateContainer { source, .. }
            | Self::DeleteRealm { source, .. }
            | Self::DeleteSpace { source, .. }
            | Self::DeleteStack { source, .. }
            | Self::DeleteCell { source, .. }
            | Self::DeleteContainer { source, .. }
            | Self::PurgeRealm { source, .. }
            | Self::PurgeSpace { source, .. }
            | Self::PurgeStack { source, .. }
            | Self::PurgeCell { source, .. }
            | Self::PurgeContainer { source, .. }
            | Self::StartCell { source, .. }
            | Self::StopCell { source, .. }
            | Self::StartContainer { source, .. }
            | Self::StopContainer { source, .. }
            | Self::CheckNamespaceExists { source, .. }
            | Self::CheckNetworkExists { source, .. }
            | Self::CheckCgroupExists { source, .. }
            | Self::CheckRootContainerExists { source, .. }
            | Self::ConversionFailed { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Whether this error, or any cause in its chain, has the given kind.
    pub fn has_kind(&self, kind: ErrorKind) -> bool {
        let mut current = Some(self);
        while let Some(error) = current {
            if error.kind() == kind {
                return true;
            }
            current = error.cause();
        }
        false
    }

    /// Whether this error is one of the `*NotFound` lookup sentinels.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::RealmNotFound
                | ErrorKind::SpaceNotFound
                | ErrorKind::StackNotFound
                | ErrorKind::CellNotFound
                | ErrorKind::ContainerNotFound
        )
    }

    /// Whether this error is a terminal validation failure.
    pub fn is_validation(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::RealmNameRequired
                | ErrorKind::SpaceNameRequired
                | ErrorKind::StackNameRequired
                | ErrorKind::CellNameRequired
                | ErrorKind::ContainerNameRequired
                | ErrorKind::InvalidImage
                | ErrorKind::ConfigInvalid
        )
    }

    /// Process exit code for this error: 2 for validation failures, 3 for
    /// refused deletes with remaining dependencies, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.has_kind(ErrorKind::ResourceHasDependencies) {
            EXIT_DEPENDENCIES
        } else if self.is_validation() {
            EXIT_VALIDATION
        } else {
            EXIT_FAILURE
        }
    }
}
