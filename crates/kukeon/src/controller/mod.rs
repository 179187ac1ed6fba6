//! The reconciliation controller: translates typed resource documents into
//! the host-side resource graph through the runner port and reports precise
//! pre/post outcomes.
//!
//! Every top-level entry point here observes pre-state, mutates, then derives
//! its `*_created` flags from the pre/post pair; the flags are never stored
//! state. Each entry also guarantees that `runner.close()` runs on every exit
//! path, success and error alike.

mod apply;
mod bootstrap;
mod cell;
mod container;
mod realm;
mod refresh;
mod space;
mod stack;

pub use apply::{Action, ApplyResult, ResourceResult, apply};
pub use bootstrap::{BootstrapReport, bootstrap};
pub use cell::{
    CreateCellResult, DeleteCellResult, GetCellResult, PurgeCellResult, StartCellResult,
    StopCellResult, create_cell, delete_cell, get_cell, list_cells, purge_cell, start_cell,
    stop_cell,
};
pub use container::{
    CreateContainerResult, DeleteContainerResult, GetContainerResult, PurgeContainerResult,
    StartContainerResult, StopContainerResult, create_container, delete_container, get_container,
    list_containers, purge_container, start_container, stop_container,
};
pub use realm::{
    CreateRealmResult, DeleteRealmResult, GetRealmResult, PurgeRealmResult, create_realm,
    delete_realm, get_realm, list_realms, purge_realm,
};
pub use refresh::{RefreshResult, refresh};
pub use space::{
    CreateSpaceResult, DeleteSpaceResult, GetSpaceResult, PurgeSpaceResult, create_space,
    delete_space, get_space, list_spaces, purge_space,
};
pub use stack::{
    CreateStackResult, DeleteStackResult, GetStackResult, PurgeStackResult, create_stack,
    delete_stack, get_stack, list_stacks, purge_stack,
};

use crate::runner::Runner;

/// The single derivation rule behind every `*_created` flag: a resource was
/// created by this call iff it exists now and did not exist before.
pub(crate) fn created(exists_pre: bool, exists_post: bool) -> bool {
    exists_post && !exists_pre
}

/// Releases the runner at the end of a top-level entry. Close failures are
/// logged and never override the operation's result.
pub(crate) async fn close_runner<R: Runner + ?Sized>(runner: &R) {
    if let Err(error) = runner.close().await {
        tracing::warn!(%error, "failed to close runner");
    }
}
