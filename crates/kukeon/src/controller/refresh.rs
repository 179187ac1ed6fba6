//! Refresh: walk the persisted hierarchy, re-observe runtime truth through
//! the runner and write drift back into metadata.

use crate::{
    controller::close_runner,
    error::Result,
    model::HasMetadata,
    runner::Runner,
};

/// What a refresh walk found and what it had to update, by fully qualified
/// name (`realm/space/stack/cell`). Per-entity failures land in `errors` and
/// never abort the walk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefreshResult {
    pub found: Vec<String>,
    pub updated: Vec<String>,
    pub errors: Vec<String>,
}

impl RefreshResult {
    fn record(&mut self, fqn: &str, updated: bool) {
        self.found.push(fqn.to_string());
        if updated {
            self.updated.push(fqn.to_string());
        }
    }

    fn record_error(&mut self, fqn: &str, error: &crate::error::Error) {
        tracing::warn!(entity = %fqn, %error, "refresh failed for entity");
        self.errors.push(format!("{fqn}: {error}"));
    }
}

/// Walks `realms → spaces → stacks → cells` parent-first, refreshing each
/// entity from runtime truth. A parent's status is updated before its
/// children are observed.
pub async fn refresh<R: Runner + ?Sized>(runner: &R) -> Result<RefreshResult> {
    let result = refresh_inner(runner).await;
    close_runner(runner).await;
    result
}

pub(crate) async fn refresh_inner<R: Runner + ?Sized>(runner: &R) -> Result<RefreshResult> {
    let mut result = RefreshResult::default();

    for realm in runner.list_realms().await? {
        let realm_name = realm.name().to_string();
        match runner.refresh_realm(realm).await {
            Ok((_, updated)) => result.record(&realm_name, updated),
            Err(error) => result.record_error(&realm_name, &error),
        }

        for space in runner.list_spaces(&realm_name).await? {
            let space_fqn = format!("{realm_name}/{}", space.name());
            match runner.refresh_space(space.clone()).await {
                Ok((_, updated)) => result.record(&space_fqn, updated),
                Err(error) => result.record_error(&space_fqn, &error),
            }

            for stack in runner.list_stacks(&realm_name, space.name()).await? {
                let stack_fqn = format!("{space_fqn}/{}", stack.name());
                match runner.refresh_stack(stack.clone()).await {
                    Ok((_, updated)) => result.record(&stack_fqn, updated),
                    Err(error) => result.record_error(&stack_fqn, &error),
                }

                for cell in runner
                    .list_cells(&realm_name, space.name(), stack.name())
                    .await?
                {
                    let cell_fqn = format!("{stack_fqn}/{}", cell.name());
                    let pre_state = cell.status.state;
                    let pre_cgroup = cell.status.cgroup_path.clone();
                    match runner.refresh_cell(cell).await {
                        Ok((refreshed, containers_updated)) => {
                            // A cell counts as updated when its state or
                            // cgroup drifted, or any container status was
                            // refreshed.
                            let updated = refreshed.status.state != pre_state
                                || refreshed.status.cgroup_path != pre_cgroup
                                || containers_updated > 0;
                            result.record(&cell_fqn, updated);
                        }
                        Err(error) => result.record_error(&cell_fqn, &error),
                    }
                }
            }
        }
    }

    tracing::info!(
        found = result.found.len(),
        updated = result.updated.len(),
        errors = result.errors.len(),
        "refresh walk finished"
    );
    Ok(result)
}
