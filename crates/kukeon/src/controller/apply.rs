//! The apply engine: drives a heterogeneous document set through the
//! idempotent reconciliation pipeline in topological order.

use std::collections::BTreeMap;

use crate::{
    apischeme::Document,
    controller::{cell, close_runner, container, realm, space, stack},
    error::{Error, Result},
    model::Entity,
    runner::Runner,
};

/// What happened to one resource during apply.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Action {
    Created,
    Updated,
    #[default]
    Unchanged,
    Failed,
}

/// Per-resource outcome, in processing order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceResult {
    /// Position of the document in the original input.
    pub index: usize,
    pub kind: String,
    pub name: String,
    pub action: Action,
    pub error: Option<String>,
    /// Sub-resources this apply (re)created, e.g. `"cgroup"`.
    pub changes: Vec<String>,
    pub details: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ApplyResult {
    pub resources: Vec<ResourceResult>,
}

impl ApplyResult {
    pub fn failed_count(&self) -> usize {
        self.resources
            .iter()
            .filter(|resource| resource.action == Action::Failed)
            .count()
    }
}

/// Applies the documents: stable-sorts them by kind priority (ties broken by
/// input order), reconciles each one and reports a per-resource action. The
/// batch always runs to completion; failures never short-circuit it.
pub async fn apply<R: Runner + ?Sized>(runner: &R, documents: Vec<Document>) -> Result<ApplyResult> {
    let result = apply_inner(runner, documents).await;
    close_runner(runner).await;
    result
}

pub(crate) async fn apply_inner<R: Runner + ?Sized>(
    runner: &R,
    documents: Vec<Document>,
) -> Result<ApplyResult> {
    let mut ordered: Vec<(usize, Document)> = documents.into_iter().enumerate().collect();
    ordered.sort_by_key(|(index, document)| (document.priority(), *index));

    let mut resources = Vec::with_capacity(ordered.len());
    for (index, document) in ordered {
        let mut resource = reconcile_document(runner, &document).await;
        resource.index = index;
        tracing::debug!(
            kind = %resource.kind,
            name = %resource.name,
            action = %resource.action,
            "applied resource"
        );
        resources.push(resource);
    }

    Ok(ApplyResult { resources })
}

async fn reconcile_document<R: Runner + ?Sized>(runner: &R, document: &Document) -> ResourceResult {
    let kind = document.kind_name();
    let name = document.name();

    let entity = match document.normalize() {
        Ok(entity) => entity,
        Err(error) => return failed(kind, name, &error),
    };

    match entity {
        Entity::Realm(entity) => match realm::create_realm_inner(runner, entity).await {
            Ok(result) => {
                let changes = change_list(&[
                    ("cgroup", result.cgroup_created),
                    ("namespace", result.namespace_created),
                ]);
                let details = BTreeMap::from([(
                    "namespace".to_string(),
                    result.realm.spec.namespace.clone(),
                )]);
                outcome(kind, name, result.created, changes, details)
            }
            Err(error) => failed(kind, name, &error),
        },
        Entity::Space(entity) => match space::create_space_inner(runner, entity).await {
            Ok(result) => {
                let changes = change_list(&[
                    ("cgroup", result.cgroup_created),
                    ("cni-network", result.network_created),
                ]);
                let details = BTreeMap::from([(
                    "network".to_string(),
                    result.space.status.network_name.clone(),
                )]);
                outcome(kind, name, result.created, changes, details)
            }
            Err(error) => failed(kind, name, &error),
        },
        Entity::Stack(entity) => match stack::create_stack_inner(runner, entity).await {
            Ok(result) => {
                let changes = change_list(&[("cgroup", result.cgroup_created)]);
                let details = BTreeMap::from([(
                    "cgroup".to_string(),
                    result.stack.status.cgroup_path.clone(),
                )]);
                outcome(kind, name, result.created, changes, details)
            }
            Err(error) => failed(kind, name, &error),
        },
        Entity::Cell(entity) => match cell::create_cell_inner(runner, entity).await {
            Ok(result) => {
                let changes = change_list(&[
                    ("cgroup", result.cgroup_created),
                    ("root-container", result.root_container_created),
                    ("containers", !result.created && !result.started.is_empty()),
                ]);
                let details = BTreeMap::from([(
                    "containers".to_string(),
                    result.cell.spec.containers.len().to_string(),
                )]);
                outcome(kind, name, result.created, changes, details)
            }
            Err(error) => failed(kind, name, &error),
        },
        Entity::Container(entity) => {
            match container::create_container_inner(runner, entity).await {
                Ok(result) => {
                    let changes = change_list(&[("container-spec", result.changed)]);
                    let details =
                        BTreeMap::from([("image".to_string(), result.container.image.clone())]);
                    outcome(kind, name, result.created, changes, details)
                }
                Err(error) => failed(kind, name, &error),
            }
        }
    }
}

fn change_list(candidates: &[(&str, bool)]) -> Vec<String> {
    candidates
        .iter()
        .filter(|(_, changed)| *changed)
        .map(|(label, _)| (*label).to_string())
        .collect()
}

fn outcome(
    kind: String,
    name: String,
    created: bool,
    changes: Vec<String>,
    details: BTreeMap<String, String>,
) -> ResourceResult {
    let action = if created {
        Action::Created
    } else if changes.is_empty() {
        Action::Unchanged
    } else {
        Action::Updated
    };
    ResourceResult {
        index: 0,
        kind,
        name,
        action,
        error: None,
        changes: if created { Vec::new() } else { changes },
        details,
    }
}

fn failed(kind: String, name: String, error: &Error) -> ResourceResult {
    ResourceResult {
        index: 0,
        kind,
        name,
        action: Action::Failed,
        error: Some(render_chain(error)),
        changes: Vec::new(),
        details: BTreeMap::new(),
    }
}

/// Flattens an error chain into one human-readable line.
fn render_chain(error: &Error) -> String {
    let mut message = error.to_string();
    let mut current = error.cause();
    while let Some(cause) = current {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        current = cause.cause();
    }
    message
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::{apischeme::parse_documents, runner::fake::FakeRunner};

    fn documents(input: &str) -> Vec<Document> {
        parse_documents(input).expect("parse")
    }

    #[tokio::test]
    async fn mixed_kinds_are_processed_in_topological_order() {
        let runner = FakeRunner::new();
        let input = indoc! {"
            kind: Container
            metadata:
              name: web
            spec:
              image: nginx:1.27
              realmId: r1
              spaceId: s1
              stackId: st1
              cellId: c1
            ---
            kind: Realm
            metadata:
              name: r1
            ---
            kind: Space
            metadata:
              name: s1
            spec:
              realmId: r1
        "};

        let result = apply(&runner, documents(input)).await.expect("apply");

        let indices: Vec<_> = result.resources.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![1, 2, 0]);
        assert_eq!(result.resources[0].kind, "Realm");
        assert_eq!(result.resources[1].kind, "Space");
        assert_eq!(result.resources[2].kind, "Container");

        assert_eq!(result.resources[0].action, Action::Created);
        assert_eq!(result.resources[1].action, Action::Created);
        // The container's cell was never applied, so it fails without
        // aborting the batch.
        assert_eq!(result.resources[2].action, Action::Failed);
    }

    #[tokio::test]
    async fn a_full_hierarchy_applies_in_one_pass() {
        let runner = FakeRunner::new();
        let input = indoc! {"
            kind: Cell
            metadata:
              name: c1
            spec:
              realmId: r1
              spaceId: s1
              stackId: st1
              containers:
                - name: web
                  image: nginx:1.27
            ---
            kind: Stack
            metadata:
              name: st1
            spec:
              realmId: r1
              spaceId: s1
            ---
            kind: Space
            metadata:
              name: s1
            spec:
              realmId: r1
            ---
            kind: Realm
            metadata:
              name: r1
        "};

        let result = apply(&runner, documents(input)).await.expect("apply");

        assert_eq!(result.failed_count(), 0);
        let actions: Vec<_> = result.resources.iter().map(|r| r.action).collect();
        assert_eq!(actions, vec![Action::Created; 4]);
        assert!(runner.has_task("r1-s1-c1-web"));
    }

    #[tokio::test]
    async fn reapplying_the_same_documents_is_unchanged() {
        let runner = FakeRunner::new();
        let input = indoc! {"
            kind: Realm
            metadata:
              name: r1
            ---
            kind: Space
            metadata:
              name: s1
            spec:
              realmId: r1
        "};

        apply(&runner, documents(input)).await.expect("first apply");
        let second = apply(&runner, documents(input)).await.expect("second apply");

        let actions: Vec<_> = second.resources.iter().map(|r| r.action).collect();
        assert_eq!(actions, vec![Action::Unchanged; 2]);
    }

    #[tokio::test]
    async fn drifted_resources_report_updated() {
        let runner = FakeRunner::new();
        let input = "kind: Realm\nmetadata:\n  name: r1\n";

        apply(&runner, documents(input)).await.expect("first apply");
        runner.remove_cgroup("/kukeon/r1");

        let second = apply(&runner, documents(input)).await.expect("second apply");

        assert_eq!(second.resources[0].action, Action::Updated);
        assert_eq!(second.resources[0].changes, vec!["cgroup"]);
    }

    #[tokio::test]
    async fn unknown_kinds_fail_without_aborting() {
        let runner = FakeRunner::new();
        let input = indoc! {"
            kind: Gadget
            metadata:
              name: g1
            ---
            kind: Realm
            metadata:
              name: r1
        "};

        let result = apply(&runner, documents(input)).await.expect("apply");

        assert_eq!(result.resources[0].kind, "Realm");
        assert_eq!(result.resources[0].action, Action::Created);
        assert_eq!(result.resources[1].kind, "Gadget");
        assert_eq!(result.resources[1].action, Action::Failed);
        let error = result.resources[1].error.as_deref().expect("error message");
        assert!(error.contains("unknown document kind"));
    }

    #[tokio::test]
    async fn validation_failures_are_reported_per_resource() {
        let runner = FakeRunner::new();
        let input = indoc! {"
            kind: Realm
            metadata:
              name: \"   \"
            ---
            kind: Realm
            metadata:
              name: r1
        "};

        let result = apply(&runner, documents(input)).await.expect("apply");

        assert_eq!(result.failed_count(), 1);
        assert_eq!(result.resources[0].action, Action::Failed);
        let error = result.resources[0].error.as_deref().expect("error message");
        assert!(error.contains("realm name is required"));
        assert_eq!(result.resources[1].action, Action::Created);
    }
}
