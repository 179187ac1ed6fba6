//! The unit that actually runs workloads. A cell owns a cgroup subtree, an
//! optional root (pause) container holding its namespaces alive, and zero or
//! more workload container specs.

use serde::{Deserialize, Serialize};

use crate::{
    constants::{CELL_LABEL, REALM_LABEL, SPACE_LABEL, STACK_LABEL},
    error::{Error, Result},
    model::{Container, ContainerSpec, ContainerState, HasMetadata, Metadata, State, trim_in_place},
};

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: CellSpec,
    #[serde(default)]
    pub status: CellStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellSpec {
    #[serde(default)]
    pub id: String,
    pub realm_name: String,
    pub space_name: String,
    pub stack_name: String,
    /// Placeholder container keeping the cell's namespaces alive
    /// independently of the workloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_container: Option<ContainerSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<ContainerSpec>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellStatus {
    #[serde(default)]
    pub state: State,
    #[serde(default)]
    pub cgroup_path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<ContainerState>,
}

impl Cell {
    pub fn new(
        name: impl Into<String>,
        realm_name: impl Into<String>,
        space_name: impl Into<String>,
        stack_name: impl Into<String>,
    ) -> Self {
        Self {
            metadata: Metadata::new(name),
            spec: CellSpec {
                id: String::new(),
                realm_name: realm_name.into(),
                space_name: space_name.into(),
                stack_name: stack_name.into(),
                root_container: None,
                containers: Vec::new(),
            },
            status: CellStatus::default(),
        }
    }

    pub fn admit(&mut self) -> Result<()> {
        trim_in_place(&mut self.metadata.name);
        if self.metadata.name.is_empty() {
            return Err(Error::CellNameRequired);
        }

        trim_in_place(&mut self.spec.realm_name);
        if self.spec.realm_name.is_empty() {
            return Err(Error::RealmNameRequired);
        }
        trim_in_place(&mut self.spec.space_name);
        if self.spec.space_name.is_empty() {
            return Err(Error::SpaceNameRequired);
        }
        trim_in_place(&mut self.spec.stack_name);
        if self.spec.stack_name.is_empty() {
            return Err(Error::StackNameRequired);
        }

        trim_in_place(&mut self.spec.id);
        if self.spec.id.is_empty() {
            self.spec.id = self.metadata.name.clone();
        }

        let (realm, space, stack, name) = (
            self.spec.realm_name.clone(),
            self.spec.space_name.clone(),
            self.spec.stack_name.clone(),
            self.metadata.name.clone(),
        );
        self.metadata.label_if_missing(REALM_LABEL, &realm);
        self.metadata.label_if_missing(SPACE_LABEL, &space);
        self.metadata.label_if_missing(STACK_LABEL, &stack);
        self.metadata.label_if_missing(CELL_LABEL, &name);

        if let Some(root) = &mut self.spec.root_container {
            root.admit()?;
            root.force_parents(&realm, &space, &stack, &name);
        }
        for container in &mut self.spec.containers {
            container.admit()?;
            container.force_parents(&realm, &space, &stack, &name);
        }

        Ok(())
    }

    /// The workload spec with the given name, if present.
    pub fn container_spec(&self, name: &str) -> Option<&ContainerSpec> {
        self.spec
            .containers
            .iter()
            .find(|container| container.name == name)
    }

    /// The observed state entry for the given container, if present.
    pub fn container_state(&self, name: &str) -> Option<&ContainerState> {
        self.status
            .containers
            .iter()
            .find(|container| container.name == name)
    }

    /// Whether any container of this cell is observed as running. `Unknown`
    /// counts as not running.
    pub fn has_running_containers(&self) -> bool {
        self.status
            .containers
            .iter()
            .any(|container| container.state.is_running())
    }

    /// Records `state` for every workload container in the status section,
    /// rebuilding the list from the spec.
    pub fn record_container_states(&mut self, state: State) {
        self.status.containers = self
            .spec
            .containers
            .iter()
            .map(|container| ContainerState {
                name: container.name.clone(),
                state,
            })
            .collect();
    }

    /// Records `state` for one container, appending the entry if missing.
    pub fn record_container_state(&mut self, name: &str, state: State) {
        match self
            .status
            .containers
            .iter_mut()
            .find(|container| container.name == name)
        {
            Some(entry) => entry.state = state,
            None => self.status.containers.push(ContainerState {
                name: name.to_string(),
                state,
            }),
        }
    }

    /// Projects one owned workload into a standalone [`Container`] value.
    pub fn container(&self, name: &str) -> Option<Container> {
        let spec = self.container_spec(name)?.clone();
        let status = self
            .container_state(name)
            .cloned()
            .unwrap_or_else(|| ContainerState {
                name: name.to_string(),
                state: State::Unknown,
            });
        Some(Container {
            metadata: Metadata::new(name),
            spec,
            status,
        })
    }
}

impl HasMetadata for Cell {
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell_with_containers() -> Cell {
        let mut cell = Cell::new("c1", "r1", "s1", "st1");
        cell.spec.containers = vec![
            ContainerSpec {
                name: "web".to_string(),
                image: "nginx:1.27".to_string(),
                realm_name: "other".to_string(),
                ..ContainerSpec::default()
            },
            ContainerSpec {
                id: "db".to_string(),
                image: "postgres:17".to_string(),
                ..ContainerSpec::default()
            },
        ];
        cell
    }

    #[test]
    fn admission_forces_container_ownership() {
        let mut cell = cell_with_containers();
        cell.admit().expect("admission should succeed");

        for container in &cell.spec.containers {
            assert_eq!(container.realm_name, "r1");
            assert_eq!(container.space_name, "s1");
            assert_eq!(container.stack_name, "st1");
            assert_eq!(container.cell_name, "c1");
        }
        // name defaulted from id
        assert_eq!(cell.spec.containers[1].name, "db");
    }

    #[test]
    fn admission_rejects_a_container_without_image() {
        let mut cell = Cell::new("c1", "r1", "s1", "st1");
        cell.spec.containers = vec![ContainerSpec {
            name: "broken".to_string(),
            ..ContainerSpec::default()
        }];

        let err = cell.admit().expect_err("blank image must fail");
        assert_eq!(
            err,
            Error::InvalidImage {
                image: String::new()
            }
        );
    }

    #[test]
    fn running_containers_are_detected() {
        let mut cell = cell_with_containers();
        cell.admit().expect("admission should succeed");

        cell.record_container_states(State::Stopped);
        assert!(!cell.has_running_containers());

        cell.record_container_state("web", State::Ready);
        assert!(cell.has_running_containers());
        assert_eq!(cell.container_state("db").map(|c| c.state), Some(State::Stopped));
    }
}
