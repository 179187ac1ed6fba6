//! Workload container specs. Containers are owned by a cell; their four
//! parent-name fields are forced to the enclosing cell on admission.

use serde::{Deserialize, Serialize};

use crate::{
    constants::{CELL_LABEL, REALM_LABEL, SPACE_LABEL, STACK_LABEL},
    error::{Error, Result},
    model::{HasMetadata, Metadata, State, trim_in_place},
};

/// A container as addressed by the controller: a spec plus its own
/// metadata/status sections, mirroring the other kinds.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: ContainerSpec,
    #[serde(default)]
    pub status: ContainerState,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSpec {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default)]
    pub realm_name: String,
    #[serde(default)]
    pub space_name: String,
    #[serde(default)]
    pub stack_name: String,
    #[serde(default)]
    pub cell_name: String,
    /// Runtime-side identifier, set once the task exists. Purge falls back to
    /// the derived runtime name when this is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub containerd_id: Option<String>,
}

/// Per-container observed state, as recorded in the owning cell's status.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerState {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state: State,
}

impl ContainerSpec {
    /// Trims and validates the spec on its own: name/id default from each
    /// other and the image must be non-empty.
    pub fn admit(&mut self) -> Result<()> {
        trim_in_place(&mut self.name);
        trim_in_place(&mut self.id);
        if self.name.is_empty() {
            if self.id.is_empty() {
                return Err(Error::ContainerNameRequired);
            }
            self.name = self.id.clone();
        }
        if self.id.is_empty() {
            self.id = self.name.clone();
        }

        trim_in_place(&mut self.image);
        if self.image.is_empty() {
            return Err(Error::InvalidImage {
                image: self.image.clone(),
            });
        }

        Ok(())
    }

    /// Forces the four parent-name fields to the enclosing cell's.
    pub fn force_parents(&mut self, realm: &str, space: &str, stack: &str, cell: &str) {
        self.realm_name = realm.to_string();
        self.space_name = space.to_string();
        self.stack_name = stack.to_string();
        self.cell_name = cell.to_string();
    }
}

impl Container {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            metadata: Metadata::new(name.clone()),
            spec: ContainerSpec {
                name,
                image: image.into(),
                ..ContainerSpec::default()
            },
            status: ContainerState::default(),
        }
    }

    pub fn admit(&mut self) -> Result<()> {
        trim_in_place(&mut self.metadata.name);
        if self.metadata.name.is_empty() {
            self.metadata.name = self.spec.name.trim().to_string();
        }
        if self.spec.name.trim().is_empty() {
            self.spec.name = self.metadata.name.clone();
        }
        self.spec.admit()?;
        self.metadata.name = self.spec.name.clone();

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
        trim_in_place(&mut self.spec.cell_name);
        if self.spec.cell_name.is_empty() {
            return Err(Error::CellNameRequired);
        }

        let (realm, space, stack, cell) = (
            self.spec.realm_name.clone(),
            self.spec.space_name.clone(),
            self.spec.stack_name.clone(),
            self.spec.cell_name.clone(),
        );
        self.metadata.label_if_missing(REALM_LABEL, &realm);
        self.metadata.label_if_missing(SPACE_LABEL, &space);
        self.metadata.label_if_missing(STACK_LABEL, &stack);
        self.metadata.label_if_missing(CELL_LABEL, &cell);

        self.status.name = self.metadata.name.clone();

        Ok(())
    }
}

impl HasMetadata for Container {
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
