//! A network-scoped subdomain inside a realm. Each space owns one CNI network
//! whose name is a deterministic function of `(realm, space)`; renaming either
//! side means creating a new space.

use serde::{Deserialize, Serialize};

use crate::{
    constants::{REALM_LABEL, SPACE_LABEL},
    error::{Error, Result},
    model::{HasMetadata, Metadata, State, trim_in_place},
};

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Space {
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: SpaceSpec,
    #[serde(default)]
    pub status: SpaceStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceSpec {
    #[serde(default)]
    pub id: String,
    pub realm_name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceStatus {
    #[serde(default)]
    pub state: State,
    #[serde(default)]
    pub cgroup_path: String,
    /// The derived CNI network name, recorded once the network is created.
    #[serde(default)]
    pub network_name: String,
}

impl Space {
    pub fn new(name: impl Into<String>, realm_name: impl Into<String>) -> Self {
        Self {
            metadata: Metadata::new(name),
            spec: SpaceSpec {
                id: String::new(),
                realm_name: realm_name.into(),
            },
            status: SpaceStatus::default(),
        }
    }

    pub fn admit(&mut self) -> Result<()> {
        trim_in_place(&mut self.metadata.name);
        if self.metadata.name.is_empty() {
            return Err(Error::SpaceNameRequired);
        }

        trim_in_place(&mut self.spec.realm_name);
        if self.spec.realm_name.is_empty() {
            return Err(Error::RealmNameRequired);
        }

        trim_in_place(&mut self.spec.id);
        if self.spec.id.is_empty() {
            self.spec.id = self.metadata.name.clone();
        }

        let realm = self.spec.realm_name.clone();
        let name = self.metadata.name.clone();
        self.metadata.label_if_missing(REALM_LABEL, &realm);
        self.metadata.label_if_missing(SPACE_LABEL, &name);

        Ok(())
    }
}

impl HasMetadata for Space {
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
