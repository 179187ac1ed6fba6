//! The top-level isolation domain. A realm owns one containerd namespace and
//! the root of its cgroup subtree.

use serde::{Deserialize, Serialize};

use crate::{
    constants::REALM_LABEL,
    error::{Error, Result},
    model::{HasMetadata, Metadata, State, trim_in_place},
};

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Realm {
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: RealmSpec,
    #[serde(default)]
    pub status: RealmStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealmSpec {
    /// Stable identifier, defaulted from the metadata name on admission.
    #[serde(default)]
    pub id: String,
    /// The containerd namespace owned by this realm, defaulted from the name.
    #[serde(default)]
    pub namespace: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealmStatus {
    #[serde(default)]
    pub state: State,
    #[serde(default)]
    pub cgroup_path: String,
}

impl Realm {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            metadata: Metadata::new(name),
            ..Self::default()
        }
    }

    /// Trims and validates the name, fills spec defaults and the ancestor
    /// label chain.
    pub fn admit(&mut self) -> Result<()> {
        trim_in_place(&mut self.metadata.name);
        if self.metadata.name.is_empty() {
            return Err(Error::RealmNameRequired);
        }

        trim_in_place(&mut self.spec.id);
        if self.spec.id.is_empty() {
            self.spec.id = self.metadata.name.clone();
        }

        trim_in_place(&mut self.spec.namespace);
        if self.spec.namespace.is_empty() {
            self.spec.namespace = self.metadata.name.clone();
        }

        let name = self.metadata.name.clone();
        self.metadata.label_if_missing(REALM_LABEL, &name);

        Ok(())
    }
}

impl HasMetadata for Realm {
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
