//! Document shapes of the `kukeon.io/v1alpha1` schema and their conversion
//! into the internal model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{
    Cell, CellSpec, Container, ContainerSpec, Metadata, Realm, RealmSpec, Space, SpaceSpec, Stack,
    StackSpec,
};

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl From<DocumentMetadata> for Metadata {
    fn from(metadata: DocumentMetadata) -> Self {
        Self {
            name: metadata.name,
            labels: metadata.labels,
        }
    }
}

/// Picks the internal parent reference over the external one when both are
/// present; the external `*Id` form is the compatibility spelling.
fn parent_ref(internal: Option<&String>, external: Option<&String>) -> String {
    internal
        .or(external)
        .map(String::to_owned)
        .unwrap_or_default()
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealmDocument {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
    #[serde(default)]
    pub spec: RealmDocumentSpec,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealmDocumentSpec {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
}

impl RealmDocument {
    pub fn to_realm(&self) -> Realm {
        Realm {
            metadata: self.metadata.clone().into(),
            spec: RealmSpec {
                id: self.spec.id.clone().unwrap_or_default(),
                namespace: self.spec.namespace.clone().unwrap_or_default(),
            },
            status: Default::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceDocument {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
    #[serde(default)]
    pub spec: SpaceDocumentSpec,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceDocumentSpec {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub realm_id: Option<String>,
    #[serde(default)]
    pub realm_name: Option<String>,
}

impl SpaceDocument {
    pub fn to_space(&self) -> Space {
        Space {
            metadata: self.metadata.clone().into(),
            spec: SpaceSpec {
                id: self.spec.id.clone().unwrap_or_default(),
                realm_name: parent_ref(self.spec.realm_name.as_ref(), self.spec.realm_id.as_ref()),
            },
            status: Default::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackDocument {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
    #[serde(default)]
    pub spec: StackDocumentSpec,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackDocumentSpec {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub realm_id: Option<String>,
    #[serde(default)]
    pub realm_name: Option<String>,
    #[serde(default)]
    pub space_id: Option<String>,
    #[serde(default)]
    pub space_name: Option<String>,
}

impl StackDocument {
    pub fn to_stack(&self) -> Stack {
        Stack {
            metadata: self.metadata.clone().into(),
            spec: StackSpec {
                id: self.spec.id.clone().unwrap_or_default(),
                realm_name: parent_ref(self.spec.realm_name.as_ref(), self.spec.realm_id.as_ref()),
                space_name: parent_ref(self.spec.space_name.as_ref(), self.spec.space_id.as_ref()),
            },
            status: Default::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellDocument {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
    #[serde(default)]
    pub spec: CellDocumentSpec,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellDocumentSpec {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub realm_id: Option<String>,
    #[serde(default)]
    pub realm_name: Option<String>,
    #[serde(default)]
    pub space_id: Option<String>,
    #[serde(default)]
    pub space_name: Option<String>,
    #[serde(default)]
    pub stack_id: Option<String>,
    #[serde(default)]
    pub stack_name: Option<String>,
    #[serde(default)]
    pub root_container: Option<WorkloadDocumentSpec>,
    #[serde(default)]
    pub containers: Vec<WorkloadDocumentSpec>,
}

/// A workload entry inside a cell document (or the payload of a standalone
/// container document).
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadDocumentSpec {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub containerd_id: Option<String>,
}

impl WorkloadDocumentSpec {
    fn to_container_spec(&self) -> ContainerSpec {
        ContainerSpec {
            id: self.id.clone().unwrap_or_default(),
            name: self.name.clone().unwrap_or_default(),
            image: self.image.clone(),
            command: self.command.clone(),
            args: self.args.clone(),
            containerd_id: self.containerd_id.clone(),
            ..ContainerSpec::default()
        }
    }
}

impl CellDocument {
    pub fn to_cell(&self) -> Cell {
        Cell {
            metadata: self.metadata.clone().into(),
            spec: CellSpec {
                id: self.spec.id.clone().unwrap_or_default(),
                realm_name: parent_ref(self.spec.realm_name.as_ref(), self.spec.realm_id.as_ref()),
                space_name: parent_ref(self.spec.space_name.as_ref(), self.spec.space_id.as_ref()),
                stack_name: parent_ref(self.spec.stack_name.as_ref(), self.spec.stack_id.as_ref()),
                root_container: self
                    .spec
                    .root_container
                    .as_ref()
                    .map(WorkloadDocumentSpec::to_container_spec),
                containers: self
                    .spec
                    .containers
                    .iter()
                    .map(WorkloadDocumentSpec::to_container_spec)
                    .collect(),
            },
            status: Default::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDocument {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
    #[serde(default)]
    pub spec: ContainerDocumentSpec,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDocumentSpec {
    #[serde(flatten)]
    pub workload: WorkloadDocumentSpec,
    #[serde(default)]
    pub realm_id: Option<String>,
    #[serde(default)]
    pub realm_name: Option<String>,
    #[serde(default)]
    pub space_id: Option<String>,
    #[serde(default)]
    pub space_name: Option<String>,
    #[serde(default)]
    pub stack_id: Option<String>,
    #[serde(default)]
    pub stack_name: Option<String>,
    #[serde(default)]
    pub cell_id: Option<String>,
    #[serde(default)]
    pub cell_name: Option<String>,
}

impl ContainerDocument {
    pub fn to_container(&self) -> Container {
        let mut spec = self.spec.workload.to_container_spec();
        spec.realm_name = parent_ref(
            self.spec.realm_name.as_ref(),
            self.spec.realm_id.as_ref(),
        );
        spec.space_name = parent_ref(
            self.spec.space_name.as_ref(),
            self.spec.space_id.as_ref(),
        );
        spec.stack_name = parent_ref(
            self.spec.stack_name.as_ref(),
            self.spec.stack_id.as_ref(),
        );
        spec.cell_name = parent_ref(self.spec.cell_name.as_ref(), self.spec.cell_id.as_ref());
        if spec.name.is_empty() {
            spec.name = self.metadata.name.clone();
        }

        Container {
            metadata: self.metadata.clone().into(),
            spec,
            status: Default::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn cell_documents_carry_their_workloads() {
        let input = indoc! {"
            apiVersion: kukeon.io/v1alpha1
            kind: Cell
            metadata:
              name: c1
            spec:
              realmName: r1
              spaceId: s1
              stackName: st1
              containers:
                - name: web
                  image: nginx:1.27
                  args: [\"-g\", \"daemon off;\"]
        "};

        let document: CellDocument = serde_yaml::from_str(input).expect("deserialize");
        let cell = document.to_cell();

        assert_eq!(cell.spec.space_name, "s1");
        assert_eq!(cell.spec.containers.len(), 1);
        assert_eq!(cell.spec.containers[0].image, "nginx:1.27");
        assert_eq!(cell.spec.containers[0].args, vec!["-g", "daemon off;"]);
    }

    #[test]
    fn container_documents_take_the_name_from_metadata() {
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
        "};

        let document: ContainerDocument = serde_yaml::from_str(input).expect("deserialize");
        let container = document.to_container();

        assert_eq!(container.spec.name, "web");
        assert_eq!(container.spec.cell_name, "c1");
        assert_eq!(container.spec.realm_name, "r1");
    }

    #[test]
    fn internal_references_win_over_external_ones() {
        let spec = SpaceDocumentSpec {
            realm_id: Some("external".to_string()),
            realm_name: Some("internal".to_string()),
            ..SpaceDocumentSpec::default()
        };
        let document = SpaceDocument {
            metadata: DocumentMetadata {
                name: "s1".to_string(),
                ..DocumentMetadata::default()
            },
            spec,
            ..SpaceDocument::default()
        };

        assert_eq!(document.to_space().spec.realm_name, "internal");
    }
}
