//! A logical grouping inside a space, owning a cgroup subtree.

use serde::{Deserialize, Serialize};

use crate::{
    constants::{REALM_LABEL, SPACE_LABEL, STACK_LABEL},
    error::{Error, Result},
    model::{HasMetadata, Metadata, State, trim_in_place},
};

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stack {
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: StackSpec,
    #[serde(default)]
    pub status: StackStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackSpec {
    #[serde(default)]
    pub id: String,
    pub realm_name: String,
    pub space_name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackStatus {
    #[serde(default)]
    pub state: State,
    #[serde(default)]
    pub cgroup_path: String,
}

impl Stack {
    pub fn new(
        name: impl Into<String>,
        realm_name: impl Into<String>,
        space_name: impl Into<String>,
    ) -> Self {
        Self {
            metadata: Metadata::new(name),
            spec: StackSpec {
                id: String::new(),
                realm_name: realm_name.into(),
                space_name: space_name.into(),
            },
            status: StackStatus::default(),
        }
    }

    pub fn admit(&mut self) -> Result<()> {
        trim_in_place(&mut self.metadata.name);
        if self.metadata.name.is_empty() {
            return Err(Error::StackNameRequired);
        }

        trim_in_place(&mut self.spec.realm_name);
        if self.spec.realm_name.is_empty() {
            return Err(Error::RealmNameRequired);
        }

        trim_in_place(&mut self.spec.space_name);
        if self.spec.space_name.is_empty() {
            return Err(Error::SpaceNameRequired);
        }

        trim_in_place(&mut self.spec.id);
        if self.spec.id.is_empty() {
            self.spec.id = self.metadata.name.clone();
        }

        let realm = self.spec.realm_name.clone();
        let space = self.spec.space_name.clone();
        let name = self.metadata.name.clone();
        self.metadata.label_if_missing(REALM_LABEL, &realm);
        self.metadata.label_if_missing(SPACE_LABEL, &space);
        self.metadata.label_if_missing(STACK_LABEL, &name);

        Ok(())
    }
}

impl HasMetadata for Stack {
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("", "r1", "s1", Error::StackNameRequired)]
    #[case("st1", "", "s1", Error::RealmNameRequired)]
    #[case("st1", "r1", " ", Error::SpaceNameRequired)]
    fn admit_validates_all_names(
        #[case] name: &str,
        #[case] realm: &str,
        #[case] space: &str,
        #[case] expected: Error,
    ) {
        let mut stack = Stack::new(name, realm, space);
        assert_eq!(stack.admit(), Err(expected));
    }

    #[test]
    fn admit_fills_the_full_chain() {
        let mut stack = Stack::new("st1", "r1", "s1");
        stack.admit().expect("admission should succeed");

        assert_eq!(stack.metadata.labels["realm"], "r1");
        assert_eq!(stack.metadata.labels["space"], "s1");
        assert_eq!(stack.metadata.labels["stack"], "st1");
    }
}
