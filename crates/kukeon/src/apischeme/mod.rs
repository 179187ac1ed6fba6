//! The versioned document schema and the external→internal normalization
//! boundary.
//!
//! Documents arrive with `apiVersion`, `kind`, `metadata`, `spec` sections
//! and reference their parents either in the external form (`realmId`,
//! `spaceId`, …) or the internal one (`realmName`, …). [`Document::normalize`]
//! converts a document into the internal model exactly once, at entry; the
//! reconciliation primitives never see external shapes.

use serde::Deserialize;
use snafu::ResultExt;

use crate::{
    error::{ConversionFailedSnafu, Error, Result},
    model::{Entity, Kind},
};

pub mod v1alpha1;

pub use v1alpha1::{
    CellDocument, ContainerDocument, DocumentMetadata, RealmDocument, SpaceDocument, StackDocument,
};

/// The document schema version this build understands.
pub const API_VERSION: &str = "kukeon.io/v1alpha1";

/// One typed input document. Unknown kinds are carried through so the apply
/// engine can report them as failed resources instead of dropping them.
#[derive(Clone, Debug, PartialEq)]
pub enum Document {
    Realm(RealmDocument),
    Space(SpaceDocument),
    Stack(StackDocument),
    Cell(CellDocument),
    Container(ContainerDocument),
    Unknown { kind: String, name: String },
}

impl Document {
    /// The declared kind, as written in the document.
    pub fn kind_name(&self) -> String {
        match self {
            Self::Realm(_) => Kind::Realm.to_string(),
            Self::Space(_) => Kind::Space.to_string(),
            Self::Stack(_) => Kind::Stack.to_string(),
            Self::Cell(_) => Kind::Cell.to_string(),
            Self::Container(_) => Kind::Container.to_string(),
            Self::Unknown { kind, .. } => kind.clone(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::Realm(doc) => doc.metadata.name.clone(),
            Self::Space(doc) => doc.metadata.name.clone(),
            Self::Stack(doc) => doc.metadata.name.clone(),
            Self::Cell(doc) => doc.metadata.name.clone(),
            Self::Container(doc) => doc.metadata.name.clone(),
            Self::Unknown { name, .. } => name.clone(),
        }
    }

    /// The topological priority used by the apply engine; unknown kinds sort
    /// last and fail during normalization.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Realm(_) => Kind::Realm.priority(),
            Self::Space(_) => Kind::Space.priority(),
            Self::Stack(_) => Kind::Stack.priority(),
            Self::Cell(_) => Kind::Cell.priority(),
            Self::Container(_) => Kind::Container.priority(),
            Self::Unknown { .. } => u8::MAX,
        }
    }

    /// Converts the document into the internal model.
    pub fn normalize(&self) -> Result<Entity> {
        self.check_api_version()?;
        match self {
            Self::Realm(doc) => Ok(Entity::Realm(doc.to_realm())),
            Self::Space(doc) => Ok(Entity::Space(doc.to_space())),
            Self::Stack(doc) => Ok(Entity::Stack(doc.to_stack())),
            Self::Cell(doc) => Ok(Entity::Cell(doc.to_cell())),
            Self::Container(doc) => Ok(Entity::Container(doc.to_container())),
            Self::Unknown { kind, .. } => Err(Error::UnknownKind { kind: kind.clone() }),
        }
    }

    fn check_api_version(&self) -> Result<()> {
        let api_version = match self {
            Self::Realm(doc) => &doc.api_version,
            Self::Space(doc) => &doc.api_version,
            Self::Stack(doc) => &doc.api_version,
            Self::Cell(doc) => &doc.api_version,
            Self::Container(doc) => &doc.api_version,
            Self::Unknown { .. } => return Ok(()),
        };
        if api_version.is_empty() || api_version == API_VERSION {
            return Ok(());
        }
        Err(Error::ConversionFailed {
            kind: self.kind_name(),
            source: Box::new(Error::ConfigInvalid {
                message: format!("unsupported apiVersion {api_version:?}, expected {API_VERSION}"),
            }),
        })
    }
}

/// Reads a (possibly multi-document) YAML stream into typed documents.
/// Documents of unknown kind are kept as [`Document::Unknown`]; empty
/// documents are skipped.
pub fn parse_documents(input: &str) -> Result<Vec<Document>> {
    let mut documents = Vec::new();

    for deserializer in serde_yaml::Deserializer::from_str(input) {
        let value =
            serde_yaml::Value::deserialize(deserializer).map_err(|error| Error::ConfigInvalid {
                message: format!("invalid YAML document: {error}"),
            })?;
        if value.is_null() {
            continue;
        }

        let kind = value
            .get("kind")
            .and_then(serde_yaml::Value::as_str)
            .unwrap_or_default()
            .to_string();
        let name = value
            .get("metadata")
            .and_then(|metadata| metadata.get("name"))
            .and_then(serde_yaml::Value::as_str)
            .unwrap_or_default()
            .to_string();

        let document = match kind.as_str() {
            "Realm" => Document::Realm(from_value(value, &kind)?),
            "Space" => Document::Space(from_value(value, &kind)?),
            "Stack" => Document::Stack(from_value(value, &kind)?),
            "Cell" => Document::Cell(from_value(value, &kind)?),
            "Container" => Document::Container(from_value(value, &kind)?),
            _ => Document::Unknown { kind, name },
        };
        documents.push(document);
    }

    Ok(documents)
}

fn from_value<T: serde::de::DeserializeOwned>(value: serde_yaml::Value, kind: &str) -> Result<T> {
    serde_yaml::from_value(value)
        .map_err(|error| Error::ConfigInvalid {
            message: format!("malformed {kind} document: {error}"),
        })
        .context(ConversionFailedSnafu { kind })
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn parses_a_multi_document_stream() {
        let input = indoc! {"
            apiVersion: kukeon.io/v1alpha1
            kind: Realm
            metadata:
              name: r1
            spec:
              namespace: n1
            ---
            apiVersion: kukeon.io/v1alpha1
            kind: Space
            metadata:
              name: s1
            spec:
              realmId: r1
            ---
            kind: Gadget
            metadata:
              name: g1
        "};

        let documents = parse_documents(input).expect("parse");
        assert_eq!(documents.len(), 3);
        assert_eq!(documents[0].kind_name(), "Realm");
        assert_eq!(documents[1].kind_name(), "Space");
        assert_eq!(
            documents[2],
            Document::Unknown {
                kind: "Gadget".to_string(),
                name: "g1".to_string()
            }
        );
    }

    #[test]
    fn normalizes_external_parent_references() {
        let input = indoc! {"
            kind: Space
            metadata:
              name: s1
            spec:
              realmId: r1
        "};

        let documents = parse_documents(input).expect("parse");
        let Entity::Space(space) = documents[0].normalize().expect("normalize") else {
            panic!("expected a space");
        };
        assert_eq!(space.spec.realm_name, "r1");
    }

    #[test]
    fn unknown_kinds_fail_normalization_not_parsing() {
        let documents = parse_documents("kind: Widget\nmetadata:\n  name: w1\n").expect("parse");
        let err = documents[0].normalize().expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::UnknownKind);
    }

    #[test]
    fn foreign_api_versions_are_rejected() {
        let input = indoc! {"
            apiVersion: acme.dev/v1
            kind: Realm
            metadata:
              name: r1
        "};

        let documents = parse_documents(input).expect("parse");
        let err = documents[0].normalize().expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::ConversionFailed);
        assert!(err.has_kind(ErrorKind::ConfigInvalid));
    }

    #[test]
    fn labels_survive_parsing() {
        let input = indoc! {"
            kind: Realm
            metadata:
              name: r1
              labels:
                team: storage
        "};

        let documents = parse_documents(input).expect("parse");
        let Entity::Realm(realm) = documents[0].normalize().expect("normalize") else {
            panic!("expected a realm");
        };
        assert_eq!(realm.metadata.labels["team"], "storage");
    }
}
