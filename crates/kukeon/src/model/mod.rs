//! The hierarchical domain model: Realm → Space → Stack → Cell plus the
//! workload containers attached to cells.
//!
//! Every entity carries three sections: `metadata` (name and labels), `spec`
//! (declarative intent including parent references) and `status` (observed
//! truth). Admission (`admit`) trims and validates names, fills spec defaults
//! and augments the label map with the ancestor chain; existing label values
//! are never overwritten.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

mod cell;
mod container;
mod realm;
mod space;
mod stack;

pub use cell::{Cell, CellSpec, CellStatus};
pub use container::{Container, ContainerSpec, ContainerState};
pub use realm::{Realm, RealmSpec, RealmStatus};
pub use space::{Space, SpaceSpec, SpaceStatus};
pub use stack::{Stack, StackSpec, StackStatus};

/// Name and label map shared by every entity kind.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl Metadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
        }
    }

    /// Inserts the label only when the key is not present yet.
    pub(crate) fn label_if_missing(&mut self, key: &str, value: &str) {
        self.labels
            .entry(key.to_string())
            .or_insert_with(|| value.to_string());
    }
}

/// Observed lifecycle state of an entity.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Deserialize,
    Serialize,
    strum::Display,
    strum::EnumString,
)]
pub enum State {
    #[default]
    Unknown,
    Created,
    Ready,
    Stopped,
}

impl State {
    /// Whether this state counts as "running" for the Ready-cell guards.
    /// `Unknown` is treated as not running.
    pub fn is_running(self) -> bool {
        self == Self::Ready
    }
}

/// The five entity kinds, ordered by their apply priority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, strum::Display, strum::EnumString)]
pub enum Kind {
    Realm,
    Space,
    Stack,
    Cell,
    Container,
}

impl Kind {
    /// Fixed topological priority used by the apply engine: parents sort
    /// before children.
    pub fn priority(self) -> u8 {
        match self {
            Self::Realm => 1,
            Self::Space => 2,
            Self::Stack => 3,
            Self::Cell => 4,
            Self::Container => 5,
        }
    }
}

/// Access to the metadata section shared by every entity kind.
pub trait HasMetadata {
    fn metadata(&self) -> &Metadata;
    fn metadata_mut(&mut self) -> &mut Metadata;

    fn name(&self) -> &str {
        &self.metadata().name
    }
}

/// An entity of any kind, for code that is polymorphic over the hierarchy.
#[derive(Clone, Debug, PartialEq)]
pub enum Entity {
    Realm(Realm),
    Space(Space),
    Stack(Stack),
    Cell(Cell),
    Container(Container),
}

impl Entity {
    pub fn kind(&self) -> Kind {
        match self {
            Self::Realm(_) => Kind::Realm,
            Self::Space(_) => Kind::Space,
            Self::Stack(_) => Kind::Stack,
            Self::Cell(_) => Kind::Cell,
            Self::Container(_) => Kind::Container,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Realm(realm) => realm.name(),
            Self::Space(space) => space.name(),
            Self::Stack(stack) => stack.name(),
            Self::Cell(cell) => cell.name(),
            Self::Container(container) => container.name(),
        }
    }
}

/// The cgroup-owning subset of the hierarchy. The runner matches on the
/// variant and dispatches; containers share their cell's cgroup and are not
/// part of this set.
#[derive(Clone, Debug, PartialEq)]
pub enum CgroupScope {
    Realm(Realm),
    Space(Space),
    Stack(Stack),
    Cell(Cell),
}

impl CgroupScope {
    /// The cgroup path recorded in the entity's status.
    pub fn cgroup_path(&self) -> &str {
        match self {
            Self::Realm(realm) => &realm.status.cgroup_path,
            Self::Space(space) => &space.status.cgroup_path,
            Self::Stack(stack) => &stack.status.cgroup_path,
            Self::Cell(cell) => &cell.status.cgroup_path,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Realm(realm) => realm.name(),
            Self::Space(space) => space.name(),
            Self::Stack(stack) => stack.name(),
            Self::Cell(cell) => cell.name(),
        }
    }
}

impl From<Realm> for CgroupScope {
    fn from(realm: Realm) -> Self {
        Self::Realm(realm)
    }
}

impl From<Space> for CgroupScope {
    fn from(space: Space) -> Self {
        Self::Space(space)
    }
}

impl From<Stack> for CgroupScope {
    fn from(stack: Stack) -> Self {
        Self::Stack(stack)
    }
}

impl From<Cell> for CgroupScope {
    fn from(cell: Cell) -> Self {
        Self::Cell(cell)
    }
}

/// Trims a name field in place.
pub(crate) fn trim_in_place(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_never_overwritten() {
        let mut metadata = Metadata::new("r1");
        metadata
            .labels
            .insert("realm".to_string(), "custom".to_string());

        metadata.label_if_missing("realm", "r1");
        metadata.label_if_missing("space", "s1");

        assert_eq!(metadata.labels["realm"], "custom");
        assert_eq!(metadata.labels["space"], "s1");
    }

    #[test]
    fn kind_priorities_order_parents_first() {
        let mut kinds = vec![Kind::Container, Kind::Stack, Kind::Realm, Kind::Cell, Kind::Space];
        kinds.sort_by_key(|kind| kind.priority());
        assert_eq!(
            kinds,
            vec![Kind::Realm, Kind::Space, Kind::Stack, Kind::Cell, Kind::Container]
        );
    }

    #[test]
    fn unknown_state_is_not_running() {
        assert!(!State::Unknown.is_running());
        assert!(!State::Stopped.is_running());
        assert!(State::Ready.is_running());
    }
}
