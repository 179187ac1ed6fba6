//! Deterministic derivation of runtime-facing identifiers from the
//! `(realm, space, stack, cell, container)` tuple: CNI network names, runtime
//! container names, cgroup paths and the on-disk metadata layout.
//!
//! Everything in this module is a pure function; no I/O happens here.

use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};

use const_format::concatcp;
use regex::Regex;

use crate::{
    constants::{CGROUP_ROOT, METADATA_FILE},
    error::{Error, Result},
};

/// The shape every derived identifier segment is normalized to. This follows
/// the CNI network name rule: lowercase alphanumerics and dashes, starting
/// and ending with an alphanumeric.
pub const SEGMENT_FMT: &str = "[a-z0-9]([-a-z0-9]*[a-z0-9])?";

const SEGMENT_PATTERN: &str = concatcp!("^", SEGMENT_FMT, "$");

static SEGMENT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(SEGMENT_PATTERN).expect("failed to compile segment regex"));

static NON_IDENTIFIER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^a-z0-9-]+").expect("failed to compile non-identifier regex"));

/// Normalizes one identifier segment: trimmed, lowercased, every run of
/// characters outside `[a-z0-9-]` replaced by a single dash, outer dashes
/// stripped. Fails with `ConfigInvalid` when nothing is left.
fn normalize_segment(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::ConfigInvalid {
            message: format!("{field} must not be empty"),
        });
    }

    let lowered = trimmed.to_lowercase();
    let replaced = NON_IDENTIFIER_REGEX.replace_all(&lowered, "-");
    let normalized = replaced.trim_matches('-').to_string();

    if normalized.is_empty() || !SEGMENT_REGEX.is_match(&normalized) {
        return Err(Error::ConfigInvalid {
            message: format!("{field} {value:?} normalizes to an empty identifier"),
        });
    }

    Ok(normalized)
}

/// The CNI network name owned by a space: `<realm>-<space>` after
/// normalization. Changing either input means a different network, which is
/// why renaming a space requires creating a new one.
pub fn build_space_network_name(realm: &str, space: &str) -> Result<String> {
    let realm = normalize_segment(realm, "realm name")?;
    let space = normalize_segment(space, "space name")?;
    Ok(format!("{realm}-{space}"))
}

/// The runtime-side identifier of a workload container:
/// `<realm>-<space>-<cell>-<name>` after normalization.
pub fn build_container_name(realm: &str, space: &str, cell: &str, name: &str) -> Result<String> {
    let realm = normalize_segment(realm, "realm name")?;
    let space = normalize_segment(space, "space name")?;
    let cell = normalize_segment(cell, "cell name")?;
    let name = normalize_segment(name, "container name")?;
    Ok(format!("{realm}-{space}-{cell}-{name}"))
}

/// Cgroup path of a realm's root: `/kukeon/<realm>`.
pub fn realm_cgroup_path(realm: &str) -> Result<String> {
    let realm = normalize_segment(realm, "realm name")?;
    Ok(format!("{CGROUP_ROOT}/{realm}"))
}

/// Cgroup path of a space subtree: `/kukeon/<realm>/<space>`.
pub fn space_cgroup_path(realm: &str, space: &str) -> Result<String> {
    let realm_path = realm_cgroup_path(realm)?;
    let space = normalize_segment(space, "space name")?;
    Ok(format!("{realm_path}/{space}"))
}

/// Cgroup path of a stack subtree: `/kukeon/<realm>/<space>/<stack>`.
pub fn stack_cgroup_path(realm: &str, space: &str, stack: &str) -> Result<String> {
    let space_path = space_cgroup_path(realm, space)?;
    let stack = normalize_segment(stack, "stack name")?;
    Ok(format!("{space_path}/{stack}"))
}

/// Cgroup path of a cell subtree: `/kukeon/<realm>/<space>/<stack>/<cell>`.
pub fn cell_cgroup_path(realm: &str, space: &str, stack: &str, cell: &str) -> Result<String> {
    let stack_path = stack_cgroup_path(realm, space, stack)?;
    let cell = normalize_segment(cell, "cell name")?;
    Ok(format!("{stack_path}/{cell}"))
}

/// Directory holding a realm's own metadata document.
pub fn realm_metadata_dir(run_path: &Path, realm: &str) -> PathBuf {
    run_path.join(realm)
}

/// Directory holding a space's own metadata document.
pub fn space_metadata_dir(run_path: &Path, realm: &str, space: &str) -> PathBuf {
    realm_metadata_dir(run_path, realm).join(space)
}

/// Directory holding a stack's own metadata document.
pub fn stack_metadata_dir(run_path: &Path, realm: &str, space: &str, stack: &str) -> PathBuf {
    space_metadata_dir(run_path, realm, space).join(stack)
}

/// Directory holding a cell's metadata document, the deepest level of the
/// four-level layout.
pub fn cell_metadata_dir(
    run_path: &Path,
    realm: &str,
    space: &str,
    stack: &str,
    cell: &str,
) -> PathBuf {
    stack_metadata_dir(run_path, realm, space, stack).join(cell)
}

/// The metadata document inside an entity directory.
pub fn metadata_file(dir: &Path) -> PathBuf {
    dir.join(METADATA_FILE)
}
