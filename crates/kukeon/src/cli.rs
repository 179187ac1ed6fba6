//! Clap types composing the command-line surface of the orchestrator.
//!
//! The library defines the argument shapes; the binary that embeds them owns
//! parsing, rendering and process exit. Exit codes map through
//! [`Error::exit_code`](crate::error::Error::exit_code): 0 on success, 1 on
//! operation errors, 2 on validation errors, 3 on refused deletes with
//! remaining dependencies.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{constants::DEFAULT_RUN_PATH, runner::CniDirectories};

#[derive(Debug, PartialEq, Eq, Parser)]
#[command(name = "kukeon", about = "Single-host container workload orchestrator")]
pub struct Cli {
    #[command(flatten)]
    pub common: CommonArguments,

    #[command(subcommand)]
    pub command: Command,
}

/// Options every command takes.
#[derive(Debug, PartialEq, Eq, Args)]
pub struct CommonArguments {
    /// Root of the on-disk metadata tree.
    #[arg(long, env = "KUKEON_RUN_PATH", default_value = DEFAULT_RUN_PATH)]
    pub run_path: PathBuf,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Create a resource and its runtime-side sub-resources.
    Create(ResourceSelector),

    /// Show one resource with its observed sub-resource state.
    Get(ResourceSelector),

    /// List resources of a kind, optionally narrowed by parents.
    List(ListArguments),

    /// Start a cell or a single container.
    Start(ResourceSelector),

    /// Stop a cell or a single container, keeping its metadata.
    Stop(ResourceSelector),

    /// Delete a resource; refuses when dependencies remain.
    Delete(DeleteArguments),

    /// Delete plus reap orphaned runtime artefacts; safe without metadata.
    Purge(DeleteArguments),

    /// Apply a document set in topological order.
    Apply(ApplyArguments),

    /// Re-observe runtime truth and write drift back into metadata.
    Refresh,

    /// Ensure the default hierarchy and CNI directories exist.
    Bootstrap(BootstrapArguments),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ResourceKind {
    Realm,
    Space,
    Stack,
    Cell,
    Container,
}

#[derive(Debug, PartialEq, Eq, Args)]
pub struct ResourceSelector {
    /// The resource kind to operate on.
    #[arg(value_enum)]
    pub kind: ResourceKind,

    /// The resource name.
    pub name: String,

    #[arg(long)]
    pub realm: Option<String>,

    #[arg(long)]
    pub space: Option<String>,

    #[arg(long)]
    pub stack: Option<String>,

    #[arg(long)]
    pub cell: Option<String>,

    /// Container image (container kind only).
    #[arg(long)]
    pub image: Option<String>,
}

#[derive(Debug, PartialEq, Eq, Args)]
pub struct ListArguments {
    #[arg(value_enum)]
    pub kind: ResourceKind,

    #[arg(long, default_value = "")]
    pub realm: String,

    #[arg(long, default_value = "")]
    pub space: String,

    #[arg(long, default_value = "")]
    pub stack: String,

    #[arg(long, default_value = "")]
    pub cell: String,
}

#[derive(Debug, PartialEq, Eq, Args)]
pub struct DeleteArguments {
    #[command(flatten)]
    pub resource: ResourceSelector,

    /// Recursively delete every descendant first.
    #[arg(long)]
    pub cascade: bool,

    /// Skip the dependency check; descendants become orphans reapable by
    /// purge.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, PartialEq, Eq, Args)]
pub struct ApplyArguments {
    /// Path to a YAML document set, `-` for stdin.
    #[arg(short = 'f', long = "file")]
    pub file: PathBuf,
}

#[derive(Debug, PartialEq, Eq, Args)]
pub struct BootstrapArguments {
    #[arg(long)]
    pub cni_config_dir: Option<PathBuf>,

    #[arg(long)]
    pub cni_cache_dir: Option<PathBuf>,

    #[arg(long)]
    pub cni_bin_dir: Option<PathBuf>,
}

impl From<&BootstrapArguments> for CniDirectories {
    fn from(args: &BootstrapArguments) -> Self {
        Self {
            config_dir: args.cni_config_dir.clone(),
            cache_dir: args.cni_cache_dir.clone(),
            bin_dir: args.cni_bin_dir.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_flags_parse() {
        let cli = Cli::parse_from([
            "kukeon", "delete", "realm", "r1", "--cascade",
        ]);

        let Command::Delete(args) = cli.command else {
            panic!("expected delete");
        };
        assert_eq!(args.resource.kind, ResourceKind::Realm);
        assert_eq!(args.resource.name, "r1");
        assert!(args.cascade);
        assert!(!args.force);
    }

    #[test]
    fn run_path_has_a_default() {
        let cli = Cli::parse_from(["kukeon", "refresh"]);
        assert_eq!(cli.common.run_path, PathBuf::from(DEFAULT_RUN_PATH));
    }

    #[test]
    fn container_selectors_carry_all_parents() {
        let cli = Cli::parse_from([
            "kukeon", "create", "container", "web", "--realm", "r1", "--space", "s1", "--stack",
            "st1", "--cell", "c1", "--image", "nginx:1.27",
        ]);

        let Command::Create(selector) = cli.command else {
            panic!("expected create");
        };
        assert_eq!(selector.kind, ResourceKind::Container);
        assert_eq!(selector.cell.as_deref(), Some("c1"));
        assert_eq!(selector.image.as_deref(), Some("nginx:1.27"));
    }
}
