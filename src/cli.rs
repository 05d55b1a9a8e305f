//! Configuration-tree-to-command-line mapping, feature-gated behind `cli`.
//!
//! Unlike a fixed set of flags known at compile time, a graph's configuration tree is only known
//! at runtime (it's built by each component's `initialise`), so this uses `clap`'s builder API
//! (`Command`/`Arg`) rather than its derive macro: one flag per leaf config node, dotted path
//! turned into a `--a-b-c` long flag.

use std::path::PathBuf;

use clap::{Arg, ArgMatches, Command};

use crate::config::ConfigNode;
use crate::error::ConfigInvalid;

fn flag_name(path: &str) -> String {
    path.replace('.', "-")
}

fn leaf_arg(path: &str, node: &ConfigNode) -> Arg {
    let id = path.to_string();
    let long = flag_name(path);
    let arg = Arg::new(id).long(long);
    match node {
        ConfigNode::Bool { value } => arg
            .value_name("BOOL")
            .value_parser(["true", "false"])
            .default_value(if *value { "true" } else { "false" }),
        ConfigNode::Int { value, .. } => arg.value_name("INT").default_value(value.to_string()),
        ConfigNode::Float { value, .. } => arg.value_name("FLOAT").default_value(value.to_string()),
        ConfigNode::Str { value } => arg.value_name("STRING").default_value(value.clone()),
        ConfigNode::Path { value, .. } => arg
            .value_name("PATH")
            .default_value(value.to_string_lossy().into_owned()),
        ConfigNode::Enum { value, choices } => arg
            .value_name("CHOICE")
            .value_parser(choices.iter().map(|c| c.to_string()).collect::<Vec<_>>())
            .default_value(value.to_string()),
        ConfigNode::IntEnum { value, choices } => arg
            .value_name("CHOICE")
            .value_parser(choices.iter().map(|c| c.to_string()).collect::<Vec<_>>())
            .default_value(value.to_string()),
        ConfigNode::Duration { value, .. } => arg
            .value_name("DURATION")
            .default_value(humantime::format_duration(*value).to_string()),
        ConfigNode::Parent { .. } | ConfigNode::GrandParent { .. } => {
            unreachable!("leaf_arg is only called on leaf nodes")
        }
    }
}

fn collect_args(node: &ConfigNode, prefix: &str, out: &mut Vec<Arg>) {
    match node {
        ConfigNode::Parent { children } | ConfigNode::GrandParent { children } => {
            for (name, child) in children {
                let path = if prefix.is_empty() {
                    name.to_string()
                } else {
                    format!("{prefix}.{name}")
                };
                collect_args(child, &path, out);
            }
        }
        leaf => out.push(leaf_arg(prefix, leaf)),
    }
}

/// Build a `clap::Command` with one flag per leaf of `root`, named `program`.
pub fn build_command(program: impl Into<clap::builder::Str>, root: &ConfigNode) -> Command {
    let mut args = Vec::new();
    collect_args(root, "", &mut args);
    Command::new(program).args(args)
}

fn apply_recursive(
    matches: &ArgMatches,
    node: &mut ConfigNode,
    prefix: &str,
) -> Result<(), ConfigInvalid> {
    match node {
        ConfigNode::Parent { children } | ConfigNode::GrandParent { children } => {
            for (name, child) in children.iter_mut() {
                let path = if prefix.is_empty() {
                    name.to_string()
                } else {
                    format!("{prefix}.{name}")
                };
                apply_recursive(matches, child, &path)?;
            }
            Ok(())
        }
        _ => {
            if let Some(value) = matches.get_one::<String>(prefix) {
                node.set_from_str(prefix, value)?;
            }
            Ok(())
        }
    }
}

/// Parse `matches` (produced from a [`build_command`]-built `Command`) back into `root`,
/// validating each leaf as it's set. `root`'s shape must match the tree `build_command` was
/// called with.
pub fn apply_matches(matches: &ArgMatches, root: &mut ConfigNode) -> Result<(), ConfigInvalid> {
    apply_recursive(matches, root, "")
}

/// Parse a leaf `Path` value read back from matches: `PathBuf` round-trips through clap as a
/// plain string in this mapping (paths are validated at `set_from_str` time, not by clap itself).
pub fn path_value(matches: &ArgMatches, path: &str) -> Option<PathBuf> {
    matches.get_one::<String>(path).map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> ConfigNode {
        let mut root = ConfigNode::parent();
        root.append("gain", ConfigNode::float(1.0, 0.0, 10.0, 2));
        root.append("name", ConfigNode::str("cam0"));
        root.append("enabled", ConfigNode::bool(true));
        root
    }

    #[test]
    fn generated_flags_cover_every_leaf() {
        let tree = sample_tree();
        let cmd = build_command("testprog", &tree);
        let names: Vec<&str> = cmd.get_arguments().map(|a| a.get_id().as_str()).collect();
        assert!(names.contains(&"gain"));
        assert!(names.contains(&"name"));
        assert!(names.contains(&"enabled"));
    }

    #[test]
    fn parsed_matches_apply_back_onto_the_tree() {
        let mut tree = sample_tree();
        let cmd = build_command("testprog", &tree);
        let matches = cmd
            .try_get_matches_from(["testprog", "--gain", "3.5", "--name", "cam1"])
            .unwrap();
        apply_matches(&matches, &mut tree).unwrap();
        assert_eq!(tree.get("gain").unwrap(), &ConfigNode::float(3.5, 0.0, 10.0, 2));
        assert_eq!(tree.get("name").unwrap(), &ConfigNode::str("cam1"));
    }

    #[test]
    fn out_of_range_value_is_rejected_without_mutating_the_tree() {
        let mut tree = sample_tree();
        let cmd = build_command("testprog", &tree);
        let matches = cmd
            .try_get_matches_from(["testprog", "--gain", "99"])
            .unwrap();
        let err = apply_matches(&matches, &mut tree).unwrap_err();
        assert_eq!(err.path, "gain");
        assert_eq!(tree.get("gain").unwrap(), &ConfigNode::float(1.0, 0.0, 10.0, 2));
    }
}
