//! The typed, hierarchical, validated configuration tree.
//!
//! A component builds its tree during `initialise`; callers obtain a deep copy with
//! [`ComponentHandle::get_config`](crate::component::ComponentHandle::get_config), mutate the
//! copy, and apply it atomically with
//! [`ComponentHandle::set_config`](crate::component::ComponentHandle::set_config). This module
//! only defines the tree's shape and per-node validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use smol_str::SmolStr;

use crate::error::ConfigInvalid;

/// One node of a configuration tree, tagged by kind.
///
/// `Parent` holds an ordered map of named children (order is preserved, matching the way a
/// component declares its config in `initialise` and the way a CLI mapping should list flags).
/// `GrandParent` is the same shape one level up: a map of named `Parent` subtrees, one per child
/// component of a [`Compound`](crate::compound::Compound).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConfigNode {
    Bool {
        value: bool,
    },
    Int {
        value: i64,
        min: i64,
        max: i64,
    },
    Float {
        value: f64,
        min: f64,
        max: f64,
        decimals: u32,
    },
    Str {
        value: String,
    },
    Path {
        value: PathBuf,
        must_exist: bool,
    },
    Enum {
        value: SmolStr,
        choices: Vec<SmolStr>,
    },
    IntEnum {
        value: i64,
        choices: Vec<i64>,
    },
    /// A `join`/`stop`-timeout-style leaf, e.g. a GrandParent-configured shutdown deadline.
    /// Serialises as a human-readable string (`"5s"`, `"250ms"`) via `humantime-serde` rather
    /// than raw nanoseconds, matching how this family of tools writes durations to TOML/JSON.
    Duration {
        #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
        value: Duration,
        min: Duration,
        max: Duration,
    },
    Parent {
        children: Vec<(SmolStr, ConfigNode)>,
    },
    GrandParent {
        children: Vec<(SmolStr, ConfigNode)>,
    },
}

impl ConfigNode {
    pub fn bool(value: bool) -> Self {
        ConfigNode::Bool { value }
    }
    pub fn int(value: i64, min: i64, max: i64) -> Self {
        ConfigNode::Int { value, min, max }
    }
    pub fn float(value: f64, min: f64, max: f64, decimals: u32) -> Self {
        ConfigNode::Float {
            value,
            min,
            max,
            decimals,
        }
    }
    pub fn str(value: impl Into<String>) -> Self {
        ConfigNode::Str {
            value: value.into(),
        }
    }
    pub fn path(value: impl Into<PathBuf>, must_exist: bool) -> Self {
        ConfigNode::Path {
            value: value.into(),
            must_exist,
        }
    }
    pub fn enum_(choices: impl IntoIterator<Item = impl Into<SmolStr>>) -> Self {
        let choices: Vec<SmolStr> = choices.into_iter().map(Into::into).collect();
        let value = choices.first().cloned().unwrap_or_default();
        ConfigNode::Enum { value, choices }
    }
    pub fn int_enum(choices: impl IntoIterator<Item = i64>) -> Self {
        let choices: Vec<i64> = choices.into_iter().collect();
        let value = choices.first().copied().unwrap_or(0);
        ConfigNode::IntEnum { value, choices }
    }
    pub fn duration(value: Duration, min: Duration, max: Duration) -> Self {
        ConfigNode::Duration { value, min, max }
    }
    pub fn parent() -> Self {
        ConfigNode::Parent {
            children: Vec::new(),
        }
    }
    pub fn grand_parent() -> Self {
        ConfigNode::GrandParent {
            children: Vec::new(),
        }
    }

    fn children_mut(&mut self) -> Option<&mut Vec<(SmolStr, ConfigNode)>> {
        match self {
            ConfigNode::Parent { children } | ConfigNode::GrandParent { children } => {
                Some(children)
            }
            _ => None,
        }
    }
    fn children(&self) -> Option<&[(SmolStr, ConfigNode)]> {
        match self {
            ConfigNode::Parent { children } | ConfigNode::GrandParent { children } => {
                Some(children)
            }
            _ => None,
        }
    }

    /// Append a named child to a `Parent` or `GrandParent` node, replacing any existing child of
    /// the same name. Panics if called on a leaf node — building the tree's shape is a
    /// programming-time concern, not a runtime one.
    pub fn append(&mut self, name: impl Into<SmolStr>, child: ConfigNode) {
        let name = name.into();
        let children = self
            .children_mut()
            .expect("append called on a leaf config node");
        if let Some(slot) = children.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = child;
        } else {
            children.push((name, child));
        }
    }

    /// Look up a node by a dotted path, e.g. `"filgen.xaperture"`.
    pub fn get(&self, path: &str) -> Option<&ConfigNode> {
        let mut node = self;
        for part in path.split('.').filter(|p| !p.is_empty()) {
            node = &node.children()?.iter().find(|(n, _)| n == part)?.1;
        }
        Some(node)
    }

    /// Look up a node mutably by dotted path.
    pub fn get_mut(&mut self, path: &str) -> Option<&mut ConfigNode> {
        let mut node = self;
        for part in path.split('.').filter(|p| !p.is_empty()) {
            node = &mut node
                .children_mut()?
                .iter_mut()
                .find(|(n, _)| n == part)?
                .1;
        }
        Some(node)
    }

    /// Children names in declared order, for `Parent`/`GrandParent` nodes.
    pub fn child_names(&self) -> impl Iterator<Item = &str> {
        self.children()
            .unwrap_or(&[])
            .iter()
            .map(|(n, _)| n.as_str())
    }

    /// Validate this node's own current value against its own constraints, then recurse into
    /// children. Does not mutate anything; returns the first violation found, path-qualified.
    pub fn validate(&self) -> Result<(), ConfigInvalid> {
        self.validate_at("")
    }

    fn validate_at(&self, path: &str) -> Result<(), ConfigInvalid> {
        match self {
            ConfigNode::Int { value, min, max } => {
                if value < min || value > max {
                    return Err(ConfigInvalid::new(
                        path,
                        format!("{value} out of range [{min}, {max}]"),
                    ));
                }
            }
            ConfigNode::Float {
                value, min, max, ..
            } => {
                if value < min || value > max {
                    return Err(ConfigInvalid::new(
                        path,
                        format!("{value} out of range [{min}, {max}]"),
                    ));
                }
            }
            ConfigNode::Enum { value, choices } => {
                if !choices.contains(value) {
                    return Err(ConfigInvalid::new(path, format!("{value} not in choices")));
                }
            }
            ConfigNode::IntEnum { value, choices } => {
                if !choices.contains(value) {
                    return Err(ConfigInvalid::new(path, format!("{value} not in choices")));
                }
            }
            ConfigNode::Duration { value, min, max } => {
                if value < min || value > max {
                    return Err(ConfigInvalid::new(
                        path,
                        format!("{value:?} out of range [{min:?}, {max:?}]"),
                    ));
                }
            }
            ConfigNode::Path { value, must_exist } => {
                if *must_exist && !Path::new(value).exists() {
                    return Err(ConfigInvalid::new(
                        path,
                        format!("{} does not exist", value.display()),
                    ));
                }
            }
            ConfigNode::Bool { .. } | ConfigNode::Str { .. } => {}
            ConfigNode::Parent { children } | ConfigNode::GrandParent { children } => {
                for (name, child) in children {
                    let child_path = if path.is_empty() {
                        name.to_string()
                    } else {
                        format!("{path}.{name}")
                    };
                    child.validate_at(&child_path)?;
                }
            }
        }
        Ok(())
    }

    /// Set a leaf's value from a string, validating it against the node's own constraints first.
    /// Used by the CLI mapping to turn parsed flag values back into config nodes without
    /// each leaf kind needing its own bespoke parser at the call site.
    pub fn set_from_str(&mut self, path: &str, s: &str) -> Result<(), ConfigInvalid> {
        let invalid = |reason: String| ConfigInvalid::new(path, reason);
        match self {
            ConfigNode::Bool { value } => {
                *value = s
                    .parse()
                    .map_err(|_| invalid(format!("`{s}` is not a bool")))?;
            }
            ConfigNode::Int { value, min, max } => {
                let parsed: i64 = s
                    .parse()
                    .map_err(|_| invalid(format!("`{s}` is not an int")))?;
                if parsed < *min || parsed > *max {
                    return Err(invalid(format!("{parsed} out of range [{min}, {max}]")));
                }
                *value = parsed;
            }
            ConfigNode::Float {
                value,
                min,
                max,
                ..
            } => {
                let parsed: f64 = s
                    .parse()
                    .map_err(|_| invalid(format!("`{s}` is not a float")))?;
                if parsed < *min || parsed > *max {
                    return Err(invalid(format!("{parsed} out of range [{min}, {max}]")));
                }
                *value = parsed;
            }
            ConfigNode::Str { value } => *value = s.to_string(),
            ConfigNode::Path { value, must_exist } => {
                let p = PathBuf::from(s);
                if *must_exist && !p.exists() {
                    return Err(invalid(format!("{} does not exist", p.display())));
                }
                *value = p;
            }
            ConfigNode::Enum { value, choices } => {
                let candidate: SmolStr = s.into();
                if !choices.contains(&candidate) {
                    return Err(invalid(format!("`{s}` not in choices")));
                }
                *value = candidate;
            }
            ConfigNode::IntEnum { value, choices } => {
                let parsed: i64 = s
                    .parse()
                    .map_err(|_| invalid(format!("`{s}` is not an int")))?;
                if !choices.contains(&parsed) {
                    return Err(invalid(format!("{parsed} not in choices")));
                }
                *value = parsed;
            }
            ConfigNode::Duration { value, min, max } => {
                let parsed = humantime::parse_duration(s)
                    .map_err(|_| invalid(format!("`{s}` is not a duration")))?;
                if parsed < *min || parsed > *max {
                    return Err(invalid(format!("{parsed:?} out of range [{min:?}, {max:?}]")));
                }
                *value = parsed;
            }
            ConfigNode::Parent { .. } | ConfigNode::GrandParent { .. } => {
                return Err(invalid("cannot set a string value on a parent node".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> ConfigNode {
        let mut root = ConfigNode::parent();
        root.append("gain", ConfigNode::float(1.0, 0.0, 10.0, 2));
        root.append("name", ConfigNode::str("default"));
        root.append(
            "outframe_pool_len",
            ConfigNode::int(3, 2, i64::MAX),
        );
        root
    }

    #[test]
    fn validate_rejects_out_of_range_int() {
        let mut root = sample_tree();
        root.get_mut("outframe_pool_len").unwrap().set_from_str("outframe_pool_len", "1").unwrap_err();
        // still default since set_from_str validates before mutating
        assert_eq!(
            root.get("outframe_pool_len").unwrap(),
            &ConfigNode::int(3, 2, i64::MAX)
        );
    }

    #[test]
    fn dotted_path_lookup_through_grandparent() {
        let mut gp = ConfigNode::grand_parent();
        gp.append("filgen", sample_tree());
        assert_eq!(
            gp.get("filgen.gain").unwrap(),
            &ConfigNode::float(1.0, 0.0, 10.0, 2)
        );
    }

    #[test]
    fn set_from_str_updates_valid_value() {
        let mut root = sample_tree();
        root.get_mut("gain").unwrap().set_from_str("gain", "3.5").unwrap();
        assert_eq!(root.get("gain").unwrap(), &ConfigNode::float(3.5, 0.0, 10.0, 2));
    }

    #[test]
    fn round_trip_clone_is_equal_and_independent() {
        let root = sample_tree();
        let mut copy = root.clone();
        copy.get_mut("gain").unwrap().set_from_str("gain", "9.0").unwrap();
        assert_ne!(root.get("gain"), copy.get("gain"));
    }

    #[test]
    fn full_tree_validate_recurses_into_children() {
        let mut gp = ConfigNode::grand_parent();
        gp.append("child", sample_tree());
        assert!(gp.validate().is_ok());
    }
}
