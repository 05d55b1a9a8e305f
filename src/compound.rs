//! Grouping several components into one reusable unit: children are linked to each other, and to
//! the compound's own named inputs/outputs, purely by wiring — a compound adds no runtime
//! overhead of its own.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use smol_str::SmolStr;

use crate::component::ComponentHandle;
use crate::config::ConfigNode;
use crate::error::ConfigInvalid;
use crate::frame::Delivery;

/// The sentinel child name denoting the compound's own boundary in a linkage, e.g.
/// `(("self", "input"), ("resize", "input"))`.
pub const SELF: &str = "self";

/// Several components wired together and exposed as one unit.
///
/// Built once, from a fixed set of named children and a list of linkages. A linkage whose source
/// is `("self", name)` wires the compound's own input `name` straight through to a child's input;
/// one whose destination is `("self", name)` records which child (and which of its outputs)
/// backs the compound's own output `name`. Any other linkage binds one child's output directly to
/// another child's input. An optional `config_map`, attached with
/// [`with_config_map`](Self::with_config_map), additionally exposes a flat name → list of
/// `child.param` paths for fanning one high-level setting out to several children at once.
pub struct Compound<P> {
    children: HashMap<SmolStr, Arc<ComponentHandle<P>>>,
    self_inputs: HashMap<SmolStr, (SmolStr, SmolStr)>,
    self_outputs: HashMap<SmolStr, (SmolStr, SmolStr)>,
    config_map: Vec<(SmolStr, Vec<(SmolStr, SmolStr)>)>,
}

impl<P: Send + Sync + Default + 'static> Compound<P> {
    /// `children` names the components this compound owns; `linkages` wires them (and the
    /// compound's own boundary, via [`SELF`]) together. Children not mentioned in any linkage are
    /// still owned and started/stopped/joined, just never fed by this compound directly.
    pub fn new(
        children: impl IntoIterator<Item = (impl Into<SmolStr>, Arc<ComponentHandle<P>>)>,
        linkages: impl IntoIterator<Item = ((&'static str, &'static str), (&'static str, &'static str))>,
    ) -> Self {
        let children: HashMap<SmolStr, Arc<ComponentHandle<P>>> =
            children.into_iter().map(|(n, c)| (n.into(), c)).collect();
        let mut self_inputs = HashMap::new();
        let mut self_outputs = HashMap::new();
        for ((src, outbox), (dest, inbox)) in linkages {
            if src == SELF {
                self_inputs.insert(SmolStr::new(outbox), (SmolStr::new(dest), SmolStr::new(inbox)));
            } else if dest == SELF {
                children
                    .get(src)
                    .unwrap_or_else(|| panic!("compound linkage references unknown child `{src}`"))
                    .reserve_output(outbox);
                self_outputs.insert(SmolStr::new(inbox), (SmolStr::new(src), SmolStr::new(outbox)));
            } else {
                let source = children
                    .get(src)
                    .unwrap_or_else(|| panic!("compound linkage references unknown child `{src}`"))
                    .clone();
                let destination = children
                    .get(dest)
                    .unwrap_or_else(|| panic!("compound linkage references unknown child `{dest}`"))
                    .clone();
                source.bind(outbox, destination, inbox);
            }
        }
        Self {
            children,
            self_inputs,
            self_outputs,
            config_map: Vec::new(),
        }
    }

    /// Attach a high-level config_map: each name fans a single string value out to a list
    /// of `child.param` dotted paths, applied with [`set_config_mapped`](Self::set_config_mapped).
    pub fn with_config_map(
        mut self,
        config_map: impl IntoIterator<Item = (&'static str, Vec<(&'static str, &'static str)>)>,
    ) -> Self {
        self.config_map = config_map
            .into_iter()
            .map(|(name, paths)| {
                let paths = paths
                    .into_iter()
                    .map(|(child, path)| (SmolStr::new(child), SmolStr::new(path)))
                    .collect();
                (SmolStr::new(name), paths)
            })
            .collect();
        self
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, &Arc<ComponentHandle<P>>)> {
        self.children.iter().map(|(n, c)| (n.as_str(), c))
    }

    /// Set one config_map entry's value, parsed and applied against every mapped `child.param`
    /// path in declaration order: non-transactional, stopping at (and returning) the first
    /// child that rejects the value. Paths already applied to earlier children in the call are
    /// left as applied.
    pub fn set_config_mapped(&self, name: &str, value: &str) -> Result<(), ConfigInvalid> {
        let (_, paths) = self
            .config_map
            .iter()
            .find(|(n, _)| n == name)
            .ok_or_else(|| ConfigInvalid::new(name, "no such config_map entry"))?;
        for (child, path) in paths {
            let Some(handle) = self.children.get(child) else {
                continue;
            };
            let mut tree = handle.get_config();
            let node = tree
                .get_mut(path)
                .ok_or_else(|| ConfigInvalid::new(path, "no such config path"))?;
            node.set_from_str(path, value)?;
            handle.set_config(tree)?;
        }
        Ok(())
    }

    /// Deliver into one of the compound's own named inputs, passed straight through to the
    /// backing child with no extra buffering.
    pub fn input(&self, port: &str, delivery: Delivery<P>) {
        match self.self_inputs.get(port) {
            Some((child, child_input)) => self.children[child].input(child_input, delivery),
            None => tracing::warn!(port, "delivery to unknown compound input port dropped"),
        }
    }

    /// Bind one of the compound's own named outputs — wired through to whichever child actually
    /// produces it — to a peer.
    pub fn bind(&self, output: &str, peer: Arc<ComponentHandle<P>>, input: impl Into<SmolStr>) {
        match self.self_outputs.get(output) {
            Some((child, child_output)) => self.children[child].bind(child_output, peer, input),
            None => tracing::warn!(output, "bind to unknown compound output port ignored"),
        }
    }

    /// Gather every child's configuration into one grand-parent tree, keyed by child name.
    pub fn get_config(&self) -> ConfigNode {
        let mut root = ConfigNode::grand_parent();
        for (name, child) in &self.children {
            root.append(name.clone(), child.get_config());
        }
        root
    }

    /// Distribute a grand-parent tree's named subtrees back out to the matching children.
    pub fn set_config(&self, config: ConfigNode) -> Result<(), ConfigInvalid> {
        let ConfigNode::GrandParent { children } = config else {
            return Err(ConfigInvalid::new(
                "",
                "compound set_config requires a grand-parent tree",
            ));
        };
        for (name, child_config) in children {
            if let Some(child) = self.children.get(&name) {
                child.set_config(child_config)?;
            }
        }
        Ok(())
    }

    pub fn start(&self) {
        for (name, child) in &self.children {
            tracing::debug!(child = %name, "starting compound child");
            child.start();
        }
    }

    pub fn stop(&self) {
        for (name, child) in &self.children {
            tracing::debug!(child = %name, "stopping compound child");
            child.stop();
        }
    }

    /// Wait for children to finish. With `end_comps`, only waits on children with no bound
    /// output — the compound's own graph-terminal leaves — rather than every child's worker,
    /// a shortcut for "the pipeline has drained" without needing every internal worker to stop.
    pub fn join(&self, end_comps: bool, timeout: Option<Duration>) -> bool {
        let mut all_joined = true;
        for (name, child) in &self.children {
            if end_comps && !child.is_terminal() {
                continue;
            }
            tracing::debug!(child = %name, "joining compound child");
            all_joined &= child.join(timeout);
        }
        all_joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, EventLoopKind};
    use crate::error::ComponentError;
    use crate::frame::FrameData;
    use crate::transformer::{Transform, Transformer};
    use std::sync::Mutex;

    struct AddOne;
    impl Transform<i32> for AddOne {
        fn transform(
            &self,
            in_frame: &FrameData<i32>,
            out_frame: &mut FrameData<i32>,
        ) -> Result<bool, ComponentError> {
            out_frame.data = in_frame.data + 1;
            Ok(true)
        }
    }

    struct RecordingSink(Arc<Mutex<Vec<i32>>>);
    impl Component<i32> for RecordingSink {
        fn outputs(&self) -> &'static [&'static str] {
            &[]
        }
        fn process_frame(&self, handle: &ComponentHandle<i32>) -> Result<(), ComponentError> {
            if let Some(Delivery::Frame(f)) = handle.take_input("input") {
                self.0.lock().unwrap().push(f.data);
            }
            Ok(())
        }
    }

    fn one_frame(value: i32) -> Delivery<i32> {
        let pool = crate::pool::ObjectPool::create(move || FrameData::new(0, "N", value), 1, || {});
        Delivery::Frame(pool.get().unwrap())
    }

    #[test]
    fn compound_wires_self_boundary_and_inner_child_transparently() {
        let add_a = ComponentHandle::build("add_a", Arc::new(Transformer::new(AddOne)), EventLoopKind::Thread);
        let add_b = ComponentHandle::build("add_b", Arc::new(Transformer::new(AddOne)), EventLoopKind::Thread);
        let compound = Compound::new(
            [("a", add_a.clone()), ("b", add_b.clone())],
            [
                (("self", "input"), ("a", "input")),
                (("a", "output"), ("b", "input")),
                (("b", "output"), ("self", "output")),
            ],
        );

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = ComponentHandle::build(
            "sink",
            Arc::new(RecordingSink(received.clone())),
            EventLoopKind::Thread,
        );
        compound.bind("output", sink.clone(), "input");

        compound.start();
        sink.start();
        compound.input("input", one_frame(40));
        std::thread::sleep(Duration::from_millis(100));

        compound.stop();
        sink.stop();
        assert!(compound.join(false, Some(Duration::from_secs(5))));
        assert!(sink.join(Some(Duration::from_secs(5))));
        assert_eq!(*received.lock().unwrap(), vec![42]);
    }

    #[test]
    fn join_end_comps_only_waits_on_terminal_children() {
        let add_a = ComponentHandle::build("add_a", Arc::new(Transformer::new(AddOne)), EventLoopKind::Thread);
        let add_b = ComponentHandle::build("add_b", Arc::new(Transformer::new(AddOne)), EventLoopKind::Thread);
        add_a.bind("output", add_b.clone(), "input");
        let compound = Compound::new([("a", add_a), ("b", add_b)], []);
        compound.start();
        compound.input("input", one_frame(1));
        compound.stop();
        // "a" has a bound output (not terminal); only "b" (no binding at all) should be waited on.
        assert!(compound.join(true, Some(Duration::from_secs(5))));
    }

    #[test]
    fn child_wired_to_self_output_is_not_terminal_before_the_compound_is_bound() {
        let add_a = ComponentHandle::build("add_a", Arc::new(Transformer::new(AddOne)), EventLoopKind::Thread);
        let a = add_a.clone();
        let compound = Compound::new([("a", add_a)], [(("a", "output"), ("self", "output"))]);
        // Nothing has bound the compound's own "output" yet, but "a"'s output is already spoken
        // for: it must not be mistaken for a graph-terminal leaf.
        assert!(!a.is_terminal());
        let _ = compound;
    }

    #[test]
    fn config_map_fans_one_value_out_to_every_mapped_child_path() {
        let add_a = ComponentHandle::build("a", Arc::new(Transformer::new(AddOne)), EventLoopKind::Thread);
        let compound = Compound::new([("a", add_a.clone())], []).with_config_map([(
            "pool_len",
            vec![("a", "outframe_pool_len")],
        )]);
        compound.set_config_mapped("pool_len", "5").unwrap();
        compound.start();
        std::thread::sleep(Duration::from_millis(100));
        compound.stop();
        assert!(compound.join(false, Some(Duration::from_secs(5))));
        assert_eq!(a_pool_len(&add_a), 5);
    }

    fn a_pool_len(handle: &Arc<ComponentHandle<i32>>) -> i64 {
        match handle.get_config().get("outframe_pool_len").unwrap() {
            ConfigNode::Int { value, .. } => *value,
            _ => panic!("expected an int leaf"),
        }
    }
}
