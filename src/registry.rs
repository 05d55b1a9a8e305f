//! Data-first graph construction: build a component behaviour from a tagged JSON value instead of
//! Rust source, feature-gated behind `registry`.
//!
//! [`Component`] is generic over its frame payload, so a `typetag`/`inventory`-style approach —
//! a single non-generic `dyn Trait` registered at link time via distributed ctors — doesn't fit:
//! `typetag::serde` needs one concrete trait object to register constructors against, and ours
//! varies per `P`. This instead uses a tag-keyed `HashMap<&str, fn(...) -> T>` lookup, specialised
//! to one [`Registry<P>`] per payload type and built on `serde_json::Value` directly rather than
//! `erased_serde`, since a single concrete payload type doesn't need `erased_serde`'s
//! format-agnostic deserializer erasure.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::component::Component;
use crate::error::ConfigInvalid;

/// The JSON field naming which registered behaviour a value describes, e.g.
/// `{"type": "resize", "width": 640}`.
const TAG_FIELD: &str = "type";

type BuildFn<P> =
    Box<dyn Fn(serde_json::Value) -> Result<Arc<dyn Component<P>>, ConfigInvalid> + Send + Sync>;

/// A tag → constructor lookup for one payload type, used to build components from data (e.g. a
/// saved graph description) rather than Rust source.
pub struct Registry<P> {
    builders: HashMap<&'static str, BuildFn<P>>,
}

impl<P> Default for Registry<P> {
    fn default() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }
}

impl<P: 'static> Registry<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a concrete behaviour under `tag`: a later [`build`](Self::build) call tagged with
    /// it deserialises the rest of the JSON object as `T`.
    pub fn register<T>(&mut self, tag: &'static str)
    where
        T: Component<P> + DeserializeOwned + 'static,
    {
        self.builders.insert(
            tag,
            Box::new(move |value| {
                let behaviour: T = serde_json::from_value(value)
                    .map_err(|err| ConfigInvalid::new(tag, err.to_string()))?;
                Ok(Arc::new(behaviour) as Arc<dyn Component<P>>)
            }),
        );
    }

    /// Whether `tag` has a registered builder.
    pub fn contains(&self, tag: &str) -> bool {
        self.builders.contains_key(tag)
    }

    /// Build a component behaviour from a tagged JSON value: the `"type"` field picks the
    /// builder, the rest of the object is deserialised as that builder's own concrete type.
    pub fn build(&self, mut value: serde_json::Value) -> Result<Arc<dyn Component<P>>, ConfigInvalid> {
        let tag = value
            .as_object_mut()
            .and_then(|obj| obj.remove(TAG_FIELD))
            .and_then(|t| t.as_str().map(str::to_string))
            .ok_or_else(|| ConfigInvalid::new(TAG_FIELD, "missing component `type` tag"))?;
        let builder = self
            .builders
            .get(tag.as_str())
            .ok_or_else(|| ConfigInvalid::new(TAG_FIELD, format!("unknown component type `{tag}`")))?;
        builder(value)
    }
}
