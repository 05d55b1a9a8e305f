//! Metadata carried alongside a [`Frame`](crate::frame::Frame): a structured tag map plus an
//! append-only audit trail.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use smol_str::SmolStr;

/// Well-known private-namespace tags consulted directly by the runtime.
const TAG_XLEN: &str = "xlen";
const TAG_YLEN: &str = "ylen";
const TAG_FOURCC: &str = "fourcc";
const TAG_AUDIT: &str = "audit";

/// An opaque embedded-image-metadata namespace, copied through verbatim by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EmbeddedBlob(pub Vec<u8>);

/// Side-channel information that travels with every [`Frame`](crate::frame::Frame).
///
/// Holds a private tag → string map (the `xlen`/`ylen`/`fourcc`/`audit` fields are named
/// accessors backed by this same map) plus opaque embedded blobs (`exif`, `iptc`, `xmp`, ...)
/// copied verbatim from source files. Metadata is always copied by value between frames; the
/// runtime never aliases it across two live frames.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Metadata {
    tags: BTreeMap<SmolStr, String>,
    embedded: BTreeMap<SmolStr, EmbeddedBlob>,
}

impl Metadata {
    /// A fresh, empty metadata block with an empty audit trail.
    pub fn new() -> Self {
        let mut tags = BTreeMap::new();
        tags.insert(SmolStr::new_static(TAG_AUDIT), String::new());
        Self {
            tags,
            embedded: BTreeMap::new(),
        }
    }

    /// Get a tag's value, if present.
    pub fn get(&self, tag: &str) -> Option<&str> {
        self.tags.get(tag).map(String::as_str)
    }

    /// Set a tag's value.
    pub fn set(&mut self, tag: impl Into<SmolStr>, value: impl Into<String>) {
        self.tags.insert(tag.into(), value.into());
    }

    pub fn xlen(&self) -> Option<u32> {
        self.get(TAG_XLEN).and_then(|v| v.parse().ok())
    }
    pub fn ylen(&self) -> Option<u32> {
        self.get(TAG_YLEN).and_then(|v| v.parse().ok())
    }
    pub fn fourcc(&self) -> Option<&str> {
        self.get(TAG_FOURCC)
    }
    pub fn set_xlen(&mut self, xlen: u32) {
        self.set(TAG_XLEN, xlen.to_string());
    }
    pub fn set_ylen(&mut self, ylen: u32) {
        self.set(TAG_YLEN, ylen.to_string());
    }
    pub fn set_fourcc(&mut self, fourcc: impl Into<String>) {
        self.set(TAG_FOURCC, fourcc.into());
    }

    /// Store an opaque embedded-metadata blob (e.g. `"exif"`, `"iptc"`, `"xmp"`) under a
    /// namespace. The runtime never interprets its contents.
    pub fn set_embedded(&mut self, namespace: impl Into<SmolStr>, blob: Vec<u8>) {
        self.embedded.insert(namespace.into(), EmbeddedBlob(blob));
    }
    pub fn embedded(&self, namespace: &str) -> Option<&[u8]> {
        self.embedded.get(namespace).map(|b| b.0.as_slice())
    }

    /// The current audit trail.
    pub fn audit(&self) -> &str {
        self.get(TAG_AUDIT).unwrap_or("")
    }

    /// Extend the audit trail in the standard form:
    ///
    /// ```text
    /// data = ComponentName(data)
    ///     param: value
    ///     <fully.qualified.ComponentName>
    /// ```
    ///
    /// `text` should describe what was done and end with a newline; `component_path` is the
    /// fully-qualified name written on its own indented line. Set `with_history` to `false` to
    /// discard the trail accumulated so far (rarely wanted outside of file writers).
    pub fn set_audit(&mut self, component_path: &str, text: &str, with_history: bool) {
        let mut audit = if with_history {
            self.audit().to_string()
        } else {
            String::new()
        };
        audit.push_str(text);
        let _ = writeln!(audit, "    <{component_path}>");
        self.set(TAG_AUDIT, audit);
    }

    /// Merge the audit trails of several inputs under named, indented sub-blocks, replacing this
    /// metadata's own trail. Typically followed immediately by [`set_audit`](Self::set_audit) to
    /// record the merging component itself. `parts` is walked in the order given, so callers
    /// that care about a stable ordering should pass an ordered sequence (e.g. a `Vec`, not a
    /// `HashMap`).
    pub fn merge_audit<'a>(&mut self, parts: impl IntoIterator<Item = (&'a str, &'a Metadata)>) {
        let mut audit = String::new();
        for (name, metadata) in parts {
            let _ = writeln!(audit, "{name} = {{");
            for line in metadata.audit().lines() {
                let _ = writeln!(audit, "    {line}");
            }
            audit.push_str("    }\n");
        }
        self.set(TAG_AUDIT, audit);
    }

    /// Copy all tags and embedded blobs from `other` into `self`, overwriting on conflict.
    pub fn copy_from(&mut self, other: &Metadata) {
        for (k, v) in &other.tags {
            self.tags.insert(k.clone(), v.clone());
        }
        for (k, v) in &other.embedded {
            self.embedded.insert(k.clone(), v.clone());
        }
    }

    /// Iterate all tags in the private namespace (sorted by tag name).
    pub fn tags(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Iterate all embedded-blob namespaces present.
    pub fn embedded_namespaces(&self) -> impl Iterator<Item = &str> {
        self.embedded.keys().map(SmolStr::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_metadata_has_empty_audit() {
        let md = Metadata::new();
        assert_eq!(md.audit(), "");
    }

    #[test]
    fn set_audit_appends_history_and_component_line() {
        let mut md = Metadata::new();
        md.set_audit("pkg.Source", "data = test.y\n", true);
        md.set_audit("pkg.Transformer", "data = Transformer(data)\n", true);
        let audit = md.audit();
        assert!(audit.contains("data = test.y\n    <pkg.Source>\n"));
        assert!(audit.ends_with("data = Transformer(data)\n    <pkg.Transformer>\n"));
    }

    #[test]
    fn set_audit_without_history_discards_prior_trail() {
        let mut md = Metadata::new();
        md.set_audit("pkg.A", "data = A(data)\n", true);
        md.set_audit("pkg.B", "data = B(data)\n", false);
        assert_eq!(md.audit(), "data = B(data)\n    <pkg.B>\n");
    }

    #[test]
    fn merge_audit_indents_and_labels_each_part() {
        let mut y = Metadata::new();
        y.set_audit("pkg.YReader", "data = test.y\n", true);
        let mut uv = Metadata::new();
        uv.set_audit("pkg.UVReader", "data = test.uv\n", true);

        let mut out = Metadata::new();
        out.merge_audit([("Y", &y), ("UV", &uv)]);
        out.set_audit("pkg.YUVtoRGB", "data = YUVtoRGB(Y, UV)\n", true);

        let expected = "Y = {\n    data = test.y\n    <pkg.YReader>\n    }\n\
UV = {\n    data = test.uv\n    <pkg.UVReader>\n    }\n\
data = YUVtoRGB(Y, UV)\n    <pkg.YUVtoRGB>\n";
        assert_eq!(out.audit(), expected);
    }

    #[test]
    fn named_accessors_round_trip_through_tag_map() {
        let mut md = Metadata::new();
        md.set_xlen(720);
        md.set_ylen(576);
        md.set_fourcc("UYVY");
        assert_eq!(md.xlen(), Some(720));
        assert_eq!(md.ylen(), Some(576));
        assert_eq!(md.fourcc(), Some("UYVY"));
        assert_eq!(md.get("xlen"), Some("720"));
    }

    #[test]
    fn embedded_blobs_are_opaque_and_copied_verbatim() {
        let mut md = Metadata::new();
        md.set_embedded("exif", vec![1, 2, 3]);
        let mut copy = Metadata::new();
        copy.copy_from(&md);
        assert_eq!(copy.embedded("exif"), Some(&[1u8, 2, 3][..]));
    }
}
