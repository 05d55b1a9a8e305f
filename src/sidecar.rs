//! A minimal XMP-flavoured sidecar reader/writer.
//!
//! Writes/reads `<path>.xmp` next to a media file, round-tripping exactly the runtime's own
//! private namespace (the `xlen`/`ylen`/`fourcc`/`audit` tags plus any free-form tag a component
//! added) under the `Xmp.pyctools.` prefix [`Metadata::get`]/[`Metadata::set`] already use. This
//! does not parse or validate any other RDF/XMP content a real sidecar file might carry; it is
//! boundary plumbing for the runtime's own tags, not a general XMP library.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::metadata::Metadata;

const NAMESPACE: &str = "Xmp.pyctools.";

fn sidecar_path(media_path: &Path) -> PathBuf {
    let mut s = media_path.as_os_str().to_os_string();
    s.push(".xmp");
    PathBuf::from(s)
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\n', "&#10;")
}

fn unescape(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&#10;", "\n")
        .replace("&amp;", "&")
}

/// Write `metadata`'s tags to `<media_path>.xmp`, one element per tag under the runtime's
/// namespace.
pub fn write(media_path: &Path, metadata: &Metadata) -> io::Result<()> {
    let mut out = String::new();
    out.push_str("<x:xmpmeta x:xmptk=\"pyctools-rt\" xmlns:x=\"adobe:ns:meta/\">\n");
    for (tag, value) in metadata.tags() {
        out.push_str(&format!(
            "  <{NAMESPACE}{tag}>{}</{NAMESPACE}{tag}>\n",
            escape(value)
        ));
    }
    out.push_str("</x:xmpmeta>\n");
    fs::write(sidecar_path(media_path), out)
}

/// Read `<media_path>.xmp` and return the tags found under the runtime's namespace as a fresh
/// [`Metadata`]. Any RDF/XMP content outside that namespace is ignored, not an error.
pub fn read(media_path: &Path) -> io::Result<Metadata> {
    let text = fs::read_to_string(sidecar_path(media_path))?;
    let mut metadata = Metadata::new();
    for line in text.lines() {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix(&format!("<{NAMESPACE}")) else {
            continue;
        };
        let Some(tag_end) = rest.find('>') else {
            continue;
        };
        let tag = &rest[..tag_end];
        let after = &rest[tag_end + 1..];
        let close = format!("</{NAMESPACE}{tag}>");
        if let Some(value_end) = after.find(&close) {
            metadata.set(tag, unescape(&after[..value_end]));
        }
    }
    Ok(metadata)
}

/// Whether a sidecar file exists for `media_path`.
pub fn exists(media_path: &Path) -> bool {
    sidecar_path(media_path).exists()
}
