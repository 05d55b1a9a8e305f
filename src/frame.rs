//! The unit of data flowing through a pipeline: a reference-counted, pool-backed [`Frame`].

use std::sync::Arc;

use smol_str::SmolStr;

use crate::metadata::Metadata;
use crate::pool::Pooled;

/// Frame sequence number. `-1` marks a *static* frame (a filter, matrix, or windowing cell) that
/// persists across many `process_frame` invocations; `>= 0` is an ordered stream position.
pub type FrameNo = i64;

/// Sentinel frame number for static (persistent) frames.
pub const STATIC_FRAME_NO: FrameNo = -1;

/// The body of a [`Frame`]: pixel payload plus its accompanying type tag and metadata.
///
/// Generic over the payload representation `P` — the runtime is deliberately indifferent to
/// whether that's a raw sample buffer, an image-library handle, or something else entirely; it
/// only ever moves `P` around by reference.
pub struct FrameData<P> {
    pub frame_no: FrameNo,
    /// Short tag such as `"RGB"`, `"Y"`, `"YCbCr"`, `"CbCr"`, `"fil"`, `"cell"`, `"func"`, `"FT"`.
    pub type_tag: SmolStr,
    pub metadata: Metadata,
    pub data: P,
}

impl<P: Default> Default for FrameData<P> {
    fn default() -> Self {
        Self {
            frame_no: STATIC_FRAME_NO,
            type_tag: SmolStr::default(),
            metadata: Metadata::new(),
            data: P::default(),
        }
    }
}

impl<P> FrameData<P> {
    pub fn new(frame_no: FrameNo, type_tag: impl Into<SmolStr>, data: P) -> Self {
        Self {
            frame_no,
            type_tag: type_tag.into(),
            metadata: Metadata::new(),
            data,
        }
    }

    /// Copy this frame's bookkeeping (frame number, type tag, metadata) from another frame,
    /// leaving `data` untouched. Used by transformers to seed a freshly pooled output frame from
    /// its input before overwriting `data`.
    pub fn initialise_from(&mut self, other: &FrameData<P>)
    where
        P: Clone,
    {
        self.frame_no = other.frame_no;
        self.type_tag = other.type_tag.clone();
        self.metadata.copy_from(&other.metadata);
    }
}

/// A reference-counted, pool-backed frame.
///
/// Cloning a `Frame` is cheap (an `Arc` clone) and is exactly how a frame travels to more than
/// one consumer. Once published — handed to any peer via an output — a frame is immutable: a
/// component receiving one must not mutate its `data` or `metadata`. While a component still
/// holds sole ownership, fresh from a pool, [`Arc::get_mut`] succeeds and mutation is fine; this
/// is the only point at which a `Frame` may be written to.
pub type Frame<P> = Arc<Pooled<FrameData<P>>>;

/// One value delivered through an input buffer: either a real frame, or the end-of-stream
/// sentinel. The aligner treats the sentinel as fatal on any input.
pub enum Delivery<P> {
    Frame(Frame<P>),
    EndOfStream,
}

impl<P> Delivery<P> {
    pub fn frame_no(&self) -> Option<FrameNo> {
        match self {
            Delivery::Frame(f) => Some(f.frame_no),
            Delivery::EndOfStream => None,
        }
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Delivery::EndOfStream)
    }

    pub fn as_frame(&self) -> Option<&Frame<P>> {
        match self {
            Delivery::Frame(f) => Some(f),
            Delivery::EndOfStream => None,
        }
    }
}

impl<P> Clone for Delivery<P> {
    fn clone(&self) -> Self {
        match self {
            Delivery::Frame(f) => Delivery::Frame(f.clone()),
            Delivery::EndOfStream => Delivery::EndOfStream,
        }
    }
}
