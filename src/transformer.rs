//! A convenience [`Component`] impl for the common single-input, single-output case: a
//! user only supplies a [`Transform`], and the aligner/pool/bookkeeping plumbing is handled once
//! here instead of once per component.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::component::{Component, ComponentHandle};
use crate::config::ConfigNode;
use crate::error::ComponentError;
use crate::frame::{Delivery, FrameData};

/// The part of a transformer a caller actually writes: turn one input frame into one output
/// frame, or end the stream.
pub trait Transform<P>: Send + Sync {
    /// Populate `in_frame`'s bookkeeping into `out_frame` (already done by the caller via
    /// [`FrameData::initialise_from`]) and write `out_frame.data`. Return `Ok(false)` to end the
    /// stream: the checked-out output frame is dropped (returning it to its pool), end-of-stream
    /// is emitted on every output, and the component stops, exactly as if `process_frame` had
    /// returned [`ComponentError::StreamEnd`].
    fn transform(
        &self,
        in_frame: &FrameData<P>,
        out_frame: &mut FrameData<P>,
    ) -> Result<bool, ComponentError>;

    /// Populate `config` with any leaves this transform needs.
    fn initialise(&self, _config: &mut ConfigNode) {}
    fn on_start(&self, _handle: &ComponentHandle<P>) {}
    fn on_set_config(&self, _handle: &ComponentHandle<P>) {}
}

/// Wraps a [`Transform`] into a full [`Component`]: one input port `"input"`, one pooled output
/// port `"output"`.
pub struct Transformer<P, T> {
    inner: T,
    _marker: PhantomData<fn(P)>,
}

impl<P, T: Transform<P>> Transformer<P, T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }
}

impl<P, T: Transform<P>> Component<P> for Transformer<P, T>
where
    P: Send + Sync + Default + Clone + 'static,
    T: Send + Sync,
{
    fn type_name(&self) -> &'static str {
        // The audit trail should name the thing a user actually wrote (`T`), not this generic
        // wrapper's own type.
        std::any::type_name::<T>()
    }

    fn with_outframe_pool(&self) -> bool {
        true
    }

    fn initialise(&self, config: &mut ConfigNode) {
        self.inner.initialise(config);
    }
    fn on_start(&self, handle: &ComponentHandle<P>) {
        self.inner.on_start(handle);
    }
    fn on_set_config(&self, handle: &ComponentHandle<P>) {
        self.inner.on_set_config(handle);
    }

    fn process_frame(&self, handle: &ComponentHandle<P>) -> Result<(), ComponentError> {
        let in_frame = match handle.take_input("input") {
            Some(Delivery::Frame(f)) => f,
            Some(Delivery::EndOfStream) => {
                return Err(ComponentError::Fatal(
                    "end-of-stream reached process_frame; the aligner should have filtered it".into(),
                ));
            }
            None => {
                return Err(ComponentError::Fatal(
                    "aligner invoked process_frame with no input frame queued".into(),
                ));
            }
        };

        let mut out = handle
            .pool_get("output")
            .ok_or_else(|| ComponentError::Fatal("output pool empty at process_frame time".into()))?;
        let out_data: &mut FrameData<P> =
            Arc::get_mut(&mut out).expect("freshly checked-out pool frame is sole-owned");
        out_data.initialise_from(&in_frame);

        let keep = self.inner.transform(&in_frame, out_data)?;
        if !keep {
            // The checked-out `out` frame is simply dropped here, returning it to its pool; the
            // aligner's `StreamEnd` handling sends the actual end-of-stream marker downstream.
            return Err(ComponentError::StreamEnd);
        }
        let name = handle.audit_name();
        out_data
            .metadata
            .set_audit(&name, &format!("data = {name}(data)\n"), true);
        handle.emit("output", out);
        Ok(())
    }
}
