//! The error taxonomy used throughout the runtime.
//!
//! `ConfigInvalid` is returned synchronously by [`set_config`](crate::config::ConfigNode) and
//! never crosses an event loop boundary; the remaining four variants are carried by
//! [`ComponentError`] and travel through a component's own worker, where they are logged and
//! turned into a clean shutdown rather than propagated to peers (see the propagation policy in
//! the crate's top-level docs).

use smol_str::SmolStr;
use thiserror::Error;

use crate::utils::LogErr;

/// A configuration value was rejected by a node's validator.
///
/// Raised synchronously from `set_config`/`ConfigNode::set`; the offending value is never
/// applied, so the tree remains exactly as it was before the call.
#[derive(Debug, Clone, Error)]
#[error("invalid value for config node `{path}`: {reason}")]
pub struct ConfigInvalid {
    pub path: SmolStr,
    pub reason: SmolStr,
}
impl ConfigInvalid {
    pub fn new(path: impl Into<SmolStr>, reason: impl Into<SmolStr>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
impl LogErr for ConfigInvalid {
    fn log_err(&self) {
        tracing::warn!(path = %self.path, reason = %self.reason, "rejected config update");
    }
}

/// The runtime-level error taxonomy for a running component.
///
/// None of these propagate upstream: a component observing one of these on itself stops
/// cleanly and its downstream peers observe [`ComponentError::StreamEnd`] in turn.
#[derive(Debug, Clone, Error)]
pub enum ComponentError {
    /// Orderly end of an input stream. Propagates to every output; the component stops.
    #[error("stream ended")]
    StreamEnd,

    /// `process_frame` (or `transform`) signalled failure.
    #[error("processing failed: {0}")]
    ProcessingFailed(SmolStr),

    /// An input frame's type or shape didn't match what the component expected.
    ///
    /// Not necessarily fatal — a component may log this once per distinct mismatch and keep
    /// running; see [`MismatchGuard`](crate::component::MismatchGuard).
    #[error("input mismatch on `{input}`: expected {expected}, got {got}")]
    InputMismatch {
        input: SmolStr,
        expected: SmolStr,
        got: SmolStr,
    },

    /// Pool factory failure, event-loop failure, or any other unhandled condition.
    ///
    /// Always fatal: the component stops and signals the owning [`Runner`](crate::runner::Runner).
    #[error("fatal component error: {0}")]
    Fatal(SmolStr),
}

impl LogErr for ComponentError {
    fn log_err(&self) {
        match self {
            ComponentError::StreamEnd => tracing::debug!("stream end"),
            ComponentError::ProcessingFailed(msg) => {
                tracing::error!(%msg, "processing failed")
            }
            ComponentError::InputMismatch {
                input,
                expected,
                got,
            } => {
                tracing::warn!(%input, %expected, %got, "input mismatch")
            }
            ComponentError::Fatal(msg) => tracing::error!(%msg, "fatal component error"),
        }
    }
}

/// A component name was requested from a graph but no such component was registered.
#[derive(Debug, Clone, Error)]
#[error("unknown component `{0}`")]
pub struct UnknownComponent(pub SmolStr);

/// A named input or output port was requested but the component declares no such port.
#[derive(Debug, Clone, Error)]
#[error("component `{component}` has no port named `{port}`")]
pub struct UnknownPort {
    pub component: SmolStr,
    pub port: SmolStr,
}
