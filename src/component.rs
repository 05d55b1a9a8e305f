//! The component base: wires named inputs/outputs, an event loop, a configuration subtree, and
//! an object pool into one reactive unit, plus the multi-input aligner that drives
//! `process_frame`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};
use std::time::Duration;

use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::config::ConfigNode;
use crate::error::{ComponentError, ConfigInvalid};
use crate::event_loop::{Dispatcher, Event, EventHandler, EventLoop, ThreadEventLoop};
use crate::frame::{Delivery, Frame, FrameData, FrameNo, STATIC_FRAME_NO};
use crate::pool::ObjectPool;
use crate::utils::LogErr;

const DEFAULT_OUTFRAME_POOL_LEN: i64 = 3;
const MIN_OUTFRAME_POOL_LEN: i64 = 2;

/// User-implemented behaviour for a processing node.
///
/// Every method besides [`process_frame`](Component::process_frame) has a default; a minimal
/// component only needs to implement that one hook. All hooks run on the component's own worker
/// (never concurrently with each other, never concurrently with a second invocation of
/// themselves).
pub trait Component<P>: Send + Sync {
    /// The short name this behaviour writes into a frame's audit trail when it runs.
    /// Defaults to the concrete type's own name; override only if a component wants something
    /// other than its Rust type name recorded there.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
    /// Declared input port names. Default: a single port named `"input"`.
    fn inputs(&self) -> &'static [&'static str] {
        &["input"]
    }
    /// Declared output port names. Default: a single port named `"output"`.
    fn outputs(&self) -> &'static [&'static str] {
        &["output"]
    }
    /// Whether each declared output gets a pooled supply of frames, sized by the
    /// `outframe_pool_len` config leaf (one value shared by every pooled output this
    /// component declares).
    fn with_outframe_pool(&self) -> bool {
        false
    }

    /// Populate `config` with any leaves this component needs beyond the ones the handle adds
    /// automatically (`outframe_pool_len`, when `with_outframe_pool` is set).
    fn initialise(&self, _config: &mut ConfigNode) {}
    /// One-shot setup, run once before the aligner's first pass.
    fn on_start(&self, _handle: &ComponentHandle<P>) {}
    /// React to an applied config change.
    fn on_set_config(&self, _handle: &ComponentHandle<P>) {}
    /// React to a peer binding one of this component's outputs.
    fn on_connect(&self, _handle: &ComponentHandle<P>, _output: &str) {}
    /// Do one unit of work. Called by the aligner once every input has a frame with a matching
    /// frame number (or is static) and every pooled output has capacity. Responsible for calling
    /// [`take_input`](ComponentHandle::take_input) on each input it consumes and
    /// [`pool_get`](ComponentHandle::pool_get) on each output it emits on.
    fn process_frame(&self, handle: &ComponentHandle<P>) -> Result<(), ComponentError>;
    /// Cleanup, run once during termination.
    fn on_stop(&self, _handle: &ComponentHandle<P>) {}
}

/// Helper for the "warn once, then continue" half of `InputMismatch`: remembers the last
/// type tag seen on a port and only returns an error the first time, or when it changes.
#[derive(Default)]
pub struct MismatchGuard(Mutex<Option<SmolStr>>);

impl MismatchGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `got` against what was last seen on `input`. Returns `Some(error)` the first time,
    /// or whenever `got` differs from the previously seen value; returns `None` on a repeat.
    pub fn check(
        &self,
        input: impl Into<SmolStr>,
        expected: impl Into<SmolStr>,
        got: impl Into<SmolStr>,
    ) -> Option<ComponentError> {
        let got = got.into();
        let mut last = self.0.lock().unwrap();
        if last.as_ref() == Some(&got) {
            return None;
        }
        let input = input.into();
        let expected = expected.into();
        *last = Some(got.clone());
        Some(ComponentError::InputMismatch {
            input,
            expected,
            got,
        })
    }
}

type Binding<P> = Box<dyn Fn(Delivery<P>) + Send + Sync>;

enum Loop {
    Thread(ThreadEventLoop),
    Cooperative(crate::event_loop::CooperativeEventLoop),
}
impl EventLoop for Loop {
    fn queue(&self, event: Event) {
        match self {
            Loop::Thread(l) => l.queue(event),
            Loop::Cooperative(l) => l.queue(event),
        }
    }
    fn start(&self) {
        match self {
            Loop::Thread(l) => l.start(),
            Loop::Cooperative(l) => l.start(),
        }
    }
    fn join(&self, timeout: Option<Duration>) -> bool {
        match self {
            Loop::Thread(l) => l.join(timeout),
            Loop::Cooperative(l) => l.join(timeout),
        }
    }
    fn running(&self) -> bool {
        match self {
            Loop::Thread(l) => l.running(),
            Loop::Cooperative(l) => l.running(),
        }
    }
}

/// Which kind of event loop a newly built component should run on.
pub enum EventLoopKind {
    /// A private worker thread.
    Thread,
    /// A cooperative loop hosted on a shared dispatcher (e.g. a UI thread).
    Cooperative(Arc<Dispatcher>),
}

struct InputPort<P> {
    buffer: crate::buffer::InputBuffer<P>,
}

/// A live, wired-up component: named inputs/outputs, a configuration subtree, pooled outputs,
/// and the event loop driving it. Built with [`ComponentHandle::build`].
pub struct ComponentHandle<P> {
    name: SmolStr,
    behaviour: Arc<dyn Component<P>>,
    input_names: SmallVec<[SmolStr; 2]>,
    output_names: SmallVec<[SmolStr; 2]>,
    inputs: HashMap<SmolStr, InputPort<P>>,
    output_pools: Mutex<HashMap<SmolStr, ObjectPool<FrameData<P>>>>,
    bindings: Mutex<HashMap<SmolStr, Binding<P>>>,
    config: RwLock<ConfigNode>,
    pending_config: Mutex<Option<ConfigNode>>,
    config_generation: AtomicU64,
    last_seen_generation: AtomicU64,
    event_loop: OnceLock<Loop>,
    ended: AtomicBool,
    fatal: AtomicBool,
    self_weak: Weak<ComponentHandle<P>>,
}

impl<P: Send + Sync + Default + 'static> ComponentHandle<P> {
    /// Build and wire a component: reads its declared inputs/outputs, runs `initialise` to
    /// populate the config tree, and attaches the requested event loop flavour. The component is
    /// not started; call [`start`](Self::start) once the graph is fully wired (`bind` calls
    /// included).
    pub fn build(
        name: impl Into<SmolStr>,
        behaviour: Arc<dyn Component<P>>,
        kind: EventLoopKind,
    ) -> Arc<Self> {
        let input_names: SmallVec<[SmolStr; 2]> =
            behaviour.inputs().iter().map(|s| SmolStr::new(*s)).collect();
        let output_names: SmallVec<[SmolStr; 2]> =
            behaviour.outputs().iter().map(|s| SmolStr::new(*s)).collect();

        let mut config = ConfigNode::parent();
        behaviour.initialise(&mut config);
        // Only supply the default leaf if `initialise` didn't already declare one: a component is
        // free to pick its own starting `outframe_pool_len` (e.g. a source wanting a deeper pool
        // than a downstream filter) by appending it itself before this runs.
        if behaviour.with_outframe_pool() && config.get("outframe_pool_len").is_none() {
            config.append(
                "outframe_pool_len",
                ConfigNode::int(
                    DEFAULT_OUTFRAME_POOL_LEN,
                    MIN_OUTFRAME_POOL_LEN,
                    i64::MAX,
                ),
            );
        }

        let handle = Arc::new_cyclic(|weak: &Weak<ComponentHandle<P>>| {
            let inputs = input_names
                .iter()
                .map(|name| {
                    let name = name.clone();
                    let weak = weak.clone();
                    let notify_name = name.clone();
                    let buffer = crate::buffer::InputBuffer::new(move || {
                        if let Some(handle) = weak.upgrade() {
                            handle.queue(Event::Input(notify_name.clone()));
                        }
                    });
                    (name, InputPort { buffer })
                })
                .collect();
            ComponentHandle {
                name: name.into(),
                behaviour,
                input_names,
                output_names,
                inputs,
                output_pools: Mutex::new(HashMap::new()),
                bindings: Mutex::new(HashMap::new()),
                config: RwLock::new(config),
                pending_config: Mutex::new(None),
                config_generation: AtomicU64::new(0),
                last_seen_generation: AtomicU64::new(0),
                event_loop: OnceLock::new(),
                ended: AtomicBool::new(false),
                fatal: AtomicBool::new(false),
                self_weak: weak.clone(),
            }
        });

        let event_loop = match kind {
            EventLoopKind::Thread => Loop::Thread(ThreadEventLoop::new(handle.clone())),
            EventLoopKind::Cooperative(dispatcher) => {
                Loop::Cooperative(crate::event_loop::CooperativeEventLoop::new(
                    dispatcher,
                    handle.clone(),
                ))
            }
        };
        handle
            .event_loop
            .set(event_loop)
            .unwrap_or_else(|_| unreachable!("event_loop is only ever set once, here"));
        handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The identifier this component writes into a frame's audit trail: its behaviour's
    /// short type name via [`disqualified::ShortName`], matching how the crate already favours
    /// short names over a fully module-qualified path in its own `Display` impls and error
    /// messages.
    pub fn audit_name(&self) -> String {
        crate::utils::short_type_name_str(self.behaviour.type_name()).to_string()
    }

    pub fn input_names(&self) -> &[SmolStr] {
        &self.input_names
    }

    pub fn output_names(&self) -> &[SmolStr] {
        &self.output_names
    }

    fn queue(&self, event: Event) {
        if let Some(loop_) = self.event_loop.get() {
            loop_.queue(event);
        }
    }

    // -- lifecycle verbs -----------------------------------------------------------------

    pub fn start(&self) {
        if let Some(loop_) = self.event_loop.get() {
            loop_.start();
        }
    }
    pub fn stop(&self) {
        self.queue(Event::Stop);
    }
    pub fn join(&self, timeout: Option<Duration>) -> bool {
        match self.event_loop.get() {
            Some(loop_) => loop_.join(timeout),
            None => true,
        }
    }
    pub fn running(&self) -> bool {
        self.event_loop.get().map(|l| l.running()).unwrap_or(false)
    }
    pub fn is_fatal(&self) -> bool {
        self.fatal.load(Ordering::SeqCst)
    }
    pub fn has_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    /// Whether this component currently has no outputs bound to a peer (the natural definition
    /// of a graph-terminal node).
    pub fn is_terminal(&self) -> bool {
        self.bindings.lock().unwrap().is_empty()
    }

    /// Mark an output as spoken for without installing a real peer yet: a `Compound`
    /// calls this for every child output wired to its own external boundary, so the child is never
    /// mistaken for graph-terminal before the compound itself is bound to something downstream.
    /// A later [`bind`](Self::bind) call on the same output replaces this placeholder.
    pub fn reserve_output(&self, output: &str) {
        self.bindings
            .lock()
            .unwrap()
            .entry(SmolStr::new(output))
            .or_insert_with(|| Box::new(|_| {}));
    }

    // -- configuration ---------------------------------------------------------------------

    pub fn get_config(&self) -> ConfigNode {
        self.config.read().unwrap().clone()
    }

    /// Validate `tree`, then enqueue it to be swapped in atomically at the next event boundary.
    /// Rejects synchronously (before anything is queued) if validation fails.
    pub fn set_config(&self, tree: ConfigNode) -> Result<(), ConfigInvalid> {
        tree.validate()?;
        *self.pending_config.lock().unwrap() = Some(tree);
        self.queue(Event::ConfigChanged);
        Ok(())
    }

    /// Poll-and-compare: returns `true` the first time it's called after a config change has
    /// been applied since the last call.
    pub fn update_config(&self) -> bool {
        let current = self.config_generation.load(Ordering::SeqCst);
        let last = self.last_seen_generation.swap(current, Ordering::SeqCst);
        last != current
    }

    fn apply_pending_config(&self) {
        let pending = self.pending_config.lock().unwrap().take();
        if let Some(tree) = pending {
            *self.config.write().unwrap() = tree;
            self.config_generation.fetch_add(1, Ordering::SeqCst);
            self.behaviour.on_set_config(self);
        }
    }

    // -- ports ---------------------------------------------------------------------------

    /// Enqueue a frame (or end-of-stream) on a named input port.
    pub fn input(&self, port: &str, delivery: Delivery<P>) {
        if let Some(input) = self.inputs.get(port) {
            input.buffer.input(delivery);
        } else {
            tracing::warn!(component = %self.name, port, "delivery to unknown input port dropped");
        }
    }

    /// Pop the head delivery from a named input port. Used by `process_frame` implementations.
    pub fn take_input(&self, port: &str) -> Option<Delivery<P>> {
        self.inputs.get(port).and_then(|i| i.buffer.get())
    }

    /// Clone of the head delivery on a named input, without removing it. A `process_frame` that
    /// reads a static (persistent, `frame_no == -1`) input reads it this way instead of with
    /// [`take_input`](Self::take_input): the aligner only ever lets one static frame sit in the
    /// buffer, so popping it would starve every later invocation (the static-input
    /// persistence edge case).
    pub fn peek_input(&self, port: &str) -> Option<Delivery<P>> {
        self.inputs.get(port).and_then(|i| i.buffer.peek())
    }

    /// Check out a frame from a named output's pool. `None` if the pool has no idle frame or the
    /// output has no pool (the aligner never calls `process_frame` while a pool is empty, so this
    /// should only return `None` for an unpooled output).
    pub fn pool_get(&self, output: &str) -> Option<Frame<P>> {
        self.output_pools.lock().unwrap().get(output)?.get()
    }

    /// Install a direct dispatch from this component's named output to a peer's named input.
    /// Replaces any existing binding for that output. Calls the component's `on_connect` hook.
    pub fn bind(&self, output: &str, peer: Arc<ComponentHandle<P>>, input: impl Into<SmolStr>) {
        let input = input.into();
        let binding: Binding<P> = Box::new(move |delivery| peer.input(&input, delivery));
        self.bindings
            .lock()
            .unwrap()
            .insert(SmolStr::new(output), binding);
        self.behaviour.on_connect(self, output);
    }

    /// Deliver a frame on a named output: dispatches to the bound peer, or drops it if the
    /// output has no binding (the default "unbound output" behaviour).
    pub fn emit(&self, output: &str, frame: Frame<P>) {
        self.emit_delivery(output, Delivery::Frame(frame));
    }

    fn emit_delivery(&self, output: &str, delivery: Delivery<P>) {
        let bindings = self.bindings.lock().unwrap();
        if let Some(binding) = bindings.get(output) {
            binding(delivery);
        }
    }

    fn emit_end_of_stream(&self) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        for output in self.output_names.clone() {
            self.emit_delivery(&output, Delivery::EndOfStream);
        }
        self.stop();
    }

    // -- event handling / aligner -------------------------------------------------------

    fn handle_start(&self) {
        if self.behaviour.with_outframe_pool() {
            self.update_config();
            let len = self
                .get_config()
                .get("outframe_pool_len")
                .and_then(|n| match n {
                    ConfigNode::Int { value, .. } => Some(*value),
                    _ => None,
                })
                .unwrap_or(DEFAULT_OUTFRAME_POOL_LEN)
                .max(MIN_OUTFRAME_POOL_LEN) as usize;
            let mut pools = self.output_pools.lock().unwrap();
            for output in &self.output_names {
                let weak = self.self_weak.clone();
                let notify_name = output.clone();
                pools.insert(
                    output.clone(),
                    ObjectPool::create(FrameData::<P>::default, len, move || {
                        if let Some(handle) = weak.upgrade() {
                            handle.queue(Event::PoolReady(notify_name.clone()));
                        }
                    }),
                );
            }
        }
        self.behaviour.on_start(self);
        self.run_aligner();
    }

    fn handle_stop(&self) {
        self.behaviour.on_stop(self);
    }

    fn run_aligner(&self) {
        loop {
            if self.ended.load(Ordering::SeqCst) {
                return;
            }
            {
                let pools = self.output_pools.lock().unwrap();
                if pools.values().any(|p| p.available() == 0) {
                    return;
                }
            }
            if self.inputs.values().any(|i| i.buffer.available() == 0) {
                return;
            }

            if self.inputs.is_empty() {
                if let Err(err) = self.behaviour.process_frame(self) {
                    self.handle_process_error(err);
                    return;
                }
                continue;
            }

            let mut target: FrameNo = STATIC_FRAME_NO;
            let mut end_of_stream = false;
            for input in self.inputs.values() {
                match input.buffer.peek() {
                    Some(Delivery::EndOfStream) => end_of_stream = true,
                    Some(Delivery::Frame(f)) => target = target.max(f.frame_no),
                    None => unreachable!("availability checked above"),
                }
            }
            if end_of_stream {
                self.emit_end_of_stream();
                return;
            }

            let mut retry = false;
            for input in self.inputs.values() {
                match input.buffer.peek() {
                    Some(Delivery::Frame(f)) if f.frame_no == STATIC_FRAME_NO => {
                        while input.buffer.available() > 1 {
                            input.buffer.get();
                        }
                    }
                    Some(Delivery::Frame(f)) if f.frame_no < target => {
                        input.buffer.get();
                        retry = true;
                    }
                    _ => {}
                }
            }
            if retry {
                continue;
            }

            if let Err(err) = self.behaviour.process_frame(self) {
                self.handle_process_error(err);
                return;
            }
        }
    }

    fn handle_process_error(&self, err: ComponentError) {
        err.log_err();
        match err {
            ComponentError::StreamEnd | ComponentError::ProcessingFailed(_) => {
                self.emit_end_of_stream();
            }
            ComponentError::Fatal(_) => {
                self.fatal.store(true, Ordering::SeqCst);
                self.emit_end_of_stream();
            }
            ComponentError::InputMismatch { .. } => {
                // Not fatal by itself; a component that wants to stop on mismatch should return
                // `ProcessingFailed` instead. Treat as a no-op re-check.
            }
        }
    }
}

impl<P: Send + Sync + Default + 'static> EventHandler for ComponentHandle<P> {
    fn handle(&self, event: Event) {
        match event {
            Event::Start => self.handle_start(),
            Event::Stop => self.handle_stop(),
            Event::ConfigChanged => {
                self.apply_pending_config();
                self.run_aligner();
            }
            Event::Input(_) | Event::PoolReady(_) => self.run_aligner(),
        }
    }
}
