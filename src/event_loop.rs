//! Per-component cooperative executors.
//!
//! Two behaviourally-identical implementations are provided, both built on the same [`Event`]
//! and [`EventLoop`] contract: [`ThreadEventLoop`] gives a component its own private worker
//! thread; [`CooperativeEventLoop`] instead queues work onto a shared [`Dispatcher`] driven by
//! one caller-chosen thread (e.g. a UI event loop). In both, [`EventLoop::queue`] is safe to call
//! from any thread, and a component's own events are always processed one at a time, in arrival
//! order, never concurrently with each other.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use smol_str::SmolStr;

/// One event delivered to a component's worker.
///
/// Firing sources: a peer delivering a frame fires `Input`; a pool releasing
/// a slot fires `PoolReady`; `set_config` fires `ConfigChanged`; the event loop itself fires
/// `Start` once, first, and `Stop` once, last.
#[derive(Debug, Clone)]
pub enum Event {
    Start,
    Stop,
    Input(SmolStr),
    PoolReady(SmolStr),
    ConfigChanged,
}

impl Event {
    fn is_stop(&self) -> bool {
        matches!(self, Event::Stop)
    }
}

/// The per-component logic invoked once per [`Event`], always from the same logical worker.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: Event);
}

/// The contract both event loop implementations satisfy.
pub trait EventLoop: Send + Sync {
    /// Thread-safe enqueue. A no-op once this loop has processed `Event::Stop`.
    fn queue(&self, event: Event);
    /// Begin draining the queue; `Event::Start` is delivered to the handler first.
    fn start(&self);
    /// Wait for the worker to process `Event::Stop` and exit, up to `timeout` (or forever if
    /// `None`). Returns whether it stopped within the deadline.
    fn join(&self, timeout: Option<Duration>) -> bool;
    /// Whether the loop is currently draining events (`true` between `start()` and the
    /// processing of `Event::Stop`).
    fn running(&self) -> bool;
}

/// Shared stop-signalling state so both event loop flavours share one `join` implementation.
struct StopSignal {
    running: AtomicBool,
    stopped: Mutex<bool>,
    cv: Condvar,
}
impl StopSignal {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            stopped: Mutex::new(false),
            cv: Condvar::new(),
        }
    }
    fn mark_started(&self) {
        self.running.store(true, Ordering::SeqCst);
    }
    fn mark_stopped(&self) {
        self.running.store(false, Ordering::SeqCst);
        *self.stopped.lock().unwrap() = true;
        self.cv.notify_all();
    }
    fn join(&self, timeout: Option<Duration>) -> bool {
        let mut guard = self.stopped.lock().unwrap();
        match timeout {
            None => {
                while !*guard {
                    guard = self.cv.wait(guard).unwrap();
                }
                true
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while !*guard {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return *guard;
                    }
                    let (g, _) = self.cv.wait_timeout(guard, remaining).unwrap();
                    guard = g;
                }
                true
            }
        }
    }
}

/// A private worker thread per component.
///
/// `queue` before `start` is allowed (events simply wait in the channel); `start` may only be
/// called once.
pub struct ThreadEventLoop {
    handler: Arc<dyn EventHandler>,
    sender: std::sync::mpsc::Sender<Event>,
    receiver: Mutex<Option<std::sync::mpsc::Receiver<Event>>>,
    signal: Arc<StopSignal>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
    stopped_flag: Arc<AtomicBool>,
}

impl ThreadEventLoop {
    pub fn new(handler: Arc<dyn EventHandler>) -> Self {
        let (sender, receiver) = std::sync::mpsc::channel();
        Self {
            handler,
            sender,
            receiver: Mutex::new(Some(receiver)),
            signal: Arc::new(StopSignal::new()),
            join_handle: Mutex::new(None),
            stopped_flag: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl EventLoop for ThreadEventLoop {
    fn queue(&self, event: Event) {
        if self.stopped_flag.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.sender.send(event);
    }

    fn start(&self) {
        let receiver = self
            .receiver
            .lock()
            .unwrap()
            .take()
            .expect("ThreadEventLoop::start called more than once");
        // Mark started synchronously, before the worker thread even spawns: `running()` must
        // become true the instant `start()` returns, the same as `CooperativeEventLoop`, so a
        // caller polling `running()` right after `start()` never mistakes "not spawned yet" for
        // "already finished".
        self.signal.mark_started();
        let handler = self.handler.clone();
        let signal = self.signal.clone();
        let stopped_flag = self.stopped_flag.clone();
        let join_handle = std::thread::Builder::new()
            .name("pyctools-component".into())
            .spawn(move || {
                handler.handle(Event::Start);
                for event in receiver.iter() {
                    let stop = event.is_stop();
                    handler.handle(event);
                    if stop {
                        break;
                    }
                }
                stopped_flag.store(true, Ordering::SeqCst);
                signal.mark_stopped();
            })
            .expect("failed to spawn component worker thread");
        *self.join_handle.lock().unwrap() = Some(join_handle);
    }

    fn join(&self, timeout: Option<Duration>) -> bool {
        let stopped = self.signal.join(timeout);
        if stopped {
            if let Some(handle) = self.join_handle.lock().unwrap().take() {
                let _ = handle.join();
            }
        }
        stopped
    }

    fn running(&self) -> bool {
        self.signal.running.load(Ordering::SeqCst)
    }
}

/// A single FIFO job queue shared by every component hosted on one cooperative loop, e.g. a
/// process's UI thread. Created once per "main thread"; components register work on it via
/// [`CooperativeEventLoop`] and never touch it directly.
pub struct Dispatcher {
    queue: Mutex<VecDeque<Box<dyn FnOnce() + Send>>>,
    cv: Condvar,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            cv: Condvar::new(),
        }
    }

    fn push(&self, job: Box<dyn FnOnce() + Send>) {
        self.queue.lock().unwrap().push_back(job);
        self.cv.notify_all();
    }

    /// Drive queued jobs on the calling thread until `keep_going` returns `false` and the queue
    /// is empty. A component's `Stop` event does not, by itself, stop the dispatcher: other
    /// components sharing it may still have work pending.
    pub fn run_while(&self, mut keep_going: impl FnMut() -> bool) {
        loop {
            let job = {
                let mut guard = self.queue.lock().unwrap();
                loop {
                    if let Some(job) = guard.pop_front() {
                        break Some(job);
                    }
                    if !keep_going() {
                        break None;
                    }
                    guard = self
                        .cv
                        .wait_timeout(guard, Duration::from_millis(25))
                        .unwrap()
                        .0;
                }
            };
            match job {
                Some(job) => job(),
                None => return,
            }
        }
    }

    /// Run a fixed number of queued jobs, or until the queue drains, without blocking. Useful
    /// for tests and for a caller that pumps the dispatcher itself on its own schedule.
    pub fn run_pending(&self) {
        loop {
            let job = self.queue.lock().unwrap().pop_front();
            match job {
                Some(job) => job(),
                None => return,
            }
        }
    }
}

/// A cooperative loop hosted on a shared [`Dispatcher`] rather than a private thread.
///
/// Behaviourally identical to [`ThreadEventLoop`]: `queue` is safe from any thread, and this
/// component's events are always run one at a time, in arrival order, by whichever thread is
/// currently driving the dispatcher.
pub struct CooperativeEventLoop {
    handler: Arc<dyn EventHandler>,
    dispatcher: Arc<Dispatcher>,
    signal: Arc<StopSignal>,
    stopped_flag: Arc<AtomicBool>,
}

impl CooperativeEventLoop {
    pub fn new(dispatcher: Arc<Dispatcher>, handler: Arc<dyn EventHandler>) -> Self {
        Self {
            handler,
            dispatcher,
            signal: Arc::new(StopSignal::new()),
            stopped_flag: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl EventLoop for CooperativeEventLoop {
    fn queue(&self, event: Event) {
        if self.stopped_flag.load(Ordering::SeqCst) {
            return;
        }
        let handler = self.handler.clone();
        let signal = self.signal.clone();
        let stopped_flag = self.stopped_flag.clone();
        self.dispatcher.push(Box::new(move || {
            let stop = event.is_stop();
            handler.handle(event);
            if stop {
                stopped_flag.store(true, Ordering::SeqCst);
                signal.mark_stopped();
            }
        }));
    }

    fn start(&self) {
        self.signal.mark_started();
        self.queue(Event::Start);
    }

    fn join(&self, timeout: Option<Duration>) -> bool {
        self.signal.join(timeout)
    }

    fn running(&self) -> bool {
        self.signal.running.load(Ordering::SeqCst)
    }
}
