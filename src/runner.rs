//! Drives a whole graph to completion: start everything, wait for the graph's terminal
//! members to finish, stop whatever remains, join everything, and report a process-style exit
//! code.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::component::ComponentHandle;
use crate::compound::Compound;
use crate::event_loop::Dispatcher;

/// Anything a [`Runner`] can drive: a single [`ComponentHandle`] or a [`Compound`], regardless of
/// their payload type — the Runner itself is never generic over `P`.
pub trait GraphMember: Send + Sync {
    fn start(&self);
    fn stop(&self);
    fn join(&self, timeout: Option<Duration>) -> bool;
    fn running(&self) -> bool;
    fn is_terminal(&self) -> bool;
    fn is_fatal(&self) -> bool;
}

impl<P: Send + Sync + Default + 'static> GraphMember for ComponentHandle<P> {
    fn start(&self) {
        ComponentHandle::start(self)
    }
    fn stop(&self) {
        ComponentHandle::stop(self)
    }
    fn join(&self, timeout: Option<Duration>) -> bool {
        ComponentHandle::join(self, timeout)
    }
    fn running(&self) -> bool {
        ComponentHandle::running(self)
    }
    fn is_terminal(&self) -> bool {
        ComponentHandle::is_terminal(self)
    }
    fn is_fatal(&self) -> bool {
        ComponentHandle::is_fatal(self)
    }
}

impl<P: Send + Sync + Default + 'static> GraphMember for Compound<P> {
    fn start(&self) {
        Compound::start(self)
    }
    fn stop(&self) {
        Compound::stop(self)
    }
    fn join(&self, timeout: Option<Duration>) -> bool {
        Compound::join(self, true, timeout)
    }
    fn running(&self) -> bool {
        self.children().any(|(_, c)| c.running())
    }
    /// A compound with no exposed output behaves, from outside, like one terminal node: nothing
    /// can ever be bound downstream of it.
    fn is_terminal(&self) -> bool {
        self.children().all(|(_, c)| c.is_terminal())
    }
    fn is_fatal(&self) -> bool {
        self.children().any(|(_, c)| c.is_fatal())
    }
}

/// Process exit code conventions: 0 on a clean run, non-zero if any component reported a
/// fatal error or the run was interrupted.
pub const EXIT_OK: i32 = 0;
pub const EXIT_FATAL: i32 = 1;
pub const EXIT_INTERRUPTED: i32 = 130;

/// Drives one graph of components/compounds to completion.
#[derive(Default)]
pub struct Runner {
    members: Vec<Arc<dyn GraphMember>>,
}

impl Runner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, member: Arc<dyn GraphMember>) -> &mut Self {
        self.members.push(member);
        self
    }

    fn terminal_members(&self) -> impl Iterator<Item = &Arc<dyn GraphMember>> {
        self.members.iter().filter(|m| m.is_terminal())
    }

    /// Start everything, block until every terminal member stops running on its own (a source
    /// running out of input, say), then `stop()`/`join()` the rest of the graph. Returns a
    /// process-style exit code.
    pub fn run(&self, timeout: Option<Duration>) -> i32 {
        self.run_until(|| false, Duration::from_millis(5), timeout)
    }

    /// Same as [`run`](Self::run), but also polls `should_stop` at `poll_interval` and treats a
    /// `true` as an external interrupt: the graph is stopped early and [`EXIT_INTERRUPTED`] is
    /// returned (unless a fatal error also occurred, which takes precedence for reporting but not
    /// for the interrupted exit code's own claim — both are "not a clean run").
    pub fn run_until(
        &self,
        mut should_stop: impl FnMut() -> bool,
        poll_interval: Duration,
        timeout: Option<Duration>,
    ) -> i32 {
        for member in &self.members {
            member.start();
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        let mut interrupted = false;
        loop {
            if self.terminal_members().all(|m| !m.running()) {
                break;
            }
            if should_stop() {
                interrupted = true;
                break;
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    break;
                }
            }
            std::thread::sleep(poll_interval);
        }

        for member in &self.members {
            member.stop();
        }
        let mut fatal = false;
        for member in &self.members {
            member.join(timeout);
            fatal |= member.is_fatal();
        }

        if fatal {
            EXIT_FATAL
        } else if interrupted {
            EXIT_INTERRUPTED
        } else {
            EXIT_OK
        }
    }

    /// For a graph hosted on a shared cooperative [`Dispatcher`] (e.g. components sharing a UI
    /// thread): drains the dispatcher on the calling thread for the duration of the run instead
    /// of sleep-polling. `should_stop` is checked between drained jobs, same semantics as
    /// [`run_until`](Self::run_until).
    pub fn run_on_dispatcher(
        &self,
        dispatcher: &Dispatcher,
        mut should_stop: impl FnMut() -> bool,
        timeout: Option<Duration>,
    ) -> i32 {
        for member in &self.members {
            member.start();
        }

        let mut interrupted = false;
        dispatcher.run_while(|| {
            if self.terminal_members().all(|m| !m.running()) {
                return false;
            }
            if should_stop() {
                interrupted = true;
                return false;
            }
            true
        });

        for member in &self.members {
            member.stop();
        }
        dispatcher.run_pending();
        let mut fatal = false;
        for member in &self.members {
            member.join(timeout);
            fatal |= member.is_fatal();
        }

        if fatal {
            EXIT_FATAL
        } else if interrupted {
            EXIT_INTERRUPTED
        } else {
            EXIT_OK
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, ComponentHandle, EventLoopKind};
    use crate::error::ComponentError;
    use crate::frame::{Delivery, FrameData};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// A source that emits ascending integers until it hits `limit`, then signals stream end.
    struct CountingSource {
        limit: i32,
        emitted: Mutex<i32>,
    }
    impl Component<i32> for CountingSource {
        fn inputs(&self) -> &'static [&'static str] {
            &[]
        }
        fn with_outframe_pool(&self) -> bool {
            true
        }
        fn process_frame(&self, handle: &ComponentHandle<i32>) -> Result<(), ComponentError> {
            let mut emitted = self.emitted.lock().unwrap();
            if *emitted >= self.limit {
                return Err(ComponentError::StreamEnd);
            }
            let frame = handle
                .pool_get("output")
                .expect("aligner only calls process_frame when the pool has room");
            *emitted += 1;
            handle.emit("output", frame);
            Ok(())
        }
    }

    struct CountingSink(Arc<AtomicUsize>);
    impl Component<i32> for CountingSink {
        fn outputs(&self) -> &'static [&'static str] {
            &[]
        }
        fn process_frame(&self, handle: &ComponentHandle<i32>) -> Result<(), ComponentError> {
            match handle.take_input("input") {
                Some(Delivery::Frame(_)) => {
                    self.0.fetch_add(1, Ordering::SeqCst);
                }
                Some(Delivery::EndOfStream) | None => {}
            }
            Ok(())
        }
    }

    #[test]
    fn run_drives_source_to_sink_and_reports_clean_exit() {
        let source = ComponentHandle::build(
            "source",
            Arc::new(CountingSource {
                limit: 5,
                emitted: Mutex::new(0),
            }),
            EventLoopKind::Thread,
        );
        let count = Arc::new(AtomicUsize::new(0));
        let sink = ComponentHandle::build(
            "sink",
            Arc::new(CountingSink(count.clone())),
            EventLoopKind::Thread,
        );
        source.bind("output", sink.clone(), "input");

        let mut runner = Runner::new();
        runner.add(source);
        runner.add(sink);
        let code = runner.run(Some(Duration::from_secs(5)));
        assert_eq!(code, EXIT_OK);
        assert_eq!(count.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn run_until_honours_external_interrupt() {
        struct NeverEndingSource;
        impl Component<i32> for NeverEndingSource {
            fn inputs(&self) -> &'static [&'static str] {
                &[]
            }
            fn with_outframe_pool(&self) -> bool {
                true
            }
            fn process_frame(&self, handle: &ComponentHandle<i32>) -> Result<(), ComponentError> {
                if let Some(frame) = handle.pool_get("output") {
                    handle.emit("output", frame);
                }
                Ok(())
            }
        }
        let count = Arc::new(AtomicUsize::new(0));
        let source = ComponentHandle::build("source", Arc::new(NeverEndingSource), EventLoopKind::Thread);
        let sink = ComponentHandle::build(
            "sink",
            Arc::new(CountingSink(count.clone())),
            EventLoopKind::Thread,
        );
        source.bind("output", sink.clone(), "input");

        let mut runner = Runner::new();
        runner.add(source);
        runner.add(sink.clone());
        let interrupted = Arc::new(AtomicUsize::new(0));
        let interrupted2 = interrupted.clone();
        let code = runner.run_until(
            move || {
                // interrupt as soon as the sink has seen a handful of frames
                if count.load(Ordering::SeqCst) >= 3 {
                    interrupted2.fetch_add(1, Ordering::SeqCst);
                    true
                } else {
                    false
                }
            },
            Duration::from_millis(1),
            Some(Duration::from_secs(5)),
        );
        assert_eq!(code, EXIT_INTERRUPTED);
        assert!(!sink.running());
    }
}
