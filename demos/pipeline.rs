//! A minimal end-to-end pipeline run from the command line: a counter feeds a doubling
//! transform into a printing sink, driven to completion by [`Runner`].
//!
//! ```text
//! cargo run --example pipeline -- 5
//! ```

use std::sync::{Arc, Mutex};

use pyctools_rt::component::{Component, ComponentHandle, EventLoopKind};
use pyctools_rt::config::ConfigNode;
use pyctools_rt::error::ComponentError;
use pyctools_rt::frame::{Delivery, FrameData, FrameNo};
use pyctools_rt::runner::Runner;
use pyctools_rt::transformer::{Transform, Transformer};

/// A no-input component counting `0..total`, then ending the stream.
struct Counter {
    next: Mutex<FrameNo>,
    total: FrameNo,
}

impl Counter {
    fn new(total: FrameNo) -> Self {
        Self {
            next: Mutex::new(0),
            total,
        }
    }
}

impl Component<i32> for Counter {
    fn inputs(&self) -> &'static [&'static str] {
        &[]
    }
    fn with_outframe_pool(&self) -> bool {
        true
    }
    fn initialise(&self, config: &mut ConfigNode) {
        config.append("outframe_pool_len", ConfigNode::int(3, 2, i64::MAX));
    }
    fn process_frame(&self, handle: &ComponentHandle<i32>) -> Result<(), ComponentError> {
        let mut next = self.next.lock().unwrap();
        if *next >= self.total {
            return Err(ComponentError::StreamEnd);
        }
        let frame_no = *next;
        *next += 1;
        drop(next);

        let mut out = handle
            .pool_get("output")
            .ok_or_else(|| ComponentError::Fatal("output pool empty at process_frame time".into()))?;
        let out_data: &mut FrameData<i32> =
            Arc::get_mut(&mut out).expect("freshly checked-out pool frame is sole-owned");
        out_data.frame_no = frame_no;
        out_data.type_tag = "N".into();
        out_data.data = frame_no as i32;
        let name = handle.audit_name();
        out_data
            .metadata
            .set_audit(&name, &format!("data = {name}(data)\n"), true);
        handle.emit("output", out);
        Ok(())
    }
}

struct Doubler;
impl Transform<i32> for Doubler {
    fn transform(
        &self,
        in_frame: &FrameData<i32>,
        out_frame: &mut FrameData<i32>,
    ) -> Result<bool, ComponentError> {
        out_frame.data = in_frame.data * 2;
        Ok(true)
    }
}

/// A no-output component logging every value it receives at `info`.
struct Printer;
impl Component<i32> for Printer {
    fn outputs(&self) -> &'static [&'static str] {
        &[]
    }
    fn process_frame(&self, handle: &ComponentHandle<i32>) -> Result<(), ComponentError> {
        match handle.take_input("input") {
            Some(Delivery::Frame(f)) => tracing::info!(value = f.data, "received"),
            Some(Delivery::EndOfStream) | None => {}
        }
        Ok(())
    }
}

fn setup() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

fn main() -> anyhow::Result<()> {
    setup();

    let count: FrameNo = std::env::args()
        .nth(1)
        .map(|s| s.parse())
        .transpose()?
        .unwrap_or(10);

    let counter = ComponentHandle::build("counter", Arc::new(Counter::new(count)), EventLoopKind::Thread);
    let doubler = ComponentHandle::build(
        "doubler",
        Arc::new(Transformer::new(Doubler)),
        EventLoopKind::Thread,
    );
    let printer = ComponentHandle::build("printer", Arc::new(Printer), EventLoopKind::Thread);

    counter.bind("output", doubler.clone(), "input");
    doubler.bind("output", printer.clone(), "input");

    let mut runner = Runner::new();
    runner.add(counter).add(doubler).add(printer);

    let code = runner.run(Some(std::time::Duration::from_secs(10)));
    if code != pyctools_rt::runner::EXIT_OK {
        anyhow::bail!("pipeline exited with code {code}");
    }
    Ok(())
}
