use super::Heap;
use crate::components::node::NodeKindCatalog;
use crate::host::DeviceContext;
use std::cell::RefCell;
use std::rc::Rc;

/// Destination of `print`.
pub trait OutputSink {
    fn print_line(&mut self, line: &str);
}

pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn print_line(&mut self, line: &str) {
        println!("{line}");
    }
}

/// Keeps printed lines; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    lines: Rc<RefCell<Vec<String>>>,
}

impl CapturedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }
}

impl OutputSink for CapturedOutput {
    fn print_line(&mut self, line: &str) {
        self.lines.borrow_mut().push(line.to_string());
    }
}

/// State owned by exactly one run: device, component heap, node kind
/// catalog, and the print destination. Dropped when the run finishes.
pub struct ExecutionContext {
    pub device: DeviceContext,
    pub heap: Heap,
    pub catalog: NodeKindCatalog,
    output: Box<dyn OutputSink>,
}

impl ExecutionContext {
    pub fn new(device: DeviceContext, output: Box<dyn OutputSink>) -> Self {
        Self {
            device,
            heap: Heap::new(),
            catalog: NodeKindCatalog::new(),
            output,
        }
    }

    pub fn print(&mut self, line: &str) {
        self.output.print_line(line);
    }
}
