use super::diagnostics::ErrorSink;
use super::loader::Program;
use crate::components::Component;
use crate::components::collections::RoAssociativeArray;
use crate::runtime::{ComponentRef, ExecutionContext, FatalRunError, Heap, Interpreter, Value};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Hands a linked program to the interpreter with the initial scope and
/// turns whatever comes back into host-facing results.
#[derive(Debug, Clone)]
pub struct ExecutionCoordinator {
    source: String,
}

impl ExecutionCoordinator {
    pub const DEFAULT_SOURCE: &'static str = "auto-run-dev";
    pub const TERMINATION_REASON: &'static str = "EXIT_UNKNOWN";

    pub fn new() -> Self {
        Self::with_source(Self::DEFAULT_SOURCE)
    }

    /// `source` is the launch origin the channel sees.
    pub fn with_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn initial_scope(&self, heap: &mut Heap) -> ComponentRef {
        let mut scope = RoAssociativeArray::new();
        scope.insert(
            "lastExitOrTerminationReason",
            Value::from(Self::TERMINATION_REASON),
        );
        scope.insert("source", Value::String(self.source.clone()));
        heap.alloc(Component::AssociativeArray(scope))
    }

    /// Results are snapshotted before the run's heap goes away. Fatal errors
    /// and interpreter panics are reported to `sink` and returned.
    pub fn execute(
        &self,
        program: &Program,
        interpreter: &mut dyn Interpreter,
        context: &mut ExecutionContext,
        sink: &mut dyn ErrorSink,
    ) -> Result<Vec<serde_json::Value>, FatalRunError> {
        let scope = self.initial_scope(&mut context.heap);
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            interpreter.exec(program.statements(), scope, context)
        }));
        let error = match outcome {
            Ok(Ok(values)) => {
                return Ok(values
                    .iter()
                    .map(|value| context.heap.snapshot(value))
                    .collect());
            }
            Ok(Err(error)) => error,
            Err(payload) => FatalRunError::Panic(panic_message(&*payload)),
        };
        sink.fatal(&error);
        Err(error)
    }
}

impl Default for ExecutionCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
