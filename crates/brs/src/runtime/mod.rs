//! Per-run execution state and the interpreter seam.

mod context;
mod evaluator;
mod heap;
mod value;

pub use context::{CapturedOutput, ExecutionContext, OutputSink, StdoutSink};
pub use evaluator::Evaluator;
pub use heap::{ComponentRef, Heap, RunId, SlotId};
pub use value::Value;

use crate::parser::{Span, Spanned, Statement};
use thiserror::Error;

/// An error that ends the run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FatalRunError {
    #[error("{message}")]
    Runtime { message: String, span: Option<Span> },
    #[error("Interpreter panicked: {0}")]
    Panic(String),
}

impl FatalRunError {
    pub fn runtime(message: impl Into<String>, span: Span) -> Self {
        Self::Runtime {
            message: message.into(),
            span: Some(span),
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Runtime { span, .. } => *span,
            Self::Panic(_) => None,
        }
    }
}

/// Executes a linked program. `scope` is the initial associative array
/// handed to the entry point.
pub trait Interpreter {
    fn exec(
        &mut self,
        statements: &[Spanned<Statement>],
        scope: ComponentRef,
        context: &mut ExecutionContext,
    ) -> Result<Vec<Value>, FatalRunError>;
}
