pub mod components;
pub mod host;
pub mod parser;
pub mod pipeline;
pub mod runtime;

pub use components::registry::{ComponentRegistry, Constructor, CreationContext, CreationFailure};
pub use host::{DeviceContext, DeviceInfo, PackageMessage, run_package};
pub use parser::Manifest;
pub use pipeline::{
    CollectingSink, ErrorSink, LogSink, ProgramLoader, RunOutcome, RunPhase, RunPipeline,
    RunReport, SourceUnit, run_channel,
};
pub use runtime::{Evaluator, ExecutionContext, FatalRunError, Interpreter, Value};
