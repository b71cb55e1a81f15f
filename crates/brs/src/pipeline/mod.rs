//! One run of a channel: load, resolve libraries, execute.

pub mod coordinator;
pub mod diagnostics;
pub mod libraries;
pub mod loader;

pub use coordinator::ExecutionCoordinator;
pub use diagnostics::{CollectingSink, Diagnostic, ErrorSink, LogSink, Stage};
pub use libraries::{LibraryId, LibraryRequests};
pub use loader::{
    BrsParser, BrsPreprocessor, BrsScanner, CompiledUnit, Frontend, LoadedProgram, Preprocessor,
    Program, ProgramLoader, Scanner, SourceUnit, UnitParser, UnitSummary,
};

use crate::host::DeviceContext;
use crate::parser::Manifest;
use crate::runtime::{ExecutionContext, Interpreter, OutputSink, StdoutSink};
use serde::Serialize;

/// Phases only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    Idle,
    Loading,
    Resolving,
    Executing,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status")]
pub enum RunOutcome {
    #[serde(rename = "ok")]
    Success { results: Vec<serde_json::Value> },
    #[serde(rename = "error")]
    Error { message: String },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    #[serde(flatten)]
    pub outcome: RunOutcome,
    pub phase: RunPhase,
    pub libraries: Vec<LibraryId>,
    pub units: Vec<UnitSummary>,
}

/// Owns everything a single run needs. [`RunPipeline::run`] consumes it, so
/// a pipeline cannot be started twice.
pub struct RunPipeline<'a> {
    phase: RunPhase,
    manifest: Manifest,
    loader: ProgramLoader,
    coordinator: ExecutionCoordinator,
    device: DeviceContext,
    output: Box<dyn OutputSink>,
    interpreter: &'a mut dyn Interpreter,
    sink: &'a mut dyn ErrorSink,
}

impl<'a> RunPipeline<'a> {
    pub fn new(interpreter: &'a mut dyn Interpreter, sink: &'a mut dyn ErrorSink) -> Self {
        Self {
            phase: RunPhase::Idle,
            manifest: Manifest::new(),
            loader: ProgramLoader::default(),
            coordinator: ExecutionCoordinator::default(),
            device: DeviceContext::default(),
            output: Box::new(StdoutSink),
            interpreter,
            sink,
        }
    }

    pub fn manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn loader(mut self, loader: ProgramLoader) -> Self {
        self.loader = loader;
        self
    }

    pub fn coordinator(mut self, coordinator: ExecutionCoordinator) -> Self {
        self.coordinator = coordinator;
        self
    }

    pub fn device(mut self, device: DeviceContext) -> Self {
        self.device = device;
        self
    }

    pub fn output(mut self, output: Box<dyn OutputSink>) -> Self {
        self.output = output;
        self
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    fn advance(&mut self, next: RunPhase) {
        debug_assert!(next > self.phase, "run phase cannot go from {:?} to {next:?}", self.phase);
        log::debug!("Run phase {:?} -> {next:?}", self.phase);
        self.phase = next;
    }

    pub fn run(mut self, units: &[SourceUnit]) -> RunReport {
        log::info!("Starting run with {} unit(s)", units.len());

        self.advance(RunPhase::Loading);
        let compiled = self.loader.load_units(units, &self.manifest, &mut *self.sink);

        self.advance(RunPhase::Resolving);
        let loaded = self.loader.link(compiled, &mut *self.sink);

        self.advance(RunPhase::Executing);
        let mut context = ExecutionContext::new(self.device, self.output);
        let outcome = match self.coordinator.execute(
            &loaded.program,
            &mut *self.interpreter,
            &mut context,
            &mut *self.sink,
        ) {
            Ok(results) => RunOutcome::Success { results },
            Err(error) => RunOutcome::Error {
                message: error.to_string(),
            },
        };
        // Every component of the run is released with its heap
        drop(context);

        self.phase = RunPhase::Finished;
        log::info!(
            "Run finished: {}",
            if outcome.is_success() { "ok" } else { "error" }
        );
        RunReport {
            outcome,
            phase: self.phase,
            libraries: loaded.libraries,
            units: loaded.units,
        }
    }
}

/// Loads, links and executes `units` with default collaborators. Printed
/// output goes to stdout.
pub fn run_channel(
    manifest: Manifest,
    units: &[SourceUnit],
    device: DeviceContext,
    interpreter: &mut dyn Interpreter,
    sink: &mut dyn ErrorSink,
) -> RunOutcome {
    RunPipeline::new(interpreter, sink)
        .manifest(manifest)
        .device(device)
        .run(units)
        .outcome
}
