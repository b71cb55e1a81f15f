use anyhow::{Context, Result, bail};
use brs::host::PackageMessage;
use brs::pipeline::{Diagnostic, ErrorSink, ExecutionCoordinator, ProgramLoader, RunOutcome};
use brs::runtime::StdoutSink;
use brs::{ComponentRegistry, DeviceContext, DeviceInfo, Evaluator, FatalRunError, Manifest};
use brs::{RunPipeline, SourceUnit};
use clap::{Parser as ClapParser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(ClapParser)]
#[command(name = "brs")]
#[command(about = "BrightScript channel runtime")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate inline BrightScript code
    Eval {
        /// The code to evaluate
        code: String,
    },
    /// Load, link and run source files as one channel
    Run {
        /// Source files, in load order
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Manifest file for conditional compilation
        #[arg(long)]
        manifest: Option<PathBuf>,
        /// JSON device description
        #[arg(long)]
        device: Option<PathBuf>,
        /// Launch source the channel sees
        #[arg(long, default_value = ExecutionCoordinator::DEFAULT_SOURCE)]
        source: String,
    },
    /// Install and run a JSON package message
    Package {
        /// Path to the package message
        message: PathBuf,
    },
    /// Check that files load without errors
    Check {
        /// Source files
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Manifest file for conditional compilation
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
}

/// Prints source-annotated reports to stderr and counts them.
#[derive(Default)]
struct TerminalSink {
    reported: usize,
}

impl ErrorSink for TerminalSink {
    fn report(&mut self, diagnostic: &Diagnostic, source: &str) {
        self.reported += 1;
        eprintln!("{}", diagnostic.render(source));
    }

    fn fatal(&mut self, error: &FatalRunError) {
        self.reported += 1;
        eprintln!("Runtime error: {error}");
    }
}

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Eval { code } => {
            let units = [SourceUnit::new("eval.brs", code)];
            let outcome = run(&units, Manifest::new(), DeviceContext::default(), None);
            finish(outcome)
        }
        Commands::Run {
            files,
            manifest,
            device,
            source,
        } => {
            let units = read_units(&files)?;
            let manifest = read_manifest(manifest.as_deref())?;
            let device = match device {
                Some(path) => {
                    let json = fs::read_to_string(&path)
                        .with_context(|| format!("Reading device description {}", path.display()))?;
                    let info: DeviceInfo = serde_json::from_str(&json)
                        .with_context(|| format!("Parsing device description {}", path.display()))?;
                    DeviceContext::new(info)
                }
                None => DeviceContext::default(),
            };
            let outcome = run(&units, manifest, device, Some(source));
            finish(outcome)
        }
        Commands::Package { message } => {
            let json = fs::read_to_string(&message)
                .with_context(|| format!("Reading package message {}", message.display()))?;
            let message = PackageMessage::from_json(&json)?;
            let mut sink = TerminalSink::default();
            let report = brs::run_package(
                &message,
                ComponentRegistry::global(),
                &mut sink,
                Box::new(StdoutSink),
            )?;
            finish(report.outcome)
        }
        Commands::Check { files, manifest } => {
            let units = read_units(&files)?;
            let manifest = read_manifest(manifest.as_deref())?;
            let mut sink = TerminalSink::default();
            let loaded = ProgramLoader::default().load(&units, &manifest, &mut sink);
            for unit in &loaded.units {
                eprintln!(
                    "{}: {}",
                    unit.path,
                    if unit.failed { "failed" } else { "ok" }
                );
            }
            if sink.reported > 0 {
                bail!("{} problem(s) found", sink.reported);
            }
            Ok(())
        }
    }
}

fn run(
    units: &[SourceUnit],
    manifest: Manifest,
    device: DeviceContext,
    source: Option<String>,
) -> RunOutcome {
    let mut interpreter = Evaluator::default();
    let mut sink = TerminalSink::default();
    let coordinator = source
        .map(ExecutionCoordinator::with_source)
        .unwrap_or_default();
    let report = RunPipeline::new(&mut interpreter, &mut sink)
        .manifest(manifest)
        .device(device)
        .coordinator(coordinator)
        .run(units);
    report.outcome
}

fn finish(outcome: RunOutcome) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if let RunOutcome::Error { message } = outcome {
        bail!("Run failed: {message}");
    }
    Ok(())
}

fn read_units(files: &[PathBuf]) -> Result<Vec<SourceUnit>> {
    files
        .iter()
        .map(|file| {
            let text = fs::read_to_string(file)
                .with_context(|| format!("Reading source file {}", file.display()))?;
            Ok(SourceUnit::new(file.display().to_string(), text))
        })
        .collect()
}

fn read_manifest(path: Option<&Path>) -> Result<Manifest> {
    let Some(path) = path else {
        return Ok(Manifest::new());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("Reading manifest {}", path.display()))?;
    Ok(Manifest::parse(&text))
}
