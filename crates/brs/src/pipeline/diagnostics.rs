use crate::parser::{ParseError, PreprocessorError};
use crate::runtime::FatalRunError;
use ariadne::{Config, Label, Report, ReportKind, Source};
use serde::Serialize;
use std::fmt;
use std::ops::Range;

/// Loading stage a unit failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Scan,
    Preprocess,
    Parse,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Scan => "scan",
            Self::Preprocess => "preprocess",
            Self::Parse => "parse",
        })
    }
}

/// One problem found while loading a unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub path: String,
    pub stage: Stage,
    pub span: Range<usize>,
    pub message: String,
    pub reason: String,
}

impl Diagnostic {
    pub fn from_rich<T: fmt::Display>(path: &str, stage: Stage, error: &ParseError<'_, T>) -> Self {
        Self {
            path: path.to_string(),
            stage,
            span: error.span().into_range(),
            message: error.to_string(),
            reason: error.reason().to_string(),
        }
    }

    pub fn from_preprocessor(path: &str, error: &PreprocessorError) -> Self {
        Self {
            path: path.to_string(),
            stage: Stage::Preprocess,
            span: error.span.into_range(),
            message: error.to_string(),
            reason: error.message.clone(),
        }
    }

    /// Source-annotated report without colors.
    pub fn render(&self, source: &str) -> String {
        let path = self.path.as_str();
        let mut report_bytes = Vec::new();
        let written = Report::build(ReportKind::Error, (path, self.span.clone()))
            .with_config(Config::default().with_color(false))
            .with_message(format!("{} error: {}", self.stage, self.message))
            .with_label(Label::new((path, self.span.clone())).with_message(&self.reason))
            .finish()
            .write((path, Source::from(source)), &mut report_bytes);
        match written {
            Ok(()) => String::from_utf8_lossy(&report_bytes).into_owned(),
            Err(_) => self.to_string(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}:{}..{}: {} error: {}",
            self.path, self.span.start, self.span.end, self.stage, self.message
        )
    }
}

/// Receives load diagnostics and fatal run errors.
pub trait ErrorSink {
    fn report(&mut self, diagnostic: &Diagnostic, source: &str);
    fn fatal(&mut self, error: &FatalRunError);
}

/// Writes everything to the `log` facade.
#[derive(Debug, Default)]
pub struct LogSink;

impl ErrorSink for LogSink {
    fn report(&mut self, diagnostic: &Diagnostic, source: &str) {
        log::error!("{}", diagnostic.render(source));
    }

    fn fatal(&mut self, error: &FatalRunError) {
        log::error!("{error}");
    }
}

/// Keeps everything for later inspection.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub diagnostics: Vec<Diagnostic>,
    pub fatal: Vec<FatalRunError>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty() && self.fatal.is_empty()
    }
}

impl ErrorSink for CollectingSink {
    fn report(&mut self, diagnostic: &Diagnostic, _source: &str) {
        self.diagnostics.push(diagnostic.clone());
    }

    fn fatal(&mut self, error: &FatalRunError) {
        self.fatal.push(error.clone());
    }
}

impl<S: ErrorSink + ?Sized> ErrorSink for &mut S {
    fn report(&mut self, diagnostic: &Diagnostic, source: &str) {
        (**self).report(diagnostic, source);
    }

    fn fatal(&mut self, error: &FatalRunError) {
        (**self).fatal(error);
    }
}
