//! Turns source units into one linked program.
//!
//! Each unit goes through scan, preprocess and parse. A unit failing any
//! stage is reported and skipped; loading itself never fails. Libraries
//! requested by the units that compiled are appended after them.

use super::diagnostics::{Diagnostic, ErrorSink, Stage};
use super::libraries::{LibraryId, LibraryRequests};
use crate::parser::{self, Manifest, Spanned, Statement, Token, lexer, parse_tokens};
use chumsky::Parser as _;
use serde::Serialize;
use std::collections::BTreeSet;

/// A file handed over by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    pub path: String,
    pub text: String,
}

impl SourceUnit {
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }
}

pub struct Scanned {
    pub tokens: Vec<Spanned<Token>>,
    pub errors: Vec<Diagnostic>,
}

pub struct Parsed {
    pub statements: Vec<Spanned<Statement>>,
    pub errors: Vec<Diagnostic>,
    pub libraries: BTreeSet<LibraryId>,
}

pub trait Scanner {
    fn scan(&self, text: &str, path: &str) -> Scanned;
}

pub trait Preprocessor {
    fn preprocess(
        &self,
        tokens: Vec<Spanned<Token>>,
        manifest: &Manifest,
        path: &str,
    ) -> Result<Vec<Spanned<Token>>, Vec<Diagnostic>>;
}

pub trait UnitParser {
    fn parse(&self, tokens: &[Spanned<Token>], path: &str) -> Parsed;
}

#[derive(Debug, Default)]
pub struct BrsScanner;

impl Scanner for BrsScanner {
    fn scan(&self, text: &str, path: &str) -> Scanned {
        let (tokens, errors) = lexer().parse(text).into_output_errors();
        let mut tokens = tokens.unwrap_or_default();
        tokens.retain(|token| token.node != Token::Comment);
        Scanned {
            tokens,
            errors: errors
                .iter()
                .map(|error| Diagnostic::from_rich(path, Stage::Scan, error))
                .collect(),
        }
    }
}

#[derive(Debug, Default)]
pub struct BrsPreprocessor;

impl Preprocessor for BrsPreprocessor {
    fn preprocess(
        &self,
        tokens: Vec<Spanned<Token>>,
        manifest: &Manifest,
        path: &str,
    ) -> Result<Vec<Spanned<Token>>, Vec<Diagnostic>> {
        parser::preprocess(tokens, manifest).map_err(|errors| {
            errors
                .iter()
                .map(|error| Diagnostic::from_preprocessor(path, error))
                .collect()
        })
    }
}

#[derive(Debug, Default)]
pub struct BrsParser;

impl UnitParser for BrsParser {
    fn parse(&self, tokens: &[Spanned<Token>], path: &str) -> Parsed {
        match parse_tokens(tokens) {
            Ok(unit) => Parsed {
                statements: unit.statements,
                errors: Vec::new(),
                libraries: unit.libraries,
            },
            Err(errors) => Parsed {
                statements: Vec::new(),
                errors: errors
                    .iter()
                    .map(|error| Diagnostic::from_rich(path, Stage::Parse, error))
                    .collect(),
                libraries: BTreeSet::new(),
            },
        }
    }
}

/// The three collaborators a unit passes through.
pub struct Frontend {
    pub scanner: Box<dyn Scanner>,
    pub preprocessor: Box<dyn Preprocessor>,
    pub parser: Box<dyn UnitParser>,
}

impl Default for Frontend {
    fn default() -> Self {
        Self {
            scanner: Box::new(BrsScanner),
            preprocessor: Box::new(BrsPreprocessor),
            parser: Box::new(BrsParser),
        }
    }
}

/// Result of compiling one unit. A failed unit has no statements and
/// requests no libraries.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledUnit {
    pub path: String,
    pub statements: Vec<Spanned<Statement>>,
    pub failed: bool,
    pub required_libraries: BTreeSet<LibraryId>,
}

impl CompiledUnit {
    fn failed(path: &str) -> Self {
        Self {
            path: path.to_string(),
            statements: Vec::new(),
            failed: true,
            required_libraries: BTreeSet::new(),
        }
    }
}

/// What a host or test can inspect about a unit after linking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitSummary {
    pub path: String,
    pub failed: bool,
    pub statements: usize,
    pub libraries: BTreeSet<LibraryId>,
}

/// Linked statements in execution order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    statements: Vec<Spanned<Statement>>,
}

impl Program {
    pub fn statements(&self) -> &[Spanned<Statement>] {
        &self.statements
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedProgram {
    pub program: Program,
    pub units: Vec<UnitSummary>,
    pub libraries: Vec<LibraryId>,
}

#[derive(Default)]
pub struct ProgramLoader {
    frontend: Frontend,
}

impl ProgramLoader {
    pub fn new(frontend: Frontend) -> Self {
        Self { frontend }
    }

    pub fn compile_unit(
        &self,
        unit: &SourceUnit,
        manifest: &Manifest,
        sink: &mut dyn ErrorSink,
    ) -> CompiledUnit {
        let mut report = |errors: &[Diagnostic]| {
            for diagnostic in errors {
                sink.report(diagnostic, &unit.text);
            }
        };

        let scanned = self.frontend.scanner.scan(&unit.text, &unit.path);
        if !scanned.errors.is_empty() {
            report(&scanned.errors);
            return CompiledUnit::failed(&unit.path);
        }

        let tokens = match self
            .frontend
            .preprocessor
            .preprocess(scanned.tokens, manifest, &unit.path)
        {
            Ok(tokens) => tokens,
            Err(errors) => {
                report(&errors);
                return CompiledUnit::failed(&unit.path);
            }
        };

        let parsed = self.frontend.parser.parse(&tokens, &unit.path);
        if !parsed.errors.is_empty() {
            report(&parsed.errors);
            return CompiledUnit::failed(&unit.path);
        }

        CompiledUnit {
            path: unit.path.clone(),
            statements: parsed.statements,
            failed: false,
            required_libraries: parsed.libraries,
        }
    }

    pub fn load_units(
        &self,
        units: &[SourceUnit],
        manifest: &Manifest,
        sink: &mut dyn ErrorSink,
    ) -> Vec<CompiledUnit> {
        units
            .iter()
            .map(|unit| {
                let compiled = self.compile_unit(unit, manifest, sink);
                if compiled.failed {
                    log::debug!("Skipping unit '{}'", unit.path);
                }
                compiled
            })
            .collect()
    }

    /// Concatenates the compiled units and appends the libraries they ask
    /// for. Units without statements contribute no library requests.
    pub fn link(&self, units: Vec<CompiledUnit>, sink: &mut dyn ErrorSink) -> LoadedProgram {
        let mut requests = LibraryRequests::default();
        let mut statements = Vec::new();
        let mut summaries = Vec::with_capacity(units.len());

        for unit in units {
            summaries.push(UnitSummary {
                path: unit.path,
                failed: unit.failed,
                statements: unit.statements.len(),
                libraries: unit.required_libraries.clone(),
            });
            if unit.failed || unit.statements.is_empty() {
                continue;
            }
            requests.extend(&unit.required_libraries);
            statements.extend(unit.statements);
        }

        let libraries = requests.resolve();
        for library in &libraries {
            log::debug!("Linking library '{library}'");
            statements.extend(self.compile_library(*library, sink));
        }

        LoadedProgram {
            program: Program { statements },
            units: summaries,
            libraries,
        }
    }

    /// Library text is scanned and parsed but not preprocessed.
    fn compile_library(&self, library: LibraryId, sink: &mut dyn ErrorSink) -> Vec<Spanned<Statement>> {
        let path = library.path();
        let source = library.source();
        let scanned = self.frontend.scanner.scan(source, path);
        let errors = if scanned.errors.is_empty() {
            let parsed = self.frontend.parser.parse(&scanned.tokens, path);
            if parsed.errors.is_empty() {
                return parsed.statements;
            }
            parsed.errors
        } else {
            scanned.errors
        };
        for diagnostic in &errors {
            sink.report(diagnostic, source);
        }
        Vec::new()
    }

    pub fn load(
        &self,
        units: &[SourceUnit],
        manifest: &Manifest,
        sink: &mut dyn ErrorSink,
    ) -> LoadedProgram {
        let compiled = self.load_units(units, manifest, sink);
        self.link(compiled, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::diagnostics::CollectingSink;

    fn load(units: &[SourceUnit]) -> (LoadedProgram, CollectingSink) {
        let mut sink = CollectingSink::new();
        let loaded = ProgramLoader::default().load(units, &Manifest::new(), &mut sink);
        (loaded, sink)
    }

    #[test]
    fn scan_errors_fail_the_unit() {
        let (loaded, sink) = load(&[SourceUnit::new("a.brs", "x = \"unterminated\n")]);
        assert!(loaded.units[0].failed);
        assert!(loaded.program.is_empty());
        assert_eq!(sink.diagnostics[0].stage, Stage::Scan);
        assert_eq!(sink.diagnostics[0].path, "a.brs");
    }

    #[test]
    fn preprocessor_errors_fail_the_unit() {
        let (loaded, sink) = load(&[SourceUnit::new("a.brs", "#if missingFlag\nx = 1\n#end if\n")]);
        assert!(loaded.units[0].failed);
        assert_eq!(sink.diagnostics[0].stage, Stage::Preprocess);
    }

    #[test]
    fn manifest_flags_select_branches() {
        let mut manifest = Manifest::new();
        manifest.set("bs_const", "debug=true");
        let unit = SourceUnit::new("a.brs", "#if debug\nx = 1\n#else\nx = 2\ny = 3\n#end if\n");
        let loaded = ProgramLoader::default().load(&[unit], &manifest, &mut CollectingSink::new());
        assert_eq!(loaded.program.len(), 1);
    }

    #[test]
    fn library_flags_come_only_from_units_with_statements() {
        let (loaded, sink) = load(&[
            SourceUnit::new("a.brs", "Library \"Roku_Ads.brs\"\n"),
            SourceUnit::new("b.brs", "' nothing but a comment\n"),
        ]);
        assert!(sink.is_empty());
        assert_eq!(loaded.libraries, vec![LibraryId::Ads]);
        assert_eq!(loaded.units[1].statements, 0);
    }

    #[test]
    fn libraries_follow_the_units() {
        let (loaded, _) = load(&[SourceUnit::new("a.brs", "Library \"v30/bslCore.brs\"\nx = 1\n")]);
        let statements = loaded.program.statements();
        assert!(matches!(statements[0].node, Statement::Library { .. }));
        assert!(matches!(statements[1].node, Statement::Assign { .. }));
        assert!(
            statements[2..]
                .iter()
                .all(|statement| matches!(statement.node, Statement::Function(_)))
        );
    }

    /// Forwards to the real preprocessor and records which paths it saw.
    #[derive(Default)]
    struct RecordingPreprocessor {
        seen: std::rc::Rc<std::cell::RefCell<Vec<String>>>,
    }

    impl Preprocessor for RecordingPreprocessor {
        fn preprocess(
            &self,
            tokens: Vec<Spanned<Token>>,
            manifest: &Manifest,
            path: &str,
        ) -> Result<Vec<Spanned<Token>>, Vec<Diagnostic>> {
            self.seen.borrow_mut().push(path.to_string());
            BrsPreprocessor.preprocess(tokens, manifest, path)
        }
    }

    #[test]
    fn library_text_skips_the_preprocessor() {
        let recorder = RecordingPreprocessor::default();
        let seen = std::rc::Rc::clone(&recorder.seen);
        let loader = ProgramLoader::new(Frontend {
            preprocessor: Box::new(recorder),
            ..Frontend::default()
        });
        let mut sink = CollectingSink::new();
        let loaded = loader.load(
            &[SourceUnit::new("main.brs", "Library \"v30/bslDefender.brs\"\n")],
            &Manifest::new(),
            &mut sink,
        );

        assert!(sink.is_empty());
        assert_eq!(loaded.libraries, vec![LibraryId::Defender, LibraryId::Core]);
        assert_eq!(*seen.borrow(), vec!["main.brs".to_string()]);
    }
}
