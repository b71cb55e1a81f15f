use brs::components::Component;
use brs::components::collections::RoArray;
use brs::host::PackageMessage;
use brs::pipeline::{LibraryId, RunPhase, Stage};
use brs::runtime::{CapturedOutput, ComponentRef};
use brs::{
    CollectingSink, ComponentRegistry, DeviceContext, Evaluator, ExecutionContext, FatalRunError,
    Interpreter, Manifest, ProgramLoader, RunOutcome, RunPipeline, RunReport, SourceUnit, Value,
};
use serde_json::json;

fn units(sources: &[(&str, &str)]) -> Vec<SourceUnit> {
    sources
        .iter()
        .map(|(path, text)| SourceUnit::new(*path, *text))
        .collect()
}

fn run(sources: &[(&str, &str)]) -> (RunReport, CollectingSink, Vec<String>) {
    let mut interpreter = Evaluator::default();
    let mut sink = CollectingSink::new();
    let output = CapturedOutput::new();
    let report = RunPipeline::new(&mut interpreter, &mut sink)
        .output(Box::new(output.clone()))
        .run(&units(sources));
    (report, sink, output.lines())
}

fn results(report: &RunReport) -> &[serde_json::Value] {
    match &report.outcome {
        RunOutcome::Success { results } => results,
        RunOutcome::Error { message } => panic!("run failed: {message}"),
    }
}

#[test]
fn failed_unit_in_the_middle_contributes_nothing() {
    let (report, sink, output) = run(&[
        ("source/a.brs", "print \"a\"\n"),
        ("source/b.brs", "Library \"Roku_Ads.brs\"\nprint (\n"),
        ("source/c.brs", "print \"c\"\n"),
    ]);

    assert_eq!(output, vec!["a", "c"]);
    assert!(report.libraries.is_empty());
    assert!(report.units[1].failed);
    assert!(!report.units[0].failed && !report.units[2].failed);
    assert!(!sink.diagnostics.is_empty());
    assert!(sink.diagnostics.iter().all(|diagnostic| diagnostic.path == "source/b.brs"));
    assert_eq!(sink.diagnostics[0].stage, Stage::Parse);
    assert_eq!(report.phase, RunPhase::Finished);
}

#[test]
fn defender_brings_core_along_in_fixed_order() {
    let (report, sink, _) = run(&[
        ("source/a.brs", "Library \"v30/bslDefender.brs\"\n"),
        ("source/b.brs", "Library \"v30/bslCore.brs\"\nLibrary \"v30/bslDefender.brs\"\n"),
    ]);
    assert!(sink.is_empty());
    assert_eq!(report.libraries, vec![LibraryId::Defender, LibraryId::Core]);

    let mut sink = CollectingSink::new();
    let loaded = ProgramLoader::default().load(
        &units(&[("a.brs", "Library \"v30/bslDefender.brs\"\n")]),
        &Manifest::new(),
        &mut sink,
    );
    let defender_functions = 3;
    let core_functions = 4;
    assert_eq!(loaded.program.len(), 1 + defender_functions + core_functions);
}

#[test]
fn library_functions_are_callable() {
    let (report, sink, _) = run(&[(
        "source/main.brs",
        r#"Library "v30/bslDefender.brs"
Library "Roku_Ads.brs"

function Main()
    message = dfDrawMessage("Loading")
    ads = Roku_Ads()
    return [message.text, message.confirmKey, ads.version, bslBoolToString(true)]
end function
"#,
    )]);
    assert!(sink.is_empty(), "{:?}", sink.diagnostics);
    assert_eq!(
        report.libraries,
        vec![LibraryId::Defender, LibraryId::Core, LibraryId::Ads]
    );
    let results = results(&report);
    assert_eq!(results.last(), Some(&json!(["Loading", 6, "3.0", "true"])));
}

#[test]
fn regex_kind_is_case_insensitive_and_unknown_kinds_fail() {
    let (report, _, _) = run(&[(
        "source/main.brs",
        r#"re = CreateObject("RoRegex", "a.*b", "i")
re.IsMatch("xAyB")
CreateObject("NotAKind")
"#,
    )]);
    assert_eq!(results(&report)[1..], [json!(true), json!(null)]);

    let catalog = brs::components::node::NodeKindCatalog::new();
    let cx = brs::CreationContext { catalog: &catalog };
    assert!(matches!(
        ComponentRegistry::global().create("NotAKind", &[], &cx),
        Err(brs::CreationFailure::UnknownKind { .. })
    ));
}

#[test]
fn redeclared_builtin_node_kind_is_seen_by_later_creations() {
    let (report, sink, _) = run(&[(
        "source/main.brs",
        r#"before = CreateObject("roSGNode", "Label")
before.subtype()
component "Label"
    field text = "declared"
end component
after = CreateObject("roSGNode", "Label")
before.text
after.text
after.subtype()
"#,
    )]);
    assert!(sink.is_empty());
    let results = results(&report);
    assert_eq!(results[1], json!("Label"));
    assert_eq!(results[4], json!(""));
    assert_eq!(results[5], json!("declared"));
    assert_eq!(results[6], json!("Label"));
}

#[test]
fn node_declarations_do_not_leak_into_the_next_run() {
    let declare = r#"component "Badge" extends "Label"
end component
CreateObject("roSGNode", "Badge") <> invalid
"#;
    let (first, _, _) = run(&[("source/main.brs", declare)]);
    assert_eq!(results(&first)[1], json!(true));

    let (second, _, _) = run(&[(
        "source/main.brs",
        "CreateObject(\"roSGNode\", \"Badge\") = invalid\n",
    )]);
    assert_eq!(results(&second)[0], json!(true));
}

/// Keeps a component handle from one run and tries it in the next.
#[derive(Default)]
struct Smuggler {
    kept: Option<ComponentRef>,
    seen_in_second_run: Option<bool>,
}

impl Interpreter for Smuggler {
    fn exec(
        &mut self,
        _: &[brs::parser::Spanned<brs::parser::Statement>],
        _: ComponentRef,
        context: &mut ExecutionContext,
    ) -> Result<Vec<Value>, FatalRunError> {
        match self.kept {
            None => {
                let array = context
                    .heap
                    .alloc(Component::Array(RoArray::from(vec![Value::Integer(1)])));
                self.kept = Some(array);
                Ok(vec![Value::Object(array)])
            }
            Some(kept) => {
                self.seen_in_second_run = Some(context.heap.get(kept).is_some());
                Ok(Vec::new())
            }
        }
    }
}

#[test]
fn components_of_one_run_are_unreachable_from_the_next() {
    let mut smuggler = Smuggler::default();
    let mut sink = CollectingSink::new();

    let first = RunPipeline::new(&mut smuggler, &mut sink).run(&[]);
    assert_eq!(
        first.outcome,
        RunOutcome::Success {
            results: vec![json!([1])]
        }
    );
    RunPipeline::new(&mut smuggler, &mut sink).run(&[]);

    assert_eq!(smuggler.seen_in_second_run, Some(false));
}

#[test]
fn zero_units_finish_successfully() {
    let (report, sink, output) = run(&[]);
    assert_eq!(report.phase, RunPhase::Finished);
    assert_eq!(report.outcome, RunOutcome::Success { results: vec![] });
    assert!(sink.is_empty());
    assert!(output.is_empty());
}

#[test]
fn fatal_errors_end_the_run() {
    let (report, sink, output) = run(&[(
        "source/main.brs",
        "print \"before\"\nvalue = missing + 1\nprint \"after\"\n",
    )]);
    assert_eq!(
        report.outcome,
        RunOutcome::Error {
            message: "Use of uninitialized variable 'missing'".to_string()
        }
    );
    assert_eq!(report.phase, RunPhase::Finished);
    assert_eq!(output, vec!["before"]);
    assert_eq!(sink.fatal.len(), 1);
}

#[test]
fn oversized_requests_fail_the_run_not_the_host() {
    let (report, sink, output) = run(&[(
        "source/main.brs",
        r#"print "start"
a = CreateObject("roArray", 0, true)
a.SetEntry(100000000000, 1)
print "unreachable"
"#,
    )]);
    assert!(matches!(
        &report.outcome,
        RunOutcome::Error { message } if message.starts_with("setentry() failed")
    ));
    assert_eq!(report.phase, RunPhase::Finished);
    assert_eq!(output, vec!["start"]);
    assert_eq!(sink.fatal.len(), 1);

    let (next, _, _) = run(&[("source/main.brs", "1 + 1\n")]);
    assert_eq!(results(&next), [json!(2)]);
}

#[test]
fn main_receives_the_launch_scope() {
    let (report, _, output) = run(&[(
        "source/main.brs",
        "sub Main(args)\n    print args.source\n    print args.lastExitOrTerminationReason\nend sub\n",
    )]);
    assert!(report.outcome.is_success());
    assert_eq!(output, vec!["auto-run-dev", "EXIT_UNKNOWN"]);
}

#[test]
fn manifest_constants_reach_the_preprocessor() {
    let mut interpreter = Evaluator::default();
    let mut sink = CollectingSink::new();
    let output = CapturedOutput::new();
    let report = RunPipeline::new(&mut interpreter, &mut sink)
        .manifest(Manifest::parse("title=Demo\nbs_const=premium=false\n"))
        .output(Box::new(output.clone()))
        .run(&units(&[(
            "source/main.brs",
            "#if premium\nprint \"premium\"\n#else\nprint \"free\"\n#end if\n",
        )]));
    assert!(report.outcome.is_success());
    assert_eq!(output.lines(), vec!["free"]);
}

#[test]
fn packages_install_and_run() {
    let message = PackageMessage::from_json(
        r#"{
            "device": {"deviceModel": "4200X"},
            "paths": [
                {"url": "manifest", "id": 0, "type": "text"},
                {"url": "source/main.brs", "id": 0, "type": "source"},
                {"url": "data/greeting.txt", "id": 1, "type": "text"}
            ],
            "brs": ["function Main()\n  return ReadAsciiFile(\"pkg:/data/greeting.txt\")\nend function\n"],
            "texts": ["title=Hello\n", "hello from the package"]
        }"#,
    )
    .unwrap();
    let mut sink = CollectingSink::new();
    let output = CapturedOutput::new();
    let report = brs::run_package(
        &message,
        ComponentRegistry::global(),
        &mut sink,
        Box::new(output),
    )
    .unwrap();
    assert!(sink.is_empty());
    assert_eq!(results(&report).last(), Some(&json!("hello from the package")));

    let device = DeviceContext::new(message.device.clone());
    assert_eq!(device.model_name(), Some("Roku 3"));
}
