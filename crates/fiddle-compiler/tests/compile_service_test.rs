use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use fiddle_compiler::reference::{BootManifest, MANIFEST_FILE};
use fiddle_compiler::{
    classify, format, has_blocking_error, CompilerConfig, CompilerError, DirectorySource, InvokeError,
    LanguageVersion, MemorySource, OutputKind, ReadinessState, Session, Severity, Value,
};

async fn ready_session(config: CompilerConfig) -> Session {
    let session = Session::new(config).unwrap();
    session.populate(&MemorySource::new().with_core_library()).await.unwrap();
    session
}

#[tokio::test]
async fn add_is_callable_after_compile() {
    let session = ready_session(CompilerConfig::default()).await;
    let outcome = session
        .compile("class C { public static int Add(int a,int b)=>a+b; }")
        .unwrap();

    assert!(!has_blocking_error(outcome.diagnostics()));
    let unit = outcome.unit().expect("compiled unit");
    let result = unit.invoke("C.Add", &[Value::Int(2), Value::Int(3)]).unwrap();
    assert_eq!(result.value, Value::Int(5));
    assert_eq!(session.emitted_units(), 1);
}

#[tokio::test]
async fn missing_semicolon_fails_without_emission() {
    let session = ready_session(CompilerConfig::default()).await;
    let outcome = session.compile("class C { void M() { int x = 1 } }").unwrap();

    assert!(!outcome.is_success());
    assert!(outcome.unit().is_none());
    let missing: Vec<_> = outcome.errors().filter(|d| d.id == "CS1002").collect();
    assert!(!missing.is_empty());
    assert_eq!(missing[0].location.line, 1);
    assert!(missing[0].location.column > "class C { void M() { int x = ".len());
    assert_eq!(session.emitted_units(), 0);
}

#[tokio::test]
async fn compile_before_populate_is_rejected() {
    let session = Session::new(CompilerConfig::default()).unwrap();
    let err = session.compile("class C { }").unwrap_err();
    assert!(matches!(err, CompilerError::NotReady { .. }));
    assert_eq!(session.state(), ReadinessState::NotStarted);
}

#[tokio::test]
async fn warnings_do_not_block_success() {
    let session = ready_session(CompilerConfig::default()).await;
    let outcome = session
        .compile("using System; public static class M { public static int F() { int unused = 0; return 1; } }")
        .unwrap();

    assert!(outcome.is_success());
    let classified = classify(outcome.diagnostics());
    assert!(classified.errors.is_empty());
    assert!(classified.warnings.iter().any(|d| d.id == "CS0219"));
    assert!(classified.infos.iter().any(|d| d.id == "CS8019"));
}

#[tokio::test]
async fn continuations_run_once_each_in_order() {
    let session = Session::new(CompilerConfig::default()).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));
    for i in 0..5 {
        let order = Arc::clone(&order);
        session.on_ready(move |_| order.lock().unwrap().push(i));
    }

    session.populate(&MemorySource::new()).await.unwrap();
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);

    let late = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&late);
    session.on_ready(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(late.load(Ordering::SeqCst), 1);
    assert_eq!(order.lock().unwrap().len(), 5);
}

#[tokio::test]
async fn failed_population_never_becomes_ready() {
    let session = Session::new(CompilerConfig::default()).unwrap();
    let source = MemorySource::new().with_listing("Missing.dll");
    assert!(session.populate(&source).await.is_err());
    assert_eq!(session.state(), ReadinessState::InProgress);
    assert!(matches!(
        session.compile("class C { }"),
        Err(CompilerError::NotReady {
            state: ReadinessState::InProgress
        })
    ));
}

#[tokio::test]
async fn console_output_is_captured() {
    let config = CompilerConfig::default().with_output_kind(OutputKind::ConsoleApplication);
    let session = ready_session(config).await;
    let outcome = session
        .compile(
            r#"
for (int i = 1; i <= 3; i++)
{
    System.Console.WriteLine("line " + i);
}
"#,
        )
        .unwrap();

    let unit = outcome.into_unit().unwrap();
    let run = unit.run_entry_point().unwrap();
    assert_eq!(run.output, "line 1\nline 2\nline 3\n");
    assert_eq!(run.value, Value::Void);
}

#[tokio::test]
async fn step_budget_stops_infinite_loops() {
    let session = ready_session(CompilerConfig::default().with_max_steps(10_000)).await;
    let outcome = session
        .compile("public static class Spin { public static void Forever() { while (true) { } } }")
        .unwrap();
    let unit = outcome.into_unit().unwrap();
    assert!(matches!(
        unit.invoke("Spin.Forever", &[]),
        Err(InvokeError::StepBudgetExhausted { limit: 10_000 })
    ));
}

#[tokio::test]
async fn language_version_gates_features() {
    let source = "public static class M { public static int Two() => 2; }";

    let old = ready_session(CompilerConfig::default().with_language_version(LanguageVersion::CSharp5)).await;
    let outcome = old.compile(source).unwrap();
    assert!(!outcome.is_success());
    assert!(outcome.errors().any(|d| d.id == "CS8026"));

    let new = ready_session(CompilerConfig::default()).await;
    assert!(new.compile(source).unwrap().is_success());
}

#[tokio::test]
async fn compiled_unit_serves_as_reference() {
    let library = ready_session(CompilerConfig::default().with_assembly_name("MathLib")).await;
    let outcome = library
        .compile("public static class Lib { public static int Twice(int x) => x * 2; }")
        .unwrap();
    let lib_bytes = outcome.unit().unwrap().bytes().to_vec();

    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("MathLib.dll"), &lib_bytes).unwrap();
    let manifest = BootManifest {
        assembly_references: vec!["MathLib.dll".to_string(), "MathLib.pdb".to_string()],
    };
    std::fs::write(dir.path().join(MANIFEST_FILE), serde_json::to_vec(&manifest).unwrap()).unwrap();

    let session = Session::new(CompilerConfig::default()).unwrap();
    let catalog = session.populate(&DirectorySource::new(dir.path())).await.unwrap();
    assert_eq!(catalog.names(), vec!["System.Runtime.dll", "MathLib.dll"]);

    let outcome = session
        .compile("public static class App { public static int Run() => Lib.Twice(21); }")
        .unwrap();
    let unit = outcome.into_unit().unwrap();
    assert_eq!(unit.invoke("App.Run", &[]).unwrap().value, Value::Int(42));
}

#[test]
fn format_is_idempotent_and_tolerant() {
    let source = "class C{public static int Add(int a,int b)=>a+b;void M(){for(int i=0;i<3;i++){System.Console.WriteLine(i);}}}";
    let once = format(source);
    assert_eq!(format(&once), once);

    let broken = format("class C { void M() { if (x) { } ");
    assert!(broken.contains("class C"));
    let _ = format("}}}{{{");
}

#[test]
fn diagnostics_display_with_location() {
    let diagnostic = fiddle_compiler::Diagnostic::error(
        "CS1002",
        "; expected",
        fiddle_compiler::Location::point(1, 31),
    );
    assert_eq!(diagnostic.severity, Severity::Error);
    assert_eq!(diagnostic.to_string(), "(1,31): error CS1002: ; expected");
}
