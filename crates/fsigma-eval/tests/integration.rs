mod helpers;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use fsigma_eval::{
    CompileError, CompilerOptions, Engine, Ingest, IngestConfig, InputShape, compile_directory,
};
use helpers::{engine_from_yaml, eval, rule_yaml, titles, write_rule};
use serde_json::{Value, json};
use tempfile::TempDir;

#[test]
fn rule_matches_only_when_every_check_passes() {
    let yaml = r#"
title: Whoami Via Cmd
detection:
    selection:
        Image|endswith: '\cmd.exe'
        CommandLine|contains: whoami
    condition: selection
"#;
    assert_eq!(
        eval(yaml, json!({"Image": "C:\\cmd.exe", "CommandLine": "cmd /c whoami"})).len(),
        1
    );
    assert!(eval(yaml, json!({"Image": "C:\\cmd.exe", "CommandLine": "dir"})).is_empty());
    assert!(eval(yaml, json!({"CommandLine": "whoami"})).is_empty());
}

#[test]
fn empty_detection_never_matches() {
    let engine = engine_from_yaml("title: Nothing\nlevel: low\n");
    assert_eq!(engine.rule_count(), 1);
    for record in [json!({}), json!({"CommandLine": ""}), json!({"noop": ""})] {
        assert!(engine.evaluate(&record).is_empty());
    }
}

#[test]
fn contains_is_case_insensitive() {
    let yaml = "title: Cmd\ndetection:\n  sel:\n    CommandLine|contains: CMD\n";
    assert_eq!(eval(yaml, json!({"CommandLine": "cmd.exe"})).len(), 1);
    assert_eq!(eval(yaml, json!({"commandline": "Cmd.Exe"})).len(), 1);
}

#[test]
fn cidr_matches_network_members_only() {
    let yaml = "title: Internal\ndetection:\n  sel:\n    SourceIp|cidr: 10.0.0.0/24\n";
    assert_eq!(eval(yaml, json!({"SourceIp": "10.0.0.5"})).len(), 1);
    assert!(eval(yaml, json!({"SourceIp": "10.0.1.5"})).is_empty());
    assert!(eval(yaml, json!({"SourceIp": "not-an-ip"})).is_empty());
    assert!(eval(yaml, json!({"SourceIp": 42})).is_empty());
}

#[test]
fn base64_offset_finds_encoded_payload() {
    let yaml = "title: B64\ndetection:\n  sel:\n    CommandLine|base64offset: evil-cmd\n";
    let encoded = STANDARD.encode("Start-Process evil-cmd -Hidden");
    assert_eq!(
        eval(yaml, json!({"CommandLine": format!("-enc {encoded}")})).len(),
        1
    );
    assert!(eval(yaml, json!({"CommandLine": "-enc bm90aGluZw=="})).is_empty());
}

#[test]
fn encoded_powershell_end_to_end() {
    let yaml = r#"
title: Encoded PowerShell Command
id: 7f3c1c9e-encoded-ps
level: high
description: PowerShell launched with an encoded command
detection:
    selection:
        Image|endswith: '\powershell.exe'
        CommandLine|contains:
            - '-enc'
            - '-encodedcommand'
    condition: selection
"#;
    let record = json!({
        "EventID": 4688,
        "Image": "C:\\Windows\\System32\\WindowsPowerShell\\v1.0\\powershell.exe",
        "CommandLine": "powershell.exe -EncodedCommand SQBFAFgAIAAoAE4AZQB3AC0ATwBiAGoAZQBjAHQA"
    });
    let hits = eval(yaml, record);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].title, "Encoded PowerShell Command");
    assert_eq!(hits[0].id.as_deref(), Some("7f3c1c9e-encoded-ps"));
    assert_eq!(hits[0].level, "high");
    assert_eq!(hits[0].description, "PowerShell launched with an encoded command");
}

#[test]
fn repeated_evaluation_is_idempotent() {
    let engine = engine_from_yaml(&rule_yaml("Whoami", "CommandLine|contains", "whoami"));
    let record = json!({"CommandLine": "whoami /priv"});
    let first = engine.evaluate(&record);
    assert_eq!(first.len(), 1);
    for _ in 0..10 {
        assert_eq!(engine.evaluate(&record), first);
    }
}

#[test]
fn nested_fields_reachable_with_dotted_attributes() {
    let yaml = "title: Nested\ndetection:\n  sel:\n    process.name|endswith: powershell.exe\n";
    let hits = eval(
        yaml,
        json!({"Process": {"Name": "C:\\PowerShell.exe", "Pid": 12}}),
    );
    assert_eq!(hits.len(), 1);
}

#[test]
fn multi_document_stream_compiles_each_rule() {
    let yaml = format!(
        "{}---\n{}",
        rule_yaml("First", "a", "1"),
        rule_yaml("Second", "b", "2")
    );
    let engine = engine_from_yaml(&yaml);
    assert_eq!(engine.rule_count(), 2);
    assert_eq!(
        titles(&engine.evaluate(&json!({"a": 1, "b": "2"}))),
        ["First", "Second"]
    );
}

// ---------------------------------------------------------------------------
// Directories
// ---------------------------------------------------------------------------

#[test]
fn directory_with_one_unknown_operator_keeps_the_rest() {
    let dir = TempDir::new().unwrap();
    write_rule(dir.path(), "a.yml", &rule_yaml("A", "Image|endswith", "a.exe"));
    write_rule(dir.path(), "b.yaml", &rule_yaml("B", "Image|endswith", "b.exe"));
    write_rule(dir.path(), "sub/c.yml", &rule_yaml("C", "Image", "c.exe"));
    write_rule(
        dir.path(),
        "d.yml",
        &rule_yaml("Broken", "CommandLine|windash", "-enc"),
    );
    write_rule(dir.path(), "notes.txt", "not a rule");

    let outcome = compile_directory(dir.path(), &CompilerOptions::default()).unwrap();
    assert_eq!(outcome.rules.len(), 3);
    assert_eq!(outcome.skipped.len(), 1);

    let skipped = &outcome.skipped[0];
    assert!(skipped.path.ends_with("d.yml"));
    assert_eq!(skipped.title.as_deref(), Some("Broken"));
    assert!(skipped.reason.contains("windash"), "{}", skipped.reason);

    let order: Vec<_> = outcome.rules.iter().map(|r| r.meta().title.as_str()).collect();
    assert_eq!(order, ["A", "B", "C"]);
}

#[test]
fn directory_skips_unparsable_files() {
    let dir = TempDir::new().unwrap();
    write_rule(dir.path(), "good.yml", &rule_yaml("Good", "a", "1"));
    write_rule(dir.path(), "bad.yml", "title: [unclosed\n");
    write_rule(dir.path(), "untitled.yml", "detection:\n  sel:\n    a: 1\n");

    let outcome = compile_directory(dir.path(), &CompilerOptions::default()).unwrap();
    assert_eq!(outcome.rules.len(), 1);
    assert_eq!(outcome.skipped.len(), 2);
    assert!(outcome.skipped.iter().all(|s| s.title.is_none()));
}

#[cfg(unix)]
#[test]
fn directory_symlink_cycle_compiles_each_rule_once() {
    let dir = TempDir::new().unwrap();
    write_rule(dir.path(), "a.yml", &rule_yaml("A", "a", "1"));
    std::os::unix::fs::symlink(dir.path(), dir.path().join("loop")).unwrap();

    let outcome = compile_directory(dir.path(), &CompilerOptions::default()).unwrap();
    assert_eq!(outcome.rules.len(), 1);
    assert!(outcome.skipped.is_empty());

    let engine = Engine::new(outcome.rules);
    assert_eq!(titles(&engine.evaluate(&json!({"a": "1"}))), ["A"]);
}

#[test]
fn empty_directory_is_an_empty_set() {
    let dir = TempDir::new().unwrap();
    let outcome = compile_directory(dir.path(), &CompilerOptions::default()).unwrap();
    assert!(outcome.rules.is_empty());
    assert!(outcome.skipped.is_empty());
}

#[test]
fn missing_directory_is_an_error() {
    let dir = TempDir::new().unwrap();
    let err = compile_directory(&dir.path().join("missing"), &CompilerOptions::default())
        .unwrap_err();
    assert!(matches!(err, CompileError::RuleDirectory { .. }));
}

#[test]
fn engine_from_directory_reports_skips() {
    let dir = TempDir::new().unwrap();
    write_rule(dir.path(), "a.yml", &rule_yaml("A", "a", "1"));
    write_rule(dir.path(), "b.yml", &rule_yaml("B", "b|nope", "1"));
    let (engine, skipped) =
        Engine::from_directory(dir.path(), &CompilerOptions::default()).unwrap();
    assert_eq!(engine.rule_count(), 1);
    assert_eq!(skipped.len(), 1);
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

fn scan_engine() -> Engine {
    engine_from_yaml(&format!(
        "{}---\n{}",
        rule_yaml("Even", "parity", "even"),
        rule_yaml("Seven", "n|endswith", "7")
    ))
}

fn ndjson(count: usize) -> String {
    let mut out = String::new();
    for n in 0..count {
        let parity = if n % 2 == 0 { "even" } else { "odd" };
        out.push_str(&json!({"n": n, "parity": parity}).to_string());
        out.push('\n');
        if n % 50 == 0 {
            out.push_str("garbage line\n\n");
        }
    }
    out
}

fn collect_lines(
    engine: &Engine,
    input: &str,
    workers: usize,
    batch_size: usize,
) -> Vec<(Value, Vec<String>)> {
    let ingest = Ingest::new(engine, IngestConfig { workers, batch_size });
    let mut out = Vec::new();
    ingest
        .run_lines(input.as_bytes(), |record, matches| {
            out.push((
                record.clone(),
                matches.iter().map(|m| m.title.clone()).collect(),
            ));
        })
        .unwrap();
    out
}

#[test]
fn line_results_identical_for_any_worker_count() {
    let engine = scan_engine();
    let input = ndjson(500);
    let baseline = collect_lines(&engine, &input, 1, 1024);
    assert_eq!(baseline.len(), 500);

    for (workers, batch_size) in [(2, 7), (4, 64), (8, 1), (3, 1024)] {
        assert_eq!(
            collect_lines(&engine, &input, workers, batch_size),
            baseline,
            "workers={workers} batch_size={batch_size}"
        );
    }
}

#[test]
fn line_results_arrive_in_input_order() {
    let engine = scan_engine();
    let out = collect_lines(&engine, &ndjson(200), 4, 16);
    let order: Vec<u64> = out.iter().map(|(r, _)| r["n"].as_u64().unwrap()).collect();
    assert_eq!(order, (0..200).collect::<Vec<_>>());
}

#[test]
fn summary_counts_records_and_hits() {
    let engine = scan_engine();
    let ingest = Ingest::new(&engine, IngestConfig { workers: 2, batch_size: 10 });
    let summary = ingest.run_lines(ndjson(20).as_bytes(), |_, _| {}).unwrap();
    assert_eq!(summary.records, 20);
    // 10 even records, plus n=7 and n=17 which are odd.
    assert_eq!(summary.hits, 12);
}

#[test]
fn run_dispatches_on_detected_shape() {
    let engine = scan_engine();
    let ingest = Ingest::new(&engine, IngestConfig::default());

    let array = br#"[{"n": 1, "parity": "odd"}, {"n": 2, "parity": "even"}]"#;
    let shape = InputShape::detect(array);
    assert_eq!(shape, InputShape::Array);
    let summary = ingest.run(shape, &array[..], |_, _| {}).unwrap();
    assert_eq!((summary.records, summary.hits), (2, 1));

    let lines = b"{\"n\": 7}\n{\"n\": 8}\n";
    let shape = InputShape::detect(lines);
    assert_eq!(shape, InputShape::Lines);
    let summary = ingest.run(shape, &lines[..], |_, _| {}).unwrap();
    assert_eq!((summary.records, summary.hits), (2, 1));
}

#[test]
fn malformed_document_is_fatal() {
    let engine = scan_engine();
    let ingest = Ingest::new(&engine, IngestConfig::default());
    let err = ingest
        .run(InputShape::Single, &b"{\"n\": "[..], |_, _| {})
        .unwrap_err();
    assert!(matches!(err, fsigma_eval::IngestError::Json(_)));
}
