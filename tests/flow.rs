mod common;

use common::{REPLY, export_dir, model_calls, send, state_path, use_fake_model, write_script};
use serde_json::{Value, json};
use std::fs;
use std::path::Path;

const LINE: &str = r#""file": "main.py", "line": 1"#;

fn setup(variant: &str, reply: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    use_fake_model(dir.path(), variant, reply);
    write_script(dir.path());
    send(dir.path(), "activate", "");
    dir
}

fn labels(output: &Value) -> Vec<String> {
    output["thread"]["comments"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["label"].as_str().unwrap().to_string())
        .collect()
}

fn next_command(output: &Value) -> Option<String> {
    output["thread"]["actions"]
        .as_array()
        .unwrap()
        .first()
        .map(|a| a["command"].as_str().unwrap().to_string())
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn full_reasoning_flow() {
    let repo = setup("reasoning", REPLY);
    let root = repo.path();

    let signal = send(root, "errorSignal", r#""file": "main.py", "line": 2"#);
    assert_eq!(signal["decorations"]["lines"], json!([1]));

    let started = send(root, "triggerExplanation", LINE);
    assert_eq!(labels(&started), ["tracehint"]);
    assert_eq!(next_command(&started).as_deref(), Some("tracehint.showHint"));
    assert_eq!(started["decorations"]["lines"], json!([]));
    let thread_id = started["thread"]["threadId"].clone();

    let hint = send(root, "showHint", LINE);
    assert_eq!(hint["thread"]["threadId"], thread_id);
    assert_eq!(labels(&hint), ["Hint"]);
    assert_eq!(
        hint["thread"]["comments"][0]["body"],
        "look at the name being printed"
    );
    assert_eq!(
        next_command(&hint).as_deref(),
        Some("tracehint.showReasoning")
    );
    assert_eq!(model_calls(root), 1);

    let reasoning = send(root, "showReasoning", LINE);
    assert_eq!(labels(&reasoning), ["Hint", "Reasoning"]);
    assert_eq!(
        next_command(&reasoning).as_deref(),
        Some("tracehint.showAnswer")
    );

    let answer = send(root, "showAnswer", LINE);
    assert_eq!(labels(&answer), ["Hint", "Reasoning", "Answer"]);
    assert_eq!(
        answer["thread"]["comments"][2]["body"],
        "```python\nprint(x)\n```"
    );
    assert_eq!(next_command(&answer), None);
    assert_eq!(answer["decorations"]["lines"], json!([]));
    assert_eq!(model_calls(root), 1);

    // The aggregate export covers the line with its one-based number.
    let aggregate = read_json(&export_dir(root).join("main.json"));
    let entries = aggregate.as_object().unwrap();
    assert_eq!(entries.len(), 1);
    let (key, entry) = entries.iter().next().unwrap();
    assert!(key.ends_with("main.py:1"), "got key {key}");
    assert_eq!(entry["line"], 2);
    assert_eq!(entry["reasoning"], "y is never assigned before it is used");
    assert_eq!(entry["reasoningOpened"], true);
    assert_eq!(
        entry["stepsCompleted"],
        json!(["hint", "reasoning", "answer"])
    );

    let single = read_json(&export_dir(root).join("main_line2.json"));
    assert_eq!(single["answerOpened"], true);
    assert!(single["timestamp"].as_str().is_some());
}

#[test]
fn repeated_hint_asks_model_once() {
    let repo = setup("reasoning", REPLY);
    let root = repo.path();

    send(root, "triggerExplanation", LINE);
    let first = send(root, "showHint", LINE);
    let second = send(root, "showHint", LINE);
    assert_eq!(model_calls(root), 1);
    assert_eq!(first["thread"], second["thread"]);
}

#[test]
fn host_supplied_line_text_is_used() {
    let repo = setup("reasoning", REPLY);
    let root = repo.path();
    // The line does not exist on disk; the host's copy is enough.
    let output = send(
        root,
        "showHint",
        r#""file": "unsaved.py", "line": 40, "source_line": "print(y)""#,
    );
    assert_eq!(labels(&output), ["Hint"]);
    assert_eq!(model_calls(root), 1);
}

#[test]
fn answer_before_reasoning_is_ignored() {
    let repo = setup("reasoning", REPLY);
    let root = repo.path();

    send(root, "triggerExplanation", LINE);
    send(root, "showHint", LINE);
    let output = send(root, "showAnswer", LINE);
    assert!(output.is_null(), "got: {output}");
    assert!(!export_dir(root).join("main_line2.json").exists());

    let state: Value = serde_json::from_str(&fs::read_to_string(state_path(root)).unwrap()).unwrap();
    assert_eq!(state["processed"], json!([]));
}

#[test]
fn reasoning_without_hint_is_ignored() {
    let repo = setup("reasoning", REPLY);
    let root = repo.path();

    send(root, "triggerExplanation", LINE);
    let output = send(root, "showReasoning", LINE);
    assert!(output.is_null(), "got: {output}");
    assert_eq!(model_calls(root), 0);
}

#[test]
fn explained_line_is_not_explained_again() {
    let repo = setup("reasoning", REPLY);
    let root = repo.path();

    send(root, "triggerExplanation", LINE);
    send(root, "showHint", LINE);
    send(root, "showReasoning", LINE);
    send(root, "showAnswer", LINE);
    let before = fs::read_to_string(export_dir(root).join("main.json")).unwrap();

    let again = send(root, "triggerExplanation", LINE);
    assert_eq!(again["notice"]["level"], "info");
    assert_eq!(
        again["notice"]["message"],
        "Line 2 has already been explained."
    );
    assert!(again.get("thread").is_none());

    // A new error on the same line is not flagged either.
    let signal = send(root, "errorSignal", r#""file": "main.py", "line": 2"#);
    assert_eq!(signal["decorations"]["lines"], json!([]));

    assert_eq!(
        fs::read_to_string(export_dir(root).join("main.json")).unwrap(),
        before
    );
    assert_eq!(model_calls(root), 1);
}

#[test]
fn failing_model_reports_error_and_allows_retry() {
    let repo = setup("reasoning", REPLY);
    let root = repo.path();
    // An empty reply is a failed query.
    fs::write(root.join(".tracehint/reply.txt"), "").unwrap();

    send(root, "triggerExplanation", LINE);
    let failed = send(root, "showHint", LINE);
    assert_eq!(failed["notice"]["level"], "error");
    assert!(
        failed["notice"]["message"]
            .as_str()
            .unwrap()
            .starts_with("Could not get an explanation")
    );
    assert!(!export_dir(root).join("main.json").exists());

    fs::write(root.join(".tracehint/reply.txt"), REPLY).unwrap();
    let retried = send(root, "showHint", LINE);
    assert_eq!(labels(&retried), ["Hint"]);
    assert_eq!(model_calls(root), 2);
}

#[test]
fn define_flow_goes_from_hint_to_answer() {
    let repo = setup(
        "define",
        "Hint: the name is wrong\nAnswer: Original: print(y) -> Corrected: print(x)",
    );
    let root = repo.path();

    send(root, "triggerExplanation", LINE);
    let hint = send(root, "showHint", LINE);
    assert_eq!(next_command(&hint).as_deref(), Some("tracehint.showAnswer"));

    let ignored = send(root, "showDefine", LINE);
    assert!(ignored.is_null(), "got: {ignored}");

    let answer = send(root, "showAnswer", LINE);
    assert_eq!(labels(&answer), ["Hint", "Define", "Answer"]);
    assert_eq!(
        answer["thread"]["comments"][2]["body"],
        "Original: print(y) → Corrected: print(x)"
    );

    let single = read_json(&export_dir(root).join("main_line2.json"));
    assert_eq!(single["defineOpened"], true);
    assert!(single.get("reasoning").is_none());
}

#[test]
fn save_file_removes_stale_export() {
    let repo = setup("reasoning", REPLY);
    let root = repo.path();

    send(root, "showHint", LINE);
    let export = export_dir(root).join("main.json");
    assert!(export.is_file());

    // A fresh session has nothing cached for the document.
    send(root, "activate", "");
    send(root, "saveFile", r#""file": "main.py""#);
    assert!(!export.exists());
}
