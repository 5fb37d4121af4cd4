#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

pub const REPLY: &str = "Hint: look at the name being printed\n\
Reasoning: y is never assigned before it is used\n\
Answer: print(x)";

pub fn run_cli(stdin_json: &str) -> (i32, String, String) {
    run_cli_with_args(&[], stdin_json)
}

pub fn run_cli_with_args(args: &[&str], stdin_json: &str) -> (i32, String, String) {
    run_cli_in(&std::env::current_dir().unwrap(), args, stdin_json)
}

/// Run the binary from `dir` as its working directory.
pub fn run_cli_in(dir: &Path, args: &[&str], stdin_json: &str) -> (i32, String, String) {
    let mut child = Command::new(env!("CARGO_BIN_EXE_tracehint"))
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn binary");

    child
        .stdin
        .as_mut()
        .unwrap()
        .write_all(stdin_json.as_bytes())
        .unwrap();

    let output = child.wait_with_output().unwrap();
    (
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

/// Start the binary without waiting for it. Stdout is piped so lines can
/// be read while it runs.
pub fn spawn_cli(args: &[&str]) -> Child {
    Command::new(env!("CARGO_BIN_EXE_tracehint"))
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn binary")
}

/// Create a temp dir containing a git repo with an initial commit and return it.
/// The `TempDir` must be kept alive for the duration of the test.
pub fn temp_git_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let repo = git2::Repository::init(dir.path()).unwrap();

    let mut config = repo.config().unwrap();
    config.set_str("user.name", "Test").unwrap();
    config.set_str("user.email", "test@test.com").unwrap();

    let sig = repo.signature().unwrap();
    let tree_oid = repo.index().unwrap().write_tree().unwrap();
    let tree = repo.find_tree(tree_oid).unwrap();
    repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
        .unwrap();

    dir
}

/// Point the project at a shell script standing in for the model. The
/// script replies with `reply` and counts its invocations in
/// `.tracehint/calls`.
pub fn use_fake_model(root: &Path, variant: &str, reply: &str) {
    let data = root.join(".tracehint");
    fs::create_dir_all(&data).unwrap();

    let reply_path = data.join("reply.txt");
    fs::write(&reply_path, reply).unwrap();
    let script = data.join("model.sh");
    let calls = data.join("calls");
    fs::write(
        &script,
        format!(
            "cat > /dev/null\n\
             n=$(cat '{calls}' 2>/dev/null || echo 0)\n\
             echo $((n + 1)) > '{calls}'\n\
             cat '{reply}'\n",
            calls = calls.display(),
            reply = reply_path.display(),
        ),
    )
    .unwrap();

    fs::write(
        data.join("tracehint.toml"),
        format!(
            "variant = \"{variant}\"\n\
             interpreter = \"sh\"\n\n\
             [model]\n\
             backend = \"command\"\n\
             command = [\"sh\", \"{}\"]\n",
            script.display()
        ),
    )
    .unwrap();
}

/// How often the fake model was asked.
pub fn model_calls(root: &Path) -> u32 {
    fs::read_to_string(root.join(".tracehint/calls"))
        .map(|s| s.trim().parse().unwrap())
        .unwrap_or(0)
}

/// Build a host command for the test session.
pub fn command(cwd: &Path, name: &str, fields: &str) -> String {
    let cwd = cwd.to_str().unwrap();
    if fields.is_empty() {
        format!(r#"{{ "command": "{name}", "session_id": "test-session", "cwd": "{cwd}" }}"#)
    } else {
        format!(
            r#"{{ "command": "{name}", "session_id": "test-session", "cwd": "{cwd}", {fields} }}"#
        )
    }
}

/// Run a command that must succeed and return its parsed output, or
/// `Null` when it printed nothing.
pub fn send(cwd: &Path, name: &str, fields: &str) -> serde_json::Value {
    let (code, stdout, stderr) = run_cli(&command(cwd, name, fields));
    assert_eq!(code, 0, "{name} failed: {stderr}");
    if stdout.trim().is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_str(&stdout).unwrap()
    }
}

pub fn state_path(root: &Path) -> PathBuf {
    root.join(".tracehint/session-test-session.json")
}

pub fn export_dir(root: &Path) -> PathBuf {
    root.join("tracehint-data")
}

/// Write `main.py` with an error on its second line.
pub fn write_script(root: &Path) {
    fs::write(root.join("main.py"), "x = 1\nprint(y)\n").unwrap();
}
