//! Runs a script under the interpreter and reports traceback locations
//! found in its stderr.
//!
//! A background thread owns the stderr pipe and sends one
//! [`TracebackLocation`] per chunk that contains a match. The
//! [`Subscription`] owns the child process; dropping it kills the child.

use anyhow::{Context, Result};
use regex::Regex;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, Command, ExitStatus, Stdio};
use std::sync::LazyLock;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

static TRACEBACK_LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"File "([^"]+)", line (\d+)"#).expect("traceback pattern")
});

/// A `File "<path>", line <N>` reference. `line` is one-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracebackLocation {
    pub file: PathBuf,
    pub line: u32,
}

/// First traceback location in `chunk`, if any.
pub fn scan_chunk(chunk: &str) -> Option<TracebackLocation> {
    let caps = TRACEBACK_LOCATION.captures(chunk)?;
    let file = PathBuf::from(caps.get(1)?.as_str());
    let line = caps.get(2)?.as_str().parse().ok()?;
    Some(TracebackLocation { file, line })
}

/// A running script whose stderr is being scanned.
pub struct Subscription {
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
}

/// Start `interpreter script` in `cwd`. Locations arrive on the returned
/// receiver until the script closes its stderr.
pub fn spawn(
    interpreter: &str,
    script: &Path,
    cwd: &Path,
) -> Result<(Subscription, Receiver<TracebackLocation>)> {
    let mut child = Command::new(interpreter)
        .arg(script)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("running {interpreter} {}", script.display()))?;
    info!(pid = child.id(), script = %script.display(), "interpreter started");

    let stderr = child.stderr.take().context("interpreter has no stderr pipe")?;
    let (tx, rx) = mpsc::channel();
    let reader = std::thread::spawn(move || scan_stream(stderr, tx));

    Ok((
        Subscription {
            child: Some(child),
            reader: Some(reader),
        },
        rx,
    ))
}

fn scan_stream(mut stderr: ChildStderr, tx: Sender<TracebackLocation>) {
    let mut buf = [0u8; 8192];
    loop {
        let n = match stderr.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!("reading interpreter stderr: {e}");
                break;
            }
        };
        let chunk = String::from_utf8_lossy(&buf[..n]);
        if let Some(location) = scan_chunk(&chunk) {
            debug!(file = %location.file.display(), line = location.line, "traceback location");
            if tx.send(location).is_err() {
                // Nobody is listening any more.
                break;
            }
        }
    }
}

impl Subscription {
    /// Wait for the script to exit. The exit status is logged only.
    pub fn finish(mut self) -> Result<ExitStatus> {
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        let mut child = self.child.take().context("subscription already finished")?;
        let status = child.wait().context("waiting for interpreter")?;
        info!(code = ?status.code(), "interpreter exited");
        Ok(status)
    }

    /// Stop listening and kill the script if it is still running.
    pub fn unsubscribe(mut self) {
        self.kill();
    }

    fn kill(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Ok(None) = child.try_wait() {
                let _ = child.kill();
            }
            let _ = child.wait();
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.kill();
    }
}
