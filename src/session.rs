use crate::disclosure::{self, Entry, ExplanationSource, Transition};
use crate::export::{ExportOutcome, Exporter};
use crate::llm::{self, QueryError};
use crate::parser::ParseOptions;
use crate::preferences::{Preferences, PromptTemplate};
use crate::record::{LineKey, Step};
use crate::runner::{self, TracebackLocation};
use crate::state::SessionState;
use crate::thread;
use crate::types::{
    Decorations, EnableWatchInput, ErrorSignalInput, FileInput, HostCommand, HostOutput,
    LineInput, Notice, NoticeLevel, ShowHintInput,
};
use anyhow::{Context, Result};
use fd_lock::RwLock;
use serde::de::DeserializeOwned;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const DATA_DIR: &str = ".tracehint";

/// Held by every process that reads and writes session state.
const LOCK_FILE: &str = "state.lock";

/// Read and deserialize a JSON file, returning `None` if it doesn't exist.
fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path) {
        Ok(s) => {
            let val = serde_json::from_str(&s)
                .with_context(|| format!("parsing {}", path.display()))?;
            Ok(Some(val))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

/// Remove a file, ignoring "not found" errors.
fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
    }
}

/// Zero-based `line` of the file at `path`.
fn read_line(path: &Path, line: u32) -> Result<String> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    contents
        .lines()
        .nth(line as usize)
        .map(str::to_string)
        .with_context(|| format!("{} has no line {}", path.display(), line + 1))
}

fn notice(level: NoticeLevel, message: String) -> Option<HostOutput> {
    Some(HostOutput {
        notice: Some(Notice { level, message }),
        ..Default::default()
    })
}

// ===================================================================
// Model-backed explanation source
// ===================================================================

/// Builds the prompt for a line and asks the configured model.
struct ModelSource<'a> {
    prefs: &'a Preferences,
    dir: &'a Path,
    source_line: Option<&'a str>,
}

impl ModelSource<'_> {
    fn template(&self) -> Result<String, QueryError> {
        match &self.prefs.prompt_template {
            None => Ok(llm::default_template(self.prefs.variant).to_string()),
            Some(PromptTemplate::Inline(s)) => Ok(s.clone()),
            Some(PromptTemplate::File(name)) => {
                let path = self.dir.join(name);
                fs::read_to_string(&path)
                    .map_err(|e| QueryError::Prompt(format!("reading {}: {e}", path.display())))
            }
        }
    }
}

impl ExplanationSource for ModelSource<'_> {
    fn fetch(&mut self, key: &LineKey) -> Result<String, QueryError> {
        let line = match self.source_line {
            Some(text) => text.to_string(),
            None => read_line(&key.document, key.line)
                .map_err(|e| QueryError::Prompt(format!("{e:#}")))?,
        };
        let prompt = llm::render_prompt(
            &self.template()?,
            &line,
            &self.prefs.language,
            self.prefs.variant,
        )?;
        let model = llm::from_preferences(&self.prefs.model)?;
        info!(%key, "asking model for an explanation");
        model.complete(&prompt)
    }
}

// ===================================================================
// Session
// ===================================================================

pub struct Session {
    repo: Option<git2::Repository>,
    root: PathBuf,
    dir: PathBuf,
    session_id: String,
    pub prefs: Preferences,
    state: SessionState,
    /// Reveals whose exports are written by `write_exports`.
    exports: Vec<(LineKey, bool)>,
}

impl Session {
    /// Locate the project root (the git work tree containing `cwd`, or
    /// `cwd` itself), ensure `.tracehint/` exists and load preferences.
    ///
    /// State is read under the lock by each command, not here.
    pub fn open(cwd: &str, session_id: &str) -> Result<Self> {
        let cwd = fs::canonicalize(cwd).with_context(|| format!("resolving {cwd}"))?;
        let repo = git2::Repository::discover(&cwd).ok();
        let root = repo
            .as_ref()
            .and_then(|r| r.workdir())
            .map(Path::to_path_buf)
            .unwrap_or(cwd);
        let dir = root.join(DATA_DIR);
        if !dir.exists() {
            fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let prefs = Preferences::load(&dir)?;
        Ok(Self {
            repo,
            root,
            dir,
            session_id: session_id.to_string(),
            prefs,
            state: SessionState::default(),
            exports: Vec::new(),
        })
    }

    // ---------------------------------------------------------------
    // Private helpers
    // ---------------------------------------------------------------

    fn state_path(&self) -> PathBuf {
        self.dir.join(format!("session-{}.json", self.session_id))
    }

    fn state_lock(&self) -> Result<RwLock<File>> {
        let path = self.dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        Ok(RwLock::new(file))
    }

    /// Replace the in-memory state with what is on disk. Call with the
    /// state lock held.
    fn reload(&mut self) -> Result<()> {
        self.state = read_json_file(&self.state_path())?.unwrap_or_default();
        Ok(())
    }

    /// Write the session state, replacing the previous file atomically.
    fn save(&self) -> Result<()> {
        let path = self.state_path();
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(&self.state).context("serializing session state")?;
        fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("replacing {}", path.display()))
    }

    fn exporter(&self) -> Exporter {
        Exporter::new(self.root.join(&self.prefs.export_dir), self.prefs.variant)
    }

    fn resolve(&self, file: &str) -> PathBuf {
        self.root.join(file)
    }

    fn key(&self, file: &str, line: u32) -> LineKey {
        LineKey::new(self.resolve(file), line)
    }

    /// Check whether `.tracehint` is covered by the repo's ignore rules.
    /// Outside a git repository there is nothing to warn about.
    fn is_data_dir_ignored(&self) -> bool {
        self.repo.as_ref().is_none_or(|repo| {
            repo.is_path_ignored(Path::new(DATA_DIR)).unwrap_or(false)
        })
    }

    fn decorations(&self, document: &Path) -> Decorations {
        Decorations {
            file: document.display().to_string(),
            lines: self.state.decorated_lines(document),
        }
    }

    /// Write the exports for every reveal handled so far. Meant to run
    /// after the output reached the host. Failures are logged only.
    pub fn write_exports(&mut self) {
        let exporter = self.exporter();
        for (key, completed) in std::mem::take(&mut self.exports) {
            if let Err(e) = exporter.export_file(&self.state.cache, &key.document) {
                warn!("exporting {}: {e:#}", key.document.display());
            }
            if !completed {
                continue;
            }
            if let Some(record) = self.state.cache.get(&key) {
                if let Err(e) = exporter.export_line(&key, record) {
                    warn!("exporting {key}: {e:#}");
                }
            }
        }
    }

    fn record_error_signal(&mut self, location: &TracebackLocation) -> LineKey {
        let key = LineKey::new(
            self.root.join(&location.file),
            location.line.saturating_sub(1),
        );
        if !self.state.mark_pending(key.clone()) {
            debug!(%key, "error signal on an explained line");
        }
        key
    }

    /// Run `script` to completion and flag every traceback location found
    /// in its stderr.
    fn run_script(&mut self, script: &Path) -> Result<()> {
        let (subscription, locations) =
            runner::spawn(&self.prefs.interpreter, script, &self.root)?;
        for location in locations {
            self.record_error_signal(&location);
        }
        subscription.finish()?;
        Ok(())
    }

    /// Run `script` and report the lines it flagged. A script that cannot
    /// be run becomes a warning for the host; the command still succeeds.
    fn run_and_decorate(&mut self, script: &Path) -> HostOutput {
        match self.run_script(script) {
            Ok(()) => HostOutput {
                decorations: Some(self.decorations(script)),
                ..Default::default()
            },
            Err(e) => {
                warn!("running {}: {e:#}", script.display());
                HostOutput {
                    notice: Some(Notice {
                        level: NoticeLevel::Warning,
                        message: format!("Could not run {}: {e:#}", script.display()),
                    }),
                    ..Default::default()
                }
            }
        }
    }

    // ---------------------------------------------------------------
    // Command handlers
    // ---------------------------------------------------------------

    /// Handle one host command and persist the resulting state. The
    /// state file is read and written under the state lock.
    pub fn handle(&mut self, command: &HostCommand) -> Result<Option<HostOutput>> {
        let mut lock = self.state_lock()?;
        let _guard = lock.write().context("locking session state")?;
        self.reload()?;

        let output = match command {
            HostCommand::Activate(_) => self.handle_activate()?,
            HostCommand::ErrorSignal(e) => self.handle_error_signal(e),
            HostCommand::TriggerExplanation(e) => self.handle_trigger(e),
            HostCommand::ShowHint(e) => self.handle_show_hint(e),
            HostCommand::ShowSecondary(e) => self.handle_reveal(e, Step::Secondary),
            HostCommand::ShowAnswer(e) => self.handle_reveal(e, Step::Answer),
            HostCommand::SaveFile(e) => self.handle_save_file(e),
            HostCommand::EnableWatch(e) => self.handle_enable_watch(e),
            HostCommand::FileSaved(e) => self.handle_file_saved(e),
            HostCommand::Deactivate(_) => return self.handle_deactivate(),
        };
        self.save()?;
        Ok(output)
    }

    fn handle_activate(&mut self) -> Result<Option<HostOutput>> {
        self.state = SessionState::default();

        if !self.is_data_dir_ignored() {
            return Ok(notice(
                NoticeLevel::Warning,
                "[tracehint] .tracehint is not in .gitignore; \
                 add it to avoid committing session state"
                    .into(),
            ));
        }
        Ok(None)
    }

    fn handle_error_signal(&mut self, input: &ErrorSignalInput) -> Option<HostOutput> {
        let key = self.record_error_signal(&TracebackLocation {
            file: PathBuf::from(&input.file),
            line: input.line,
        });
        Some(HostOutput {
            decorations: Some(self.decorations(&key.document)),
            ..Default::default()
        })
    }

    fn handle_trigger(&mut self, input: &LineInput) -> Option<HostOutput> {
        let key = self.key(&input.file, input.line);
        match disclosure::begin(&mut self.state, &key) {
            Entry::AlreadyExplained => notice(
                NoticeLevel::Info,
                format!("Line {} has already been explained.", key.line + 1),
            ),
            Entry::Started { thread, state } => {
                debug!(%key, ?state, "flow started");
                Some(HostOutput {
                    thread: Some(thread::render(
                        &key,
                        &thread,
                        self.state.cache.get(&key),
                        self.prefs.variant,
                    )),
                    decorations: Some(self.decorations(&key.document)),
                    ..Default::default()
                })
            }
        }
    }

    fn handle_show_hint(&mut self, input: &ShowHintInput) -> Option<HostOutput> {
        let key = self.key(&input.file, input.line);
        self.reveal(&key, Step::Hint, input.source_line.as_deref())
    }

    fn handle_reveal(&mut self, input: &LineInput, step: Step) -> Option<HostOutput> {
        let key = self.key(&input.file, input.line);
        self.reveal(&key, step, None)
    }

    fn reveal(&mut self, key: &LineKey, step: Step, source_line: Option<&str>) -> Option<HostOutput> {
        let options = ParseOptions {
            variant: self.prefs.variant,
            language: &self.prefs.language,
        };
        let mut source = ModelSource {
            prefs: &self.prefs,
            dir: &self.dir,
            source_line,
        };
        let transition = disclosure::reveal(&mut self.state, key, step, options, &mut source);

        match transition {
            Transition::Revealed {
                state, completed, ..
            } => {
                debug!(%key, ?state, "revealed");
                let handle = self.state.thread_for(key);
                let update =
                    thread::render(key, &handle, self.state.cache.get(key), self.prefs.variant);
                self.exports.push((key.clone(), completed));
                Some(HostOutput {
                    thread: Some(update),
                    decorations: completed.then(|| self.decorations(&key.document)),
                    ..Default::default()
                })
            }
            Transition::QueryFailed(message) => {
                warn!(%key, "model query failed: {message}");
                notice(
                    NoticeLevel::Error,
                    format!("Could not get an explanation: {message}"),
                )
            }
            Transition::PreconditionNotMet(why) => {
                debug!(%key, ?step, "ignored: {why}");
                None
            }
        }
    }

    fn handle_save_file(&mut self, input: &FileInput) -> Option<HostOutput> {
        let document = self.resolve(&input.file);
        match self.exporter().export_file(&self.state.cache, &document) {
            Ok(ExportOutcome::Written(path)) => info!(path = %path.display(), "saved"),
            Ok(outcome) => debug!(?outcome, "nothing to save"),
            Err(e) => warn!("saving {}: {e:#}", document.display()),
        }
        notice(
            NoticeLevel::Info,
            format!("Saved explanation data for {}.", document.display()),
        )
    }

    fn handle_enable_watch(&mut self, input: &EnableWatchInput) -> Option<HostOutput> {
        self.state.watch_enabled = true;
        let mut output = match &input.file {
            Some(file) => {
                let script = self.resolve(file);
                self.run_and_decorate(&script)
            }
            None => HostOutput::default(),
        };
        if output.notice.is_none() {
            output.notice = Some(Notice {
                level: NoticeLevel::Info,
                message: "Watch mode enabled: saved scripts will be run and errors explained."
                    .into(),
            });
        }
        Some(output)
    }

    fn handle_file_saved(&mut self, input: &FileInput) -> Option<HostOutput> {
        if !self.state.watch_enabled {
            return None;
        }
        let script = self.resolve(&input.file);
        Some(self.run_and_decorate(&script))
    }

    fn handle_deactivate(&mut self) -> Result<Option<HostOutput>> {
        self.state = SessionState::default();
        remove_if_exists(&self.state_path())?;
        Ok(None)
    }

    // ---------------------------------------------------------------
    // Watch mode
    // ---------------------------------------------------------------

    /// Run `file` and call `emit` with updated decorations for every
    /// traceback location while the script is running. Returning an error
    /// from `emit` stops the script.
    ///
    /// Hook commands keep arriving while the script runs, so each location
    /// is merged into the state on disk under the lock.
    pub fn watch(
        &mut self,
        file: &str,
        mut emit: impl FnMut(&HostOutput) -> Result<()>,
    ) -> Result<()> {
        let script = self.resolve(file);
        let (subscription, locations) =
            runner::spawn(&self.prefs.interpreter, &script, &self.root)?;
        for location in locations {
            let output = self.record_watched(&location)?;
            if let Err(e) = emit(&output) {
                subscription.unsubscribe();
                return Err(e);
            }
        }
        subscription.finish()?;
        Ok(())
    }

    fn record_watched(&mut self, location: &TracebackLocation) -> Result<HostOutput> {
        let mut lock = self.state_lock()?;
        let _guard = lock.write().context("locking session state")?;
        self.reload()?;
        let key = self.record_error_signal(location);
        self.save()?;
        Ok(HostOutput {
            decorations: Some(self.decorations(&key.document)),
            ..Default::default()
        })
    }
}
