use serde::{Deserialize, Serialize};

// ===================================================================
// Host Command Input (received via stdin, snake_case JSON)
// ===================================================================

/// Fields shared by all host commands.
#[derive(Debug, Clone, Deserialize)]
pub struct CommonInput {
    pub session_id: String,
    pub cwd: String,
}

/// A command addressed at one line. `line` is zero-based, as the host's
/// editor positions are.
#[derive(Debug, Deserialize)]
pub struct LineInput {
    #[serde(flatten)]
    pub common: CommonInput,
    pub file: String,
    pub line: u32,
}

#[derive(Debug, Deserialize)]
pub struct ShowHintInput {
    #[serde(flatten)]
    pub common: CommonInput,
    pub file: String,
    pub line: u32,
    /// Text of the line, when the host already has the document open.
    /// Read from disk otherwise.
    #[serde(default)]
    pub source_line: Option<String>,
}

/// A traceback location reported by the host. `line` is one-based, as
/// printed in the traceback.
#[derive(Debug, Deserialize)]
pub struct ErrorSignalInput {
    #[serde(flatten)]
    pub common: CommonInput,
    pub file: String,
    pub line: u32,
}

#[derive(Debug, Deserialize)]
pub struct FileInput {
    #[serde(flatten)]
    pub common: CommonInput,
    pub file: String,
}

#[derive(Debug, Deserialize)]
pub struct EnableWatchInput {
    #[serde(flatten)]
    pub common: CommonInput,
    /// Script to run right away, if the host has one open.
    #[serde(default)]
    pub file: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionInput {
    #[serde(flatten)]
    pub common: CommonInput,
}

/// Top-level host command, deserialized from stdin JSON.
///
/// Tagged by the `command` field.
#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum HostCommand {
    Activate(SessionInput),
    ErrorSignal(ErrorSignalInput),
    TriggerExplanation(LineInput),
    ShowHint(ShowHintInput),
    #[serde(rename = "showReasoning", alias = "showDefine")]
    ShowSecondary(LineInput),
    ShowAnswer(LineInput),
    SaveFile(FileInput),
    EnableWatch(EnableWatchInput),
    FileSaved(FileInput),
    Deactivate(SessionInput),
}

impl HostCommand {
    /// Access the common fields shared by all commands.
    pub fn common(&self) -> &CommonInput {
        match self {
            Self::Activate(e) => &e.common,
            Self::ErrorSignal(e) => &e.common,
            Self::TriggerExplanation(e) => &e.common,
            Self::ShowHint(e) => &e.common,
            Self::ShowSecondary(e) => &e.common,
            Self::ShowAnswer(e) => &e.common,
            Self::SaveFile(e) => &e.common,
            Self::EnableWatch(e) => &e.common,
            Self::FileSaved(e) => &e.common,
            Self::Deactivate(e) => &e.common,
        }
    }
}

// ===================================================================
// Host Output (written to stdout, camelCase JSON)
// ===================================================================

/// Everything the host should show after a command. Absent fields mean
/// "leave as is".
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostOutput {
    /// Message shown to the user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<Notice>,

    /// Content for the annotation thread on one line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadUpdate>,

    /// Lines that should show the "explain this" entry affordance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decorations: Option<Decorations>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// Full replacement content for an annotation thread.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadUpdate {
    /// Stable for the lifetime of the session; the host creates the thread
    /// on first sight and updates it afterwards.
    pub thread_id: String,
    pub file: String,
    /// Zero-based.
    pub line: u32,
    pub comments: Vec<ThreadComment>,
    /// Affordances to show under the comments, in order.
    pub actions: Vec<ThreadAction>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadComment {
    pub label: String,
    pub body: String,
}

/// A button that invokes a host command with positional arguments.
#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadAction {
    pub title: String,
    pub command: String,
    pub arguments: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Decorations {
    pub file: String,
    /// Zero-based lines.
    pub lines: Vec<u32>,
}
