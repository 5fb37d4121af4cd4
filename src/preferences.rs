use crate::record::Variant;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

const FILENAME: &str = "tracehint.toml";

/// Prompt template: either an inline Jinja2 string or a path to a template
/// file (relative to `.tracehint/`). The template sees `line`, `language`
/// and `variant`.
///
/// In TOML this looks like one of:
///
/// ```toml
/// [prompt_template]
/// inline = "Explain {{ line }}"
///
/// # or
///
/// [prompt_template]
/// file = "prompt.tmpl"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum PromptTemplate {
    /// An inline Jinja2 template string.
    Inline(String),
    /// Path to a template file (relative to `.tracehint/`).
    File(String),
}

/// Which model backend answers prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelBackend {
    /// OpenAI-compatible `/chat/completions` endpoint, streamed over SSE.
    #[default]
    OpenAi,
    /// A local command that reads the prompt on stdin and writes the reply
    /// to stdout (e.g. `ollama run llama3.2`).
    Command,
}

/// `[model]` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelPreferences {
    #[serde(default)]
    pub backend: ModelBackend,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Program and arguments for the `command` backend.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    /// Request timeout. Unset means wait for as long as the service takes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1".into()
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}

impl Default for ModelPreferences {
    fn default() -> Self {
        Self {
            backend: ModelBackend::default(),
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            command: Vec::new(),
            timeout_secs: None,
        }
    }
}

/// User-facing preferences stored in `.tracehint/tracehint.toml`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Preferences {
    /// Explanation schema: "reasoning" (hint/reasoning/answer) or "define"
    /// (hint/answer with original → corrected answers).
    #[serde(default)]
    pub variant: Variant,

    /// Language tag for code fences and prompts.
    #[serde(default = "default_language")]
    pub language: String,

    /// Interpreter used to run scripts in watch mode.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Project-relative directory that receives exported explanation data.
    #[serde(default = "default_export_dir")]
    pub export_dir: String,

    /// Overrides the built-in prompt for the selected variant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<PromptTemplate>,

    #[serde(default)]
    pub model: ModelPreferences,
}

fn default_language() -> String {
    "python".into()
}

fn default_interpreter() -> String {
    "python3".into()
}

fn default_export_dir() -> String {
    "tracehint-data".into()
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            variant: Variant::default(),
            language: default_language(),
            interpreter: default_interpreter(),
            export_dir: default_export_dir(),
            prompt_template: None,
            model: ModelPreferences::default(),
        }
    }
}

impl Preferences {
    /// Load preferences from `.tracehint/tracehint.toml`.
    ///
    /// If the file doesn't exist it is created with defaults. Missing keys
    /// in an existing file are filled in with defaults via serde.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(FILENAME);
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let prefs: Preferences = toml::from_str(&contents)
                    .with_context(|| format!("parsing {}", path.display()))?;
                Ok(prefs)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let prefs = Preferences::default();
                let toml_str = toml::to_string_pretty(&prefs)
                    .context("serializing default preferences")?;
                fs::write(&path, &toml_str)
                    .with_context(|| format!("writing default {}", path.display()))?;
                Ok(prefs)
            }
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }
}
