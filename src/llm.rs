//! Model query service.
//!
//! The rest of the crate only sees [`ModelQuery`]: hand it a prompt, get
//! text deltas back. Deltas are always accumulated into one string before
//! anything parses them.

use crate::preferences::{ModelBackend, ModelPreferences};
use crate::record::Variant;
use minijinja::{Environment, context};
use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("model backend is not configured: {0}")]
    NotConfigured(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("failed to read response stream: {0}")]
    Stream(String),

    #[error("model command failed: {0}")]
    Command(String),

    #[error("could not build prompt: {0}")]
    Prompt(String),

    #[error("model returned an empty response")]
    EmptyResponse,
}

pub trait ModelQuery {
    /// Send `prompt` and call `on_delta` for every chunk of the reply.
    fn stream(&self, prompt: &str, on_delta: &mut dyn FnMut(&str)) -> Result<(), QueryError>;

    /// Send `prompt` and return the whole reply. An empty reply is an error.
    fn complete(&self, prompt: &str) -> Result<String, QueryError> {
        let mut reply = String::new();
        self.stream(prompt, &mut |delta| reply.push_str(delta))?;
        if reply.trim().is_empty() {
            return Err(QueryError::EmptyResponse);
        }
        Ok(reply)
    }
}

/// Build the configured backend.
pub fn from_preferences(prefs: &ModelPreferences) -> Result<Box<dyn ModelQuery>, QueryError> {
    match prefs.backend {
        ModelBackend::OpenAi => Ok(Box::new(OpenAiClient::new(prefs)?)),
        ModelBackend::Command => Ok(Box::new(CommandClient::new(prefs)?)),
    }
}

// ===================================================================
// Prompt
// ===================================================================

const REASONING_PROMPT: &str = "\
You are helping a student understand an error in their {{ language }} program.
The error was raised by this line:

```{{ language }}
{{ line }}
```

Respond in exactly this format and nothing else:
Hint: <one sentence nudging the student toward the problem, without giving the fix>
Reasoning: <a short explanation of why the line fails>
Answer: <the corrected line only>
";

const DEFINE_PROMPT: &str = "\
You are helping a student understand an error in their {{ language }} program.
The error was raised by this line:

```{{ language }}
{{ line }}
```

Respond in exactly this format and nothing else:
Hint: <one sentence nudging the student toward the problem, without giving the fix>
Answer: Format: \"Original: <the line as written> → Corrected: <the fixed line>\"
";

/// The built-in template for a variant.
pub fn default_template(variant: Variant) -> &'static str {
    match variant {
        Variant::Reasoning => REASONING_PROMPT,
        Variant::Define => DEFINE_PROMPT,
    }
}

/// Render a prompt template for one source line.
pub fn render_prompt(
    template: &str,
    line: &str,
    language: &str,
    variant: Variant,
) -> Result<String, QueryError> {
    let env = Environment::new();
    let tmpl = env
        .template_from_str(template)
        .map_err(|e| QueryError::Prompt(e.to_string()))?;
    tmpl.render(context! {
        line => line.trim_end(),
        language,
        variant => variant.secondary_name(),
    })
    .map_err(|e| QueryError::Prompt(e.to_string()))
}

// ===================================================================
// OpenAI-compatible streaming client
// ===================================================================

pub struct OpenAiClient {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiClient {
    pub fn new(prefs: &ModelPreferences) -> Result<Self, QueryError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(prefs.timeout_secs.map(Duration::from_secs))
            .build()
            .map_err(|e| QueryError::Http(format!("failed to create HTTP client: {e}")))?;
        let api_key = std::env::var(&prefs.api_key_env).ok();
        if api_key.is_none() {
            debug!(var = %prefs.api_key_env, "no API key in environment");
        }
        Ok(Self {
            client,
            base_url: prefs.endpoint.trim_end_matches('/').to_string(),
            model: prefs.model.clone(),
            api_key,
        })
    }
}

impl ModelQuery for OpenAiClient {
    fn stream(&self, prompt: &str, on_delta: &mut dyn FnMut(&str)) -> Result<(), QueryError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": true,
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .map_err(|e| QueryError::Http(format!("request failed: {e}")))?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            return Err(QueryError::Http(format!("HTTP {status}: {text}")));
        }

        read_sse(BufReader::new(response), on_delta)
    }
}

/// Read `data: {json}` server-sent events until `[DONE]`, forwarding
/// `choices[0].delta.content`.
fn read_sse(reader: impl BufRead, on_delta: &mut dyn FnMut(&str)) -> Result<(), QueryError> {
    for line in reader.lines() {
        let line = line.map_err(|e| QueryError::Stream(e.to_string()))?;
        let Some(data) = line.trim().strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data == "[DONE]" {
            break;
        }
        let chunk: serde_json::Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                warn!("skipping malformed stream chunk: {e}");
                continue;
            }
        };
        if let Some(content) = chunk["choices"][0]["delta"]["content"].as_str() {
            if !content.is_empty() {
                on_delta(content);
            }
        }
    }
    Ok(())
}

// ===================================================================
// Local command client
// ===================================================================

pub struct CommandClient {
    program: String,
    args: Vec<String>,
}

impl CommandClient {
    pub fn new(prefs: &ModelPreferences) -> Result<Self, QueryError> {
        let (program, args) = prefs
            .command
            .split_first()
            .ok_or_else(|| QueryError::NotConfigured("[model] command is empty".into()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl ModelQuery for CommandClient {
    fn stream(&self, prompt: &str, on_delta: &mut dyn FnMut(&str)) -> Result<(), QueryError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| QueryError::Command(format!("spawning {}: {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .map_err(|e| QueryError::Command(format!("writing prompt: {e}")))?;
        }

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| QueryError::Command("no stdout".into()))?;
        let mut buf = [0u8; 4096];
        let mut pending: Vec<u8> = Vec::new();
        loop {
            let n = stdout
                .read(&mut buf)
                .map_err(|e| QueryError::Stream(e.to_string()))?;
            if n == 0 {
                break;
            }
            pending.extend_from_slice(&buf[..n]);
            // Hold back a trailing partial UTF-8 sequence for the next read.
            let valid = match std::str::from_utf8(&pending) {
                Ok(s) => s.len(),
                Err(e) => e.valid_up_to(),
            };
            if valid > 0 {
                on_delta(&String::from_utf8_lossy(&pending[..valid]));
                pending.drain(..valid);
            }
        }
        if !pending.is_empty() {
            on_delta(&String::from_utf8_lossy(&pending));
        }

        let status = child
            .wait()
            .map_err(|e| QueryError::Command(format!("waiting for {}: {e}", self.program)))?;
        if !status.success() {
            return Err(QueryError::Command(format!("{} exited with {status}", self.program)));
        }
        Ok(())
    }
}
