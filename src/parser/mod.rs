//! Best-effort extraction of the labeled fields in a free-text model reply.
//!
//! The model is asked for `Hint:` / `Reasoning:` / `Answer:` sections but
//! nothing forces it to comply, so every field has two chances: a section
//! scan anchored at line starts, then a line-by-line prefix scan. Whatever
//! happens, the caller gets all three fields back.

use crate::record::{Explanation, Variant};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

pub const NO_HINT: &str = "No hint.";
pub const NO_REASONING: &str = "No reasoning.";
pub const NO_ANSWER: &str = "No answer.";

/// Legend shown as the secondary field of the define variant.
pub const DEFINE_LABEL: &str =
    "Original is the line as written; Corrected is the line after the fix.";

const UNKNOWN: &str = "?";

/// Any recognized label at the start of a line, with optional markdown
/// decoration (`**Hint:**`, `## Answer:`, `- Reasoning:`).
static LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t>*#-]*(hint|reasoning|define|answer)[ \t*]*:[ \t*]*")
        .expect("label pattern")
});

static FENCE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[A-Za-z0-9_+-]*").expect("fence pattern"));

static FORMAT_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)format:\s*"?([^"]*)"#).expect("format pattern"));

static ORIGINAL_CORRECTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)original:\s*(.*?)\s*(?:→|->|\n)\s*corrected:\s*(.*)")
        .expect("original/corrected pattern")
});

#[derive(Debug, Clone, Copy)]
pub struct ParseOptions<'a> {
    pub variant: Variant,
    /// Language tag used when wrapping a bare answer in a code fence.
    pub language: &'a str,
}

/// Parse a raw model reply. Never fails: missing fields fall back to fixed
/// placeholders.
pub fn parse(raw: &str, options: ParseOptions<'_>) -> Explanation {
    if raw.trim().is_empty() {
        debug!("empty model reply, using placeholders");
        return placeholder(options.variant);
    }

    let sections = sections(raw);
    let hint = field(raw, &sections, "hint").unwrap_or_else(|| NO_HINT.to_string());

    match options.variant {
        Variant::Reasoning => Explanation {
            hint,
            secondary: field(raw, &sections, "reasoning")
                .unwrap_or_else(|| NO_REASONING.to_string()),
            answer: field(raw, &sections, "answer")
                .map(|a| fence(&a, options.language))
                .unwrap_or_else(|| NO_ANSWER.to_string()),
        },
        Variant::Define => Explanation {
            hint,
            secondary: DEFINE_LABEL.to_string(),
            answer: normalize_correction(&field(raw, &sections, "answer").unwrap_or_default()),
        },
    }
}

/// The fixed triple returned for an empty reply.
pub fn placeholder(variant: Variant) -> Explanation {
    match variant {
        Variant::Reasoning => Explanation {
            hint: NO_HINT.to_string(),
            secondary: NO_REASONING.to_string(),
            answer: NO_ANSWER.to_string(),
        },
        Variant::Define => Explanation {
            hint: NO_HINT.to_string(),
            secondary: DEFINE_LABEL.to_string(),
            answer: render_correction("", ""),
        },
    }
}

// ===================================================================
// Field extraction
// ===================================================================

/// Split the reply into `(label, text)` sections. Each section runs from
/// its label to the next recognized label or the end of input.
fn sections(raw: &str) -> Vec<(String, &str)> {
    let bounds: Vec<(usize, usize, String)> = LABEL
        .captures_iter(raw)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let label = caps.get(1)?.as_str().to_lowercase();
            Some((whole.start(), whole.end(), label))
        })
        .collect();

    bounds
        .iter()
        .enumerate()
        .map(|(i, (_, body_start, label))| {
            let body_end = bounds.get(i + 1).map_or(raw.len(), |next| next.0);
            (label.clone(), raw[*body_start..body_end].trim())
        })
        .collect()
}

fn field(raw: &str, sections: &[(String, &str)], label: &str) -> Option<String> {
    let primary = sections
        .iter()
        .find(|(l, text)| l == label && !text.is_empty())
        .map(|(_, text)| text.to_string());
    if primary.is_some() {
        return primary;
    }
    let scanned = scan_lines(raw, label);
    if scanned.is_some() {
        debug!(label, "field recovered by line scan");
    }
    scanned
}

/// First trimmed line starting with `label` (case-insensitive); the value is
/// whatever follows its first colon.
fn scan_lines(raw: &str, label: &str) -> Option<String> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .find(|l| l.to_lowercase().starts_with(label))
        .and_then(|l| l.split_once(':'))
        .map(|(_, rest)| rest.trim().to_string())
        .filter(|rest| !rest.is_empty())
}

// ===================================================================
// Answer post-processing
// ===================================================================

fn fence(answer: &str, language: &str) -> String {
    if answer.contains("```") {
        answer.to_string()
    } else {
        format!("```{language}\n{answer}\n```")
    }
}

/// Reduce an answer to `Original: <o> → Corrected: <c>`.
fn normalize_correction(answer: &str) -> String {
    let mut text = FENCE_MARKER.replace_all(answer, "").into_owned();

    if let Some(format) = FORMAT_MARKER
        .captures(&text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|f| !f.is_empty())
    {
        text = format;
    }

    let (original, corrected) = match ORIGINAL_CORRECTED.captures(&text) {
        Some(caps) => (
            caps.get(1).map_or("", |m| m.as_str()).to_string(),
            caps.get(2).map_or("", |m| m.as_str()).to_string(),
        ),
        None => {
            let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
            match (lines.next(), lines.next()) {
                (Some(first), Some(second)) => (first.to_string(), second.to_string()),
                (Some(only), None) => (UNKNOWN.to_string(), only.to_string()),
                _ => (String::new(), String::new()),
            }
        }
    };

    render_correction(&collapse(&original), &collapse(&corrected))
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn render_correction(original: &str, corrected: &str) -> String {
    let or_unknown = |s: &str| if s.is_empty() { UNKNOWN.to_string() } else { s.to_string() };
    format!(
        "Original: {} → Corrected: {}",
        or_unknown(original),
        or_unknown(corrected)
    )
}

#[cfg(test)]
mod tests;
