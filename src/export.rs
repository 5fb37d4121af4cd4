//! Export of cached explanations and what the learner opened.
//!
//! Two shapes are written to the project's export directory:
//! `<stem>.json` maps every explained line of a document to its record, and
//! `<stem>_line<N>.json` holds a single finished line.

use crate::record::{ExplanationRecord, LineKey, Variant};
use crate::state::ExplanationCache;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SecondaryText {
    Reasoning { reasoning: String },
    Define { define: String },
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SecondaryOpened {
    #[serde(rename_all = "camelCase")]
    Reasoning { reasoning_opened: bool },
    #[serde(rename_all = "camelCase")]
    Define { define_opened: bool },
}

/// One exported line. `line` is one-based.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineExport {
    pub file: String,
    pub line: u32,
    pub timestamp: String,
    pub hint: String,
    #[serde(flatten)]
    pub secondary: SecondaryText,
    pub answer: String,
    pub hint_opened: bool,
    #[serde(flatten)]
    pub secondary_opened: SecondaryOpened,
    pub answer_opened: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps_completed: Option<Vec<&'static str>>,
}

impl LineExport {
    pub fn new(
        key: &LineKey,
        record: &ExplanationRecord,
        variant: Variant,
        timestamp: &str,
    ) -> Self {
        let (secondary, secondary_opened) = match variant {
            Variant::Reasoning => (
                SecondaryText::Reasoning {
                    reasoning: record.secondary.clone(),
                },
                SecondaryOpened::Reasoning {
                    reasoning_opened: record.secondary_opened,
                },
            ),
            Variant::Define => (
                SecondaryText::Define {
                    define: record.secondary.clone(),
                },
                SecondaryOpened::Define {
                    define_opened: record.secondary_opened,
                },
            ),
        };
        Self {
            file: key.document.display().to_string(),
            line: key.line + 1,
            timestamp: timestamp.to_string(),
            hint: record.hint.clone(),
            secondary,
            answer: record.answer.clone(),
            hint_opened: record.hint_opened,
            secondary_opened,
            answer_opened: record.answer_opened,
            steps_completed: None,
        }
    }

    pub fn with_steps(mut self, record: &ExplanationRecord, variant: Variant) -> Self {
        self.steps_completed = Some(record.steps_completed(variant));
        self
    }
}

/// Aggregate for one document, keyed by `"<path>:<line>"`. Records that
/// were never fetched are left out.
pub fn build_file_export(
    cache: &ExplanationCache,
    document: &Path,
    variant: Variant,
    timestamp: &str,
) -> BTreeMap<String, LineExport> {
    cache
        .for_document(document)
        .filter(|(_, record)| record.fetched)
        .map(|(key, record)| {
            (
                key.to_string(),
                LineExport::new(key, record, variant, timestamp).with_steps(record, variant),
            )
        })
        .collect()
}

#[derive(Debug, PartialEq, Eq)]
pub enum ExportOutcome {
    Written(PathBuf),
    /// Nothing to export; a stale export was deleted.
    Removed(PathBuf),
    /// Nothing to export and nothing on disk.
    Skipped,
}

pub struct Exporter {
    dir: PathBuf,
    variant: Variant,
}

impl Exporter {
    pub fn new(dir: PathBuf, variant: Variant) -> Self {
        Self { dir, variant }
    }

    pub fn file_path(&self, document: &Path) -> PathBuf {
        self.dir.join(format!("{}.json", stem(document)))
    }

    pub fn line_path(&self, key: &LineKey) -> PathBuf {
        self.dir
            .join(format!("{}_line{}.json", stem(&key.document), key.line + 1))
    }

    /// Write the aggregate for `document`, or delete a stale one when the
    /// document has nothing cached.
    pub fn export_file(&self, cache: &ExplanationCache, document: &Path) -> Result<ExportOutcome> {
        let path = self.file_path(document);
        let aggregate = build_file_export(cache, document, self.variant, &now());
        if aggregate.is_empty() {
            return match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), "removed empty export");
                    Ok(ExportOutcome::Removed(path))
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(ExportOutcome::Skipped),
                Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
            };
        }
        self.write_json(&path, &aggregate)?;
        Ok(ExportOutcome::Written(path))
    }

    /// Write the single-line record for `key`.
    pub fn export_line(&self, key: &LineKey, record: &ExplanationRecord) -> Result<PathBuf> {
        let path = self.line_path(key);
        let export = LineExport::new(key, record, self.variant, &now());
        self.write_json(&path, &export)?;
        Ok(path)
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let json = serde_json::to_string_pretty(value).context("serializing export")?;
        fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        debug!(path = %path.display(), "export written");
        Ok(())
    }
}

fn stem(document: &Path) -> String {
    document
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "untitled".to_string())
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}
