//! Per-session state: the explanation cache, the processed and pending
//! sets, and the thread handles the host uses to update annotations.
//!
//! One `SessionState` exists per host session. It is created on
//! activation, saved after every command, and removed on deactivation.

use crate::record::{ExplanationRecord, LineKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Host-side identity of the annotation thread shown for one line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadHandle {
    pub id: String,
}

impl ThreadHandle {
    fn fresh() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

// ===================================================================
// Explanation cache
// ===================================================================

/// One record per line, no eviction.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ExplanationCache {
    #[serde(with = "entries")]
    records: BTreeMap<LineKey, ExplanationRecord>,
}

impl ExplanationCache {
    pub fn get(&self, key: &LineKey) -> Option<&ExplanationRecord> {
        self.records.get(key)
    }

    pub fn put(&mut self, key: LineKey, record: ExplanationRecord) {
        self.records.insert(key, record);
    }

    /// Read-modify-write: fields `f` does not touch keep their values.
    pub fn update<R>(&mut self, key: &LineKey, f: impl FnOnce(&mut ExplanationRecord) -> R) -> R {
        let record = self.records.entry(key.clone()).or_default();
        f(record)
    }

    /// Records whose key belongs to `document`, in line order.
    pub fn for_document<'a>(
        &'a self,
        document: &'a Path,
    ) -> impl Iterator<Item = (&'a LineKey, &'a ExplanationRecord)> + 'a {
        self.records.iter().filter(move |(k, _)| k.belongs_to(document))
    }
}

// ===================================================================
// Session state
// ===================================================================

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub cache: ExplanationCache,
    /// Lines whose flow reached the answer.
    #[serde(default)]
    pub processed: BTreeSet<LineKey>,
    /// Lines an error signal pointed at that still await their entry action.
    #[serde(default)]
    pub pending: BTreeSet<LineKey>,
    #[serde(default, with = "entries")]
    pub threads: BTreeMap<LineKey, ThreadHandle>,
    #[serde(default)]
    pub watch_enabled: bool,
}

impl SessionState {
    pub fn is_processed(&self, key: &LineKey) -> bool {
        self.processed.contains(key)
    }

    /// Flag a line for an entry affordance. Returns `false` for processed
    /// lines, which never get one again.
    pub fn mark_pending(&mut self, key: LineKey) -> bool {
        if self.is_processed(&key) {
            return false;
        }
        self.pending.insert(key);
        true
    }

    /// The thread for `key`, created on first use.
    pub fn thread_for(&mut self, key: &LineKey) -> ThreadHandle {
        self.threads
            .entry(key.clone())
            .or_insert_with(ThreadHandle::fresh)
            .clone()
    }

    /// Zero-based lines of `document` that should show the entry affordance.
    pub fn decorated_lines(&self, document: &Path) -> Vec<u32> {
        self.pending
            .iter()
            .filter(|k| k.belongs_to(document) && !self.processed.contains(k))
            .map(|k| k.line)
            .collect()
    }
}

/// (De)serialize a map with non-string keys as a list of `[key, value]`
/// pairs, since JSON object keys must be strings.
mod entries {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<K, V, S>(map: &BTreeMap<K, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        K: Serialize,
        V: Serialize,
        S: Serializer,
    {
        serializer.collect_seq(map.iter())
    }

    pub fn deserialize<'de, K, V, D>(deserializer: D) -> Result<BTreeMap<K, V>, D::Error>
    where
        K: Deserialize<'de> + Ord,
        V: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        let pairs: Vec<(K, V)> = Vec::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}
