use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

// ===================================================================
// Variant: which schema the model is asked for and how it is parsed
// ===================================================================

/// The two explanation schemas. They differ in the secondary field and in
/// how the answer is normalized, so they are never mixed within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Hint / Reasoning / Answer, answer rendered as a fenced code block.
    #[default]
    Reasoning,
    /// Hint / Answer with a fixed define label, answer rendered as
    /// `Original: <o> → Corrected: <c>`.
    Define,
}

impl Variant {
    /// Lowercase name of the secondary field, as used in exports.
    pub fn secondary_name(self) -> &'static str {
        match self {
            Variant::Reasoning => "reasoning",
            Variant::Define => "define",
        }
    }

    pub fn secondary_title(self) -> &'static str {
        match self {
            Variant::Reasoning => "Reasoning",
            Variant::Define => "Define",
        }
    }

    /// Steps the learner activates, in order. In the define variant the
    /// secondary field rides along with the answer.
    pub fn steps(self) -> &'static [Step] {
        match self {
            Variant::Reasoning => &[Step::Hint, Step::Secondary, Step::Answer],
            Variant::Define => &[Step::Hint, Step::Answer],
        }
    }
}

/// One disclosure step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Hint,
    Secondary,
    Answer,
}

/// Where a line is in its disclosure flow. Derived from the record's flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DisclosureState {
    NotStarted,
    HintShown,
    SecondaryShown,
    AnswerShown,
}

// ===================================================================
// LineKey
// ===================================================================

/// One source line within one document. `line` is zero-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineKey {
    pub document: PathBuf,
    pub line: u32,
}

impl LineKey {
    pub fn new(document: impl Into<PathBuf>, line: u32) -> Self {
        Self {
            document: document.into(),
            line,
        }
    }

    pub fn belongs_to(&self, document: &Path) -> bool {
        self.document == document
    }
}

impl fmt::Display for LineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.document.display(), self.line)
    }
}

// ===================================================================
// ExplanationRecord
// ===================================================================

/// The three fields recovered from one model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Explanation {
    pub hint: String,
    pub secondary: String,
    pub answer: String,
}

/// Cached explanation content plus the per-field disclosure flags.
///
/// Flags only ever go from `false` to `true`; there is no way to close a
/// field once it has been opened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplanationRecord {
    pub hint: String,
    pub secondary: String,
    pub answer: String,
    pub fetched: bool,
    pub hint_opened: bool,
    pub secondary_opened: bool,
    pub answer_opened: bool,
}

impl ExplanationRecord {
    /// Fill in freshly parsed content, keeping any flags already set.
    pub fn fill(&mut self, explanation: Explanation) {
        self.hint = explanation.hint;
        self.secondary = explanation.secondary;
        self.answer = explanation.answer;
        self.fetched = true;
    }

    pub fn is_opened(&self, step: Step) -> bool {
        match step {
            Step::Hint => self.hint_opened,
            Step::Secondary => self.secondary_opened,
            Step::Answer => self.answer_opened,
        }
    }

    pub fn open(&mut self, step: Step) {
        match step {
            Step::Hint => self.hint_opened = true,
            Step::Secondary => self.secondary_opened = true,
            Step::Answer => self.answer_opened = true,
        }
    }

    pub fn state(&self) -> DisclosureState {
        if self.answer_opened {
            DisclosureState::AnswerShown
        } else if self.secondary_opened {
            DisclosureState::SecondaryShown
        } else if self.hint_opened {
            DisclosureState::HintShown
        } else {
            DisclosureState::NotStarted
        }
    }

    /// Names of the opened fields in fixed hint, secondary, answer order.
    pub fn steps_completed(&self, variant: Variant) -> Vec<&'static str> {
        [
            (self.hint_opened, "hint"),
            (self.secondary_opened, variant.secondary_name()),
            (self.answer_opened, "answer"),
        ]
        .into_iter()
        .filter_map(|(opened, name)| opened.then_some(name))
        .collect()
    }
}
