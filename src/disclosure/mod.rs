use crate::llm::QueryError;
use crate::parser::{self, ParseOptions};
use crate::record::{DisclosureState, LineKey, Step, Variant};
use crate::state::{SessionState, ThreadHandle};
use std::fmt;

// ===================================================================
// Input: where a missing explanation comes from
// ===================================================================

/// Produces the raw model reply for a line. Only called when the cache has
/// no fetched record for that line.
pub trait ExplanationSource {
    fn fetch(&mut self, key: &LineKey) -> Result<String, QueryError>;
}

// ===================================================================
// Output: what the session should render
// ===================================================================

/// Result of the entry action on a line.
#[derive(Debug, PartialEq, Eq)]
pub enum Entry {
    /// The flow exists (new or resumed) and is at `state`.
    Started {
        thread: ThreadHandle,
        state: DisclosureState,
    },
    /// The line already went through the whole flow. Nothing was changed.
    AlreadyExplained,
}

/// Why a step could not be revealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// No fetched record exists; the hint has to come first.
    MissingRecord,
    /// An earlier step of the flow is still closed.
    StepNotOpened(Step),
    /// The step is not part of the active variant's flow.
    NotInFlow,
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precondition::MissingRecord => write!(f, "no explanation has been fetched"),
            Precondition::StepNotOpened(step) => write!(f, "{step:?} has not been opened"),
            Precondition::NotInFlow => write!(f, "step is not part of this flow"),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Transition {
    Revealed {
        state: DisclosureState,
        /// The model was asked during this transition.
        queried: bool,
        /// This transition finished the flow.
        completed: bool,
    },
    PreconditionNotMet(Precondition),
    /// The model could not be asked or returned nothing. State is unchanged.
    QueryFailed(String),
}

// ===================================================================
// Transitions
// ===================================================================

/// Entry action: open (or resume) the flow for `key`.
///
/// Processed lines are rejected without touching any state.
pub fn begin(state: &mut SessionState, key: &LineKey) -> Entry {
    if state.is_processed(key) {
        return Entry::AlreadyExplained;
    }
    state.pending.remove(key);
    let thread = state.thread_for(key);
    let current = state
        .cache
        .get(key)
        .map_or(DisclosureState::NotStarted, |r| r.state());
    Entry::Started {
        thread,
        state: current,
    }
}

/// Reveal `step` for `key`.
///
/// The hint step fetches and caches an explanation on a cache miss; every
/// other step requires one to exist already. Steps must be opened in the
/// order the variant defines. Flags are only ever set, never cleared.
pub fn reveal(
    state: &mut SessionState,
    key: &LineKey,
    step: Step,
    options: ParseOptions<'_>,
    source: &mut dyn ExplanationSource,
) -> Transition {
    let variant = options.variant;
    let steps = variant.steps();
    if !steps.contains(&step) {
        return Transition::PreconditionNotMet(Precondition::NotInFlow);
    }

    let mut queried = false;
    match state.cache.get(key) {
        Some(record) if record.fetched => {
            if let Some(closed) = steps
                .iter()
                .take_while(|s| **s != step)
                .find(|s| !record.is_opened(**s))
            {
                return Transition::PreconditionNotMet(Precondition::StepNotOpened(*closed));
            }
        }
        _ if step == Step::Hint => {
            let raw = match source.fetch(key) {
                Ok(raw) => raw,
                Err(e) => return Transition::QueryFailed(e.to_string()),
            };
            let mut record = state.cache.get(key).cloned().unwrap_or_default();
            record.fill(parser::parse(&raw, options));
            state.cache.put(key.clone(), record);
            queried = true;
        }
        _ => return Transition::PreconditionNotMet(Precondition::MissingRecord),
    }

    let (current, completed) = state.cache.update(key, |r| {
        r.open(step);
        if step == Step::Answer && variant == Variant::Define {
            r.open(Step::Secondary);
        }
        (r.state(), r.answer_opened)
    });

    if completed {
        state.pending.remove(key);
        state.processed.insert(key.clone());
    }

    Transition::Revealed {
        state: current,
        queried,
        completed,
    }
}
