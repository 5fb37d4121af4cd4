//! Annotation thread content for one line, derived from its record.

use crate::record::{ExplanationRecord, LineKey, Step, Variant};
use crate::state::ThreadHandle;
use crate::types::{ThreadAction, ThreadComment, ThreadUpdate};
use serde_json::json;

pub const SHOW_HINT: &str = "tracehint.showHint";
pub const SHOW_REASONING: &str = "tracehint.showReasoning";
pub const SHOW_ANSWER: &str = "tracehint.showAnswer";

const INTRO: &str = "Python raised an error on this line. Open a hint when you are ready.";

/// Build the full thread content for `key`. With no record (or nothing
/// opened yet) the thread only offers the hint.
pub fn render(
    key: &LineKey,
    handle: &ThreadHandle,
    record: Option<&ExplanationRecord>,
    variant: Variant,
) -> ThreadUpdate {
    let empty = ExplanationRecord::default();
    let record = record.unwrap_or(&empty);

    let mut comments = Vec::new();
    if record.hint_opened {
        comments.push(comment("Hint", &record.hint));
    } else {
        comments.push(comment("tracehint", INTRO));
    }
    if record.secondary_opened {
        comments.push(comment(variant.secondary_title(), &record.secondary));
    }
    if record.answer_opened {
        comments.push(comment("Answer", &record.answer));
    }

    let file = key.document.display().to_string();
    let actions = next_step(record, variant)
        .map(|step| {
            let (title, command) = action_for(step);
            vec![ThreadAction {
                title: title.to_string(),
                command: command.to_string(),
                arguments: vec![json!(file), json!(key.line)],
            }]
        })
        .unwrap_or_default();

    ThreadUpdate {
        thread_id: handle.id.clone(),
        file,
        line: key.line,
        comments,
        actions,
    }
}

/// First step of the variant's flow that is still closed.
pub fn next_step(record: &ExplanationRecord, variant: Variant) -> Option<Step> {
    variant
        .steps()
        .iter()
        .copied()
        .find(|s| !record.is_opened(*s))
}

/// The define legend opens with the answer, so only the reasoning flow
/// ever offers a secondary step.
fn action_for(step: Step) -> (&'static str, &'static str) {
    match step {
        Step::Hint => ("Show Hint", SHOW_HINT),
        Step::Secondary => ("Show Reasoning", SHOW_REASONING),
        Step::Answer => ("Show Answer", SHOW_ANSWER),
    }
}

fn comment(label: &str, body: &str) -> ThreadComment {
    ThreadComment {
        label: label.to_string(),
        body: body.to_string(),
    }
}
