use super::*;

const REASONING: ParseOptions<'static> = ParseOptions {
    variant: Variant::Reasoning,
    language: "python",
};

const DEFINE: ParseOptions<'static> = ParseOptions {
    variant: Variant::Define,
    language: "python",
};

// =================================================================
// Three-field variant
// =================================================================

#[test]
fn parses_exact_template() {
    let parsed = parse(
        "Hint: check indentation\nReasoning: mismatched block\nAnswer: print(x)",
        REASONING,
    );
    assert_eq!(parsed.hint, "check indentation");
    assert_eq!(parsed.secondary, "mismatched block");
    assert_eq!(parsed.answer, "```python\nprint(x)\n```");
}

#[test]
fn sections_span_multiple_lines() {
    let raw = "Hint: the loop\nnever ends\n\nReasoning: `i` is never\nincremented.\nAnswer:\n```python\nwhile i < n:\n    i += 1\n```\n";
    let parsed = parse(raw, REASONING);
    assert_eq!(parsed.hint, "the loop\nnever ends");
    assert_eq!(parsed.secondary, "`i` is never\nincremented.");
    // Already fenced, left alone.
    assert_eq!(parsed.answer, "```python\nwhile i < n:\n    i += 1\n```");
}

#[test]
fn labels_are_case_insensitive_and_may_be_decorated() {
    let raw = "**HINT:** look at the types\n## reasoning: str + int\n- ANSWER: x = str(n)";
    let parsed = parse(raw, REASONING);
    assert_eq!(parsed.hint, "look at the types");
    assert_eq!(parsed.secondary, "str + int");
    assert_eq!(parsed.answer, "```python\nx = str(n)\n```");
}

#[test]
fn labels_out_of_order_are_still_found() {
    let raw = "Sure! Here you go.\nAnswer: return total\nHint: you forgot to return\nReasoning: the function ends without a value";
    let parsed = parse(raw, REASONING);
    assert_eq!(parsed.hint, "you forgot to return");
    assert_eq!(parsed.secondary, "the function ends without a value");
    assert_eq!(parsed.answer, "```python\nreturn total\n```");
}

#[test]
fn line_scan_recovers_labels_the_section_scan_misses() {
    // "Hints" and "Reasoning (short)" are not exact labels.
    let raw = "Some preamble.\nHints: close the bracket\nReasoning (short): the list literal is open\nAnswer: xs = [1, 2]";
    let parsed = parse(raw, REASONING);
    assert_eq!(parsed.hint, "close the bracket");
    assert_eq!(parsed.secondary, "the list literal is open");
    assert_eq!(parsed.answer, "```python\nxs = [1, 2]\n```");
}

#[test]
fn missing_fields_get_placeholders() {
    let parsed = parse("Hint: only a hint here", REASONING);
    assert_eq!(parsed.hint, "only a hint here");
    assert_eq!(parsed.secondary, NO_REASONING);
    assert_eq!(parsed.answer, NO_ANSWER);
}

#[test]
fn unstructured_reply_gets_placeholders() {
    let parsed = parse("I am not sure what went wrong.", REASONING);
    assert_eq!(parsed, placeholder(Variant::Reasoning));
}

#[test]
fn empty_input_returns_placeholders() {
    for raw in ["", "   ", "\n\n"] {
        let parsed = parse(raw, REASONING);
        assert_eq!(parsed.hint, NO_HINT);
        assert_eq!(parsed.secondary, NO_REASONING);
        assert_eq!(parsed.answer, NO_ANSWER);
    }
}

#[test]
fn fence_uses_configured_language() {
    let parsed = parse(
        "Hint: h\nReasoning: r\nAnswer: puts x",
        ParseOptions {
            variant: Variant::Reasoning,
            language: "ruby",
        },
    );
    assert_eq!(parsed.answer, "```ruby\nputs x\n```");
}

// =================================================================
// Two-field (define) variant
// =================================================================

#[test]
fn define_answer_with_arrow() {
    let parsed = parse(
        "Hint: off-by-one\nAnswer: Original: range(n) → Corrected: range(n+1)",
        DEFINE,
    );
    assert_eq!(parsed.hint, "off-by-one");
    assert_eq!(parsed.secondary, DEFINE_LABEL);
    assert_eq!(parsed.answer, "Original: range(n) → Corrected: range(n+1)");
}

#[test]
fn define_answer_with_ascii_arrow_and_fences() {
    let raw = "Hint: wrong name\nAnswer:\n```python\nOriginal:   pritn(x)  ->  Corrected: print(x)\n```";
    let parsed = parse(raw, DEFINE);
    assert_eq!(parsed.answer, "Original: pritn(x) → Corrected: print(x)");
}

#[test]
fn define_answer_on_separate_lines() {
    let raw = "Hint: h\nAnswer:\nOriginal: if x = 1:\nCorrected: if x == 1:";
    let parsed = parse(raw, DEFINE);
    assert_eq!(parsed.answer, "Original: if x = 1: → Corrected: if x == 1:");
}

#[test]
fn define_answer_from_two_bare_lines() {
    let raw = "Hint: h\nAnswer:\n```\nprint 'x'\nprint('x')\n```";
    let parsed = parse(raw, DEFINE);
    assert_eq!(parsed.answer, "Original: print 'x' → Corrected: print('x')");
}

#[test]
fn define_answer_single_line_is_corrected_only() {
    let parsed = parse("Hint: h\nAnswer: print(x)", DEFINE);
    assert_eq!(parsed.answer, "Original: ? → Corrected: print(x)");
}

#[test]
fn define_answer_format_marker() {
    let raw = "Hint: h\nAnswer: Format: \"Original: x=1 → Corrected: x = 1\" as requested";
    let parsed = parse(raw, DEFINE);
    assert_eq!(parsed.answer, "Original: x=1 → Corrected: x = 1");
}

#[test]
fn define_missing_answer_uses_unknowns() {
    let parsed = parse("Hint: h", DEFINE);
    assert_eq!(parsed.answer, "Original: ? → Corrected: ?");
    assert_eq!(parse("", DEFINE).answer, "Original: ? → Corrected: ?");
}
