//! Response repair: recover a question array from a model's free-text reply.
//!
//! The model is asked for strict JSON, but question text legitimately holds
//! LaTeX with single backslashes (`\frac`, `\alpha`, `\,`), which is invalid
//! JSON escaping. Models also wrap replies in code fences or add a sentence
//! of preamble. The reply is therefore parsed through an ordered chain of
//! repair strategies:
//!
//! 1. direct parse of the `[` … `]` slice
//! 2. escape every backslash that does not start a valid JSON escape
//! 3. escape every backslash, then restore the escapes that were valid
//! 4. double-escape a fixed list of LaTeX command names
//!
//! Each strategy is a pure `&str → String` function, tried only if every
//! earlier one failed to parse. Strategy 2 can turn `\frac` into a form-feed
//! followed by `rac` because `\f` is a valid escape; it still wins when it
//! parses, since the chain stops at the first success.

use crate::error::ParseError;
use crate::question::{GeneratedQuestion, RawQuestion};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// One repair step.
pub struct RepairStrategy {
    pub name: &'static str,
    pub apply: fn(&str) -> String,
}

/// The chain, in the order it is tried.
pub const STRATEGIES: [RepairStrategy; 4] = [
    RepairStrategy {
        name: "direct",
        apply: str::to_string,
    },
    RepairStrategy {
        name: "escape-stray-backslashes",
        apply: escape_stray_backslashes,
    },
    RepairStrategy {
        name: "escape-all-restore-valid",
        apply: escape_all_restore_valid,
    },
    RepairStrategy {
        name: "double-escape-latex",
        apply: double_escape_latex_commands,
    },
];

/// Parse a model reply into questions with fresh ids and labeled options.
///
/// Array elements that are not question-shaped are dropped with a warning;
/// the call only fails if no strategy yields a JSON array.
pub fn parse_questions(reply: &str) -> Result<Vec<GeneratedQuestion>, ParseError> {
    let (records, strategy) = parse_records(reply)?;
    let total = records.len();

    let questions: Vec<GeneratedQuestion> = records
        .into_iter()
        .enumerate()
        .filter_map(|(i, record)| match serde_json::from_value::<RawQuestion>(record) {
            Ok(raw) if !raw.question.trim().is_empty() => Some(raw.into_question()),
            Ok(_) => {
                warn!("Dropping record {i}: empty question text");
                None
            }
            Err(e) => {
                warn!("Dropping record {i}: {e}");
                None
            }
        })
        .collect();

    debug!(
        "Parsed {}/{} records via '{}' strategy",
        questions.len(),
        total,
        strategy
    );
    Ok(questions)
}

/// Run the repair chain; return the array elements and the winning strategy.
pub fn parse_records(reply: &str) -> Result<(Vec<serde_json::Value>, &'static str), ParseError> {
    let slice = extract_array(reply).ok_or(ParseError::NoArray)?;

    let mut first_error: Option<serde_json::Error> = None;
    for strategy in &STRATEGIES {
        let candidate = (strategy.apply)(&slice);
        match serde_json::from_str::<serde_json::Value>(&candidate) {
            Ok(serde_json::Value::Array(items)) => return Ok((items, strategy.name)),
            Ok(_) => return Err(ParseError::NotAnArray),
            Err(e) => {
                debug!("Repair strategy '{}' failed: {}", strategy.name, e);
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(source) => Err(ParseError::Invalid {
            attempts: STRATEGIES.len(),
            source,
        }),
        None => Err(ParseError::NoArray),
    }
}

// ── Step 0: strip fences and slice ───────────────────────────────────────

static RE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[A-Za-z]*").unwrap());

/// Remove code-fence markers and slice from the first `[` to the last `]`.
pub fn extract_array(reply: &str) -> Option<String> {
    let stripped = RE_FENCE.replace_all(reply, "");
    let start = stripped.find('[')?;
    let end = stripped.rfind(']')?;
    if end < start {
        return None;
    }
    Some(stripped[start..=end].to_string())
}

// ── Step 2: escape stray backslashes ─────────────────────────────────────

const JSON_ESCAPES: &str = "\"\\/bfnrtu";

/// Double every backslash that is not followed by a valid JSON escape character.
pub fn escape_stray_backslashes(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 16);
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some(&next) if JSON_ESCAPES.contains(next) => {
                out.push('\\');
                out.push(next);
                chars.next();
            }
            _ => out.push_str("\\\\"),
        }
    }
    out
}

// ── Step 3: escape all, restore valid ────────────────────────────────────

/// Sequences restored after blanket escaping: quote, backslash, slash,
/// newline, tab, carriage return, backspace, form feed.
const RESTORED: [(&str, &str); 8] = [
    ("\\\\\"", "\\\""),
    ("\\\\\\\\", "\\\\"),
    ("\\\\/", "\\/"),
    ("\\\\n", "\\n"),
    ("\\\\t", "\\t"),
    ("\\\\r", "\\r"),
    ("\\\\b", "\\b"),
    ("\\\\f", "\\f"),
];

/// Double every backslash, then un-double the escapes that were already valid.
pub fn escape_all_restore_valid(input: &str) -> String {
    let mut out = input.replace('\\', "\\\\");
    for (escaped, original) in RESTORED {
        out = out.replace(escaped, original);
    }
    out
}

// ── Step 4: LaTeX command names ──────────────────────────────────────────

/// LaTeX commands that most often appear unescaped in model output.
pub const LATEX_COMMANDS: &[&str] = &[
    "frac", "dfrac", "sqrt", "times", "div", "cdot", "pm", "mp", "le", "leq", "ge", "geq",
    "neq", "ne", "approx", "equiv", "infty", "sum", "prod", "int", "oint", "lim", "log", "ln",
    "sin", "cos", "tan", "sec", "csc", "cot", "alpha", "beta", "gamma", "delta", "Delta",
    "epsilon", "theta", "lambda", "mu", "nu", "pi", "rho", "sigma", "Sigma", "tau", "phi",
    "omega", "Omega", "vec", "hat", "bar", "overline", "underline", "text", "mathrm",
    "mathbf", "left", "right", "circ", "degree", "angle", "triangle", "parallel", "perp",
    "rightarrow", "leftarrow", "Rightarrow", "implies", "in", "notin", "subset", "cup",
    "cap", "partial", "nabla", "binom", "begin", "end",
];

static RE_LATEX: Lazy<Regex> = Lazy::new(|| {
    let alternatives = LATEX_COMMANDS.join("|");
    Regex::new(&format!(r"(^|[^\\])\\({alternatives})\b")).unwrap()
});

/// Double the backslash in front of known LaTeX commands, leaving
/// already-escaped ones alone.
pub fn double_escape_latex_commands(input: &str) -> String {
    // Two passes: adjacent commands (`\alpha\beta`) share the separating
    // character, so the second match is only found on a re-scan.
    let once = RE_LATEX.replace_all(input, r"${1}\\${2}");
    RE_LATEX.replace_all(&once, r"${1}\\${2}").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_reply_with_preamble_is_sliced() {
        let reply = "Here you go:\n```json\n[{\"question\": \"What is 2+2?\"}]\n```\nGood luck!";
        assert_eq!(
            extract_array(reply).unwrap(),
            "[{\"question\": \"What is 2+2?\"}]"
        );
    }

    #[test]
    fn reply_without_array_fails() {
        assert!(matches!(parse_records("no json here"), Err(ParseError::NoArray)));
        assert!(matches!(parse_records("] backwards ["), Err(ParseError::NoArray)));
    }

    #[test]
    fn valid_json_parses_directly() {
        let (items, strategy) = parse_records(r#"[{"question": "a"}, {"question": "b"}]"#).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(strategy, "direct");
    }

    #[test]
    fn records_with_null_fields_are_kept() {
        let reply = r#"[{"question": "Define velocity.", "options": null, "tags": null},
                        {"question": "Define speed.", "has_diagram": null}]"#;
        let questions = parse_questions(reply).unwrap();
        assert_eq!(questions.len(), 2);
        assert!(questions[0].options.is_empty());
        assert!(!questions[1].has_diagram);
    }

    #[test]
    fn unescaped_latex_is_recovered() {
        let reply = r#"[{"question": "Evaluate $\int_0^1 x\,dx$", "options": ["\alpha", "1/2"]}]"#;
        assert!(serde_json::from_str::<serde_json::Value>(reply).is_err());

        let (items, strategy) = parse_records(reply).unwrap();
        assert_ne!(strategy, "direct");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["question"], r"Evaluate $\int_0^1 x\,dx$");
        assert_eq!(items[0]["options"][0], r"\alpha");
    }

    #[test]
    fn stray_backslash_escaping_keeps_valid_escapes() {
        assert_eq!(escape_stray_backslashes(r#"a\"b\nc\alpha"#), r#"a\"b\nc\\alpha"#);
        assert_eq!(escape_stray_backslashes(r"\\"), r"\\");
        assert_eq!(escape_stray_backslashes(r"end\"), r"end\\");
    }

    #[test]
    fn invalid_unicode_escape_needs_blanket_strategy() {
        let reply = r#"[{"question": "Find \underline{x}"}]"#;
        assert!(serde_json::from_str::<serde_json::Value>(&escape_stray_backslashes(reply)).is_err());

        let (items, strategy) = parse_records(reply).unwrap();
        assert_eq!(strategy, "escape-all-restore-valid");
        assert_eq!(items[0]["question"], r"Find \underline{x}");
    }

    #[test]
    fn blanket_escaping_restores_valid_sequences() {
        assert_eq!(escape_all_restore_valid(r#"say \"hi\"\n"#), r#"say \"hi\"\n"#);
        assert_eq!(escape_all_restore_valid(r"\sqrt{2}"), r"\\sqrt{2}");
        assert_eq!(escape_all_restore_valid(r"a\/b\tc"), r"a\/b\tc");
    }

    #[test]
    fn latex_commands_are_double_escaped_once() {
        assert_eq!(double_escape_latex_commands(r"\frac{1}{2}"), r"\\frac{1}{2}");
        assert_eq!(double_escape_latex_commands(r"\\frac{1}{2}"), r"\\frac{1}{2}");
        assert_eq!(double_escape_latex_commands(r"$\alpha\beta$"), r"$\\alpha\\beta$");
        // Unknown commands and prefixes of longer words are left alone.
        assert_eq!(double_escape_latex_commands(r"\foo \pix"), r"\foo \pix");
    }

    #[test]
    fn hopeless_reply_names_original_failure() {
        let err = parse_records(r#"[{"question": "unterminated}]"#).unwrap_err();
        match err {
            ParseError::Invalid { attempts, source } => {
                assert_eq!(attempts, 4);
                assert!(source.is_eof() || source.is_syntax());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parse_questions_assigns_ids_and_drops_junk() {
        let reply = r#"[
            {"id": "model-1", "type": "single_choice", "question": "Which is prime?",
             "options": ["4", "6", "7", "9"], "correct_answers": ["C"]},
            "not a question",
            {"question": "   "},
            {"question": "Define velocity.", "type": "descriptive"}
        ]"#;
        let qs = parse_questions(reply).unwrap();
        assert_eq!(qs.len(), 2);
        assert_ne!(qs[0].id, "model-1");
        assert_ne!(qs[0].id, qs[1].id);
        assert_eq!(qs[0].options[2].label, "C");
        assert_eq!(qs[0].options[2].text, "7");
    }
}
