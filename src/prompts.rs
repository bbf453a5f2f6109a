//! Prompts for question generation.
//!
//! The prompt is a pure function of the request (plus, for top-up batches,
//! the avoid-list), so two batches for the same request differ only in the
//! count they ask for. The schema block spells out every field name and the
//! allowed `type` values so the reply can be parsed without guesswork; the
//! repair chain in [`crate::pipeline::repair`] handles what the model still
//! gets wrong.

use crate::question::{GenerationRequest, QuestionType};

/// System instruction sent with every generation call.
pub const SYSTEM_PROMPT: &str = "You are an experienced examiner who writes original, \
unambiguous exam questions. You reply with a JSON array only: no prose, no markdown fences.";

/// Fixed description of the reply format.
pub const SCHEMA_DESCRIPTION: &str = r#"Return a JSON array. Each element is an object with exactly these fields:
  "type":            one of "single_choice", "multi_choice", "true_false", "numeric", "descriptive"
  "question":        the question text; write mathematics in LaTeX and escape every backslash as \\ (e.g. "\\frac{1}{2}")
  "options":         array of {"label": "A", "text": "...", "has_diagram": false}; empty for numeric and descriptive
  "correct_answers": array of option labels (choice questions), ["True"] or ["False"], or the numeric value as a string
  "marks":           positive number
  "negative_marks":  non-negative number deducted for a wrong answer
  "explanation":     worked solution
  "difficulty":      "easy", "medium" or "hard"
  "topic":           string
  "subject":         string
  "tags":            array of short strings
  "has_diagram":     true only if the question cannot be answered without a figure

Example element:
{"type": "single_choice", "question": "What is $\\sqrt{49}$?", "options": [{"label": "A", "text": "6", "has_diagram": false}, {"label": "B", "text": "7", "has_diagram": false}, {"label": "C", "text": "8", "has_diagram": false}, {"label": "D", "text": "9", "has_diagram": false}], "correct_answers": ["B"], "marks": 4, "negative_marks": 1, "explanation": "$7^2 = 49$.", "difficulty": "easy", "topic": "Square roots", "subject": "Mathematics", "tags": ["arithmetic"], "has_diagram": false}"#;

/// Per-type guidance appended after the request line.
fn type_guidance(kind: QuestionType) -> &'static str {
    match kind {
        QuestionType::SingleChoice => "Every question has four options and exactly one correct option.",
        QuestionType::MultiChoice => {
            "Every question has four options and one or more correct options; list every correct label."
        }
        QuestionType::TrueFalse => {
            "Every question is a statement to judge; options are \"True\" and \"False\"."
        }
        QuestionType::Numeric => {
            "Every answer is a single number; give no options and put the value in correct_answers."
        }
        QuestionType::Descriptive => {
            "Every question needs a written answer; give no options and put a model answer in explanation."
        }
    }
}

/// Build the user prompt for one batch.
///
/// `avoid` holds snippets of already-accepted questions; when non-empty the
/// prompt asks the model not to repeat them.
pub fn generation_prompt(request: &GenerationRequest, avoid: &[String]) -> String {
    let mut prompt = format!(
        "Write {count} {kind} questions on the topic \"{topic}\" in {subject}",
        count = request.count,
        kind = request.question_type,
        topic = request.topic,
        subject = request.subject,
    );
    if !request.level.trim().is_empty() {
        prompt.push_str(&format!(" for {}", request.level.trim()));
    }
    prompt.push_str(&format!(
        ".\nDifficulty: {}/100 ({}).\n{}\n",
        request.difficulty,
        request.difficulty_label(),
        type_guidance(request.question_type)
    ));

    if let Some(constraints) = request.constraints.as_deref() {
        if !constraints.trim().is_empty() {
            prompt.push_str(&format!("Additional constraints: {}\n", constraints.trim()));
        }
    }

    if !avoid.is_empty() {
        prompt.push_str("\nDo NOT repeat or paraphrase any of these existing questions:\n");
        for snippet in avoid {
            prompt.push_str(&format!("- {snippet}\n"));
        }
    }

    prompt.push('\n');
    prompt.push_str(SCHEMA_DESCRIPTION);
    prompt
}

/// First `max_chars` characters of a question, for the avoid-list.
pub fn question_snippet(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => trimmed[..idx].to_string(),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GenerationRequest {
        GenerationRequest::new("Kinematics", "Physics", 7)
            .level("Class 11")
            .difficulty(80)
    }

    #[test]
    fn prompt_is_deterministic() {
        let r = request();
        assert_eq!(generation_prompt(&r, &[]), generation_prompt(&r, &[]));
    }

    #[test]
    fn prompt_carries_request_fields_and_schema() {
        let p = generation_prompt(&request().constraints("SI units only"), &[]);
        assert!(p.contains("Write 7 single_choice questions"));
        assert!(p.contains("\"Kinematics\""));
        assert!(p.contains("for Class 11"));
        assert!(p.contains("80/100 (hard)"));
        assert!(p.contains("Additional constraints: SI units only"));
        assert!(p.contains("\"correct_answers\""));
        assert!(!p.contains("Do NOT repeat"));
    }

    #[test]
    fn prompt_lists_avoided_questions() {
        let p = generation_prompt(&request(), &["A ball is thrown".into(), "A car accelerates".into()]);
        assert!(p.contains("Do NOT repeat"));
        assert!(p.contains("- A ball is thrown\n"));
        assert!(p.contains("- A car accelerates\n"));
    }

    #[test]
    fn snippet_respects_char_boundaries() {
        assert_eq!(question_snippet("  héllo wörld  ", 5), "héllo");
        assert_eq!(question_snippet("short", 50), "short");
    }
}
