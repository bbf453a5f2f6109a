//! Question data model: the generation request, the generated question, and
//! the lenient wire shapes the model actually returns.
//!
//! Language models are told to emit one exact schema but routinely drift:
//! options arrive as bare strings or as objects, answers as a single value or
//! a list, marks as numbers or numeric strings. [`RawQuestion`] and
//! [`RawOption`] accept all of those shapes; [`RawQuestion::into_question`]
//! is the single place where they are normalized into [`GeneratedQuestion`].

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

// ── Request ──────────────────────────────────────────────────────────────

/// Immutable input to a generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub topic: String,
    pub subject: String,
    /// Grade or level, e.g. "Class 10" or "JEE Main".
    pub level: String,
    /// Number of questions the caller wants back.
    pub count: usize,
    pub question_type: QuestionType,
    /// Difficulty on a 1–100 scale.
    pub difficulty: u8,
    /// Optional free-text constraints appended to the prompt.
    pub constraints: Option<String>,
}

impl GenerationRequest {
    pub fn new(topic: impl Into<String>, subject: impl Into<String>, count: usize) -> Self {
        Self {
            topic: topic.into(),
            subject: subject.into(),
            level: String::new(),
            count,
            question_type: QuestionType::SingleChoice,
            difficulty: 50,
            constraints: None,
        }
    }

    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn question_type(mut self, kind: QuestionType) -> Self {
        self.question_type = kind;
        self
    }

    pub fn difficulty(mut self, difficulty: u8) -> Self {
        self.difficulty = difficulty.clamp(1, 100);
        self
    }

    pub fn constraints(mut self, constraints: impl Into<String>) -> Self {
        self.constraints = Some(constraints.into());
        self
    }

    /// Clone of this request asking for `count` questions instead.
    pub fn with_count(&self, count: usize) -> Self {
        Self {
            count,
            ..self.clone()
        }
    }

    /// Coarse label for the 1–100 difficulty scale.
    pub fn difficulty_label(&self) -> &'static str {
        match self.difficulty {
            0..=33 => "easy",
            34..=66 => "medium",
            _ => "hard",
        }
    }
}

// ── Question type ────────────────────────────────────────────────────────

/// The five supported question kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    #[default]
    SingleChoice,
    MultiChoice,
    TrueFalse,
    Numeric,
    Descriptive,
}

impl QuestionType {
    pub const ALL: [QuestionType; 5] = [
        QuestionType::SingleChoice,
        QuestionType::MultiChoice,
        QuestionType::TrueFalse,
        QuestionType::Numeric,
        QuestionType::Descriptive,
    ];

    /// Canonical wire name, as used in prompts and serialized output.
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::SingleChoice => "single_choice",
            QuestionType::MultiChoice => "multi_choice",
            QuestionType::TrueFalse => "true_false",
            QuestionType::Numeric => "numeric",
            QuestionType::Descriptive => "descriptive",
        }
    }

    /// Map the many spellings models use onto a question type.
    pub fn from_label(label: &str) -> Option<Self> {
        let key: String = label
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match key.as_str() {
            "singlechoice" | "single" | "mcq" | "scq" | "singlecorrect" => {
                Some(QuestionType::SingleChoice)
            }
            "multichoice" | "multiplechoice" | "multiple" | "msq" | "multiselect"
            | "multiplecorrect" => Some(QuestionType::MultiChoice),
            "truefalse" | "tf" | "boolean" => Some(QuestionType::TrueFalse),
            "numeric" | "numerical" | "integer" | "number" => Some(QuestionType::Numeric),
            "descriptive" | "subjective" | "shortanswer" | "longanswer" | "essay" => {
                Some(QuestionType::Descriptive)
            }
            _ => None,
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QuestionType::from_label(s).ok_or_else(|| {
            format!(
                "unknown question type '{s}' (expected one of: {})",
                QuestionType::ALL.map(|t| t.as_str()).join(", ")
            )
        })
    }
}

// ── Generated question ───────────────────────────────────────────────────

/// One answer option, always in labeled form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub label: String,
    pub text: String,
    #[serde(default)]
    pub has_diagram: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagram: Option<String>,
}

/// A fully-normalized question, ready for persistence by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    /// Assigned locally; any id the model supplied is discarded.
    pub id: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    /// Question text; may contain LaTeX.
    pub question: String,
    pub options: Vec<QuestionOption>,
    pub correct_answers: Vec<String>,
    pub marks: f32,
    pub negative_marks: f32,
    pub explanation: String,
    pub difficulty: String,
    pub topic: String,
    pub subject: String,
    pub tags: Vec<String>,
    pub has_diagram: bool,
}

// ── Lenient wire shapes ──────────────────────────────────────────────────

/// An option as the model returned it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawOption {
    Plain(String),
    Labeled {
        #[serde(default, alias = "id", alias = "key")]
        label: Option<String>,
        #[serde(alias = "content", alias = "value", alias = "option")]
        text: String,
        #[serde(default)]
        diagram: Option<String>,
        #[serde(
            default,
            deserialize_with = "null_as_default",
            alias = "hasDiagram",
            alias = "has_image",
            alias = "hasImage"
        )]
        has_diagram: bool,
    },
    Other(serde_json::Value),
}

impl RawOption {
    /// Normalize into the labeled form; `index` supplies the label when the
    /// model gave none.
    pub fn normalize(self, index: usize) -> QuestionOption {
        match self {
            RawOption::Plain(text) => QuestionOption {
                label: option_label(index),
                text,
                has_diagram: false,
                diagram: None,
            },
            RawOption::Labeled {
                label,
                text,
                diagram,
                has_diagram,
            } => QuestionOption {
                label: label
                    .filter(|l| !l.trim().is_empty())
                    .unwrap_or_else(|| option_label(index)),
                text,
                has_diagram: has_diagram || diagram.is_some(),
                diagram,
            },
            RawOption::Other(value) => QuestionOption {
                label: option_label(index),
                text: value_to_text(&value),
                has_diagram: false,
                diagram: None,
            },
        }
    }
}

/// `A`, `B`, … `Z`, then `27`, `28`, …
pub fn option_label(index: usize) -> String {
    if index < 26 {
        char::from(b'A' + index as u8).to_string()
    } else {
        (index + 1).to_string()
    }
}

/// A value that may be a single item or a list.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    Many(Vec<serde_json::Value>),
    One(serde_json::Value),
    #[default]
    Missing,
}

impl OneOrMany {
    fn into_strings(self) -> Vec<String> {
        match self {
            OneOrMany::Many(values) => values.iter().map(value_to_text).collect(),
            OneOrMany::One(serde_json::Value::Null) | OneOrMany::Missing => Vec::new(),
            OneOrMany::One(value) => vec![value_to_text(&value)],
        }
    }
}

/// A question record as the model returned it. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawQuestion {
    #[serde(rename = "type", alias = "question_type", alias = "questionType")]
    pub kind: Option<String>,
    #[serde(
        deserialize_with = "null_as_default",
        alias = "question_text",
        alias = "questionText",
        alias = "text"
    )]
    pub question: String,
    #[serde(deserialize_with = "null_as_default")]
    pub options: Vec<RawOption>,
    #[serde(
        alias = "correct_answer",
        alias = "correctAnswer",
        alias = "correctAnswers",
        alias = "answer",
        alias = "answers"
    )]
    pub correct_answers: OneOrMany,
    pub marks: Option<serde_json::Value>,
    #[serde(alias = "negativeMarks")]
    pub negative_marks: Option<serde_json::Value>,
    pub explanation: Option<String>,
    pub difficulty: Option<serde_json::Value>,
    pub topic: Option<String>,
    pub subject: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(
        deserialize_with = "null_as_default",
        alias = "hasDiagram",
        alias = "has_image",
        alias = "hasImage"
    )]
    pub has_diagram: bool,
}

impl RawQuestion {
    /// Normalize into a [`GeneratedQuestion`] with a fresh id.
    pub fn into_question(self) -> GeneratedQuestion {
        let options: Vec<QuestionOption> = self
            .options
            .into_iter()
            .enumerate()
            .map(|(i, o)| o.normalize(i))
            .collect();

        let question_type = self
            .kind
            .as_deref()
            .and_then(QuestionType::from_label)
            .unwrap_or(if options.is_empty() {
                QuestionType::Descriptive
            } else {
                QuestionType::SingleChoice
            });

        GeneratedQuestion {
            id: uuid::Uuid::new_v4().to_string(),
            question_type,
            question: self.question,
            options,
            correct_answers: self.correct_answers.into_strings(),
            marks: self.marks.as_ref().and_then(value_to_f32).unwrap_or(1.0),
            negative_marks: self
                .negative_marks
                .as_ref()
                .and_then(value_to_f32)
                .map(f32::abs)
                .unwrap_or(0.0),
            explanation: self.explanation.unwrap_or_default(),
            difficulty: self
                .difficulty
                .as_ref()
                .map(value_to_text)
                .unwrap_or_default(),
            topic: self.topic.unwrap_or_default(),
            subject: self.subject.unwrap_or_default(),
            tags: self.tags,
            has_diagram: self.has_diagram,
        }
    }
}

/// Models emit `null` for fields that do not apply; read it as the default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn value_to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn value_to_f32(value: &serde_json::Value) -> Option<f32> {
    match value {
        serde_json::Value::Number(n) => n.as_f64().map(|f| f as f32),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_and_labeled_options_normalize_to_same_shape() {
        let raw: Vec<RawOption> = serde_json::from_str(
            r#"["2", {"label": "B", "text": "4"}, {"text": "6"}, {"content": "8", "hasImage": true}]"#,
        )
        .unwrap();
        let opts: Vec<QuestionOption> = raw
            .into_iter()
            .enumerate()
            .map(|(i, o)| o.normalize(i))
            .collect();

        assert_eq!(opts[0].label, "A");
        assert_eq!(opts[0].text, "2");
        assert_eq!(opts[1].label, "B");
        assert_eq!(opts[2].label, "C");
        assert_eq!(opts[2].text, "6");
        assert_eq!(opts[3].label, "D");
        assert!(opts[3].has_diagram);
    }

    #[test]
    fn numeric_option_is_kept_as_text() {
        let raw: RawOption = serde_json::from_str("42").unwrap();
        let opt = raw.normalize(0);
        assert_eq!(opt.text, "42");
        assert_eq!(opt.label, "A");
    }

    #[test]
    fn model_id_is_never_trusted() {
        let raw: RawQuestion =
            serde_json::from_str(r#"{"id": "q1", "question": "What is 2+2?"}"#).unwrap();
        let q = raw.into_question();
        assert_ne!(q.id, "q1");
        assert_eq!(q.id.len(), 36);
    }

    #[test]
    fn single_answer_and_string_marks_are_accepted() {
        let raw: RawQuestion = serde_json::from_str(
            r#"{"type": "MCQ", "question": "Pick one", "options": ["x", "y"],
                "correct_answer": "B", "marks": "4", "negativeMarks": -1}"#,
        )
        .unwrap();
        let q = raw.into_question();
        assert_eq!(q.question_type, QuestionType::SingleChoice);
        assert_eq!(q.correct_answers, vec!["B".to_string()]);
        assert_eq!(q.marks, 4.0);
        assert_eq!(q.negative_marks, 1.0);
    }

    #[test]
    fn missing_type_falls_back_on_option_presence() {
        let q = serde_json::from_str::<RawQuestion>(r#"{"question": "Explain osmosis."}"#)
            .unwrap()
            .into_question();
        assert_eq!(q.question_type, QuestionType::Descriptive);
        assert!(q.correct_answers.is_empty());
    }

    #[test]
    fn null_fields_read_as_defaults() {
        let q = serde_json::from_str::<RawQuestion>(
            r#"{"type": "numeric", "question": "Find g on Mars.", "options": null,
                "tags": null, "has_diagram": null, "explanation": null}"#,
        )
        .unwrap()
        .into_question();
        assert_eq!(q.question_type, QuestionType::Numeric);
        assert!(q.options.is_empty());
        assert!(q.tags.is_empty());
        assert!(!q.has_diagram);
        assert_eq!(q.explanation, "");

        let opt: RawOption =
            serde_json::from_str(r#"{"label": "A", "text": "3.7", "has_diagram": null}"#).unwrap();
        let opt = opt.normalize(0);
        assert_eq!(opt.text, "3.7");
        assert!(!opt.has_diagram);
    }

    #[test]
    fn question_type_labels() {
        assert_eq!(QuestionType::from_label("Multiple Choice"), Some(QuestionType::MultiChoice));
        assert_eq!(QuestionType::from_label("true/false"), Some(QuestionType::TrueFalse));
        assert_eq!(QuestionType::from_label("integer"), Some(QuestionType::Numeric));
        assert_eq!(QuestionType::from_label("matrix-match"), None);
        assert!("bogus".parse::<QuestionType>().is_err());
        assert_eq!("single-choice".parse::<QuestionType>(), Ok(QuestionType::SingleChoice));
    }

    #[test]
    fn difficulty_labels() {
        let r = GenerationRequest::new("Optics", "Physics", 5);
        assert_eq!(r.clone().difficulty(10).difficulty_label(), "easy");
        assert_eq!(r.clone().difficulty(50).difficulty_label(), "medium");
        assert_eq!(r.difficulty(250).difficulty_label(), "hard");
    }

    #[test]
    fn option_labels_past_z() {
        assert_eq!(option_label(0), "A");
        assert_eq!(option_label(25), "Z");
        assert_eq!(option_label(26), "27");
    }
}
