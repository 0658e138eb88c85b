//! Parsing of generated quiz batches.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use orbit_telegram::adapter::truncate_chars;
use orbit_telegram::PollMessage;

pub const OPTION_COUNT: usize = 4;
const QUESTION_MAX: usize = 250;
const OPTION_MAX: usize = 100;
const EXPLANATION_MAX: usize = 200;

/// One validated multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_index: u8,
    pub explanation: String,
}

impl QuizQuestion {
    /// Poll for question `position` (1-based) of `total`, labelled `[i/n]`.
    pub fn to_poll(&self, position: usize, total: usize) -> PollMessage {
        let question = format!("[{position}/{total}] {}", self.question);
        PollMessage::quiz(&question, &self.options, self.correct_index, &self.explanation)
    }
}

#[derive(Deserialize)]
struct RawQuestion {
    question: String,
    options: Vec<String>,
    #[serde(alias = "correct_option_id", alias = "correct_index")]
    correct_id: i64,
    #[serde(default)]
    explanation: String,
}

impl RawQuestion {
    fn validate(self) -> Result<QuizQuestion, String> {
        let question = self.question.trim();
        if question.is_empty() {
            return Err("empty question".into());
        }
        if self.options.len() != OPTION_COUNT {
            return Err(format!("expected {OPTION_COUNT} options, got {}", self.options.len()));
        }
        let correct_index = u8::try_from(self.correct_id)
            .ok()
            .filter(|i| usize::from(*i) < OPTION_COUNT)
            .ok_or_else(|| format!("correct option {} out of range", self.correct_id))?;
        Ok(QuizQuestion {
            question: truncate_chars(question, QUESTION_MAX),
            options: self
                .options
                .iter()
                .map(|o| truncate_chars(o.trim(), OPTION_MAX))
                .collect(),
            correct_index,
            explanation: truncate_chars(self.explanation.trim(), EXPLANATION_MAX),
        })
    }
}

/// Remove Markdown code fences the model wraps JSON in.
fn strip_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

/// Parse a generated batch.
///
/// The body must be JSON: a list of question objects, or a single object
/// treated as a one-element list. Malformed entries are dropped individually;
/// only an unparseable body is an error.
pub fn parse_batch(text: &str) -> Result<Vec<QuizQuestion>, serde_json::Error> {
    let items = match serde_json::from_str::<Value>(&strip_fences(text))? {
        Value::Array(items) => items,
        other => vec![other],
    };

    let mut questions = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let parsed = serde_json::from_value::<RawQuestion>(item)
            .map_err(|e| e.to_string())
            .and_then(RawQuestion::validate);
        match parsed {
            Ok(q) => questions.push(q),
            Err(reason) => warn!(index = i, %reason, "dropping malformed quiz question"),
        }
    }
    Ok(questions)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = r#"{"question": "First-line for absence seizures?", "options": ["Ethosuximide","Phenytoin","Carbamazepine","Gabapentin"], "correct_id": 0, "explanation": "T-type Ca2+ blocker."}"#;

    #[test]
    fn parses_fenced_list() {
        let text = format!("```json\n[{GOOD}, {GOOD}]\n```");
        let qs = parse_batch(&text).unwrap();
        assert_eq!(qs.len(), 2);
        assert_eq!(qs[0].options[0], "Ethosuximide");
        assert_eq!(qs[0].correct_index, 0);
    }

    #[test]
    fn single_object_is_one_element_list() {
        let qs = parse_batch(GOOD).unwrap();
        assert_eq!(qs.len(), 1);
        assert_eq!(qs[0].explanation, "T-type Ca2+ blocker.");
    }

    #[test]
    fn malformed_entries_are_dropped_individually() {
        let text = format!(
            r#"[
                {GOOD},
                {{"question": "Three options", "options": ["a","b","c"], "correct_id": 0, "explanation": ""}},
                {{"question": "Bad index", "options": ["a","b","c","d"], "correct_id": 4, "explanation": ""}},
                {{"question": "Negative", "options": ["a","b","c","d"], "correct_id": -1}},
                {{"options": ["a","b","c","d"], "correct_id": 1}},
                "not an object",
                {{"question": "Alias", "options": ["a","b","c","d"], "correct_option_id": 3}}
            ]"#
        );
        let qs = parse_batch(&text).unwrap();
        assert_eq!(qs.len(), 2);
        assert_eq!(qs[1].question, "Alias");
        assert_eq!(qs[1].correct_index, 3);
        assert_eq!(qs[1].explanation, "");
    }

    #[test]
    fn garbage_body_is_an_error() {
        assert!(parse_batch("Sure! Here are your questions:").is_err());
    }

    #[test]
    fn fields_are_truncated() {
        let long = "q".repeat(400);
        let text = format!(
            r#"{{"question": "{long}", "options": ["{long}","b","c","d"], "correct_id": 1, "explanation": "{long}"}}"#
        );
        let q = &parse_batch(&text).unwrap()[0];
        assert_eq!(q.question.chars().count(), QUESTION_MAX);
        assert_eq!(q.options[0].chars().count(), OPTION_MAX);
        assert_eq!(q.explanation.chars().count(), EXPLANATION_MAX);
    }

    #[test]
    fn poll_is_labelled_with_position() {
        let q = &parse_batch(GOOD).unwrap()[0];
        let poll = q.to_poll(2, 3);
        assert_eq!(poll.question, "[2/3] First-line for absence seizures?");
        assert_eq!(poll.options.len(), OPTION_COUNT);
        assert_eq!(poll.correct_index, 0);
    }
}
