// ============================================================
// Layer 4 — Dataset Loader (jtr JSON format)
// ============================================================
// Reads a jtr-format JSON file into (QaSetting, Vec<Answer>) pairs.
//
// File shape:
//   {
//     "meta":      "...",                         (ignored)
//     "globals":   { "candidates": [...] },       (optional)
//     "instances": [
//       {
//         "id":        "q1",                      (optional)
//         "support":   ["passage", {"text": "passage"}, ...],
//         "questions": [
//           {
//             "question":   "text" | {"text": "..."},
//             "candidates": [...],                (optional)
//             "answers":    ["text" | {"text", "span": [s, e], "support_idx"}]
//           }
//         ]
//       }
//     ]
//   }
//
// Each question becomes one example; order follows the file and
// nothing is shuffled here. Spans are character offsets [s, e)
// into the referenced support passage and are validated on load.

use std::{fs, path::{Path, PathBuf}};

use serde::Deserialize;

use crate::domain::qa_setting::{Answer, Example, QaSetting};
use crate::domain::traits::DatasetSource;
use crate::error::{ReaderError, Result};

// ─── File schema ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct JtrFile {
    #[serde(default)]
    globals:   Option<Globals>,
    instances: Vec<Instance>,
}

#[derive(Debug, Default, Deserialize)]
struct Globals {
    #[serde(default)]
    candidates: Vec<TextField>,
}

#[derive(Debug, Deserialize)]
struct Instance {
    #[serde(default)]
    id:        Option<serde_json::Value>,
    #[serde(default)]
    support:   Vec<TextField>,
    questions: Vec<QuestionEntry>,
}

#[derive(Debug, Deserialize)]
struct QuestionEntry {
    question:   TextField,
    #[serde(default)]
    candidates: Vec<TextField>,
    #[serde(default)]
    answers:    Vec<AnswerEntry>,
}

/// Texts appear either bare or wrapped in an object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TextField {
    Text(String),
    Object { text: String },
}

impl TextField {
    fn into_text(self) -> String {
        match self {
            TextField::Text(t) | TextField::Object { text: t } => t,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AnswerEntry {
    Text(String),
    Object {
        text:        String,
        #[serde(default)]
        span:        Option<[usize; 2]>,
        #[serde(default, alias = "support")]
        support_idx: usize,
    },
}

// ─── Loader ───────────────────────────────────────────────────────────────────

/// Loads a jtr JSON dataset. `max_count` keeps only the first N
/// examples (debug runs).
pub struct JtrLoader {
    path:      PathBuf,
    max_count: Option<usize>,
}

impl JtrLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), max_count: None }
    }

    pub fn with_max_count(mut self, max_count: Option<usize>) -> Self {
        self.max_count = max_count;
        self
    }
}

impl DatasetSource for JtrLoader {
    fn load_all(&self) -> Result<Vec<Example>> {
        load_jtr(&self.path, self.max_count)
    }
}

/// Read `path` and convert every question into an example.
pub fn load_jtr(path: impl AsRef<Path>, max_count: Option<usize>) -> Result<Vec<Example>> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| ReaderError::io(path, e))?;
    let json = String::from_utf8(bytes).map_err(|e| {
        let at = e.utf8_error().valid_up_to();
        let line = 1 + e.as_bytes()[..at].iter().filter(|&&b| b == b'\n').count();
        ReaderError::format(path, format!("line {line}: invalid UTF-8 at byte {at}"))
    })?;
    let file: JtrFile = serde_json::from_str(&json)
        .map_err(|e| ReaderError::format(path, format!("schema mismatch: {e}")))?;

    let global_candidates: Vec<String> = file
        .globals
        .unwrap_or_default()
        .candidates
        .into_iter()
        .map(TextField::into_text)
        .collect();

    let limit = max_count.unwrap_or(usize::MAX);
    let mut examples = Vec::new();

    'instances: for (i, instance) in file.instances.into_iter().enumerate() {
        let support: Vec<String> = instance.support.into_iter().map(TextField::into_text).collect();
        let id = instance.id.map(|v| match v {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });

        for question in instance.questions {
            if examples.len() >= limit {
                break 'instances;
            }

            let candidates = if question.candidates.is_empty() {
                global_candidates.clone()
            } else {
                question.candidates.into_iter().map(TextField::into_text).collect()
            };

            let answers = question
                .answers
                .into_iter()
                .map(|a| convert_answer(path, i, &support, a))
                .collect::<Result<Vec<_>>>()?;

            let mut setting = QaSetting::new(question.question.into_text(), support.clone())
                .with_candidates(candidates);
            if let Some(id) = &id {
                setting = setting.with_id(id.clone());
            }
            examples.push((setting, answers));
        }
    }

    tracing::info!("Loaded {} examples from '{}'", examples.len(), path.display());
    Ok(examples)
}

fn convert_answer(path: &Path, instance: usize, support: &[String], entry: AnswerEntry) -> Result<Answer> {
    match entry {
        AnswerEntry::Text(text) => Ok(Answer::label(text, 1.0)),
        AnswerEntry::Object { text, span: None, support_idx } => {
            let mut answer = Answer::label(text, 1.0);
            answer.support_idx = support_idx;
            Ok(answer)
        }
        AnswerEntry::Object { text, span: Some([start, end]), support_idx } => {
            let passage = support.get(support_idx).ok_or_else(|| {
                ReaderError::format(
                    path,
                    format!("instance {instance}: answer '{text}' refers to missing support {support_idx}"),
                )
            })?;
            let passage_len = passage.chars().count();
            if start > end || end > passage_len {
                return Err(ReaderError::format(
                    path,
                    format!(
                        "instance {instance}: span [{start}, {end}) of '{text}' is outside \
                         a passage of {passage_len} characters"
                    ),
                ));
            }
            Ok(Answer::span(text, start, end, support_idx, 1.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("data").join(name)
    }

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_squad_fixture_keeps_file_order_and_spans() {
        let examples = load_jtr(fixture("squad_snippet.json"), None).unwrap();
        assert_eq!(examples.len(), 5);
        assert_eq!(examples[0].0.id.as_deref(), Some("q1"));
        assert_eq!(examples[4].0.id.as_deref(), Some("q5"));

        for (setting, answers) in &examples {
            let answer = &answers[0];
            let (s, e) = answer.span.unwrap();
            let passage: String = setting.support[0].chars().skip(s).take(e - s).collect();
            assert_eq!(passage, answer.text);
        }
    }

    #[test]
    fn test_global_candidates_apply_to_every_question() {
        let examples = load_jtr(fixture("snli_snippet.json"), None).unwrap();
        assert_eq!(examples.len(), 6);
        for (setting, answers) in &examples {
            assert_eq!(setting.candidates, vec!["entailment", "neutral", "contradiction"]);
            assert_eq!(setting.support.len(), 1);
            assert!(setting.candidates.contains(&answers[0].text));
        }
    }

    #[test]
    fn test_max_count_truncates() {
        let examples = load_jtr(fixture("squad_snippet.json"), Some(2)).unwrap();
        assert_eq!(examples.len(), 2);
    }

    #[test]
    fn test_multiple_questions_per_instance() {
        let file = write_temp(
            r#"{"instances": [{"id": 7, "support": ["abc def"], "questions": [
                {"question": "first?", "answers": ["abc"]},
                {"question": {"text": "second?"}, "candidates": ["x", "y"]}
            ]}]}"#,
        );
        let examples = load_jtr(file.path(), None).unwrap();
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].0.id.as_deref(), Some("7"));
        assert_eq!(examples[1].0.question, "second?");
        assert_eq!(examples[1].0.candidates, vec!["x", "y"]);
        assert!(examples[1].1.is_empty());
    }

    #[test]
    fn test_schema_mismatch_is_format_error() {
        let file = write_temp(r#"{"data": []}"#);
        assert!(matches!(load_jtr(file.path(), None), Err(ReaderError::Format { .. })));
    }

    #[test]
    fn test_span_outside_passage_is_format_error() {
        let file = write_temp(
            r#"{"instances": [{"support": ["short"], "questions": [
                {"question": "q", "answers": [{"text": "x", "span": [2, 40]}]}
            ]}]}"#,
        );
        assert!(matches!(load_jtr(file.path(), None), Err(ReaderError::Format { .. })));
    }

    #[test]
    fn test_invalid_utf8_is_format_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{\"instances\": [\xff\xfe]}").unwrap();
        match load_jtr(file.path(), None) {
            Err(ReaderError::Format { message, .. }) => assert!(message.starts_with("line 1"), "{message}"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_missing_dataset_file() {
        assert!(matches!(
            JtrLoader::new("nope.json").load_all(),
            Err(ReaderError::FileNotFound(_))
        ));
    }
}
