// ============================================================
// Layer 3 — QA / NLI Examples
// ============================================================
// One input setting shared by both tasks:
//
//   extractive QA:  question = the question,
//                   support  = passages that contain the answer
//   NLI:            question = the hypothesis,
//                   support  = [the premise],
//                   candidates = the label set
//
// An Answer is both a gold label (from the dataset) and a
// prediction (from a reader). For QA it carries a character span
// into support[support_idx]; for NLI the text is the label.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaSetting {
    pub question:   String,
    pub support:    Vec<String>,
    #[serde(default)]
    pub candidates: Vec<String>,
    #[serde(default)]
    pub id:         Option<String>,
}

impl QaSetting {
    pub fn new(question: impl Into<String>, support: Vec<String>) -> Self {
        Self {
            question:   question.into(),
            support,
            candidates: Vec::new(),
            id:         None,
        }
    }

    pub fn with_candidates(mut self, candidates: Vec<String>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text:        String,
    /// Character offsets [start, end) into `support[support_idx]`.
    #[serde(default)]
    pub span:        Option<(usize, usize)>,
    #[serde(default)]
    pub support_idx: usize,
    #[serde(default = "default_score")]
    pub score:       f32,
}

fn default_score() -> f32 {
    1.0
}

impl Answer {
    /// A label answer (NLI) or a free-text answer without a span.
    pub fn label(text: impl Into<String>, score: f32) -> Self {
        Self { text: text.into(), span: None, support_idx: 0, score }
    }

    pub fn span(
        text:        impl Into<String>,
        start:       usize,
        end:         usize,
        support_idx: usize,
        score:       f32,
    ) -> Self {
        Self { text: text.into(), span: Some((start, end)), support_idx, score }
    }
}

/// An input paired with its expected outputs (possibly none).
pub type Example = (QaSetting, Vec<Answer>);

/// Sort answers by descending score; ties keep their input order.
pub fn rank_answers(answers: &mut [Answer]) {
    answers.sort_by(|a, b| b.score.total_cmp(&a.score));
}
