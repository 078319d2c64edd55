// ============================================================
// Layer 2 — Evaluation
// ============================================================
// Scores a reader's top prediction against the gold answers of a
// dev or test set.
//
//   Extractive QA:  exact match and token F1 (SQuAD normalisation:
//                   lowercase, drop punctuation and articles),
//                   best over all gold answers
//   NLI:            accuracy and macro-averaged F1 over labels
//
// Examples without gold answers are not scored.
//
// EvalHook runs the same scoring from inside the training loop on
// the weights of every Nth epoch, logs it and optionally appends it
// to the metrics CSV.

use std::{
    cell::RefCell,
    collections::{BTreeSet, HashMap},
    fmt,
    rc::Rc,
};

use anyhow::Result;

use crate::domain::{
    qa_setting::{Answer, Example, QaSetting},
    traits::{Predictor, ReaderKind, TrainingHook},
};
use crate::infra::metrics::MetricsCsv;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QaMetrics {
    pub exact_match: f64,
    pub f1:          f64,
    pub count:       usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NliMetrics {
    pub accuracy: f64,
    pub macro_f1: f64,
    pub count:    usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EvalReport {
    Qa(QaMetrics),
    Nli(NliMetrics),
}

impl fmt::Display for EvalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalReport::Qa(m) => write!(
                f,
                "exact_match={:.2}% f1={:.2}% ({} examples)",
                m.exact_match * 100.0,
                m.f1 * 100.0,
                m.count
            ),
            EvalReport::Nli(m) => write!(
                f,
                "accuracy={:.2}% macro_f1={:.2}% ({} examples)",
                m.accuracy * 100.0,
                m.macro_f1 * 100.0,
                m.count
            ),
        }
    }
}

impl EvalReport {
    /// (name, value) pairs, as written to the metrics CSV.
    pub fn metrics(&self) -> Vec<(&'static str, f64)> {
        match self {
            EvalReport::Qa(m)  => vec![("exact_match", m.exact_match), ("f1", m.f1)],
            EvalReport::Nli(m) => vec![("accuracy", m.accuracy), ("macro_f1", m.macro_f1)],
        }
    }
}

/// Run `reader` over `dataset` in chunks of `batch_size` and score it.
pub fn evaluate<P>(reader: &P, dataset: &[Example], batch_size: usize) -> Result<EvalReport>
where
    P: Predictor + ?Sized,
{
    let labelled: Vec<&Example> = dataset.iter().filter(|(_, answers)| !answers.is_empty()).collect();

    let mut pairs: Vec<(Option<String>, &[Answer])> = Vec::with_capacity(labelled.len());
    for chunk in labelled.chunks(batch_size.max(1)) {
        let inputs: Vec<QaSetting> = chunk.iter().map(|(q, _)| q.clone()).collect();
        let predictions = reader.predict(&inputs)?;
        for ((_, gold), predicted) in chunk.iter().zip(predictions) {
            let top = predicted.into_iter().next().map(|a| a.text);
            pairs.push((top, gold.as_slice()));
        }
    }

    Ok(match reader.reader_kind() {
        ReaderKind::FastQa                => EvalReport::Qa(score_qa(&pairs)),
        ReaderKind::DecomposableAttention => EvalReport::Nli(score_nli(&pairs)),
    })
}

// ─── EvalHook ─────────────────────────────────────────────────────────────────

/// Every report an EvalHook produced, by epoch. Clones share one
/// record, so keep one before boxing the hook.
#[derive(Debug, Clone, Default)]
pub struct EvalHistory {
    reports: Rc<RefCell<Vec<(usize, EvalReport)>>>,
}

impl EvalHistory {
    pub fn reports(&self) -> Vec<(usize, EvalReport)> {
        self.reports.borrow().clone()
    }

    /// The report for `epoch`, if that epoch was evaluated.
    pub fn at(&self, epoch: usize) -> Option<EvalReport> {
        self.reports
            .borrow()
            .iter()
            .find(|(e, _)| *e == epoch)
            .map(|(_, report)| *report)
    }
}

/// Scores the in-training weights on one dataset every `every` epochs.
pub struct EvalHook {
    name:       String,
    dataset:    Vec<Example>,
    batch_size: usize,
    every:      usize,
    csv:        Option<MetricsCsv>,
    history:    EvalHistory,
}

impl EvalHook {
    pub fn new(name: impl Into<String>, dataset: Vec<Example>, batch_size: usize) -> Self {
        Self {
            name: name.into(),
            dataset,
            batch_size,
            every: 1,
            csv: None,
            history: EvalHistory::default(),
        }
    }

    /// Evaluate only on epochs divisible by `every`.
    pub fn every(mut self, every: usize) -> Self {
        self.every = every.max(1);
        self
    }

    pub fn with_csv(mut self, csv: MetricsCsv) -> Self {
        self.csv = Some(csv);
        self
    }

    pub fn history(&self) -> EvalHistory {
        self.history.clone()
    }
}

impl TrainingHook for EvalHook {
    fn on_iteration(&mut self, _epoch: usize, _iteration: usize, _loss: f64) {}

    fn evaluates(&self) -> bool {
        true
    }

    fn on_evaluation(&mut self, epoch: usize, predictor: &dyn Predictor) {
        if epoch % self.every != 0 {
            return;
        }
        let report = match evaluate(predictor, &self.dataset, self.batch_size) {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!("Epoch {} | cannot evaluate on {}: {e:#}", epoch, self.name);
                return;
            }
        };
        tracing::info!("Epoch {} | {}: {}", epoch, self.name, report);

        if let Some(csv) = &self.csv {
            if let Err(e) = csv.append(epoch, &self.name, &report.metrics()) {
                tracing::warn!("Cannot write metrics to '{}': {e}", csv.csv_path().display());
            }
        }
        self.history.reports.borrow_mut().push((epoch, report));
    }
}

fn score_qa(pairs: &[(Option<String>, &[Answer])]) -> QaMetrics {
    let mut em = 0.0;
    let mut f1 = 0.0;
    for (predicted, gold) in pairs {
        let predicted = predicted.as_deref().unwrap_or("");
        em += gold.iter().map(|g| exact_match(predicted, &g.text)).fold(0.0, f64::max);
        f1 += gold.iter().map(|g| token_f1(predicted, &g.text)).fold(0.0, f64::max);
    }
    let n = pairs.len().max(1) as f64;
    QaMetrics { exact_match: em / n, f1: f1 / n, count: pairs.len() }
}

fn score_nli(pairs: &[(Option<String>, &[Answer])]) -> NliMetrics {
    let labelled: Vec<(&str, &str)> = pairs
        .iter()
        .map(|(p, gold)| (p.as_deref().unwrap_or(""), gold[0].text.as_str()))
        .collect();

    let correct = labelled.iter().filter(|(p, g)| p == g).count();
    let labels: BTreeSet<&str> = labelled
        .iter()
        .flat_map(|(p, g)| [*p, *g])
        .filter(|l| !l.is_empty())
        .collect();

    let macro_f1 = if labels.is_empty() {
        0.0
    } else {
        labels
            .iter()
            .map(|label| {
                let tp = labelled.iter().filter(|(p, g)| p == label && g == label).count() as f64;
                let fp = labelled.iter().filter(|(p, g)| p == label && g != label).count() as f64;
                let fn_ = labelled.iter().filter(|(p, g)| p != label && g == label).count() as f64;
                if tp == 0.0 { 0.0 } else { 2.0 * tp / (2.0 * tp + fp + fn_) }
            })
            .sum::<f64>()
            / labels.len() as f64
    };

    NliMetrics {
        accuracy: correct as f64 / labelled.len().max(1) as f64,
        macro_f1,
        count: labelled.len(),
    }
}

/// Lowercase, replace punctuation with spaces, drop a/an/the.
fn normalize_tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .filter(|w| !matches!(*w, "a" | "an" | "the"))
        .map(str::to_string)
        .collect()
}

pub fn exact_match(predicted: &str, gold: &str) -> f64 {
    if normalize_tokens(predicted) == normalize_tokens(gold) { 1.0 } else { 0.0 }
}

pub fn token_f1(predicted: &str, gold: &str) -> f64 {
    let predicted = normalize_tokens(predicted);
    let gold      = normalize_tokens(gold);
    if predicted.is_empty() || gold.is_empty() {
        return if predicted == gold { 1.0 } else { 0.0 };
    }

    let mut gold_counts: HashMap<&str, usize> = HashMap::new();
    for token in &gold {
        *gold_counts.entry(token).or_insert(0) += 1;
    }
    let mut common = 0usize;
    for token in &predicted {
        if let Some(count) = gold_counts.get_mut(token.as_str()).filter(|c| **c > 0) {
            *count -= 1;
            common += 1;
        }
    }
    if common == 0 {
        return 0.0;
    }
    let precision = common as f64 / predicted.len() as f64;
    let recall    = common as f64 / gold.len() as f64;
    2.0 * precision * recall / (precision + recall)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_ignores_case_articles_and_punctuation() {
        assert_eq!(exact_match("The Eiffel Tower.", "eiffel tower"), 1.0);
        assert_eq!(exact_match("Paris", "Berlin"), 0.0);
    }

    #[test]
    fn test_token_f1_partial_overlap() {
        // 1 common token, precision 1/2, recall 1/1
        let f1 = token_f1("Gustave Eiffel", "Eiffel");
        assert!((f1 - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(token_f1("", "Paris"), 0.0);
    }

    #[test]
    fn test_qa_takes_best_gold_answer() {
        let gold = [Answer::label("Paris, France", 1.0), Answer::label("Paris", 1.0)];
        let pairs = vec![(Some("paris".to_string()), &gold[..]), (None, &gold[..])];
        let m = score_qa(&pairs);
        assert_eq!(m.count, 2);
        assert!((m.exact_match - 0.5).abs() < 1e-9);
        assert!((m.f1 - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_nli_accuracy_and_macro_f1() {
        let e = [Answer::label("entailment", 1.0)];
        let c = [Answer::label("contradiction", 1.0)];
        let pairs = vec![
            (Some("entailment".to_string()), &e[..]),
            (Some("entailment".to_string()), &c[..]),
            (Some("contradiction".to_string()), &c[..]),
            (Some("entailment".to_string()), &e[..]),
        ];
        let m = score_nli(&pairs);
        assert!((m.accuracy - 0.75).abs() < 1e-9);
        // entailment: tp 2, fp 1, fn 0 → 0.8; contradiction: tp 1, fp 0, fn 1 → 2/3
        assert!((m.macro_f1 - (0.8 + 2.0 / 3.0) / 2.0).abs() < 1e-9);
    }

    /// Always answers with the given label.
    struct Constant(&'static str);

    impl Predictor for Constant {
        fn reader_kind(&self) -> ReaderKind {
            ReaderKind::DecomposableAttention
        }

        fn predict(&self, inputs: &[QaSetting]) -> crate::Result<Vec<Vec<Answer>>> {
            Ok(inputs.iter().map(|_| vec![Answer::label(self.0, 0.9)]).collect())
        }
    }

    fn labelled(gold: &[&str]) -> Vec<Example> {
        gold.iter()
            .map(|g| (QaSetting::new("h", vec!["p".to_string()]), vec![Answer::label(*g, 1.0)]))
            .collect()
    }

    #[test]
    fn test_eval_hook_scores_chosen_epochs_and_writes_csv() {
        let dir = tempfile::tempdir().unwrap();
        let csv = MetricsCsv::new(dir.path().join("metrics.csv")).unwrap();
        let mut hook = EvalHook::new("dev", labelled(&["yes", "no", "yes", "yes"]), 3)
            .every(2)
            .with_csv(csv.clone());
        let history = hook.history();
        assert!(hook.evaluates());

        for epoch in 1..=4 {
            hook.on_evaluation(epoch, &Constant("yes"));
        }

        let reports = history.reports();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].0, 2);
        match history.at(4) {
            Some(EvalReport::Nli(m)) => {
                assert!((m.accuracy - 0.75).abs() < 1e-9);
                assert_eq!(m.count, 4);
            }
            other => panic!("unexpected report: {other:?}"),
        }
        assert!(history.at(3).is_none());

        let text = std::fs::read_to_string(csv.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[1], "2,dev,accuracy,0.750000");
        assert!(lines[4].starts_with("4,dev,macro_f1,"));
    }

    #[test]
    fn test_report_metrics_names() {
        let qa = EvalReport::Qa(QaMetrics { exact_match: 0.5, f1: 0.75, count: 2 });
        assert_eq!(qa.metrics(), vec![("exact_match", 0.5), ("f1", 0.75)]);
    }

    #[test]
    fn test_report_display() {
        let report = EvalReport::Nli(NliMetrics { accuracy: 0.5, macro_f1: 0.25, count: 4 });
        assert_eq!(report.to_string(), "accuracy=50.00% macro_f1=25.00% (4 examples)");
    }
}
