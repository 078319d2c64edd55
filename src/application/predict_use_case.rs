// ============================================================
// Layer 2 — Predict Use Case
// ============================================================
// Restores a stored reader and answers questions with it, either
// for a whole jtr dataset file or for one ad-hoc question.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::application::evaluation::{evaluate, EvalReport};
use crate::data::loader::JtrLoader;
use crate::domain::{
    qa_setting::{Answer, Example, QaSetting},
    traits::{DatasetSource, Reader},
};
use crate::ml::registry::ReaderRegistry;

pub struct PredictUseCase {
    reader_dir: PathBuf,
    reader:     Box<dyn Reader>,
}

impl PredictUseCase {
    pub fn new(reader_dir: impl AsRef<Path>) -> Result<Self> {
        let reader_dir = reader_dir.as_ref().to_path_buf();
        let reader = ReaderRegistry::standard()
            .load(&reader_dir)
            .with_context(|| {
                format!(
                    "Cannot load a reader from '{}'. Have you run 'train --save-dir' first?",
                    reader_dir.display()
                )
            })?;
        Ok(Self { reader_dir, reader })
    }

    pub fn reader(&self) -> &dyn Reader {
        self.reader.as_ref()
    }

    /// Answer every question in a dataset file.
    pub fn predict_file(&self, path: &str, max_count: Option<usize>) -> Result<Vec<(QaSetting, Vec<Answer>)>> {
        let data = self.load(path, max_count)?;
        let inputs: Vec<QaSetting> = data.into_iter().map(|(q, _)| q).collect();
        let answers = self.reader.infer(&inputs)?;
        tracing::info!(
            "Predicted {} inputs with '{}'",
            inputs.len(),
            self.reader_dir.display()
        );
        Ok(inputs.into_iter().zip(answers).collect())
    }

    /// Answer a single question against the given passages.
    pub fn predict_one(&self, question: &str, support: Vec<String>, candidates: Vec<String>) -> Result<Vec<Answer>> {
        let setting = QaSetting::new(question, support).with_candidates(candidates);
        let mut answers = self.reader.infer(&[setting])?;
        Ok(answers.pop().unwrap_or_default())
    }

    /// Score the stored reader on a labelled dataset file.
    pub fn evaluate_file(&self, path: &str, max_count: Option<usize>, batch_size: usize) -> Result<EvalReport> {
        let data = self.load(path, max_count)?;
        evaluate(self.reader.as_ref(), &data, batch_size)
    }

    fn load(&self, path: &str, max_count: Option<usize>) -> Result<Vec<Example>> {
        JtrLoader::new(path)
            .with_max_count(max_count)
            .load_all()
            .with_context(|| format!("Cannot load dataset '{path}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::{TrainConfig, TrainUseCase};

    fn fixture(name: &str) -> String {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("data")
            .join(name)
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn test_predict_from_stored_nli_reader() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("dam");
        TrainUseCase::new(TrainConfig {
            model:         "dam_reader".into(),
            train_file:    fixture("snli_snippet.json"),
            epochs:        2,
            batch_size:    3,
            repr_dim:      8,
            embedding_dim: 8,
            save_dir:      Some(dir.to_string_lossy().into_owned()),
            ..TrainConfig::default()
        })
        .execute()
        .unwrap();

        let predict = PredictUseCase::new(&dir).unwrap();
        let out = predict.predict_file(&fixture("snli_snippet.json"), Some(2)).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|(_, answers)| !answers.is_empty()));

        let one = predict
            .predict_one(
                "A woman sleeps.",
                vec!["A woman is sleeping on a couch.".into()],
                vec!["entailment".into(), "contradiction".into()],
            )
            .unwrap();
        assert_eq!(one.len(), 2);

        let report = predict.evaluate_file(&fixture("snli_snippet.json"), None, 4).unwrap();
        assert!(matches!(report, EvalReport::Nli(m) if m.count == 6));
    }

    #[test]
    fn test_missing_reader_dir_fails_with_hint() {
        let tmp = tempfile::tempdir().unwrap();
        let err = PredictUseCase::new(tmp.path().join("none")).err().unwrap();
        assert!(err.to_string().contains("Have you run 'train"));
    }
}
