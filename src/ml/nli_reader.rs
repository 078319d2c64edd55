// ============================================================
// Layer 5 — Entailment Reader
// ============================================================
// Wraps DecomposableAttentionModel behind the Reader trait.
//
// Mapping a QaSetting onto NLI:
//   premise    = all support passages joined with a space
//   hypothesis = the question
//   label      = text of the first answer
//
// The label set is fixed at setup time from every candidate and
// answer text in the setup dataset, in first-seen order, and is
// stored next to the weights.

use std::{path::Path, sync::Arc};

use burn::{
    data::dataloader::batcher::Batcher,
    module::{AutodiffModule, Module},
};

use crate::data::{
    batcher::{NliBatch, NliBatcher, NliSample, TokenIndexer},
    preprocessor::Preprocessor,
};
use crate::domain::{
    qa_setting::{rank_answers, Answer, Example, QaSetting},
    resources::{ReaderConfig, SharedResources},
    traits::{Predictor, Reader, ReaderKind, ReaderState, TrainingHook},
    training::{OptimizerConfig, TrainingSummary},
    vocab::Vocab,
};
use crate::error::{ReaderError, Result};
use crate::infra::checkpoint::{CheckpointManager, ReaderManifest};
use crate::ml::{
    backend::{self, InferBackend, ReaderDevice, TrainBackend},
    decomposable_attention::{DecomposableAttentionConfig, DecomposableAttentionModel},
    embedder::init_word_embedding,
    trainer,
};

pub struct NliReader {
    resources:    Arc<SharedResources>,
    config:       ReaderConfig,
    state:        ReaderState,
    preprocessor: Preprocessor,
    labels:       Vec<String>,
    indexer:      Option<TokenIndexer>,
    model:        Option<DecomposableAttentionModel<TrainBackend>>,
    device:       ReaderDevice,
}

impl NliReader {
    pub fn new(resources: Arc<SharedResources>) -> Self {
        let config = resources.config.clone();
        Self {
            preprocessor: Preprocessor::new(config.lowercase),
            config,
            resources,
            state:   ReaderState::Constructed,
            labels:  Vec::new(),
            indexer: None,
            model:   None,
            device:  backend::default_device(),
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    fn build(&mut self, vocab: Vocab, pretrained: bool) {
        backend::seed(self.config.seed);
        let indexer = TokenIndexer::new(vocab);
        let dim     = self.config.embedding_dim;
        let embeddings = if pretrained { self.resources.embeddings.as_ref() } else { None };

        let word_embedding = init_word_embedding::<TrainBackend>(
            &indexer,
            embeddings,
            dim,
            self.config.seed,
            &self.device,
        );
        let model = DecomposableAttentionConfig::new(
            indexer.num_embeddings(),
            dim,
            self.config.repr_dim,
            self.labels.len(),
        )
        .with_dropout(self.config.dropout)
        .with_train_embeddings(self.config.train_embeddings)
        .init_with_embedding(word_embedding, &self.device);

        tracing::info!(
            "NLI reader: vocab={} labels={:?} repr_dim={} params={}",
            indexer.vocab().len(),
            self.labels,
            self.config.repr_dim,
            model.num_params()
        );
        self.indexer = Some(indexer);
        self.model   = Some(model);
    }

    fn parts(&self, operation: &'static str) -> Result<(&TokenIndexer, &DecomposableAttentionModel<TrainBackend>)> {
        self.state.require_ready(operation)?;
        match (&self.indexer, &self.model) {
            (Some(indexer), Some(model)) => Ok((indexer, model)),
            _ => Err(ReaderError::SetupOrder { operation, state: self.state }),
        }
    }

    fn encode(&self, indexer: &TokenIndexer, setting: &QaSetting, label: usize) -> Result<NliSample> {
        let premise    = self.preprocessor.words(&setting.support.join(" "))?;
        let hypothesis = self.preprocessor.words(&setting.question)?;
        Ok(NliSample {
            premise_ids:    indexer.encode(&premise),
            hypothesis_ids: indexer.encode(&hypothesis),
            label,
        })
    }

    fn label_index(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    fn predict_with(
        &self,
        indexer: &TokenIndexer,
        model:   &DecomposableAttentionModel<InferBackend>,
        inputs:  &[QaSetting],
    ) -> Result<Vec<Vec<Answer>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let batcher = NliBatcher::<InferBackend>::new(self.device.clone(), indexer.pad_id());

        let samples = inputs
            .iter()
            .map(|setting| self.encode(indexer, setting, 0))
            .collect::<Result<Vec<_>>>()?;
        let probs: Vec<f32> = model
            .label_probabilities(&batcher.batch(samples))
            .into_data()
            .to_vec()
            .map_err(|e| ReaderError::Tensor(format!("{e:?}")))?;

        let num_labels = self.labels.len();
        let results = inputs
            .iter()
            .zip(probs.chunks(num_labels))
            .map(|(setting, row)| {
                let mut answers: Vec<Answer> = self
                    .labels
                    .iter()
                    .zip(row)
                    .filter(|(label, _)| setting.candidates.is_empty() || setting.candidates.contains(label))
                    .map(|(label, &p)| Answer::label(label.clone(), p))
                    .collect();
                rank_answers(&mut answers);
                answers.truncate(self.config.top_k);
                answers
            })
            .collect();
        Ok(results)
    }
}

/// Candidate and answer texts in first-seen order.
fn collect_labels(dataset: &[Example]) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    for (setting, answers) in dataset {
        let texts = setting.candidates.iter().chain(answers.iter().map(|a| &a.text));
        for text in texts {
            if !labels.contains(text) {
                labels.push(text.clone());
            }
        }
    }
    labels
}

struct EpochSnapshot<'a> {
    reader:  &'a NliReader,
    indexer: &'a TokenIndexer,
    model:   DecomposableAttentionModel<InferBackend>,
}

impl Predictor for EpochSnapshot<'_> {
    fn reader_kind(&self) -> ReaderKind {
        ReaderKind::DecomposableAttention
    }

    fn predict(&self, inputs: &[QaSetting]) -> Result<Vec<Vec<Answer>>> {
        self.reader.predict_with(self.indexer, &self.model, inputs)
    }
}

impl Reader for NliReader {
    fn kind(&self) -> ReaderKind {
        ReaderKind::DecomposableAttention
    }

    fn state(&self) -> ReaderState {
        self.state
    }

    fn setup(&mut self, dataset: &[Example], is_training: bool) -> Result<()> {
        self.state.require_constructed("setup")?;

        let labels = collect_labels(dataset);
        if labels.is_empty() {
            return Err(ReaderError::InvalidArgument(
                "setup dataset has no candidates or answers to take labels from".into(),
            ));
        }
        self.labels = labels;

        let mut vocab = self.resources.vocab.clone();
        if is_training {
            let mut words = Vec::new();
            for (setting, _) in dataset {
                words.extend(self.preprocessor.words(&setting.question)?);
                for passage in &setting.support {
                    words.extend(self.preprocessor.words(passage)?);
                }
            }
            let added = vocab.extend_counted(words, self.config.vocab_min_freq, self.config.vocab_max_size);
            tracing::info!("Added {} dataset tokens to the vocabulary", added);
        }
        vocab.freeze();

        self.config.embedding_dim    = self.resources.embedding_dim();
        self.config.train_embeddings = self.config.train_embeddings || self.resources.embeddings.is_none();

        self.build(vocab, true);
        self.state = ReaderState::SetUp;
        Ok(())
    }

    fn train(
        &mut self,
        optimizer:    &OptimizerConfig,
        batch_size:   usize,
        hooks:        &mut [Box<dyn TrainingHook>],
        max_epochs:   usize,
        training_set: &[Example],
    ) -> Result<TrainingSummary> {
        let (indexer, model) = self.parts("train")?;
        if batch_size == 0 {
            return Err(ReaderError::InvalidArgument("batch size must be at least 1".into()));
        }

        let mut samples = Vec::with_capacity(training_set.len());
        for (setting, answers) in training_set {
            let label = answers.first().and_then(|a| self.label_index(&a.text));
            match label {
                Some(label) => samples.push(self.encode(indexer, setting, label)?),
                None => tracing::warn!(
                    "Skipping example {:?}: no answer from the label set {:?}",
                    setting.id.as_deref().unwrap_or(&setting.question),
                    self.labels
                ),
            }
        }
        tracing::info!("Training on {} of {} examples", samples.len(), training_set.len());

        let batcher = NliBatcher::<TrainBackend>::new(self.device.clone(), indexer.pad_id());
        let batches: Vec<NliBatch<TrainBackend>> = samples
            .chunks(batch_size)
            .map(|chunk| batcher.batch(chunk.to_vec()))
            .collect();

        let reader: &Self = self;
        let (trained, summary) = trainer::fit::<TrainBackend, _, _, _>(
            model.clone(),
            &batches,
            optimizer,
            hooks,
            max_epochs,
            self.config.seed,
            |current: &DecomposableAttentionModel<TrainBackend>| EpochSnapshot {
                reader,
                indexer,
                model: current.valid(),
            },
        )?;

        self.model = Some(trained);
        self.state = ReaderState::Trained;
        Ok(summary)
    }

    fn infer(&self, inputs: &[QaSetting]) -> Result<Vec<Vec<Answer>>> {
        let (indexer, model) = self.parts("infer")?;
        self.predict_with(indexer, &model.valid(), inputs)
    }

    fn store(&self, dir: &Path) -> Result<()> {
        let (indexer, model) = self.parts("store")?;
        let ckpt = CheckpointManager::new(dir);
        ckpt.save_manifest(&ReaderManifest {
            reader: self.kind().canonical_name().to_string(),
            state:  self.state,
        })?;
        ckpt.save_config(&self.config)?;
        ckpt.save_vocab(indexer.vocab())?;
        ckpt.save_labels(&self.labels)?;
        ckpt.save_model::<TrainBackend, _>(model.clone())?;
        tracing::info!("Stored {} to '{}'", self.kind().canonical_name(), dir.display());
        Ok(())
    }

    fn load(&mut self, dir: &Path) -> Result<()> {
        self.state.require_constructed("load")?;
        let ckpt = CheckpointManager::new(dir);

        let manifest = ckpt.load_manifest()?;
        if manifest.reader != self.kind().canonical_name() {
            return Err(ReaderError::format(
                dir,
                format!("holds a '{}', not a {}", manifest.reader, self.kind().canonical_name()),
            ));
        }
        self.config       = ckpt.load_config()?;
        self.preprocessor = Preprocessor::new(self.config.lowercase);
        self.labels       = ckpt.load_labels()?;
        let vocab = ckpt.load_vocab()?;

        self.build(vocab, false);
        if let Some(model) = self.model.take() {
            self.model = Some(ckpt.load_model(model, &self.device)?);
        }
        self.state = ReaderState::Trained;
        Ok(())
    }

    fn num_params(&self) -> Option<usize> {
        self.model.as_ref().map(|m| m.num_params())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use crate::data::embeddings::{load_embeddings, EmbeddingFormat};
    use crate::data::loader::load_jtr;

    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("data").join(name)
    }

    fn ready_reader() -> (NliReader, Vec<Example>) {
        let config = ReaderConfig {
            repr_dim:      8,
            embedding_dim: 8,
            dropout:       0.0,
            ..ReaderConfig::default()
        };
        let data = load_jtr(fixture("snli_snippet.json"), None).unwrap();
        let mut reader = NliReader::new(SharedResources::without_embeddings(config).shared());
        reader.setup(&data, true).unwrap();
        (reader, data)
    }

    fn inputs(data: &[Example]) -> Vec<QaSetting> {
        data.iter().map(|(q, _)| q.clone()).collect()
    }

    #[test]
    fn test_labels_come_from_candidates_in_order() {
        let (reader, _) = ready_reader();
        assert_eq!(reader.labels(), ["entailment", "neutral", "contradiction"]);
    }

    #[test]
    fn test_setup_without_labels_fails() {
        let mut reader = NliReader::new(SharedResources::default().shared());
        let data = vec![(QaSetting::new("h", vec!["p".to_string()]), Vec::new())];
        assert!(matches!(reader.setup(&data, true), Err(ReaderError::InvalidArgument(_))));
        assert_eq!(reader.state(), ReaderState::Constructed);
    }

    #[test]
    fn test_store_before_setup_is_rejected() {
        let reader = NliReader::new(SharedResources::default().shared());
        let tmp = tempfile::tempdir().unwrap();
        let err = reader.store(tmp.path()).unwrap_err();
        assert!(matches!(err, ReaderError::SetupOrder { operation: "store", .. }));
    }

    #[test]
    fn test_predictions_are_ranked_label_distributions() {
        let (reader, data) = ready_reader();
        let predictions = reader.infer(&inputs(&data)).unwrap();
        assert_eq!(predictions.len(), data.len());

        for answers in &predictions {
            assert_eq!(answers.len(), 3);
            assert!(answers[0].score >= answers[1].score && answers[1].score >= answers[2].score);
            let total: f32 = answers.iter().map(|a| a.score).sum();
            assert!((total - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_candidates_restrict_the_answer_set() {
        let (reader, _) = ready_reader();
        let setting = QaSetting::new("A dog runs.", vec!["A dog is running in a field.".to_string()])
            .with_candidates(vec!["neutral".to_string()]);
        let out = reader.infer(&[setting]).unwrap();
        assert_eq!(out[0].len(), 1);
        assert_eq!(out[0][0].text, "neutral");
    }

    #[test]
    fn test_training_lowers_loss() {
        let (mut reader, data) = ready_reader();
        let summary = reader
            .train(&OptimizerConfig::with_learning_rate(0.05), 2, &mut [], 15, &data)
            .unwrap();
        assert_eq!(reader.state(), ReaderState::Trained);
        assert!(summary.final_loss().unwrap() < summary.first_loss().unwrap());
    }

    #[test]
    fn test_store_then_load_predicts_identically() {
        let (mut reader, data) = ready_reader();
        reader
            .train(&OptimizerConfig::with_learning_rate(0.05), 3, &mut [], 2, &data)
            .unwrap();
        let tmp = tempfile::tempdir().unwrap();
        reader.store(tmp.path()).unwrap();

        let mut restored = NliReader::new(SharedResources::default().shared());
        restored.load(tmp.path()).unwrap();
        assert_eq!(restored.labels(), reader.labels());
        assert_eq!(restored.infer(&inputs(&data)).unwrap(), reader.infer(&inputs(&data)).unwrap());
    }

    #[test]
    fn test_loading_a_qa_directory_fails() {
        let tmp = tempfile::tempdir().unwrap();
        CheckpointManager::new(tmp.path())
            .save_manifest(&ReaderManifest { reader: "fastqa_reader".into(), state: ReaderState::Trained })
            .unwrap();
        let mut reader = NliReader::new(SharedResources::default().shared());
        assert!(matches!(reader.load(tmp.path()), Err(ReaderError::Format { .. })));
    }

    fn embedding_weights(reader: &NliReader) -> Vec<f32> {
        let model = reader.model.as_ref().unwrap();
        model.word_embedding.weight.val().into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_frozen_pretrained_embeddings_survive_training() {
        let data  = load_jtr(fixture("snli_snippet.json"), None).unwrap();
        let glove = load_embeddings(fixture("glove_snippet.txt"), EmbeddingFormat::Glove).unwrap();
        let weights_around_training = |train_embeddings: bool| {
            let config = ReaderConfig {
                repr_dim: 8,
                dropout:  0.0,
                train_embeddings,
                ..ReaderConfig::default()
            };
            let mut reader = NliReader::new(SharedResources::from_embeddings(glove.clone(), config).shared());
            reader.setup(&data, true).unwrap();
            let before = embedding_weights(&reader);
            reader
                .train(&OptimizerConfig::with_learning_rate(0.05), 2, &mut [], 3, &data)
                .unwrap();
            (before, embedding_weights(&reader))
        };

        let (before, after) = weights_around_training(false);
        assert_eq!(before, after);
        let (before, after) = weights_around_training(true);
        assert_ne!(before, after);
    }
}
