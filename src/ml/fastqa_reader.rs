// ============================================================
// Layer 5 — Extractive QA Reader
// ============================================================
// Wraps FastQaModel behind the Reader trait.
//
//   setup  — copy the shared vocabulary, extend it with the dataset
//            tokens (training only), freeze it, allocate the model
//   train  — encode every example whose answer can be located in a
//            support passage, batch, run the shared training loop
//   infer  — for every support passage score all spans of at most
//            max_span_size tokens as P(start) · P(end), map the best
//            back to character offsets, keep the top k overall
//
// Examples whose answer cannot be found in any passage are skipped
// during training with a warning.

use std::{collections::HashSet, path::Path, sync::Arc};

use burn::{
    data::dataloader::batcher::Batcher,
    module::{AutodiffModule, Module},
};

use crate::data::{
    batcher::{QaBatch, QaBatcher, QaSample, TokenIndexer},
    preprocessor::{char_span_to_tokens, slice_chars, tokens_to_char_span, Preprocessor, Token},
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
    embedder::init_word_embedding,
    fastqa::{FastQaConfig, FastQaModel},
    trainer,
};

pub struct FastQaReader {
    resources:    Arc<SharedResources>,
    config:       ReaderConfig,
    state:        ReaderState,
    preprocessor: Preprocessor,
    indexer:      Option<TokenIndexer>,
    model:        Option<FastQaModel<TrainBackend>>,
    device:       ReaderDevice,
}

impl FastQaReader {
    pub fn new(resources: Arc<SharedResources>) -> Self {
        let config = resources.config.clone();
        Self {
            preprocessor: Preprocessor::new(config.lowercase),
            config,
            resources,
            state:   ReaderState::Constructed,
            indexer: None,
            model:   None,
            device:  backend::default_device(),
        }
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Allocate a fresh model around a frozen vocabulary.
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
        let model = FastQaConfig::new(indexer.num_embeddings(), dim, self.config.repr_dim)
            .with_dropout(self.config.dropout)
            .with_train_embeddings(self.config.train_embeddings)
            .init_with_embedding(word_embedding, &self.device);

        tracing::info!(
            "FastQA reader: vocab={} embedding_dim={} repr_dim={} params={}",
            indexer.vocab().len(),
            dim,
            self.config.repr_dim,
            model.num_params()
        );
        self.indexer = Some(indexer);
        self.model   = Some(model);
    }

    fn parts(&self, operation: &'static str) -> Result<(&TokenIndexer, &FastQaModel<TrainBackend>)> {
        self.state.require_ready(operation)?;
        match (&self.indexer, &self.model) {
            (Some(indexer), Some(model)) => Ok((indexer, model)),
            _ => Err(ReaderError::SetupOrder { operation, state: self.state }),
        }
    }

    fn encode(
        &self,
        indexer:  &TokenIndexer,
        question: &[String],
        support:  &[Token],
        answer:   (usize, usize),
    ) -> QaSample {
        let in_question: HashSet<&str> = question.iter().map(String::as_str).collect();
        let support_words: Vec<String> = support.iter().map(|t| t.text.clone()).collect();
        QaSample {
            support_ids:      indexer.encode(&support_words),
            question_ids:     indexer.encode(question),
            word_in_question: support
                .iter()
                .map(|t| if in_question.contains(t.text.as_str()) { 1.0 } else { 0.0 })
                .collect(),
            answer_start:     answer.0,
            answer_end:       answer.1,
        }
    }

    /// Token-level target for one example, or None if no answer can
    /// be located in any support passage.
    fn training_sample(&self, indexer: &TokenIndexer, (setting, answers): &Example) -> Result<Option<QaSample>> {
        let question = self.preprocessor.words(&setting.question)?;

        for answer in answers {
            let candidates: Vec<(usize, (usize, usize))> = match answer.span {
                Some(span) => vec![(answer.support_idx, span)],
                None => setting
                    .support
                    .iter()
                    .enumerate()
                    .filter_map(|(idx, passage)| find_chars(passage, &answer.text).map(|span| (idx, span)))
                    .collect(),
            };

            for (idx, (start, end)) in candidates {
                let Some(passage) = setting.support.get(idx) else { continue };
                let tokens = self.preprocessor.tokenize(passage)?;
                if let Some(target) = char_span_to_tokens(&tokens, start, end) {
                    return Ok(Some(self.encode(indexer, &question, &tokens, target)));
                }
            }
        }
        Ok(None)
    }

    /// Ranked spans for `inputs` under the given inference weights.
    fn predict_with(
        &self,
        indexer: &TokenIndexer,
        model:   &FastQaModel<InferBackend>,
        inputs:  &[QaSetting],
    ) -> Result<Vec<Vec<Answer>>> {
        let batcher = QaBatcher::<InferBackend>::new(self.device.clone(), indexer.pad_id());
        let top_k   = self.config.top_k;

        let mut results = Vec::with_capacity(inputs.len());
        for setting in inputs {
            let question = self.preprocessor.words(&setting.question)?;

            // One batch row per non-empty support passage
            let mut passages = Vec::new();
            for (idx, passage) in setting.support.iter().enumerate() {
                let tokens = self.preprocessor.tokenize(passage)?;
                if !tokens.is_empty() {
                    passages.push((idx, tokens));
                }
            }
            if passages.is_empty() {
                results.push(Vec::new());
                continue;
            }

            let batch = batcher.batch(
                passages
                    .iter()
                    .map(|(_, tokens)| self.encode(indexer, &question, tokens, (0, 0)))
                    .collect(),
            );
            let width = batch.support_ids.dims()[1];
            let (start, end) = model.span_probabilities(&batch);
            let start: Vec<f32> = start.into_data().to_vec().map_err(|e| ReaderError::Tensor(format!("{e:?}")))?;
            let end:   Vec<f32> = end.into_data().to_vec().map_err(|e| ReaderError::Tensor(format!("{e:?}")))?;

            let mut answers = Vec::new();
            for (row, (idx, tokens)) in passages.iter().enumerate() {
                let n = tokens.len();
                let row_start = &start[row * width..row * width + n];
                let row_end   = &end[row * width..row * width + n];
                for (first, last, score) in best_spans(row_start, row_end, self.config.max_span_size, top_k) {
                    if let Some((s, e)) = tokens_to_char_span(tokens, first, last) {
                        let text = slice_chars(&setting.support[*idx], s, e);
                        answers.push(Answer::span(text, s, e, *idx, score));
                    }
                }
            }
            rank_answers(&mut answers);
            answers.truncate(top_k);
            results.push(answers);
        }
        Ok(results)
    }
}

/// Character span of the first occurrence of `needle` in `haystack`.
fn find_chars(haystack: &str, needle: &str) -> Option<(usize, usize)> {
    if needle.is_empty() {
        return None;
    }
    let byte  = haystack.find(needle)?;
    let start = haystack[..byte].chars().count();
    Some((start, start + needle.chars().count()))
}

/// Best (first, last, score) token spans with last - first < max_span,
/// scored as start[first] · end[last], highest first.
pub fn best_spans(start: &[f32], end: &[f32], max_span: usize, top_k: usize) -> Vec<(usize, usize, f32)> {
    let n = start.len().min(end.len());
    let mut spans = Vec::new();
    for s in 0..n {
        for e in s..n.min(s + max_span.max(1)) {
            spans.push((s, e, start[s] * end[e]));
        }
    }
    spans.sort_by(|a, b| b.2.total_cmp(&a.2));
    spans.truncate(top_k);
    spans
}

/// The reader's preprocessing around the weights of one epoch.
struct EpochSnapshot<'a> {
    reader:  &'a FastQaReader,
    indexer: &'a TokenIndexer,
    model:   FastQaModel<InferBackend>,
}

impl Predictor for EpochSnapshot<'_> {
    fn reader_kind(&self) -> ReaderKind {
        ReaderKind::FastQa
    }

    fn predict(&self, inputs: &[QaSetting]) -> Result<Vec<Vec<Answer>>> {
        self.reader.predict_with(self.indexer, &self.model, inputs)
    }
}

impl Reader for FastQaReader {
    fn kind(&self) -> ReaderKind {
        ReaderKind::FastQa
    }

    fn state(&self) -> ReaderState {
        self.state
    }

    fn setup(&mut self, dataset: &[Example], is_training: bool) -> Result<()> {
        self.state.require_constructed("setup")?;

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

        // The stored config must describe the allocated shapes
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
        for example in training_set {
            match self.training_sample(indexer, example)? {
                Some(sample) => samples.push(sample),
                None => tracing::warn!(
                    "Skipping example {:?}: answer not found in any support passage",
                    example.0.id.as_deref().unwrap_or(&example.0.question)
                ),
            }
        }
        tracing::info!("Training on {} of {} examples", samples.len(), training_set.len());

        let batcher = QaBatcher::<TrainBackend>::new(self.device.clone(), indexer.pad_id());
        let batches: Vec<QaBatch<TrainBackend>> = samples
            .chunks(batch_size)
            .map(|chunk| batcher.batch(chunk.to_vec()))
            .collect();

        // A failed run leaves the reader with its previous weights
        let reader: &Self = self;
        let (trained, summary) = trainer::fit::<TrainBackend, _, _, _>(
            model.clone(),
            &batches,
            optimizer,
            hooks,
            max_epochs,
            self.config.seed,
            |current: &FastQaModel<TrainBackend>| EpochSnapshot { reader, indexer, model: current.valid() },
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
