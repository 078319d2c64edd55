// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Load pretrained embeddings  (Layer 4 - data, optional)
//   Step 2: Load train/dev/test sets    (Layer 4 - data)
//   Step 3: Build shared resources      (Layer 3 - domain)
//   Step 4: Create + set up the reader  (Layer 5 - ml registry)
//   Step 5: Train with hooks            (Layer 5 + Layer 6 hooks)
//           train and dev are scored after every epoch, test
//           after the last one (Layer 2 - evaluation)
//   Step 6: Collect dev / test reports  (Layer 2 - evaluation)
//   Step 7: Store the reader            (Layer 6 - checkpoint)
//   Step 8: Predict a few examples      (returned for display)
//
// Every step logs the time elapsed since the pipeline started.
// In debug mode the first N training examples are used for
// training, dev and test alike.
//
// Reference: Rust Book §13 (Iterators and Closures)

use std::{path::PathBuf, time::Instant};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::application::evaluation::{evaluate, EvalHistory, EvalHook, EvalReport};
use crate::data::{
    embeddings::{load_embeddings, EmbeddingFormat},
    loader::JtrLoader,
};
use crate::domain::{
    qa_setting::{Answer, Example, QaSetting},
    resources::{ReaderConfig, SharedResources},
    traits::{DatasetSource, Reader, TrainingHook},
    training::{OptimizerConfig, TrainingSummary},
};
use crate::infra::{
    hooks::{ExamplesPerSecHook, LossHook},
    metrics::MetricsCsv,
};
use crate::ml::registry::ReaderRegistry;

/// How many predictions the pipeline returns for display.
const SHOWCASE_EXAMPLES: usize = 3;

// ─── Training Configuration ──────────────────────────────────────────────────
// All settings for one training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub model:                String,
    pub train_file:           String,
    pub dev_file:             Option<String>,
    pub test_file:            Option<String>,
    pub embeddings:           Option<String>,
    pub embedding_format:     EmbeddingFormat,
    pub normalize_embeddings: bool,
    pub freeze_embeddings:    bool,
    pub epochs:               usize,
    pub batch_size:           usize,
    pub learning_rate:        f64,
    pub l2:                   Option<f32>,
    pub clip_value:           Option<f32>,
    pub dropout:              f64,
    pub repr_dim:             usize,
    pub embedding_dim:        usize,
    pub max_span_size:        usize,
    pub top_k:                usize,
    pub vocab_min_freq:       usize,
    pub vocab_max_size:       Option<usize>,
    pub seed:                 u64,
    pub save_dir:             Option<String>,
    pub write_metrics_to:     Option<String>,
    pub log_interval:         usize,
    pub debug:                bool,
    pub debug_examples:       usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        let reader = ReaderConfig::default();
        Self {
            model:                "fastqa_reader".to_string(),
            train_file:           "data/squad_snippet.json".to_string(),
            dev_file:             None,
            test_file:            None,
            embeddings:           None,
            embedding_format:     EmbeddingFormat::Glove,
            normalize_embeddings: false,
            freeze_embeddings:    false,
            epochs:               5,
            batch_size:           32,
            learning_rate:        1e-3,
            l2:                   None,
            clip_value:           None,
            dropout:              reader.dropout,
            repr_dim:             reader.repr_dim,
            embedding_dim:        reader.embedding_dim,
            max_span_size:        reader.max_span_size,
            top_k:                reader.top_k,
            vocab_min_freq:       reader.vocab_min_freq,
            vocab_max_size:       reader.vocab_max_size,
            seed:                 reader.seed,
            save_dir:             None,
            write_metrics_to:     None,
            log_interval:         10,
            debug:                false,
            debug_examples:       10,
        }
    }
}

impl TrainConfig {
    pub fn reader_config(&self) -> ReaderConfig {
        ReaderConfig {
            repr_dim:         self.repr_dim,
            embedding_dim:    self.embedding_dim,
            max_span_size:    self.max_span_size,
            top_k:            self.top_k,
            dropout:          self.dropout,
            train_embeddings: !self.freeze_embeddings,
            vocab_min_freq:   self.vocab_min_freq,
            vocab_max_size:   self.vocab_max_size,
            seed:             self.seed,
            ..ReaderConfig::default()
        }
    }

    pub fn optimizer(&self) -> OptimizerConfig {
        OptimizerConfig {
            learning_rate: self.learning_rate,
            l2:            self.l2,
            clip_value:    self.clip_value,
        }
    }
}

/// Everything the pipeline produced, for Layer 1 to present.
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub summary:     TrainingSummary,
    pub num_params:  Option<usize>,
    pub dev:         Option<EvalReport>,
    pub test:        Option<EvalReport>,
    pub stored_to:   Option<PathBuf>,
    pub predictions: Vec<(QaSetting, Vec<Answer>)>,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<TrainOutcome> {
        let cfg     = &self.config;
        let started = Instant::now();
        let stage   = |name: &str| {
            tracing::info!("[{:>8.2}s] {}", started.elapsed().as_secs_f64(), name);
        };
        tracing::debug!("Train config: {}", serde_json::to_string(cfg)?);

        // ── Step 1: Pretrained embeddings ─────────────────────────────────────
        let embeddings = match &cfg.embeddings {
            Some(path) => {
                tracing::info!("Loading {} embeddings from '{}'", cfg.embedding_format, path);
                let emb = load_embeddings(path, cfg.embedding_format)
                    .with_context(|| format!("Cannot load embeddings from '{path}'"))?;
                Some(if cfg.normalize_embeddings { emb.normalized() } else { emb })
            }
            None => None,
        };
        stage("embeddings ready");

        // ── Step 2: Datasets ──────────────────────────────────────────────────
        let mut train = load_dataset(&cfg.train_file)?;
        let (dev, test) = if cfg.debug {
            train.truncate(cfg.debug_examples);
            tracing::info!("Debug mode: using the first {} training examples everywhere", train.len());
            (Some(train.clone()), Some(train.clone()))
        } else {
            (
                cfg.dev_file.as_deref().map(load_dataset).transpose()?,
                cfg.test_file.as_deref().map(load_dataset).transpose()?,
            )
        };
        if train.is_empty() {
            bail!("Training file '{}' contains no examples", cfg.train_file);
        }
        stage("datasets loaded");

        // ── Step 3: Shared resources ──────────────────────────────────────────
        let reader_config = cfg.reader_config();
        let resources = match embeddings {
            Some(emb) => SharedResources::from_embeddings(emb, reader_config),
            None      => SharedResources::without_embeddings(reader_config),
        }
        .shared();

        // ── Step 4: Reader ────────────────────────────────────────────────────
        let registry   = ReaderRegistry::standard();
        let mut reader = registry.create(&cfg.model, resources)?;
        reader
            .setup(&train, true)
            .with_context(|| format!("Setting up '{}' failed", cfg.model))?;
        stage("reader set up");

        // ── Step 5: Train ─────────────────────────────────────────────────────
        let metrics_csv = match &cfg.write_metrics_to {
            Some(path) => Some(
                MetricsCsv::new(path).with_context(|| format!("Cannot create metrics file '{path}'"))?,
            ),
            None => None,
        };
        let eval_hook = |name: &str, data: &[Example], every: usize| {
            let hook = EvalHook::new(name, data.to_vec(), cfg.batch_size).every(every);
            match &metrics_csv {
                Some(csv) => hook.with_csv(csv.clone()),
                None      => hook,
            }
        };

        let mut hooks: Vec<Box<dyn TrainingHook>> = vec![
            Box::new(LossHook::new(cfg.log_interval)),
            Box::new(ExamplesPerSecHook::new(cfg.log_interval)),
            Box::new(eval_hook("train", &train, 1)),
        ];
        let mut watch = |name: &str, data: &Option<Vec<Example>>, every: usize| {
            data.as_deref().map(|data| {
                let hook    = eval_hook(name, data, every);
                let history = hook.history();
                hooks.push(Box::new(hook));
                history
            })
        };
        let dev_history  = watch("dev", &dev, 1);
        let test_history = watch("test", &test, cfg.epochs);

        let summary = reader
            .train(&cfg.optimizer(), cfg.batch_size, &mut hooks, cfg.epochs, &train)
            .with_context(|| format!("Training '{}' failed", cfg.model))?;
        tracing::info!(
            "Trained {} epochs, {} iterations, final loss {:?}",
            summary.epoch_losses.len(),
            summary.iterations,
            summary.final_loss()
        );
        stage("training finished");

        // ── Step 6: Final reports ─────────────────────────────────────────────
        let dev_report  = final_report(reader.as_ref(), &dev, dev_history.as_ref(), cfg)?;
        let test_report = final_report(reader.as_ref(), &test, test_history.as_ref(), cfg)?;
        if let Some(report) = &dev_report {
            tracing::info!("Dev:  {}", report);
        }
        if let Some(report) = &test_report {
            tracing::info!("Test: {}", report);
        }
        stage("evaluation finished");

        // ── Step 7: Store ─────────────────────────────────────────────────────
        let stored_to = match &cfg.save_dir {
            Some(dir) => {
                let dir = PathBuf::from(dir);
                reader
                    .store(&dir)
                    .with_context(|| format!("Cannot store reader to '{}'", dir.display()))?;
                Some(dir)
            }
            None => None,
        };

        // ── Step 8: Showcase predictions ──────────────────────────────────────
        let shown: Vec<QaSetting> = dev
            .as_ref()
            .unwrap_or(&train)
            .iter()
            .take(SHOWCASE_EXAMPLES)
            .map(|(q, _)| q.clone())
            .collect();
        let answers     = reader.infer(&shown)?;
        let predictions = shown.into_iter().zip(answers).collect();
        stage("done");

        Ok(TrainOutcome {
            summary,
            num_params: reader.num_params(),
            dev: dev_report,
            test: test_report,
            stored_to,
            predictions,
        })
    }
}

/// The report of the last epoch if an EvalHook produced one, else a
/// fresh evaluation of the trained reader.
fn final_report(
    reader:  &dyn Reader,
    data:    &Option<Vec<Example>>,
    history: Option<&EvalHistory>,
    cfg:     &TrainConfig,
) -> Result<Option<EvalReport>> {
    let Some(data) = data else { return Ok(None) };
    match history.and_then(|h| h.at(cfg.epochs)) {
        Some(report) => Ok(Some(report)),
        None         => evaluate(reader, data, cfg.batch_size).map(Some),
    }
}

fn load_dataset(path: &str) -> Result<Vec<Example>> {
    JtrLoader::new(path)
        .load_all()
        .with_context(|| format!("Cannot load dataset '{path}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn fixture(name: &str) -> String {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("data")
            .join(name)
            .to_string_lossy()
            .into_owned()
    }

    fn small(model: &str, train: &str) -> TrainConfig {
        TrainConfig {
            model:         model.to_string(),
            train_file:    fixture(train),
            epochs:        12,
            batch_size:    2,
            learning_rate: 0.05,
            dropout:       0.0,
            repr_dim:      8,
            embedding_dim: 8,
            ..TrainConfig::default()
        }
    }

    #[test]
    fn test_fastqa_pipeline_with_glove_and_store() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = TrainConfig {
            embeddings:           Some(fixture("glove_snippet.txt")),
            normalize_embeddings: true,
            dev_file:             Some(fixture("squad_snippet.json")),
            save_dir:             Some(tmp.path().join("reader").to_string_lossy().into_owned()),
            write_metrics_to:     Some(tmp.path().join("metrics.csv").to_string_lossy().into_owned()),
            ..small("fastqa_reader", "squad_snippet.json")
        };

        let outcome = TrainUseCase::new(cfg).execute().unwrap();
        assert_eq!(outcome.summary.epoch_losses.len(), 12);
        assert!(outcome.summary.final_loss().unwrap() < outcome.summary.first_loss().unwrap());
        assert!(matches!(outcome.dev, Some(EvalReport::Qa(_))));
        assert_eq!(outcome.predictions.len(), SHOWCASE_EXAMPLES);

        let stored = outcome.stored_to.unwrap();
        assert!(stored.join("reader.json").exists());
        assert!(stored.join("model.mpk.gz").exists());
        // train and dev, two metrics each, every epoch
        let csv = std::fs::read_to_string(tmp.path().join("metrics.csv")).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 1 + 12 * 4);
        assert_eq!(lines[0], "epoch,dataset,metric,value");
        assert!(lines[1].starts_with("1,train,exact_match,"));
        assert!(lines.iter().any(|l| l.starts_with("12,dev,f1,")));
    }

    #[test]
    fn test_nli_pipeline_in_debug_mode() {
        let cfg = TrainConfig {
            debug:          true,
            debug_examples: 4,
            ..small("dam_snli_reader", "snli_snippet.json")
        };
        let outcome = TrainUseCase::new(cfg).execute().unwrap();
        match outcome.test {
            Some(EvalReport::Nli(m)) => assert_eq!(m.count, 4),
            other => panic!("expected NLI test report, got {other:?}"),
        }
    }

    #[test]
    fn test_per_epoch_dev_scores_match_final_dev_report() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = TrainConfig {
            epochs:           3,
            dev_file:         Some(fixture("snli_snippet.json")),
            test_file:        Some(fixture("snli_snippet.json")),
            write_metrics_to: Some(tmp.path().join("m.csv").to_string_lossy().into_owned()),
            ..small("dam_snli_reader", "snli_snippet.json")
        };
        let outcome = TrainUseCase::new(cfg).execute().unwrap();

        let csv = std::fs::read_to_string(tmp.path().join("m.csv")).unwrap();
        let rows: Vec<Vec<&str>> = csv.lines().skip(1).map(|l| l.split(',').collect()).collect();
        let dev_epochs: Vec<&str> = rows
            .iter()
            .filter(|r| r[1] == "dev" && r[2] == "accuracy")
            .map(|r| r[0])
            .collect();
        assert_eq!(dev_epochs, vec!["1", "2", "3"]);
        let test_rows: Vec<&Vec<&str>> = rows.iter().filter(|r| r[1] == "test").collect();
        assert_eq!(test_rows.len(), 2);
        assert!(test_rows.iter().all(|r| r[0] == "3"));

        let last_dev: f64 = rows
            .iter()
            .rev()
            .find(|r| r[1] == "dev" && r[2] == "accuracy")
            .map(|r| r[3].parse().unwrap())
            .unwrap();
        match outcome.dev {
            Some(EvalReport::Nli(m)) => assert!((m.accuracy - last_dev).abs() < 1e-6),
            other => panic!("expected NLI dev report, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_model_fails() {
        let cfg = small("not_a_model", "squad_snippet.json");
        let err = TrainUseCase::new(cfg).execute().unwrap_err();
        assert!(err.to_string().contains("not_a_model"));
    }

    #[test]
    fn test_missing_train_file_fails() {
        let cfg = TrainConfig { train_file: "does/not/exist.json".into(), ..TrainConfig::default() };
        assert!(TrainUseCase::new(cfg).execute().is_err());
    }
}
