// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// DatasetSource: anything that yields (input, expected-output)
//               pairs.
// Reader:       the trainable unit. A closed set of
//               implementations (see ReaderKind) selected through
//               the registry in Layer 5.
// Predictor:    anything that answers QaSettings, either a reader
//               or a snapshot of its weights taken mid-training.
// TrainingHook: a passive observer of the training loop.
//
// The application layer only ever talks to `dyn Reader`, so it
// works with every model without knowing which one it drives.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::qa_setting::{Answer, Example, QaSetting};
use crate::domain::training::{OptimizerConfig, TrainingSummary};
use crate::error::{ReaderError, Result};

// ─── DatasetSource ────────────────────────────────────────────────────────────
/// Anything that can produce (input, expected-output) pairs.
///
/// Implementations:
///   - JtrLoader → reads the jtr JSON dataset format
pub trait DatasetSource {
    /// Load every example, in source order.
    fn load_all(&self) -> Result<Vec<Example>>;
}

// ─── ReaderKind ───────────────────────────────────────────────────────────────
/// Every model architecture this crate can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReaderKind {
    /// Span extraction: points at an answer inside a support passage
    FastQa,
    /// Entailment: classifies a (premise, hypothesis) pair
    DecomposableAttention,
}

impl ReaderKind {
    /// The registry key the reader is stored under.
    pub fn canonical_name(self) -> &'static str {
        match self {
            ReaderKind::FastQa                => "fastqa_reader",
            ReaderKind::DecomposableAttention => "dam_snli_reader",
        }
    }
}

// ─── ReaderState ──────────────────────────────────────────────────────────────
/// Reader lifecycle: Constructed → SetUp → Trained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReaderState {
    /// Built from shared resources, no parameters allocated yet
    Constructed,
    /// Parameters allocated, shapes fixed
    SetUp,
    /// At least one training run (or a restore from disk) completed
    Trained,
}

impl ReaderState {
    /// Parameters exist, so training and inference are allowed.
    pub fn is_ready(self) -> bool {
        matches!(self, ReaderState::SetUp | ReaderState::Trained)
    }

    pub fn require_ready(self, operation: &'static str) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(ReaderError::SetupOrder { operation, state: self })
        }
    }

    pub fn require_constructed(self, operation: &'static str) -> Result<()> {
        if self == ReaderState::Constructed {
            Ok(())
        } else {
            Err(ReaderError::SetupOrder { operation, state: self })
        }
    }
}

// ─── Reader ───────────────────────────────────────────────────────────────────
/// The capability set shared by every model.
pub trait Reader {
    fn kind(&self) -> ReaderKind;

    fn state(&self) -> ReaderState;

    /// One-time initialisation from a representative dataset.
    /// Fails with SetupOrder if called again.
    fn setup(&mut self, dataset: &[Example], is_training: bool) -> Result<()>;

    /// Run `max_epochs` passes over `training_set` in batches of
    /// `batch_size`, reporting every batch to `hooks` in order.
    fn train(
        &mut self,
        optimizer:    &OptimizerConfig,
        batch_size:   usize,
        hooks:        &mut [Box<dyn TrainingHook>],
        max_epochs:   usize,
        training_set: &[Example],
    ) -> Result<TrainingSummary>;

    /// One ranked answer list per input, best first. Never mutates
    /// the reader.
    fn infer(&self, inputs: &[QaSetting]) -> Result<Vec<Vec<Answer>>>;

    /// Persist configuration, vocabulary and weights into `dir`.
    fn store(&self, dir: &Path) -> Result<()>;

    /// Restore a reader previously written by `store`. Only valid on
    /// a freshly constructed reader.
    fn load(&mut self, dir: &Path) -> Result<()>;

    /// Number of trainable parameters, once set up.
    fn num_params(&self) -> Option<usize>;
}

// ─── Predictor ────────────────────────────────────────────────────────────────
/// Read-only inference. Every reader is a predictor; the training
/// loop also hands hooks a predictor over the weights of the epoch
/// that just finished.
pub trait Predictor {
    fn reader_kind(&self) -> ReaderKind;

    fn predict(&self, inputs: &[QaSetting]) -> Result<Vec<Vec<Answer>>>;
}

impl<R: Reader + ?Sized> Predictor for R {
    fn reader_kind(&self) -> ReaderKind {
        self.kind()
    }

    fn predict(&self, inputs: &[QaSetting]) -> Result<Vec<Vec<Answer>>> {
        self.infer(inputs)
    }
}

// ─── TrainingHook ─────────────────────────────────────────────────────────────
/// Observes the training loop. Hooks cannot stop training or touch
/// its data; they only report.
pub trait TrainingHook {
    /// Called before every batch with its number of examples.
    fn before_batch(&mut self, _examples: usize) {}

    /// Called after every batch. `iteration` counts batches across
    /// all epochs, starting at 1.
    fn on_iteration(&mut self, epoch: usize, iteration: usize, loss: f64);

    /// Called once at the end of every epoch.
    fn on_epoch_end(&mut self, _epoch: usize, _mean_loss: f64) {}

    /// Whether this hook wants `on_evaluation` calls. Building the
    /// snapshot is skipped when no hook does.
    fn evaluates(&self) -> bool {
        false
    }

    /// Called after `on_epoch_end` with the weights as they stand at
    /// the end of `epoch`.
    fn on_evaluation(&mut self, _epoch: usize, _predictor: &dyn Predictor) {}
}
