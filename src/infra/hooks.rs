// ============================================================
// Layer 6 — Training Hooks
// ============================================================
// Passive observers plugged into the training loop:
//
//   LossHook           — logs the mean loss every N iterations
//   ExamplesPerSecHook — logs throughput every N iterations
//   LossHistory        — keeps every batch and epoch loss so the
//                        caller can inspect them after training
//
// None of them can influence training; they only report.

use std::{
    cell::RefCell,
    rc::Rc,
    time::Instant,
};

use crate::domain::traits::TrainingHook;

// ─── LossHook ─────────────────────────────────────────────────────────────────
pub struct LossHook {
    every:    usize,
    loss_sum: f64,
    count:    usize,
}

impl LossHook {
    pub fn new(every: usize) -> Self {
        Self { every: every.max(1), loss_sum: 0.0, count: 0 }
    }
}

impl TrainingHook for LossHook {
    fn on_iteration(&mut self, epoch: usize, iteration: usize, loss: f64) {
        self.loss_sum += loss;
        self.count    += 1;
        if iteration % self.every == 0 {
            tracing::info!(
                "Epoch {} iter {} | mean loss over last {} = {:.4}",
                epoch,
                iteration,
                self.count,
                self.loss_sum / self.count as f64
            );
            self.loss_sum = 0.0;
            self.count    = 0;
        }
    }
}

// ─── ExamplesPerSecHook ───────────────────────────────────────────────────────
/// Counts the real size of every batch in a window, timed from just
/// before the window's first batch.
pub struct ExamplesPerSecHook {
    every:     usize,
    examples:  usize,
    started:   Option<Instant>,
    last_rate: Option<f64>,
}

impl ExamplesPerSecHook {
    pub fn new(every: usize) -> Self {
        Self { every: every.max(1), examples: 0, started: None, last_rate: None }
    }

    /// Most recently reported examples/sec, if any window finished.
    pub fn last_rate(&self) -> Option<f64> {
        self.last_rate
    }
}

impl TrainingHook for ExamplesPerSecHook {
    fn before_batch(&mut self, examples: usize) {
        self.started.get_or_insert_with(Instant::now);
        self.examples += examples;
    }

    fn on_iteration(&mut self, epoch: usize, iteration: usize, _loss: f64) {
        if iteration % self.every != 0 {
            return;
        }
        if let Some(started) = self.started.take() {
            let secs = started.elapsed().as_secs_f64().max(f64::EPSILON);
            let rate = self.examples as f64 / secs;
            tracing::info!("Epoch {} iter {} | {:.1} examples/sec", epoch, iteration, rate);
            self.last_rate = Some(rate);
        }
        self.examples = 0;
    }
}

// ─── LossHistory ──────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LossRecord {
    /// (epoch, iteration, loss) per batch
    pub iterations: Vec<(usize, usize, f64)>,
    /// (epoch, mean loss) per epoch
    pub epochs:     Vec<(usize, f64)>,
}

/// Records losses into a shared buffer. Keep a clone of the hook to
/// read the record once it has been boxed and handed to `Reader::train`.
#[derive(Debug, Clone, Default)]
pub struct LossHistory {
    record: Rc<RefCell<LossRecord>>,
}

impl LossHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> LossRecord {
        self.record.borrow().clone()
    }
}

impl TrainingHook for LossHistory {
    fn on_iteration(&mut self, epoch: usize, iteration: usize, loss: f64) {
        self.record.borrow_mut().iterations.push((epoch, iteration, loss));
    }

    fn on_epoch_end(&mut self, epoch: usize, mean_loss: f64) {
        self.record.borrow_mut().epochs.push((epoch, mean_loss));
    }
}
