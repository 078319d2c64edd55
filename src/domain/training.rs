// ============================================================
// Layer 3 — Training Settings and Results
// ============================================================

use serde::{Deserialize, Serialize};

/// Adam settings for one `Reader::train` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    pub learning_rate: f64,
    /// L2 weight decay penalty; None disables it
    pub l2:            Option<f32>,
    /// Gradients clipped to [-clip, clip]; None disables clipping
    pub clip_value:    Option<f32>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self { learning_rate: 1e-3, l2: None, clip_value: None }
    }
}

impl OptimizerConfig {
    pub fn with_learning_rate(learning_rate: f64) -> Self {
        Self { learning_rate, ..Default::default() }
    }
}

/// What a finished training run reports back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingSummary {
    /// Mean batch loss of every epoch, in order
    pub epoch_losses: Vec<f64>,
    /// Total number of optimiser steps taken
    pub iterations:   usize,
}

impl TrainingSummary {
    pub fn first_loss(&self) -> Option<f64> {
        self.epoch_losses.first().copied()
    }

    pub fn final_loss(&self) -> Option<f64> {
        self.epoch_losses.last().copied()
    }
}
