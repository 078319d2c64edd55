// ============================================================
// Layer 5 — Backends
// ============================================================
// Training runs on Autodiff<Inner>; inference runs on the inner
// backend through `model.valid()`, which also disables dropout.

use burn::prelude::*;

#[cfg(not(feature = "wgpu"))]
pub type InferBackend = burn::backend::NdArray;

#[cfg(feature = "wgpu")]
pub type InferBackend = burn::backend::Wgpu;

pub type TrainBackend = burn::backend::Autodiff<InferBackend>;

pub type ReaderDevice = <InferBackend as Backend>::Device;

pub fn default_device() -> ReaderDevice {
    let device = ReaderDevice::default();
    tracing::debug!("Using device: {:?}", device);
    device
}

/// Seed parameter initialisation (and dropout) for reproducible runs.
pub fn seed(seed: u64) {
    TrainBackend::seed(seed);
}
