// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Handles all cross-cutting concerns that don't belong in
// any specific business layer:
//
//   checkpoint.rs — Reader directories on disk
//                   Manifest, config, vocabulary and labels as
//                   JSON, weights through Burn's recorder, so a
//                   stored reader can be rebuilt exactly.
//
//   hooks.rs      — Training observers
//                   Periodic loss and throughput logging, and an
//                   in-memory loss history.
//
//   metrics.rs    — Evaluation metrics logging
//                   Appends per-epoch scores of every evaluated
//                   dataset to a CSV file for later plotting.
//
// Reference: Rust Book §7 (Modules)
//            Burn Book §5 (Checkpointing)

/// Reader directory saving and loading
pub mod checkpoint;

/// Loss / throughput / history training hooks
pub mod hooks;

/// Evaluation metrics CSV logger
pub mod metrics;
