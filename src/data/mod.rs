// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// This layer handles everything from files on disk all the way
// to tensor batches.
//
// The pipeline flows in this order:
//
//   embedding file          jtr dataset file
//       │                        │
//       ▼                        ▼
//   load_embeddings         JtrLoader      → (QaSetting, answers)
//       │                        │
//       │                        ▼
//       │                   Preprocessor   → word tokens + char offsets
//       │                        │
//       ▼                        ▼
//   Embeddings ──► Vocab ──► TokenIndexer  → token ids
//                                │
//                                ▼
//                   QaBatcher / NliBatcher → padded tensor batches
//
// Each module is responsible for exactly one step.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)
//            Rust Book §13 (Iterators and Closures)

/// GloVe / word2vec embedding file readers
pub mod embeddings;

/// Reads jtr JSON datasets
pub mod loader;

/// Word tokenisation with character offsets
pub mod preprocessor;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;
