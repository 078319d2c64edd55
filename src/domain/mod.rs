// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs and traits that define what the system is
// about: vocabularies, embedding tables, QA/NLI examples, the
// shared resource bundle, and the Reader / TrainingHook
// capabilities every model and observer implements.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits

// Token <-> id mapping, append-only
pub mod vocab;

// Pretrained word vectors indexed by token
pub mod embeddings;

// Question/support inputs and answer outputs
pub mod qa_setting;

// Configuration bundle shared by all readers
pub mod resources;

// Optimiser settings and training summaries
pub mod training;

// Reader and TrainingHook capability traits
pub mod traits;
