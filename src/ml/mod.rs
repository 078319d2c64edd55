// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// This layer contains the Burn models and training code. Outside
// it, only the batchers (Layer 4) and the weight files (Layer 6)
// touch burn types.
//
// What's in this layer:
//
//   backend.rs       — backend type aliases (NdArray, or Wgpu with
//                      the `wgpu` feature) and device helpers
//   embedder.rs      — word embedding initialisation from
//                      pretrained vectors
//   fastqa.rs        — span extraction model: question-aware
//                      support encoding + start/end pointer heads
//   decomposable_attention.rs
//                    — NLI model: attend, compare, aggregate
//   trainer.rs       — generic epoch/batch loop with Adam and hooks
//   fastqa_reader.rs — Reader implementation around fastqa.rs
//   nli_reader.rs    — Reader implementation around
//                      decomposable_attention.rs
//   registry.rs      — name → ReaderKind table and constructors
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)
//            Weissenborn et al. (2017) FastQA
//            Parikh et al. (2016) Decomposable Attention

pub mod backend;

pub mod embedder;

pub mod fastqa;

pub mod decomposable_attention;

pub mod trainer;

pub mod fastqa_reader;

pub mod nli_reader;

pub mod registry;

use burn::prelude::*;

/// Additive attention/logit bias: 0 for real positions, a large
/// negative number for padding (mask = 0).
pub(crate) fn mask_bias<B: Backend, const D: usize>(mask: Tensor<B, D>) -> Tensor<B, D> {
    mask.sub_scalar(1.0).mul_scalar(1e4)
}
