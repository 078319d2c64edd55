// ============================================================
// Layer 5 — Word Embedding Initialisation
// ============================================================
// Builds the initial embedding matrix for a reader:
//
//   row i < vocab.len()   pretrained vector of token i if one exists,
//                         otherwise uniform noise in [-0.1, 0.1]
//   PAD row               zeros
//   UNK row               uniform noise
//
// Noise comes from a seeded StdRng so two set-ups with the same
// seed start from identical parameters.

use burn::{
    module::Param,
    nn::{Embedding, EmbeddingConfig},
    prelude::*,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::data::batcher::TokenIndexer;
use crate::domain::embeddings::Embeddings;

/// Row-major initial values, `num_embeddings * dim` long.
pub fn initial_weights(
    indexer:    &TokenIndexer,
    pretrained: Option<&Embeddings>,
    dim:        usize,
    seed:       u64,
) -> Vec<f32> {
    let mut rng    = StdRng::seed_from_u64(seed);
    let rows       = indexer.num_embeddings();
    let mut values = Vec::with_capacity(rows * dim);
    let mut hits   = 0usize;

    for row in 0..rows {
        if row == indexer.pad_id() {
            values.extend(std::iter::repeat(0.0f32).take(dim));
            continue;
        }
        let vector = indexer
            .vocab()
            .token(row)
            .and_then(|token| pretrained.and_then(|emb| emb.get(token)))
            .filter(|v| v.len() == dim);
        match vector {
            Some(v) => {
                hits += 1;
                values.extend_from_slice(v);
            }
            None => values.extend((0..dim).map(|_| rng.gen_range(-0.1f32..0.1))),
        }
    }

    tracing::info!(
        "Embedding matrix: {} rows x {} dims, {} pre-trained, {} out-of-vocab",
        rows,
        dim,
        hits,
        indexer.vocab().len() - hits
    );
    values
}

/// An Embedding layer whose weights start from `initial_weights`.
pub fn init_word_embedding<B: Backend>(
    indexer:    &TokenIndexer,
    pretrained: Option<&Embeddings>,
    dim:        usize,
    seed:       u64,
    device:     &B::Device,
) -> Embedding<B> {
    let rows    = indexer.num_embeddings();
    let values  = initial_weights(indexer, pretrained, dim, seed);
    let weights = Tensor::<B, 2>::from_data(TensorData::new(values, [rows, dim]), device);

    let mut embedding = EmbeddingConfig::new(rows, dim).init(device);
    embedding.weight  = Param::from_tensor(weights);
    embedding
}
