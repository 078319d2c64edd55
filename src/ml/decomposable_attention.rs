// ============================================================
// Layer 5 — Decomposable Attention (NLI)
// ============================================================
// Parikh et al. (2016), without intra-sentence attention:
//
//   a = Linear(embed(premise))     [B, La, H]
//   b = Linear(embed(hypothesis))  [B, Lb, H]
//
//   Attend:    e     = F(a) · F(b)ᵀ                 [B, La, Lb]
//              beta  = softmax_b(e) · b             [B, La, H]
//              alpha = softmax_a(eᵀ) · a            [B, Lb, H]
//   Compare:   v1 = G([a; beta]),  v2 = G([b; alpha])
//   Aggregate: logits = W · relu(H([Σ v1; Σ v2]))   [B, C]
//
// Sums over sequence positions skip padding via the masks.

use burn::{
    nn::{
        loss::CrossEntropyLossConfig,
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::{activation, backend::AutodiffBackend},
};

use crate::data::batcher::NliBatch;
use crate::ml::{mask_bias, trainer::SupervisedModel};

#[derive(Config, Debug)]
pub struct DecomposableAttentionConfig {
    pub num_embeddings: usize,
    pub embedding_dim:  usize,
    pub hidden_dim:     usize,
    pub num_labels:     usize,
    #[config(default = 0.1)]
    pub dropout:        f64,
    #[config(default = true)]
    pub train_embeddings: bool,
}

impl DecomposableAttentionConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DecomposableAttentionModel<B> {
        let word_embedding = EmbeddingConfig::new(self.num_embeddings, self.embedding_dim).init(device);
        self.init_with_embedding(word_embedding, device)
    }

    pub fn init_with_embedding<B: Backend>(
        &self,
        word_embedding: Embedding<B>,
        device:         &B::Device,
    ) -> DecomposableAttentionModel<B> {
        let h = self.hidden_dim;
        DecomposableAttentionModel {
            word_embedding,
            projection: LinearConfig::new(self.embedding_dim, h).init(device),
            attend:     LinearConfig::new(h, h).init(device),
            compare:    LinearConfig::new(2 * h, h).init(device),
            aggregate:  LinearConfig::new(2 * h, h).init(device),
            classifier: LinearConfig::new(h, self.num_labels).init(device),
            dropout:    DropoutConfig::new(self.dropout).init(),
            train_embeddings: self.train_embeddings,
        }
    }
}

#[derive(Module, Debug)]
pub struct DecomposableAttentionModel<B: Backend> {
    pub word_embedding:   Embedding<B>,
    pub projection:       Linear<B>,
    pub attend:           Linear<B>,
    pub compare:          Linear<B>,
    pub aggregate:        Linear<B>,
    pub classifier:       Linear<B>,
    pub dropout:          Dropout,
    pub train_embeddings: bool,
}

impl<B: Backend> DecomposableAttentionModel<B> {
    fn encode(&self, ids: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let emb = self.word_embedding.forward(ids);
        let emb = if self.train_embeddings { emb } else { emb.detach() };
        self.projection.forward(emb)
    }

    /// Sum of G([x; aligned]) over the real (unpadded) positions.
    fn compare_and_sum(&self, x: Tensor<B, 3>, aligned: Tensor<B, 3>, mask: Tensor<B, 2>) -> Tensor<B, 2> {
        let compared = activation::relu(
            self.compare.forward(self.dropout.forward(Tensor::cat(vec![x, aligned], 2))),
        );
        let summed = (compared * mask.unsqueeze_dim::<3>(2)).sum_dim(1);
        let [batch_size, _, hidden] = summed.dims();
        summed.reshape([batch_size, hidden])
    }

    /// Unnormalised label scores, [batch, num_labels].
    pub fn forward(&self, batch: &NliBatch<B>) -> Tensor<B, 2> {
        let a = self.encode(batch.premise_ids.clone());
        let b = self.encode(batch.hypothesis_ids.clone());

        // ── Attend ────────────────────────────────────────────────────────────
        let fa = activation::relu(self.attend.forward(self.dropout.forward(a.clone())));
        let fb = activation::relu(self.attend.forward(self.dropout.forward(b.clone())));
        let e  = fa.matmul(fb.swap_dims(1, 2));

        let b_bias = mask_bias(batch.hypothesis_mask.clone()).unsqueeze_dim::<3>(1);
        let a_bias = mask_bias(batch.premise_mask.clone()).unsqueeze_dim::<3>(1);
        let beta   = activation::softmax(e.clone() + b_bias, 2).matmul(b.clone());
        let alpha  = activation::softmax(e.swap_dims(1, 2) + a_bias, 2).matmul(a.clone());

        // ── Compare ───────────────────────────────────────────────────────────
        let v1 = self.compare_and_sum(a, beta, batch.premise_mask.clone());
        let v2 = self.compare_and_sum(b, alpha, batch.hypothesis_mask.clone());

        // ── Aggregate ─────────────────────────────────────────────────────────
        let hidden = activation::relu(
            self.aggregate.forward(self.dropout.forward(Tensor::cat(vec![v1, v2], 1))),
        );
        self.classifier.forward(hidden)
    }

    pub fn label_probabilities(&self, batch: &NliBatch<B>) -> Tensor<B, 2> {
        activation::softmax(self.forward(batch), 1)
    }
}

impl<B: AutodiffBackend> SupervisedModel<B> for DecomposableAttentionModel<B> {
    type Batch = NliBatch<B>;

    fn forward_loss(&self, batch: NliBatch<B>) -> Tensor<B, 1> {
        let logits = self.forward(&batch);
        CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits, batch.labels)
    }

    fn batch_len(batch: &NliBatch<B>) -> usize {
        batch.len()
    }
}
