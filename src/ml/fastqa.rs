// ============================================================
// Layer 5 — Span Extraction Model
// ============================================================
// A small FastQA-style extractive reader:
//
//   support tokens ─ embed ─┐
//   word-in-question flag ──┴─ Linear + tanh ─► h_s  [B, Ls, H]
//   question tokens ─ embed ─ Linear + tanh ─► h_q  [B, Lq, H]
//
//   attended = softmax(h_s · h_qᵀ) · h_q            [B, Ls, H]
//   q        = masked mean of h_q                   [B, 1, H]
//   features = [h_s; attended; h_s∘attended; h_s∘q] [B, Ls, 4H]
//   hidden   = relu(Linear(features))               [B, Ls, H]
//   start / end logits = Linear(hidden)             [B, Ls]
//
// The word-in-question flag is FastQA's key trick: a binary feature
// telling the encoder which support words also appear in the
// question. Padding positions get a -1e4 bias on every logit.

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

use crate::data::batcher::QaBatch;
use crate::ml::{mask_bias, trainer::SupervisedModel};

#[derive(Config, Debug)]
pub struct FastQaConfig {
    pub num_embeddings: usize,
    pub embedding_dim:  usize,
    pub hidden_dim:     usize,
    #[config(default = 0.1)]
    pub dropout:        f64,
    #[config(default = true)]
    pub train_embeddings: bool,
}

impl FastQaConfig {
    /// Fresh model with randomly initialised word embeddings.
    pub fn init<B: Backend>(&self, device: &B::Device) -> FastQaModel<B> {
        let word_embedding = EmbeddingConfig::new(self.num_embeddings, self.embedding_dim).init(device);
        self.init_with_embedding(word_embedding, device)
    }

    /// Fresh model around a prepared (e.g. pretrained) embedding layer.
    pub fn init_with_embedding<B: Backend>(
        &self,
        word_embedding: Embedding<B>,
        device:         &B::Device,
    ) -> FastQaModel<B> {
        let h = self.hidden_dim;
        FastQaModel {
            word_embedding,
            support_encoder:  LinearConfig::new(self.embedding_dim + 1, h).init(device),
            question_encoder: LinearConfig::new(self.embedding_dim, h).init(device),
            interaction:      LinearConfig::new(4 * h, h).init(device),
            start_head:       LinearConfig::new(h, 1).init(device),
            end_head:         LinearConfig::new(h, 1).init(device),
            dropout:          DropoutConfig::new(self.dropout).init(),
            train_embeddings: self.train_embeddings,
        }
    }
}

#[derive(Module, Debug)]
pub struct FastQaModel<B: Backend> {
    pub word_embedding:   Embedding<B>,
    pub support_encoder:  Linear<B>,
    pub question_encoder: Linear<B>,
    pub interaction:      Linear<B>,
    pub start_head:       Linear<B>,
    pub end_head:         Linear<B>,
    pub dropout:          Dropout,
    pub train_embeddings: bool,
}

pub struct QaModelOutput<B: Backend> {
    pub start_logits: Tensor<B, 2>,
    pub end_logits:   Tensor<B, 2>,
}

impl<B: Backend> FastQaModel<B> {
    fn embed(&self, ids: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let emb = self.word_embedding.forward(ids);
        if self.train_embeddings { emb } else { emb.detach() }
    }

    pub fn forward(&self, batch: &QaBatch<B>) -> QaModelOutput<B> {
        let [batch_size, support_len] = batch.support_ids.dims();

        // ── Encode support (with word-in-question flag) and question ──────────
        let wiq = batch.word_in_question.clone().unsqueeze_dim::<3>(2);
        let support_in = Tensor::cat(vec![self.embed(batch.support_ids.clone()), wiq], 2);
        let h_s = self.dropout.forward(activation::tanh(self.support_encoder.forward(support_in)));
        let h_q = activation::tanh(
            self.question_encoder.forward(self.embed(batch.question_ids.clone())),
        );

        // ── Support → question attention ──────────────────────────────────────
        let q_bias   = mask_bias(batch.question_mask.clone()).unsqueeze_dim::<3>(1);
        let scores   = h_s.clone().matmul(h_q.clone().swap_dims(1, 2)) + q_bias;
        let attended = activation::softmax(scores, 2).matmul(h_q.clone());

        // ── Pooled question vector ────────────────────────────────────────────
        let q_mask   = batch.question_mask.clone().unsqueeze_dim::<3>(2);
        let q_len    = q_mask.clone().sum_dim(1).clamp_min(1.0);
        let q_pooled = (h_q * q_mask).sum_dim(1) / q_len;

        let features = Tensor::cat(
            vec![
                h_s.clone(),
                attended.clone(),
                h_s.clone() * attended,
                h_s * q_pooled,
            ],
            2,
        );
        let hidden = self.dropout.forward(activation::relu(self.interaction.forward(features)));

        // ── Pointer heads ─────────────────────────────────────────────────────
        let s_bias = mask_bias(batch.support_mask.clone());
        let start_logits = self
            .start_head
            .forward(hidden.clone())
            .reshape([batch_size, support_len])
            + s_bias.clone();
        let end_logits = self
            .end_head
            .forward(hidden)
            .reshape([batch_size, support_len])
            + s_bias;

        QaModelOutput { start_logits, end_logits }
    }

    /// Start and end probabilities over support positions.
    pub fn span_probabilities(&self, batch: &QaBatch<B>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let output = self.forward(batch);
        (
            activation::softmax(output.start_logits, 1),
            activation::softmax(output.end_logits, 1),
        )
    }
}

impl<B: AutodiffBackend> SupervisedModel<B> for FastQaModel<B> {
    type Batch = QaBatch<B>;

    /// Loss = (CE_start + CE_end) / 2
    fn forward_loss(&self, batch: QaBatch<B>) -> Tensor<B, 1> {
        let output = self.forward(&batch);
        let ce = CrossEntropyLossConfig::new().init(&output.start_logits.device());
        (ce.forward(output.start_logits, batch.answer_starts)
            + ce.forward(output.end_logits, batch.answer_ends))
            / 2.0_f64
    }

    fn batch_len(batch: &QaBatch<B>) -> usize {
        batch.len()
    }
}
