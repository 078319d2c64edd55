// ============================================================
// Layer 4 — Batchers
// ============================================================
// Implements Burn's Batcher trait to stack encoded samples into
// tensor batches for the two readers.
//
// Samples have different lengths, so every batch is padded to its
// own longest sequence with the PAD id. Alongside each id tensor we
// build a float mask (1.0 = real token, 0.0 = padding) that the
// models use to ignore padded positions.
//
//   QA:   support [B, Ls], question [B, Lq], word-in-question [B, Ls],
//         answer start / end token positions [B]
//   NLI:  premise [B, La], hypothesis [B, Lb], label index [B]

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::domain::vocab::Vocab;

// ─── TokenIndexer ─────────────────────────────────────────────────────────────
/// Maps tokens to embedding rows. Rows 0..len are vocabulary ids,
/// then one PAD row and one UNK row.
#[derive(Debug, Clone)]
pub struct TokenIndexer {
    vocab: Vocab,
}

impl TokenIndexer {
    pub fn new(vocab: Vocab) -> Self {
        Self { vocab }
    }

    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    pub fn pad_id(&self) -> usize {
        self.vocab.len()
    }

    pub fn unk_id(&self) -> usize {
        self.vocab.len() + 1
    }

    /// Number of embedding rows a model needs.
    pub fn num_embeddings(&self) -> usize {
        self.vocab.len() + 2
    }

    pub fn encode(&self, words: &[String]) -> Vec<i64> {
        words
            .iter()
            .map(|w| self.vocab.get(w).unwrap_or_else(|| self.unk_id()) as i64)
            .collect()
    }
}

// ─── Samples ──────────────────────────────────────────────────────────────────
/// One encoded (question, support passage) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct QaSample {
    pub support_ids:      Vec<i64>,
    pub question_ids:     Vec<i64>,
    /// 1.0 where the support token also occurs in the question
    pub word_in_question: Vec<f32>,
    /// Inclusive answer token range (0, 0 when unlabelled)
    pub answer_start:     usize,
    pub answer_end:       usize,
}

/// One encoded (premise, hypothesis) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct NliSample {
    pub premise_ids:    Vec<i64>,
    pub hypothesis_ids: Vec<i64>,
    /// Index into the reader's label set (0 when unlabelled)
    pub label:          usize,
}

// ─── Batches ──────────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct QaBatch<B: Backend> {
    pub support_ids:      Tensor<B, 2, Int>,
    pub support_mask:     Tensor<B, 2>,
    pub question_ids:     Tensor<B, 2, Int>,
    pub question_mask:    Tensor<B, 2>,
    pub word_in_question: Tensor<B, 2>,
    pub answer_starts:    Tensor<B, 1, Int>,
    pub answer_ends:      Tensor<B, 1, Int>,
}

#[derive(Debug, Clone)]
pub struct NliBatch<B: Backend> {
    pub premise_ids:     Tensor<B, 2, Int>,
    pub premise_mask:    Tensor<B, 2>,
    pub hypothesis_ids:  Tensor<B, 2, Int>,
    pub hypothesis_mask: Tensor<B, 2>,
    pub labels:          Tensor<B, 1, Int>,
}

impl<B: Backend> QaBatch<B> {
    pub fn len(&self) -> usize {
        self.support_ids.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<B: Backend> NliBatch<B> {
    pub fn len(&self) -> usize {
        self.premise_ids.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─── Padding helpers ──────────────────────────────────────────────────────────
/// Pad every row to the longest one (at least 1) and return the
/// flat ids, the flat mask and the padded length.
fn pad_rows<'a>(rows: impl Iterator<Item = &'a [i64]> + Clone, pad_id: i64) -> (Vec<i64>, Vec<f32>, usize) {
    let max_len = rows.clone().map(<[i64]>::len).max().unwrap_or(0).max(1);
    let mut ids  = Vec::new();
    let mut mask = Vec::new();
    for row in rows {
        ids.extend_from_slice(row);
        ids.extend(std::iter::repeat(pad_id).take(max_len - row.len()));
        mask.extend(std::iter::repeat(1.0f32).take(row.len()));
        mask.extend(std::iter::repeat(0.0f32).take(max_len - row.len()));
    }
    (ids, mask, max_len)
}

fn int_tensor<B: Backend, const D: usize>(values: Vec<i64>, shape: [usize; D], device: &B::Device) -> Tensor<B, D, Int> {
    Tensor::from_data(TensorData::new(values, shape), device)
}

fn float_tensor<B: Backend, const D: usize>(values: Vec<f32>, shape: [usize; D], device: &B::Device) -> Tensor<B, D> {
    Tensor::from_data(TensorData::new(values, shape), device)
}

// ─── QaBatcher ────────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct QaBatcher<B: Backend> {
    pub device: B::Device,
    pub pad_id: i64,
}

impl<B: Backend> QaBatcher<B> {
    pub fn new(device: B::Device, pad_id: usize) -> Self {
        Self { device, pad_id: pad_id as i64 }
    }
}

impl<B: Backend> Batcher<QaSample, QaBatch<B>> for QaBatcher<B> {
    fn batch(&self, items: Vec<QaSample>) -> QaBatch<B> {
        let batch_size = items.len();

        let (support_flat, support_mask, ls) =
            pad_rows(items.iter().map(|s| s.support_ids.as_slice()), self.pad_id);
        let (question_flat, question_mask, lq) =
            pad_rows(items.iter().map(|s| s.question_ids.as_slice()), self.pad_id);

        // Word-in-question features share the support padding
        let wiq_flat: Vec<f32> = items
            .iter()
            .flat_map(|s| {
                s.word_in_question
                    .iter()
                    .copied()
                    .chain(std::iter::repeat(0.0))
                    .take(ls)
            })
            .collect();

        let starts: Vec<i64> = items.iter().map(|s| s.answer_start as i64).collect();
        let ends:   Vec<i64> = items.iter().map(|s| s.answer_end as i64).collect();

        QaBatch {
            support_ids:      int_tensor(support_flat, [batch_size, ls], &self.device),
            support_mask:     float_tensor(support_mask, [batch_size, ls], &self.device),
            question_ids:     int_tensor(question_flat, [batch_size, lq], &self.device),
            question_mask:    float_tensor(question_mask, [batch_size, lq], &self.device),
            word_in_question: float_tensor(wiq_flat, [batch_size, ls], &self.device),
            answer_starts:    int_tensor(starts, [batch_size], &self.device),
            answer_ends:      int_tensor(ends, [batch_size], &self.device),
        }
    }
}

// ─── NliBatcher ───────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct NliBatcher<B: Backend> {
    pub device: B::Device,
    pub pad_id: i64,
}

impl<B: Backend> NliBatcher<B> {
    pub fn new(device: B::Device, pad_id: usize) -> Self {
        Self { device, pad_id: pad_id as i64 }
    }
}

impl<B: Backend> Batcher<NliSample, NliBatch<B>> for NliBatcher<B> {
    fn batch(&self, items: Vec<NliSample>) -> NliBatch<B> {
        let batch_size = items.len();

        let (premise_flat, premise_mask, la) =
            pad_rows(items.iter().map(|s| s.premise_ids.as_slice()), self.pad_id);
        let (hypothesis_flat, hypothesis_mask, lb) =
            pad_rows(items.iter().map(|s| s.hypothesis_ids.as_slice()), self.pad_id);
        let labels: Vec<i64> = items.iter().map(|s| s.label as i64).collect();

        NliBatch {
            premise_ids:     int_tensor(premise_flat, [batch_size, la], &self.device),
            premise_mask:    float_tensor(premise_mask, [batch_size, la], &self.device),
            hypothesis_ids:  int_tensor(hypothesis_flat, [batch_size, lb], &self.device),
            hypothesis_mask: float_tensor(hypothesis_mask, [batch_size, lb], &self.device),
            labels:          int_tensor(labels, [batch_size], &self.device),
        }
    }
}
