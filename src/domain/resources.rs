// ============================================================
// Layer 3 — Shared Resources
// ============================================================
// The configuration bundle handed to every reader: the seed
// vocabulary, the pretrained embeddings it was built from (if
// any), and the model hyperparameters.
//
// Built once, never mutated, shared through Arc. A reader that
// needs to grow the vocabulary during setup works on its own copy.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::{embeddings::Embeddings, vocab::Vocab};

/// Model hyperparameters. Serialisable so a stored reader can be
/// rebuilt with exactly the same architecture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Hidden size of every encoder / attention layer
    pub repr_dim:            usize,
    /// Word embedding size when no pretrained embeddings are given
    pub embedding_dim:       usize,
    /// Longest answer span (in tokens) the QA reader may predict
    pub max_span_size:       usize,
    /// Number of ranked answers returned per input
    pub top_k:               usize,
    /// Dropout probability (1 - keep probability)
    pub dropout:             f64,
    /// Whether pretrained embedding rows receive gradient updates
    pub train_embeddings:    bool,
    /// Lowercase tokens before vocabulary lookup
    pub lowercase:           bool,
    /// Dataset tokens seen fewer times than this are not added
    pub vocab_min_freq:      usize,
    /// Cap on the number of dataset tokens added during setup
    pub vocab_max_size:      Option<usize>,
    /// Seed for parameter initialisation and batch order
    pub seed:                u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            repr_dim:         32,
            embedding_dim:    50,
            max_span_size:    10,
            top_k:            3,
            dropout:          0.1,
            train_embeddings: true,
            lowercase:        true,
            vocab_min_freq:   1,
            vocab_max_size:   None,
            seed:             1337,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SharedResources {
    pub vocab:      Vocab,
    pub embeddings: Option<Embeddings>,
    pub config:     ReaderConfig,
}

impl SharedResources {
    /// Seed the vocabulary 1:1 from the embedding rows.
    pub fn from_embeddings(embeddings: Embeddings, config: ReaderConfig) -> Self {
        let vocab = Vocab::from_embeddings(&embeddings);
        Self { vocab, embeddings: Some(embeddings), config }
    }

    /// No pretrained vectors: the vocabulary is grown from the data.
    pub fn without_embeddings(config: ReaderConfig) -> Self {
        Self { vocab: Vocab::new(), embeddings: None, config }
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Width of the word embedding layer readers will allocate.
    pub fn embedding_dim(&self) -> usize {
        self.embeddings
            .as_ref()
            .map(Embeddings::dim)
            .unwrap_or(self.config.embedding_dim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_dim_prefers_pretrained() {
        let emb = Embeddings::from_rows(4, vec![("x".to_string(), vec![0.0; 4])]).unwrap();
        let res = SharedResources::from_embeddings(emb, ReaderConfig::default());
        assert_eq!(res.embedding_dim(), 4);
        assert_eq!(res.vocab.len(), 1);

        let res = SharedResources::without_embeddings(ReaderConfig::default());
        assert_eq!(res.embedding_dim(), 50);
        assert!(res.vocab.is_empty());
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let cfg = ReaderConfig { repr_dim: 8, vocab_max_size: Some(100), ..Default::default() };
        let json = serde_json::to_string(&cfg).unwrap();
        assert_eq!(serde_json::from_str::<ReaderConfig>(&json).unwrap(), cfg);
    }
}
