// ============================================================
// Layer 3 — Vocabulary
// ============================================================
// Maps tokens to dense integer ids and back.
//
// Invariants:
//   - ids are 0..len, contiguous, assigned in insertion order
//   - ids never change once assigned (append-only)
//   - a frozen vocabulary refuses new tokens
//
// A vocabulary seeded from an embedding table gets exactly one id
// per embedding row, in file order, so id i indexes row i.

use std::collections::HashMap;

use crate::domain::embeddings::Embeddings;

#[derive(Debug, Clone, Default)]
pub struct Vocab {
    id_to_token: Vec<String>,
    token_to_id: HashMap<String, usize>,
    frozen:      bool,
}

impl Vocab {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a token sequence. Repeated tokens keep their first id.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut vocab = Self::new();
        for token in tokens {
            vocab.add(token);
        }
        vocab
    }

    /// One id per embedding row, in the order the rows were loaded.
    pub fn from_embeddings(embeddings: &Embeddings) -> Self {
        Self::from_tokens(embeddings.tokens().iter().cloned())
    }

    /// Return the id of `token`, assigning the next free id if it is new.
    /// Returns None only when the token is new and the vocab is frozen.
    pub fn add(&mut self, token: impl Into<String>) -> Option<usize> {
        let token = token.into();
        if let Some(&id) = self.token_to_id.get(&token) {
            return Some(id);
        }
        if self.frozen {
            return None;
        }
        let id = self.id_to_token.len();
        self.token_to_id.insert(token.clone(), id);
        self.id_to_token.push(token);
        Some(id)
    }

    pub fn get(&self, token: &str) -> Option<usize> {
        self.token_to_id.get(token).copied()
    }

    pub fn token(&self, id: usize) -> Option<&str> {
        self.id_to_token.get(id).map(String::as_str)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.token_to_id.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.id_to_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_token.is_empty()
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Tokens ordered by id.
    pub fn tokens(&self) -> &[String] {
        &self.id_to_token
    }

    /// Add the new tokens of `words` seen at least `min_freq` times,
    /// most frequent first (ties in first-seen order), at most
    /// `max_new` of them. Returns how many were added.
    pub fn extend_counted<I, S>(&mut self, words: I, min_freq: usize, max_new: Option<usize>) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut fresh: Vec<(String, usize)> = Vec::new();
        let mut slot: HashMap<String, usize> = HashMap::new();
        for word in words {
            let word = word.into();
            if self.contains(&word) {
                continue;
            }
            match slot.get(&word) {
                Some(&i) => fresh[i].1 += 1,
                None => {
                    slot.insert(word.clone(), fresh.len());
                    fresh.push((word, 1));
                }
            }
        }

        fresh.retain(|(_, count)| *count >= min_freq);
        fresh.sort_by(|a, b| b.1.cmp(&a.1));
        if let Some(max) = max_new {
            fresh.truncate(max);
        }

        let mut added = 0;
        for (word, _) in fresh {
            if self.add(word).is_some() {
                added += 1;
            }
        }
        added
    }
}
