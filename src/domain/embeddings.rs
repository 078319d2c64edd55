// ============================================================
// Layer 3 — Embedding Table
// ============================================================
// Fixed-length f32 vectors, one per token, stored row-major in a
// single flat Vec. Immutable once built: the loader in Layer 4
// collects rows and calls `from_rows`, after which only lookups
// and `normalized()` (which returns a new table) are possible.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Embeddings {
    tokens:  Vec<String>,
    index:   HashMap<String, usize>,
    vectors: Vec<f32>,
    dim:     usize,
}

impl Embeddings {
    /// Build a table from (token, vector) rows.
    ///
    /// The first occurrence of a token wins; later duplicates are
    /// dropped. Returns Err with the offending token if a vector does
    /// not have `dim` components.
    pub fn from_rows(
        dim:  usize,
        rows: Vec<(String, Vec<f32>)>,
    ) -> std::result::Result<Self, String> {
        let mut tokens  = Vec::with_capacity(rows.len());
        let mut index   = HashMap::with_capacity(rows.len());
        let mut vectors = Vec::with_capacity(rows.len() * dim);

        for (token, vector) in rows {
            if vector.len() != dim {
                return Err(format!(
                    "vector for '{token}' has {} components, expected {dim}",
                    vector.len()
                ));
            }
            if index.contains_key(&token) {
                continue;
            }
            index.insert(token.clone(), tokens.len());
            tokens.push(token);
            vectors.extend_from_slice(&vector);
        }

        Ok(Self { tokens, index, vectors, dim })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn row(&self, id: usize) -> Option<&[f32]> {
        if id >= self.tokens.len() {
            return None;
        }
        Some(&self.vectors[id * self.dim..(id + 1) * self.dim])
    }

    pub fn get(&self, token: &str) -> Option<&[f32]> {
        self.index.get(token).and_then(|&id| self.row(id))
    }

    /// A copy with every row scaled to unit L2 norm (zero rows stay zero).
    pub fn normalized(&self) -> Self {
        let mut vectors = self.vectors.clone();
        if self.dim > 0 {
            for row in vectors.chunks_mut(self.dim) {
                let norm = row.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 0.0 {
                    row.iter_mut().for_each(|x| *x /= norm);
                }
            }
        }
        Self {
            tokens:  self.tokens.clone(),
            index:   self.index.clone(),
            vectors,
            dim:     self.dim,
        }
    }
}
