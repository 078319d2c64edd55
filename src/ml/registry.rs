// ============================================================
// Layer 5 — Reader Registry
// ============================================================
// A fixed, read-only table from reader name to ReaderKind.
// Several aliases point at the same kind:
//
//   fastqa_reader, fastqa                 → FastQa
//   dam_snli_reader, dam_reader,
//   decomposable_attention_reader         → DecomposableAttention
//
// Built once and passed by reference; nothing registers readers
// at runtime.

use std::{collections::BTreeMap, path::Path, sync::Arc};

use crate::domain::{
    resources::SharedResources,
    traits::{Reader, ReaderKind},
};
use crate::error::{ReaderError, Result};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{fastqa_reader::FastQaReader, nli_reader::NliReader};

#[derive(Debug, Clone)]
pub struct ReaderRegistry {
    entries: BTreeMap<&'static str, ReaderKind>,
}

impl Default for ReaderRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl ReaderRegistry {
    /// Every reader this crate ships.
    pub fn standard() -> Self {
        let entries = BTreeMap::from([
            ("fastqa_reader",                 ReaderKind::FastQa),
            ("fastqa",                        ReaderKind::FastQa),
            ("dam_snli_reader",               ReaderKind::DecomposableAttention),
            ("dam_reader",                    ReaderKind::DecomposableAttention),
            ("decomposable_attention_reader", ReaderKind::DecomposableAttention),
        ]);
        Self { entries }
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    pub fn kind(&self, name: &str) -> Result<ReaderKind> {
        self.entries
            .get(name)
            .copied()
            .ok_or_else(|| ReaderError::UnknownReader {
                name:  name.to_string(),
                known: self.names().join(", "),
            })
    }

    /// A fresh, Constructed reader of the named kind.
    pub fn create(&self, name: &str, resources: Arc<SharedResources>) -> Result<Box<dyn Reader>> {
        let kind = self.kind(name)?;
        tracing::debug!("Creating reader '{}' ({:?})", name, kind);
        Ok(construct(kind, resources))
    }

    /// Restore a reader directory written by `Reader::store`.
    pub fn load(&self, dir: impl AsRef<Path>) -> Result<Box<dyn Reader>> {
        let dir  = dir.as_ref();
        let ckpt = CheckpointManager::new(dir);
        let manifest = ckpt.load_manifest()?;
        let config   = ckpt.load_config()?;

        let kind = self.kind(&manifest.reader)?;
        let mut reader = construct(kind, SharedResources::without_embeddings(config).shared());
        reader.load(dir)?;
        tracing::info!("Loaded '{}' from '{}'", manifest.reader, dir.display());
        Ok(reader)
    }
}

fn construct(kind: ReaderKind, resources: Arc<SharedResources>) -> Box<dyn Reader> {
    match kind {
        ReaderKind::FastQa                => Box::new(FastQaReader::new(resources)),
        ReaderKind::DecomposableAttention => Box::new(NliReader::new(resources)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::traits::ReaderState;

    #[test]
    fn test_create_known_reader() {
        let registry = ReaderRegistry::standard();
        let reader = registry
            .create("fastqa_reader", SharedResources::default().shared())
            .unwrap();
        assert_eq!(reader.kind(), ReaderKind::FastQa);
        assert_eq!(reader.state(), ReaderState::Constructed);
    }

    #[test]
    fn test_aliases_share_a_kind() {
        let registry = ReaderRegistry::standard();
        assert_eq!(registry.kind("dam_reader").unwrap(), ReaderKind::DecomposableAttention);
        assert_eq!(registry.kind("fastqa").unwrap(), ReaderKind::FastQa);
        for kind in [ReaderKind::FastQa, ReaderKind::DecomposableAttention] {
            assert_eq!(registry.kind(kind.canonical_name()).unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_reader_lists_known_names() {
        let registry = ReaderRegistry::standard();
        let err = registry
            .create("not_a_model", SharedResources::default().shared())
            .err()
            .unwrap();
        match err {
            ReaderError::UnknownReader { name, known } => {
                assert_eq!(name, "not_a_model");
                assert!(known.contains("fastqa_reader"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_from_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let err = ReaderRegistry::standard().load(tmp.path().join("nothing")).err().unwrap();
        assert!(matches!(err, ReaderError::FileNotFound(_)));
    }
}
