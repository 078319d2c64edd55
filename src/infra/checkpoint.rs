// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores a reader directory.
//
// What gets saved per reader:
//   1. reader.json   — which reader kind, and its lifecycle state
//   2. config.json   — ReaderConfig (architecture hyperparameters)
//   3. vocab.json    — the reader's frozen vocabulary, ids in order
//   4. labels.json   — label set (classification readers only)
//   5. model.mpk.gz  — all learned parameters
//
// Why save config and vocab separately?
//   The weights alone do not say how big the embedding matrix is or
//   how wide each layer is. To load, we rebuild the model with the
//   exact same shapes first, then pour the weights into it.
//
// Burn's NamedMpkGzFileRecorder with FullPrecisionSettings:
//   - Serialises parameters to named MessagePack, gzip-compressed
//   - Keeps f32 precision, so a restored reader predicts exactly
//     what the stored one did
//   - Type-safe: loading fails if the architecture doesn't match
//
// Directory layout:
//   <dir>/
//     reader.json
//     config.json
//     vocab.json
//     labels.json    ← only for dam_snli_reader
//     model.mpk.gz
//
// Reference: Burn Book §5 (Records and Checkpointing)

use std::{
    fs,
    path::{Path, PathBuf},
};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::domain::{
    resources::ReaderConfig,
    traits::ReaderState,
    vocab::Vocab,
};
use crate::error::{ReaderError, Result};

const MANIFEST_FILE: &str = "reader.json";
const CONFIG_FILE:   &str = "config.json";
const VOCAB_FILE:    &str = "vocab.json";
const LABELS_FILE:   &str = "labels.json";
/// Recorder appends ".mpk.gz"
const MODEL_STEM:    &str = "model";

/// Which reader a directory holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaderManifest {
    pub reader: String,
    pub state:  ReaderState,
}

type WeightsRecorder = NamedMpkGzFileRecorder<FullPrecisionSettings>;

/// Manages one reader directory.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Nothing is touched on disk until something is saved.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    // ─── Manifest / config / vocab / labels ───────────────────────────────────

    pub fn save_manifest(&self, manifest: &ReaderManifest) -> Result<()> {
        self.write_json(MANIFEST_FILE, manifest)
    }

    pub fn load_manifest(&self) -> Result<ReaderManifest> {
        self.read_json(MANIFEST_FILE)
    }

    pub fn save_config(&self, cfg: &ReaderConfig) -> Result<()> {
        self.write_json(CONFIG_FILE, cfg)
    }

    pub fn load_config(&self) -> Result<ReaderConfig> {
        self.read_json(CONFIG_FILE)
    }

    /// Stored as a plain token list; position = id.
    pub fn save_vocab(&self, vocab: &Vocab) -> Result<()> {
        self.write_json(VOCAB_FILE, &vocab.tokens())
    }

    /// Restored frozen, exactly as it was used in training.
    pub fn load_vocab(&self) -> Result<Vocab> {
        let tokens: Vec<String> = self.read_json(VOCAB_FILE)?;
        let mut vocab = Vocab::from_tokens(tokens);
        vocab.freeze();
        Ok(vocab)
    }

    pub fn save_labels(&self, labels: &[String]) -> Result<()> {
        self.write_json(LABELS_FILE, &labels)
    }

    pub fn load_labels(&self) -> Result<Vec<String>> {
        self.read_json(LABELS_FILE)
    }

    // ─── Weights ──────────────────────────────────────────────────────────────

    /// Write every parameter of `model` to `<dir>/model.mpk.gz`.
    pub fn save_model<B: Backend, M: Module<B>>(&self, model: M) -> Result<()> {
        self.ensure_dir()?;
        let path = self.dir.join(MODEL_STEM);
        model
            .save_file(path.clone(), &WeightsRecorder::new())
            .map_err(|e| ReaderError::Persist(format!("'{}': {e:?}", path.display())))?;
        tracing::debug!("Saved weights to '{}.mpk.gz'", path.display());
        Ok(())
    }

    /// Pour stored weights into `model`, which must already have the
    /// stored architecture.
    pub fn load_model<B: Backend, M: Module<B>>(&self, model: M, device: &B::Device) -> Result<M> {
        let path = self.dir.join(MODEL_STEM);
        let file = path.with_extension("mpk.gz");
        if !file.exists() {
            return Err(ReaderError::FileNotFound(file));
        }
        let model = model
            .load_file(path.clone(), &WeightsRecorder::new(), device)
            .map_err(|e| ReaderError::Persist(format!("'{}': {e:?}", path.display())))?;
        tracing::debug!("Loaded weights from '{}'", file.display());
        Ok(model)
    }

    // ─── Helpers ──────────────────────────────────────────────────────────────

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| ReaderError::io(&self.dir, e))
    }

    fn write_json<T: Serialize + ?Sized>(&self, file: &str, value: &T) -> Result<()> {
        self.ensure_dir()?;
        let path = self.dir.join(file);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json).map_err(|e| ReaderError::io(&path, e))?;
        tracing::debug!("Wrote '{}'", path.display());
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, file: &str) -> Result<T> {
        let path = self.dir.join(file);
        let json = fs::read_to_string(&path).map_err(|e| ReaderError::io(&path, e))?;
        serde_json::from_str(&json).map_err(|e| ReaderError::format(&path, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::NdArray,
        nn::{Linear, LinearConfig},
    };

    type TestBackend = NdArray;

    #[test]
    fn test_new_does_not_create_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("reader");
        let _ = CheckpointManager::new(&dir);
        assert!(!dir.exists());
    }

    #[test]
    fn test_manifest_config_vocab_labels_roundtrip() {
        let tmp  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(tmp.path().join("reader"));

        let manifest = ReaderManifest { reader: "fastqa_reader".into(), state: ReaderState::Trained };
        ckpt.save_manifest(&manifest).unwrap();
        assert_eq!(ckpt.load_manifest().unwrap(), manifest);

        let cfg = ReaderConfig { repr_dim: 7, ..ReaderConfig::default() };
        ckpt.save_config(&cfg).unwrap();
        assert_eq!(ckpt.load_config().unwrap(), cfg);

        ckpt.save_vocab(&Vocab::from_tokens(["paris", "is", "nice"])).unwrap();
        let vocab = ckpt.load_vocab().unwrap();
        assert_eq!(vocab.get("nice"), Some(2));
        assert!(vocab.is_frozen());

        ckpt.save_labels(&["entailment".to_string(), "neutral".to_string()]).unwrap();
        assert_eq!(ckpt.load_labels().unwrap(), vec!["entailment", "neutral"]);
    }

    #[test]
    fn test_missing_files_are_file_not_found() {
        let tmp  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(tmp.path());
        assert!(matches!(ckpt.load_manifest(), Err(ReaderError::FileNotFound(_))));

        let device = Default::default();
        let model: Linear<TestBackend> = LinearConfig::new(2, 2).init(&device);
        assert!(matches!(ckpt.load_model(model, &device), Err(ReaderError::FileNotFound(_))));
    }

    #[test]
    fn test_weights_roundtrip_exactly() {
        let tmp    = tempfile::tempdir().unwrap();
        let ckpt   = CheckpointManager::new(tmp.path());
        let device = Default::default();

        let saved: Linear<TestBackend> = LinearConfig::new(3, 2).init(&device);
        ckpt.save_model(saved.clone()).unwrap();

        let fresh: Linear<TestBackend> = LinearConfig::new(3, 2).init(&device);
        let loaded = ckpt.load_model(fresh, &device).unwrap();

        let a: Vec<f32> = saved.weight.val().into_data().to_vec().unwrap();
        let b: Vec<f32> = loaded.weight.val().into_data().to_vec().unwrap();
        assert_eq!(a, b);
    }
}
