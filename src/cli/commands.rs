// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the subcommands `train`, `predict` and `models` and
// all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, EmbeddingFormat, etc.)
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};

use crate::application::train_use_case::TrainConfig;
use crate::data::embeddings::EmbeddingFormat;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a reader on a jtr dataset, evaluate it and optionally store it
    Train(TrainArgs),

    /// Answer questions with a stored reader
    Predict(PredictArgs),

    /// List the registered reader names
    Models,
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Registered reader name, e.g. fastqa_reader or dam_snli_reader
    #[arg(long, default_value = "fastqa_reader")]
    pub model: String,

    /// Training set in jtr JSON format
    #[arg(long)]
    pub train: String,

    /// Development set, evaluated after training
    #[arg(long)]
    pub dev: Option<String>,

    /// Test set, evaluated after training
    #[arg(long)]
    pub test: Option<String>,

    /// Pretrained word embeddings; without them embeddings are learned
    /// from scratch
    #[arg(long)]
    pub embeddings: Option<String>,

    /// glove, word2vec or word2vec_bin
    #[arg(long, default_value = "glove")]
    pub embedding_format: EmbeddingFormat,

    /// Scale every pretrained vector to unit length
    #[arg(long)]
    pub normalize_embeddings: bool,

    /// Keep pretrained embeddings fixed during training
    #[arg(long)]
    pub freeze_embeddings: bool,

    /// Number of full passes through the training data
    #[arg(long, default_value_t = 5)]
    pub epochs: usize,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 1e-3)]
    pub learning_rate: f64,

    /// L2 weight decay penalty
    #[arg(long)]
    pub l2: Option<f32>,

    /// Clip gradients to [-clip_value, clip_value]
    #[arg(long)]
    pub clip_value: Option<f32>,

    /// Dropout probability, i.e. 1 - keep probability
    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    /// Hidden size of the encoders
    #[arg(long, default_value_t = 32)]
    pub repr_dim: usize,

    /// Embedding size when no pretrained embeddings are given
    #[arg(long, default_value_t = 50)]
    pub embedding_dim: usize,

    /// Longest answer span in tokens (QA readers)
    #[arg(long, default_value_t = 10)]
    pub max_span_size: usize,

    /// Number of ranked answers per question
    #[arg(long, default_value_t = 3)]
    pub top_k: usize,

    /// Dataset tokens seen fewer times are left out of the vocabulary
    #[arg(long, default_value_t = 1)]
    pub vocab_min_freq: usize,

    /// Maximum number of dataset tokens added to the vocabulary
    #[arg(long)]
    pub vocab_max_size: Option<usize>,

    #[arg(long, default_value_t = 1337)]
    pub seed: u64,

    /// Store the trained reader in this directory
    #[arg(long)]
    pub save_dir: Option<String>,

    /// Append the per-epoch train/dev/test scores to this CSV file
    #[arg(long)]
    pub write_metrics_to: Option<String>,

    /// Report loss and speed every N iterations
    #[arg(long, default_value_t = 10)]
    pub log_interval: usize,

    /// Train and evaluate on the first --debug-examples training examples
    #[arg(long)]
    pub debug: bool,

    #[arg(long, default_value_t = 10)]
    pub debug_examples: usize,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            model:                a.model,
            train_file:           a.train,
            dev_file:             a.dev,
            test_file:            a.test,
            embeddings:           a.embeddings,
            embedding_format:     a.embedding_format,
            normalize_embeddings: a.normalize_embeddings,
            freeze_embeddings:    a.freeze_embeddings,
            epochs:               a.epochs,
            batch_size:           a.batch_size,
            learning_rate:        a.learning_rate,
            l2:                   a.l2,
            clip_value:           a.clip_value,
            dropout:              a.dropout,
            repr_dim:             a.repr_dim,
            embedding_dim:        a.embedding_dim,
            max_span_size:        a.max_span_size,
            top_k:                a.top_k,
            vocab_min_freq:       a.vocab_min_freq,
            vocab_max_size:       a.vocab_max_size,
            seed:                 a.seed,
            save_dir:             a.save_dir,
            write_metrics_to:     a.write_metrics_to,
            log_interval:         a.log_interval,
            debug:                a.debug,
            debug_examples:       a.debug_examples,
        }
    }
}

/// All arguments for the `predict` command.
/// Either --dataset, or --question with one or more --support.
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Directory written by `train --save-dir`
    #[arg(long)]
    pub reader_dir: String,

    /// jtr dataset whose questions should be answered
    #[arg(long, conflicts_with = "question")]
    pub dataset: Option<String>,

    /// Only read the first N questions of --dataset
    #[arg(long)]
    pub max_count: Option<usize>,

    /// Also score the predictions against the dataset's answers
    #[arg(long, requires = "dataset")]
    pub evaluate: bool,

    /// Questions per inference batch when evaluating
    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// A single question to answer
    #[arg(long, requires = "support")]
    pub question: Option<String>,

    /// Support passage for --question (repeatable)
    #[arg(long)]
    pub support: Vec<String>,

    /// Candidate answer for --question (repeatable)
    #[arg(long)]
    pub candidate: Vec<String>,

    /// Mark answers with [[ ]] instead of terminal colours
    #[arg(long)]
    pub plain: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_train_args_convert_to_config() {
        let cli = Cli::try_parse_from([
            "jack-readers", "train",
            "--model", "dam_reader",
            "--train", "data/snli_snippet.json",
            "--embedding-format", "word2vec",
            "--freeze-embeddings",
            "--l2", "0.001",
            "--debug",
        ])
        .unwrap();

        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg: TrainConfig = args.into();
        assert_eq!(cfg.model, "dam_reader");
        assert_eq!(cfg.embedding_format, EmbeddingFormat::Word2VecText);
        assert_eq!(cfg.l2, Some(0.001));
        assert!(cfg.debug);
        assert!(!cfg.reader_config().train_embeddings);
    }

    #[test]
    fn test_predict_requires_support_with_question() {
        let err = Cli::try_parse_from([
            "jack-readers", "predict", "--reader-dir", "out", "--question", "Why?",
        ]);
        assert!(err.is_err());

        let ok = Cli::try_parse_from([
            "jack-readers", "predict", "--reader-dir", "out",
            "--question", "Why?", "--support", "Because.", "--support", "Really.",
        ])
        .unwrap();
        let Commands::Predict(args) = ok.command else { panic!("expected predict") };
        assert_eq!(args.support.len(), 2);
    }

    #[test]
    fn test_predict_batch_size() {
        let parse = |extra: &[&str]| {
            let mut argv = vec!["jack-readers", "predict", "--reader-dir", "out", "--dataset", "d.json", "--evaluate"];
            argv.extend_from_slice(extra);
            Cli::try_parse_from(argv)
        };

        let Commands::Predict(args) = parse(&[]).unwrap().command else { panic!("expected predict") };
        assert_eq!(args.batch_size, 32);
        let Commands::Predict(args) = parse(&["--batch-size", "4"]).unwrap().command else { panic!("expected predict") };
        assert_eq!(args.batch_size, 4);
    }

    #[test]
    fn test_models_subcommand_parses() {
        let cli = Cli::try_parse_from(["jack-readers", "models"]).unwrap();
        assert!(matches!(cli.command, Commands::Models));
    }
}
