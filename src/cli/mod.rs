// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Three commands are supported:
//   1. `train`   — trains a reader on a jtr dataset
//   2. `predict` — loads a stored reader and answers questions
//   3. `models`  — lists the registered reader names
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

/// Highlighting answers inside their passages
pub mod pretty;

use anyhow::{bail, Result};
use clap::Parser;
use commands::{Commands, PredictArgs, TrainArgs};

use crate::domain::qa_setting::{Answer, QaSetting};
use crate::ml::registry::ReaderRegistry;
use pretty::{highlight, HighlightStyle};

#[derive(Parser, Debug)]
#[command(
    name = "jack-readers",
    version,
    about = "Train and run extractive QA and NLI readers on jtr datasets."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)   => run_train(args),
            Commands::Predict(args) => run_predict(args),
            Commands::Models        => run_models(),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Training '{}' on '{}'", args.model, args.train);
    let outcome = TrainUseCase::new(args.into()).execute()?;

    if let Some(n) = outcome.num_params {
        println!("Parameters: {n}");
    }
    if let (Some(first), Some(last)) = (outcome.summary.first_loss(), outcome.summary.final_loss()) {
        println!("Loss: {first:.4} (first epoch) → {last:.4} (last epoch)");
    }
    if let Some(report) = outcome.dev {
        println!("Dev:  {report}");
    }
    if let Some(report) = outcome.test {
        println!("Test: {report}");
    }
    for (setting, answers) in &outcome.predictions {
        print_prediction(setting, answers, HighlightStyle::Ansi);
    }
    match outcome.stored_to {
        Some(dir) => println!("Training complete. Reader stored in '{}'.", dir.display()),
        None      => println!("Training complete."),
    }
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    use crate::application::predict_use_case::PredictUseCase;

    let style   = if args.plain { HighlightStyle::Brackets } else { HighlightStyle::Ansi };
    let predict = PredictUseCase::new(&args.reader_dir)?;

    match (&args.dataset, &args.question) {
        (Some(dataset), _) => {
            for (setting, answers) in predict.predict_file(dataset, args.max_count)? {
                print_prediction(&setting, &answers, style);
            }
            if args.evaluate {
                let report = predict.evaluate_file(dataset, args.max_count, args.batch_size)?;
                println!("Evaluation: {report}");
            }
        }
        (None, Some(question)) => {
            let setting = QaSetting::new(question.as_str(), args.support.clone())
                .with_candidates(args.candidate.clone());
            let answers = predict.predict_one(question, args.support, args.candidate)?;
            print_prediction(&setting, &answers, style);
        }
        (None, None) => bail!("Pass either --dataset or --question with --support"),
    }
    Ok(())
}

fn run_models() -> Result<()> {
    for name in ReaderRegistry::standard().names() {
        println!("{name}");
    }
    Ok(())
}

fn print_prediction(setting: &QaSetting, answers: &[Answer], style: HighlightStyle) {
    match &setting.id {
        Some(id) => println!("\n[{id}] {}", setting.question),
        None     => println!("\n{}", setting.question),
    }
    if answers.is_empty() {
        println!("  (no answer)");
    }
    for (rank, answer) in answers.iter().enumerate() {
        match answer.span {
            Some((start, end)) => {
                let passage = setting
                    .support
                    .get(answer.support_idx)
                    .map(String::as_str)
                    .unwrap_or("");
                println!("  {}. {:.3}  {}", rank + 1, answer.score, highlight(passage, start, end, style));
            }
            None => println!("  {}. {:.3}  {}", rank + 1, answer.score, answer.text),
        }
    }
}
