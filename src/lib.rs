#![recursion_limit = "256"]

//! Trainable machine-reading models behind one `Reader` interface:
//! a FastQA-style span extractor and a decomposable-attention NLI
//! classifier, plus the loaders, hooks and CLI around them.

pub mod cli;
pub mod application;
pub mod domain;
pub mod data;
pub mod ml;
pub mod infra;
pub mod error;

pub use error::{ReaderError, Result};
