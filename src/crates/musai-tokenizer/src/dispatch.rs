//! Fan-out of per-file tokenization over a worker pool
//!
//! Each file is independent: parse, preprocess, tokenize. Results come back in input
//! order whatever the execution mode, so sequential and parallel runs write the same
//! corpus.

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

use crate::corpus::TokenFile;
use crate::error::{Result, TokenizerError};
use crate::midi::Score;
use crate::tokenizer::MidiTokenizer;
use crate::track::{Preprocessor, Rejection};

/// What became of one file
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Accepted(TokenFile),
    Rejected(Rejection),
    /// I/O, parse or encoding error
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileResult {
    pub path: PathBuf,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Rayon pool; `None` uses one thread per core
    Parallel { threads: Option<usize> },
    /// Everything on the calling thread, for debugging
    Sequential,
}

pub struct Dispatcher<'a> {
    tokenizer: &'a MidiTokenizer,
    preprocessor: &'a Preprocessor,
    show_progress: bool,
}

impl<'a> Dispatcher<'a> {
    pub fn new(tokenizer: &'a MidiTokenizer, preprocessor: &'a Preprocessor) -> Self {
        Self {
            tokenizer,
            preprocessor,
            show_progress: true,
        }
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn process_file(&self, path: &Path) -> Outcome {
        let score = match Score::from_file(path) {
            Ok(score) => score,
            Err(e) => return Outcome::Failed(e.to_string()),
        };
        let score = match self.preprocessor.process(score) {
            Ok(score) => score,
            Err(rejection) => return Outcome::Rejected(rejection),
        };
        match self.tokenizer.encode(&score) {
            Ok(ids) => Outcome::Accepted(TokenFile {
                ids,
                programs: score.programs(),
            }),
            Err(e) => Outcome::Failed(e.to_string()),
        }
    }

    pub fn run(&self, files: &[PathBuf], mode: ExecutionMode) -> Result<Vec<FileResult>> {
        let progress = self.progress_bar(files.len() as u64);
        let process = |path: &PathBuf| {
            let outcome = self.process_file(path);
            progress.inc(1);
            FileResult {
                path: path.clone(),
                outcome,
            }
        };

        let results: Vec<FileResult> = match mode {
            ExecutionMode::Sequential => files.iter().map(process).collect(),
            ExecutionMode::Parallel { threads } => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads.unwrap_or(0))
                    .build()
                    .map_err(|e| TokenizerError::ThreadPool(e.to_string()))?;
                pool.install(|| files.par_iter().map(process).collect())
            }
        };
        progress.finish_and_clear();

        for result in &results {
            match &result.outcome {
                Outcome::Accepted(tokens) => {
                    log::trace!("{}: {} tokens", result.path.display(), tokens.ids.len())
                }
                Outcome::Rejected(reason) => log::debug!("{}: skipped, {}", result.path.display(), reason),
                Outcome::Failed(message) => log::error!("{}: {}", result.path.display(), message),
            }
        }

        Ok(results)
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let style = ProgressStyle::with_template("{bar:40} {pos}/{len} files {elapsed_precise} eta {eta}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        ProgressBar::new(len).with_style(style)
    }
}
