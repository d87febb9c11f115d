//! The two tokenizer stages: corpus extraction and BPE learning

use musai_core::{collect_files, ClassFilter, GlobPattern};
use rayon::prelude::*;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::bpe::Bpe;
use crate::config::{Algorithm, TokenizerConfig};
use crate::corpus::{list_token_files, load_tokens, save_tokens, unique_names, TokenFile};
use crate::dispatch::{Dispatcher, ExecutionMode, Outcome};
use crate::error::{Result, TokenizerError};
use crate::params::TokenParams;
use crate::tokenizer::MidiTokenizer;
use crate::track::Preprocessor;

/// Subdirectory of the tokens path holding the BPE corpus and params
pub const BPE_DIR: &str = "bpe";

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub tokens_path: PathBuf,
    pub midis_path: PathBuf,
    pub midis_glob: String,
    pub algorithm: Algorithm,
    pub config: TokenizerConfig,
    pub filter: ClassFilter,
    pub min_beats: u32,
    pub merge: bool,
    pub mode: ExecutionMode,
    pub show_progress: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub accepted: usize,
    pub rejected: usize,
    pub failed: usize,
    pub vocab_size: u32,
    pub error_log: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BpeSummary {
    pub files: usize,
    pub base_vocab_size: u32,
    pub vocab_size: u32,
    pub base_tokens: usize,
    pub bpe_tokens: usize,
}

/// Tokenize every matching MIDI file and write the corpus and `token_params.json`
pub fn extract(options: &ExtractOptions) -> Result<ExtractSummary> {
    let tokenizer = MidiTokenizer::new(options.config.clone(), options.algorithm)?;
    let preprocessor = Preprocessor::new(
        &options.config,
        options.filter,
        options.min_beats,
        options.merge,
    );

    let pattern = GlobPattern::new(&options.midis_glob)?;
    let files = collect_files(&options.midis_path, &pattern)?;
    log::info!(
        "Tokenizing {} files from {} ({}, classes {}, required {})",
        files.len(),
        options.midis_path.display(),
        options.algorithm,
        options.filter.allowed(),
        options.filter.required()
    );

    fs::create_dir_all(&options.tokens_path)?;
    clear_corpus(&options.tokens_path)?;
    let names = unique_names(&files);
    let results = Dispatcher::new(&tokenizer, &preprocessor)
        .show_progress(options.show_progress)
        .run(&files, options.mode)?;

    let mut summary = ExtractSummary::default();
    let mut failures = Vec::new();
    for (result, name) in results.iter().zip(&names) {
        match &result.outcome {
            Outcome::Accepted(tokens) => {
                save_tokens(&options.tokens_path.join(name), tokens)?;
                summary.accepted += 1;
            }
            Outcome::Rejected(_) => summary.rejected += 1,
            Outcome::Failed(message) => {
                failures.push((result.path.as_path(), message.as_str()));
                summary.failed += 1;
            }
        }
    }

    tokenizer.to_params().save(&options.tokens_path)?;
    summary.vocab_size = tokenizer.vocab_size();
    if !failures.is_empty() {
        summary.error_log = Some(write_error_log(&options.tokens_path, &failures)?);
    }

    log::info!(
        "{} files tokenized, {} skipped, {} failed",
        summary.accepted,
        summary.rejected,
        summary.failed
    );
    log::info!("Vocabulary size: {}", summary.vocab_size);
    Ok(summary)
}

/// Remove the corpus files and BPE output of an earlier run
fn clear_corpus(dir: &Path) -> Result<()> {
    let stale = list_token_files(dir)?;
    if !stale.is_empty() {
        log::debug!("Removing {} corpus files from {}", stale.len(), dir.display());
    }
    for path in stale {
        fs::remove_file(path)?;
    }
    clear_bpe_dir(dir)
}

fn clear_bpe_dir(tokens_path: &Path) -> Result<()> {
    let bpe_dir = tokens_path.join(BPE_DIR);
    if bpe_dir.is_dir() {
        fs::remove_dir_all(&bpe_dir)?;
    }
    Ok(())
}

fn write_error_log(dir: &Path, failures: &[(&Path, &str)]) -> Result<PathBuf> {
    let stamp = chrono::Utc::now().format("%Y-%m-%d_%H-%M-%S");
    let path = dir.join(format!("tokenizer_errors_{}.log", stamp));

    let mut contents = String::new();
    for (file, message) in failures {
        let _ = writeln!(contents, "{}: {}", file.display(), message);
    }
    fs::write(&path, contents)?;
    log::warn!("{} files failed, see {}", failures.len(), path.display());
    Ok(path)
}

/// Learn BPE over the corpus in `tokens_path` and write the encoded corpus to `bpe/`
///
/// `vocab_size` defaults to a quarter more than the base vocabulary.
pub fn learn_and_apply_bpe(tokens_path: &Path, vocab_size: Option<u32>) -> Result<BpeSummary> {
    let params = TokenParams::load_from_dir(tokens_path)?;
    if params.bpe.is_some() {
        return Err(TokenizerError::Config(format!(
            "{} already holds BPE params, expected the base vocabulary",
            tokens_path.display()
        )));
    }
    let tokenizer = MidiTokenizer::from_params(params)?;
    let base_vocab_size = tokenizer.vocab_size();
    let target = vocab_size.unwrap_or_else(|| Bpe::default_target(base_vocab_size));
    if target <= base_vocab_size {
        return Err(TokenizerError::Config(format!(
            "BPE vocabulary size {} must exceed the base vocabulary size {}",
            target, base_vocab_size
        )));
    }

    let files = list_token_files(tokens_path)?;
    let documents: Vec<TokenFile> = files
        .iter()
        .map(|path| load_tokens(path))
        .collect::<Result<_>>()?;
    let corpus: Vec<Vec<u32>> = documents.iter().map(|d| d.ids.clone()).collect();
    log::info!(
        "Learning BPE over {} files, {} -> {} tokens",
        files.len(),
        base_vocab_size,
        target
    );

    let bpe = Bpe::learn(&corpus, base_vocab_size, target, tokenizer.vocab().special_count());
    let tokenizer = tokenizer.with_bpe(bpe);

    let out_dir = tokens_path.join(BPE_DIR);
    clear_bpe_dir(tokens_path)?;
    fs::create_dir_all(&out_dir)?;
    let encoded: Vec<TokenFile> = documents
        .par_iter()
        .map(|doc| TokenFile {
            ids: tokenizer.apply_bpe(&doc.ids),
            programs: doc.programs.clone(),
        })
        .collect();

    for (path, doc) in files.iter().zip(&encoded) {
        if let Some(name) = path.file_name() {
            save_tokens(&out_dir.join(name), doc)?;
        }
    }
    tokenizer.to_params().save(&out_dir)?;

    let summary = BpeSummary {
        files: files.len(),
        base_vocab_size,
        vocab_size: tokenizer.vocab_size(),
        base_tokens: corpus.iter().map(Vec::len).sum(),
        bpe_tokens: encoded.iter().map(|d| d.ids.len()).sum(),
    };
    log::info!(
        "BPE vocabulary size: {} ({} tokens down to {})",
        summary.vocab_size,
        summary.base_tokens,
        summary.bpe_tokens
    );
    Ok(summary)
}
