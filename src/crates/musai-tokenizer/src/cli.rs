//! Command line surface shared by the `tokenizer` binary and `musai tokenize`

use anyhow::{bail, Context, Result};
use clap::Args;
use musai_core::{ClassFilter, ClassSet};
use std::path::PathBuf;

use crate::config::{Algorithm, TokenizerConfig};
use crate::corpus::load_tokens;
use crate::dispatch::ExecutionMode;
use crate::params::TokenParams;
use crate::pipeline::{extract, learn_and_apply_bpe, ExtractOptions};
use crate::tokenizer::MidiTokenizer;
use crate::writer::save_midi;

/// Every class but Sound Effects
pub const DEFAULT_CLASSES: &str = "0,1,2,3,4,5,6,7,8,9,10,11,12,13,14,16";

#[derive(Args, Debug, Clone)]
pub struct TokenizeArgs {
    /// Output directory for the token corpus and token_params.json
    #[arg(short, long)]
    pub tokens_path: PathBuf,

    /// Directory holding the MIDI files
    #[arg(short, long)]
    pub midis_path: PathBuf,

    /// Glob selecting MIDI files below the MIDI directory (`**/` descends)
    #[arg(short = 'g', long, default_value = "*.mid")]
    pub midis_glob: String,

    /// Learn BPE over the corpus and write the compressed corpus to <tokens-path>/bpe
    #[arg(short, long)]
    pub bpe: bool,

    /// Extract tokens from the MIDI files
    #[arg(short, long)]
    pub process: bool,

    /// Tokenization algorithm
    #[arg(short, long, value_enum, default_value_t = Algorithm::Mmm)]
    pub algo: Algorithm,

    /// Allowed instrument classes, comma separated (15 is always dropped)
    #[arg(short, long, default_value = DEFAULT_CLASSES)]
    pub classes: String,

    /// Classes a file must contain after filtering, comma separated
    #[arg(short = 'r', long, default_value = "")]
    pub classes_req: String,

    /// Minimum length in beats
    #[arg(short, long, default_value_t = 0)]
    pub length: u32,

    /// Process files one by one on the main thread
    #[arg(short, long)]
    pub debug: bool,

    /// Keep every track instead of merging tracks per class
    #[arg(long)]
    pub no_merge: bool,

    /// Target BPE vocabulary size (default: base size * 1.25)
    #[arg(long)]
    pub vocab_size: Option<u32>,

    /// Worker threads (default: one per core)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

impl TokenizeArgs {
    pub fn class_filter(&self) -> Result<ClassFilter> {
        let allowed = ClassSet::parse_list(&self.classes).context("Invalid --classes")?;
        let required = ClassSet::parse_list(&self.classes_req).context("Invalid --classes-req")?;
        ClassFilter::new(allowed, required).context("Invalid class selection")
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        if self.debug {
            ExecutionMode::Sequential
        } else {
            ExecutionMode::Parallel {
                threads: self.threads,
            }
        }
    }
}

pub fn run_tokenize(args: &TokenizeArgs) -> Result<()> {
    if !args.process && !args.bpe {
        bail!("Nothing to do: pass --process to extract tokens and/or --bpe to apply BPE");
    }

    if args.process {
        let options = ExtractOptions {
            tokens_path: args.tokens_path.clone(),
            midis_path: args.midis_path.clone(),
            midis_glob: args.midis_glob.clone(),
            algorithm: args.algo,
            config: TokenizerConfig::default(),
            filter: args.class_filter()?,
            min_beats: args.length,
            merge: !args.no_merge,
            mode: args.execution_mode(),
            show_progress: !args.no_progress,
        };
        let summary = extract(&options).context("Token extraction failed")?;
        if summary.accepted == 0 {
            log::warn!("No file made it into the corpus");
        }
    }

    if args.bpe {
        learn_and_apply_bpe(&args.tokens_path, args.vocab_size).with_context(|| {
            format!("Failed to apply BPE to {}", args.tokens_path.display())
        })?;
    }

    Ok(())
}

#[derive(Args, Debug, Clone)]
pub struct DetokenizeArgs {
    /// Token file ({"ids": [...], "programs": [...]})
    #[arg(long)]
    pub tokens: PathBuf,

    /// token_params.json the ids were produced with
    #[arg(long)]
    pub params: PathBuf,

    /// MIDI file to write
    #[arg(long)]
    pub output: PathBuf,
}

pub fn run_detokenize(args: &DetokenizeArgs) -> Result<()> {
    let params = TokenParams::load(&args.params)
        .with_context(|| format!("Failed to load {}", args.params.display()))?;
    let tokenizer = MidiTokenizer::from_params(params)?;
    let tokens = load_tokens(&args.tokens)
        .with_context(|| format!("Failed to load {}", args.tokens.display()))?;

    let score = tokenizer.decode(&tokens.ids).context("Failed to decode tokens")?;
    save_midi(&score, &args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    log::info!(
        "Wrote {} tracks ({} beats) to {}",
        score.tracks.len(),
        score.length_beats(),
        args.output.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::{Note, Score, Track};
    use crate::writer::write_midi;
    use clap::Parser;
    use std::fs;
    use tempfile::TempDir;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        args: TokenizeArgs,
    }

    fn parse(argv: &[&str]) -> TokenizeArgs {
        Cli::try_parse_from(std::iter::once("tokenizer").chain(argv.iter().copied()))
            .unwrap()
            .args
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["-t", "out", "-m", "in", "-p"]);
        assert_eq!(args.midis_glob, "*.mid");
        assert_eq!(args.algo, Algorithm::Mmm);
        assert!(!args.bpe);
        assert_eq!(args.length, 0);
        assert_eq!(args.execution_mode(), ExecutionMode::Parallel { threads: None });

        let filter = args.class_filter().unwrap();
        assert_eq!(filter.allowed().to_string(), DEFAULT_CLASSES);
        assert!(filter.required().is_empty());
    }

    #[test]
    fn test_short_flags() {
        let args = parse(&[
            "-t", "out", "-m", "in", "-g", "**/*.mid", "-b", "-p", "-a", "REMI", "-c", "0,3,4,16",
            "-r", "16", "-l", "32", "-d",
        ]);
        assert!(args.bpe && args.process);
        assert_eq!(args.algo, Algorithm::Remi);
        assert_eq!(args.length, 32);
        assert_eq!(args.execution_mode(), ExecutionMode::Sequential);
        assert_eq!(args.class_filter().unwrap().required().to_string(), "16");
    }

    #[test]
    fn test_invalid_class_lists() {
        assert!(parse(&["-t", "o", "-m", "i", "-c", "0,17"]).class_filter().is_err());
        assert!(parse(&["-t", "o", "-m", "i", "-r", "15"]).class_filter().is_err());
        assert!(parse(&["-t", "o", "-m", "i", "-c", "0", "-r", "4"]).class_filter().is_err());
    }

    #[test]
    fn test_nothing_to_do() {
        let args = parse(&["-t", "out", "-m", "in"]);
        assert!(run_tokenize(&args).is_err());
    }

    #[test]
    fn test_tokenize_then_detokenize() {
        let midis = TempDir::new().unwrap();
        let tokens = TempDir::new().unwrap();

        let mut score = Score::new(96);
        let mut piano = Track::new(0, false);
        piano.notes = (0..8).map(|b| Note::new(b * 96, b * 96 + 96, 60 + b as u8, 100)).collect();
        score.tracks.push(piano);
        fs::write(midis.path().join("Tune.mid"), write_midi(&score, 96).unwrap()).unwrap();

        let tokens_arg = tokens.path().to_string_lossy().into_owned();
        let midis_arg = midis.path().to_string_lossy().into_owned();
        let args = parse(&["-t", &tokens_arg, "-m", &midis_arg, "-p", "-b", "--no-progress"]);
        run_tokenize(&args).unwrap();

        let output = tokens.path().join("tune.mid");
        run_detokenize(&DetokenizeArgs {
            tokens: tokens.path().join("bpe").join("tune_mid.json"),
            params: tokens.path().join("bpe").join("token_params.json"),
            output: output.clone(),
        })
        .unwrap();

        let decoded = Score::from_file(&output).unwrap();
        assert_eq!(decoded.ticks_per_beat, 384);
        let pitches: Vec<u8> = decoded.tracks[0].notes.iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, (60..68).collect::<Vec<u8>>());
        assert_eq!(decoded.tracks[0].notes[7], Note::new(7 * 384, 8 * 384, 67, 100));
    }
}
