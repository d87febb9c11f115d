use log::{debug, info};
use rand::Rng;
use std::path::{Path, PathBuf};

use musai_tokenizer::corpus::list_token_files;
use musai_tokenizer::{load_tokens, MidiTokenizer, TokenParams, BPE_DIR};

use crate::binidx::{self, BinIdx, DType};
use crate::error::{Result, TrainerError};

/// File prefix of the binidx written for token corpora
pub const DATASET_PREFIX: &str = "dataset";

/// A token stream ready for sampling training windows
#[derive(Debug, Clone)]
pub struct Dataset {
    tokens: Vec<u32>,
    vocab_size: u32,
    ctx_len: usize,
    prefix: PathBuf,
    dtype: DType,
}

/// Corpus directory to train on: the BPE corpus when one was learned
pub fn corpus_dir(dataset_path: &Path) -> PathBuf {
    let bpe_dir = dataset_path.join(BPE_DIR);
    if TokenParams::path_in(&bpe_dir).is_file() {
        bpe_dir
    } else {
        dataset_path.to_path_buf()
    }
}

impl Dataset {
    /// Concatenate a token corpus into one stream and write it as `<output>/dataset.{bin,idx}`
    ///
    /// Every document is followed by the EOS id.
    pub fn from_token_corpus(dataset_path: &Path, ctx_len: usize, output_path: &Path) -> Result<Self> {
        let dir = corpus_dir(dataset_path);
        let tokenizer = MidiTokenizer::from_params(TokenParams::load_from_dir(&dir)?)?;
        let eos = tokenizer.eos_id();

        let files = list_token_files(&dir)?;
        if files.is_empty() {
            return Err(TrainerError::EmptyDataset(dir));
        }

        let mut documents = Vec::with_capacity(files.len());
        for file in &files {
            let mut ids = load_tokens(file)?.ids;
            debug!("{}: {} tokens", file.display(), ids.len());
            ids.push(eos);
            documents.push(ids);
        }

        let vocab_size = tokenizer.vocab_size();
        let dtype = DType::for_vocab(vocab_size);
        std::fs::create_dir_all(output_path)?;
        let prefix = output_path.join(DATASET_PREFIX);
        binidx::write_binidx(&prefix, &documents, dtype)?;
        info!(
            "Wrote {} documents from {} to {}",
            documents.len(),
            dir.display(),
            binidx::bin_path(&prefix).display()
        );

        let tokens = documents.concat();
        Self::new(tokens, vocab_size, ctx_len, prefix, dtype)
    }

    /// Open an existing binidx; the vocabulary is sized by its largest id
    pub fn from_binidx(prefix: &Path, ctx_len: usize) -> Result<Self> {
        let data = BinIdx::open(prefix)?;
        let dtype = data.dtype;
        let tokens = data.into_tokens();
        let vocab_size = match tokens.iter().max() {
            Some(max) => max
                .checked_add(1)
                .ok_or_else(|| TrainerError::binidx(prefix, format!("token {} is out of range", max)))?,
            None => 0,
        };
        Self::new(tokens, vocab_size, ctx_len, prefix.to_path_buf(), dtype)
    }

    fn new(tokens: Vec<u32>, vocab_size: u32, ctx_len: usize, prefix: PathBuf, dtype: DType) -> Result<Self> {
        let required = ctx_len + 1;
        if tokens.len() <= required {
            return Err(TrainerError::DatasetTooSmall {
                tokens: tokens.len(),
                required,
            });
        }
        Ok(Dataset {
            tokens,
            vocab_size,
            ctx_len,
            prefix,
            dtype,
        })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[u32] {
        &self.tokens
    }

    pub fn vocab_size(&self) -> u32 {
        self.vocab_size
    }

    pub fn ctx_len(&self) -> usize {
        self.ctx_len
    }

    /// binidx prefix the training process reads
    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// A random window of `ctx_len + 1` tokens as input and target, shifted by one
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> (Vec<u32>, Vec<u32>) {
        let window = self.ctx_len + 1;
        let start = rng.gen_range(0..=self.tokens.len() - window);
        let chunk = &self.tokens[start..start + window];
        (chunk[..self.ctx_len].to_vec(), chunk[1..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use musai_tokenizer::{save_tokens, Algorithm, TokenFile, TokenizerConfig};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    fn write_corpus(dir: &Path, docs: &[Vec<u32>]) -> MidiTokenizer {
        let tokenizer = MidiTokenizer::new(TokenizerConfig::default(), Algorithm::Remi).unwrap();
        tokenizer.to_params().save(dir).unwrap();
        for (i, ids) in docs.iter().enumerate() {
            let file = TokenFile {
                ids: ids.clone(),
                programs: vec![(0, false)],
            };
            save_tokens(&dir.join(format!("doc_{}.json", i)), &file).unwrap();
        }
        tokenizer
    }

    #[test]
    fn test_token_corpus_adds_eos_after_each_document() {
        let corpus = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let tokenizer = write_corpus(corpus.path(), &[vec![10, 11, 12], vec![13, 14]]);
        let eos = tokenizer.eos_id();

        let dataset = Dataset::from_token_corpus(corpus.path(), 4, out.path()).unwrap();
        assert_eq!(dataset.tokens(), &[10, 11, 12, eos, 13, 14, eos]);
        assert_eq!(dataset.vocab_size(), tokenizer.vocab_size());

        let data = BinIdx::open(&out.path().join(DATASET_PREFIX)).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data.sequence(1), &[13, 14, eos]);
    }

    #[test]
    fn test_binidx_vocab_from_max_id() {
        let dir = TempDir::new().unwrap();
        let prefix = dir.path().join("data");
        binidx::write_binidx(&prefix, &[vec![1, 2, 3, 40, 5, 6]], DType::U16).unwrap();

        let dataset = Dataset::from_binidx(&prefix, 3).unwrap();
        assert_eq!(dataset.vocab_size(), 41);
        assert_eq!(dataset.len(), 6);
    }

    #[test]
    fn test_negative_ids_are_rejected() {
        let dir = TempDir::new().unwrap();
        let prefix = dir.path().join("data");
        binidx::write_binidx(&prefix, &[vec![1, 2, 3, 4, 5, 6]], DType::I32).unwrap();

        let mut bin = std::fs::read(binidx::bin_path(&prefix)).unwrap();
        bin[8..12].copy_from_slice(&(-1i32).to_le_bytes());
        std::fs::write(binidx::bin_path(&prefix), bin).unwrap();

        assert!(matches!(
            Dataset::from_binidx(&prefix, 3),
            Err(TrainerError::Binidx { .. })
        ));
    }

    #[test]
    fn test_needs_more_than_context_plus_one() {
        let dir = TempDir::new().unwrap();
        let prefix = dir.path().join("data");
        binidx::write_binidx(&prefix, &[vec![1, 2, 3, 4]], DType::U16).unwrap();

        assert!(matches!(
            Dataset::from_binidx(&prefix, 3),
            Err(TrainerError::DatasetTooSmall { tokens: 4, required: 4 })
        ));
        assert!(Dataset::from_binidx(&prefix, 2).is_ok());
    }

    #[test]
    fn test_empty_corpus() {
        let corpus = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write_corpus(corpus.path(), &[]);
        assert!(matches!(
            Dataset::from_token_corpus(corpus.path(), 4, out.path()),
            Err(TrainerError::EmptyDataset(_))
        ));
    }

    #[test]
    fn test_prefers_bpe_corpus() {
        let corpus = TempDir::new().unwrap();
        write_corpus(corpus.path(), &[vec![10]]);
        assert_eq!(corpus_dir(corpus.path()), corpus.path());

        let bpe = corpus.path().join(BPE_DIR);
        std::fs::create_dir(&bpe).unwrap();
        write_corpus(&bpe, &[vec![10]]);
        assert_eq!(corpus_dir(corpus.path()), bpe);
    }

    #[test]
    fn test_sample_is_shifted_window() {
        let dir = TempDir::new().unwrap();
        let prefix = dir.path().join("data");
        let doc: Vec<u32> = (0..50).collect();
        binidx::write_binidx(&prefix, &[doc], DType::U16).unwrap();
        let dataset = Dataset::from_binidx(&prefix, 8).unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let (x, y) = dataset.sample(&mut rng);
            assert_eq!(x.len(), 8);
            assert_eq!(y.len(), 8);
            assert_eq!(&x[1..], &y[..7]);
            assert_eq!(y[7], x[7] + 1);
        }
    }
}
