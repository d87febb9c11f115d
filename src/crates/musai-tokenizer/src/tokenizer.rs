use crate::bpe::Bpe;
use crate::config::{Algorithm, TokenizerConfig};
use crate::error::{Result, TokenizerError};
use crate::midi::Score;
use crate::params::TokenParams;
use crate::vocab::Vocab;
use crate::{mmm, remi};

/// Score to token id conversion for one algorithm and configuration
#[derive(Debug, Clone)]
pub struct MidiTokenizer {
    config: TokenizerConfig,
    algorithm: Algorithm,
    vocab: Vocab,
    bpe: Option<Bpe>,
}

impl MidiTokenizer {
    pub fn new(config: TokenizerConfig, algorithm: Algorithm) -> Result<Self> {
        config.validate()?;
        let vocab = Vocab::build(&config, algorithm);
        Ok(Self {
            config,
            algorithm,
            vocab,
            bpe: None,
        })
    }

    /// Rebuild a tokenizer from stored params, keeping their id order
    pub fn from_params(params: TokenParams) -> Result<Self> {
        params.config.validate()?;
        if let Some(bpe) = &params.bpe {
            if bpe.base_vocab_size as usize != params.vocab_base.len() {
                return Err(TokenizerError::Config(format!(
                    "BPE was learned over {} base tokens but the vocabulary has {}",
                    bpe.base_vocab_size,
                    params.vocab_base.len()
                )));
            }
        }
        Ok(Self {
            config: params.config,
            algorithm: params.algorithm,
            vocab: Vocab::from_tokens(params.vocab_base),
            bpe: params.bpe,
        })
    }

    pub fn to_params(&self) -> TokenParams {
        TokenParams {
            algorithm: self.algorithm,
            config: self.config.clone(),
            vocab_base: self.vocab.tokens().to_vec(),
            bpe: self.bpe.clone(),
        }
    }

    pub fn with_bpe(mut self, bpe: Bpe) -> Self {
        self.bpe = Some(bpe);
        self
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    pub fn bpe(&self) -> Option<&Bpe> {
        self.bpe.as_ref()
    }

    /// Size of the id space: the BPE vocabulary when merges are loaded
    pub fn vocab_size(&self) -> u32 {
        self.bpe
            .as_ref()
            .map_or(self.vocab.len() as u32, Bpe::vocab_size)
    }

    pub fn eos_id(&self) -> u32 {
        self.vocab.eos_id()
    }

    /// Token strings of a preprocessed score
    pub fn tokenize(&self, score: &Score) -> Result<Vec<String>> {
        let quantized = score.resample(self.config.max_res());
        match self.algorithm {
            Algorithm::Remi => remi::encode(&quantized, &self.config),
            Algorithm::Mmm => mmm::encode(&quantized, &self.config),
        }
    }

    /// Token ids of a preprocessed score, BPE-encoded when merges are loaded
    pub fn encode(&self, score: &Score) -> Result<Vec<u32>> {
        let tokens = self.tokenize(score)?;
        let ids = self.vocab.encode(&tokens)?;
        Ok(self.apply_bpe(&ids))
    }

    pub fn apply_bpe(&self, ids: &[u32]) -> Vec<u32> {
        match &self.bpe {
            Some(bpe) => bpe.encode(ids),
            None => ids.to_vec(),
        }
    }

    /// Decode ids into a score at `max_res` ticks per beat
    pub fn decode(&self, ids: &[u32]) -> Result<Score> {
        let base_ids = match &self.bpe {
            Some(bpe) => bpe.decode(ids)?,
            None => ids.to_vec(),
        };
        let tokens = self.vocab.decode(&base_ids)?;
        match self.algorithm {
            Algorithm::Remi => remi::decode(&tokens, &self.config),
            Algorithm::Mmm => mmm::decode(&tokens, &self.config),
        }
    }
}
