use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::bpe::Bpe;
use crate::config::{Algorithm, TokenizerConfig};
use crate::error::{Result, TokenizerError};

pub const TOKEN_PARAMS_NAME: &str = "token_params.json";

/// Everything needed to rebuild a tokenizer with the same id assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenParams {
    pub algorithm: Algorithm,
    pub config: TokenizerConfig,
    /// Base vocabulary in id order
    #[serde(rename = "_vocab_base")]
    pub vocab_base: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpe: Option<Bpe>,
}

impl TokenParams {
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(TOKEN_PARAMS_NAME)
    }

    /// Write `token_params.json` into a directory, returning its path
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        let path = Self::path_in(dir);
        let json = serde_json::to_string_pretty(self).map_err(|e| TokenizerError::json(&path, e))?;
        fs::write(&path, json)?;
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(TokenizerError::MissingParams(path.to_path_buf()));
        }
        let data = fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(|e| TokenizerError::json(path, e))
    }

    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load(&Self::path_in(dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bpe::Merge;
    use tempfile::TempDir;

    fn params(bpe: Option<Bpe>) -> TokenParams {
        TokenParams {
            algorithm: Algorithm::Remi,
            config: TokenizerConfig::default(),
            vocab_base: vec!["PAD_None".into(), "BOS_None".into(), "EOS_None".into()],
            bpe,
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let bpe = Bpe {
            base_vocab_size: 3,
            merges: vec![Merge { pair: (1, 2), id: 3 }],
        };
        let original = params(Some(bpe));

        let path = original.save(dir.path()).unwrap();
        assert_eq!(path, dir.path().join(TOKEN_PARAMS_NAME));

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"_vocab_base\""));
        assert!(raw.contains("\"REMI\""));
        assert_eq!(TokenParams::load_from_dir(dir.path()).unwrap(), original);
    }

    #[test]
    fn test_base_params_omit_bpe() {
        let dir = TempDir::new().unwrap();
        let path = params(None).save(dir.path()).unwrap();
        assert!(!fs::read_to_string(path).unwrap().contains("\"bpe\""));
        assert_eq!(TokenParams::load_from_dir(dir.path()).unwrap().bpe, None);
    }

    #[test]
    fn test_missing_params() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            TokenParams::load_from_dir(dir.path()),
            Err(TokenizerError::MissingParams(_))
        ));
    }
}
